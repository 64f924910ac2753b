//! Incremental SSE frame parsing (Bytes -> StreamChunk)

use std::sync::Arc;

use bytes::BytesMut;
use futures::{stream, StreamExt};
use tracing::{debug, warn};

use super::{ByteStream, FrameDecoder};
use crate::types::chunk::StreamChunk;
use crate::ChunkStream;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Turn a raw byte stream into a chunk stream using `decoder` for payload
/// semantics.
///
/// The state machine buffers raw bytes and frames lines before any UTF-8
/// decoding, so the emitted chunk sequence is identical whether the
/// transport delivers the response in one fragment or byte-at-a-time — a
/// multi-byte character split across fragments is reassembled intact. After
/// the terminal chunk is emitted the input is dropped without further reads.
pub fn sse_chunk_stream(input: ByteStream, decoder: Arc<dyn FrameDecoder>) -> ChunkStream {
    let stream = stream::unfold(
        (input, BytesMut::new(), false),
        move |(mut input, mut buf, done)| {
            let decoder = Arc::clone(&decoder);
            async move {
                if done {
                    return None;
                }

                loop {
                    // Emit complete lines from the buffer first. Text
                    // conversion happens per complete line, never per
                    // fragment.
                    while let Some(idx) = buf.iter().position(|b| *b == b'\n') {
                        let mut line_bytes = buf.split_to(idx + 1);
                        line_bytes.truncate(idx);
                        if line_bytes.last() == Some(&b'\r') {
                            line_bytes.truncate(line_bytes.len() - 1);
                        }
                        let line = String::from_utf8_lossy(&line_bytes);

                        match decode_line(decoder.as_ref(), &line) {
                            LineOutcome::Skip => continue,
                            LineOutcome::Chunk(chunk) => {
                                let finished = chunk.done;
                                return Some((Ok(chunk), (input, buf, finished)));
                            }
                        }
                    }

                    // Need more data.
                    match input.next().await {
                        Some(Ok(bytes)) => {
                            buf.extend_from_slice(&bytes);
                        }
                        Some(Err(e)) => {
                            // The connection is gone; whatever was delivered
                            // stands. Terminate the stream normally.
                            warn!(error = %e, "stream transport failed; terminating");
                            return Some((Ok(StreamChunk::terminal()), (input, buf, true)));
                        }
                        None => {
                            // EOF: flush a final unterminated line, if any.
                            let mut line_bytes = buf.split();
                            if line_bytes.last() == Some(&b'\r') {
                                line_bytes.truncate(line_bytes.len() - 1);
                            }
                            let line = String::from_utf8_lossy(&line_bytes);
                            if let LineOutcome::Chunk(chunk) =
                                decode_line(decoder.as_ref(), &line)
                            {
                                let finished = chunk.done;
                                if finished {
                                    return Some((Ok(chunk), (input, buf, true)));
                                }
                                // One more poll will hit EOF again and
                                // synthesize the terminal chunk.
                                return Some((Ok(chunk), (input, buf, false)));
                            }
                            return Some((Ok(StreamChunk::terminal()), (input, buf, true)));
                        }
                    }
                }
            }
        },
    );

    Box::pin(stream)
}

enum LineOutcome {
    Skip,
    Chunk(StreamChunk),
}

fn decode_line(decoder: &dyn FrameDecoder, line: &str) -> LineOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineOutcome::Skip;
    }

    // Only data lines are forwarded; event names, comments and anything
    // else a backend interleaves stay invisible to the decoder.
    let payload = match trimmed.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.trim_start(),
        None => return LineOutcome::Skip,
    };

    if payload == DONE_SENTINEL {
        return LineOutcome::Chunk(StreamChunk::terminal());
    }

    match decoder.decode_frame(payload) {
        Ok(Some(chunk)) => {
            if chunk.is_empty() {
                LineOutcome::Skip
            } else {
                LineOutcome::Chunk(chunk)
            }
        }
        Ok(None) => LineOutcome::Skip,
        Err(e) => {
            debug!(error = %e, frame = payload, "skipping undecodable frame");
            LineOutcome::Skip
        }
    }
}
