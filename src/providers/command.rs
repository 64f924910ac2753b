//! 子进程适配器 — 将本地安装的 CLI 工具桥接为统一的聊天后端
//!
//! Subprocess adapter bridging locally installed CLI tools (agent CLIs,
//! local runners) into the provider contract. The conversation is flattened
//! into one role-annotated prompt argument; streaming reads the child's
//! stdout line by line, attempting known JSON shapes before falling back to
//! raw text. Output lines travel through a bounded channel from the reader
//! task to the consumer, and the child is killed when the stream is dropped.

use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::ErrorContext;
use crate::providers::ChatProvider;
use crate::types::chunk::{ChatResponse, StreamChunk, Usage};
use crate::types::message::{Message, MessageRole};
use crate::types::model::ModelInfo;
use crate::types::request::ChatRequest;
use crate::{ChunkStream, Error, Result};

/// Upper bound for one stdout line; protects against a runaway child.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Depth of the reader-to-consumer channel. A slow consumer applies
/// backpressure to the reader task rather than buffering unboundedly.
const CHANNEL_DEPTH: usize = 32;

pub struct CommandProvider {
    tag: String,
    program: String,
    base_args: Vec<String>,
    model_flag: Option<String>,
    env: HashMap<String, String>,
    model_list: Vec<String>,
}

impl fmt::Debug for CommandProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // env overrides may carry credentials; keep them out of Debug.
        f.debug_struct("CommandProvider")
            .field("tag", &self.tag)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl CommandProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let program = config.command.clone().ok_or_else(|| {
            Error::configuration(format!("provider '{}' requires a command", config.tag()))
        })?;
        Ok(Self {
            tag: config.tag().to_string(),
            program,
            base_args: config.args.clone(),
            model_flag: config.model_flag.clone(),
            env: config.env.clone(),
            model_list: config.model_list.clone(),
        })
    }

    fn build_command(&self, request: &ChatRequest) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.base_args);
        if let Some(flag) = &self.model_flag {
            let model = request.native_model(&self.tag);
            if !model.is_empty() {
                cmd.arg(flag).arg(model);
            }
        }
        cmd.arg(flatten_transcript(&request.messages));
        cmd.envs(&self.env);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Flatten the message list into one role-annotated transcript argument.
pub(crate) fn flatten_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let label = match m.role {
                MessageRole::System => "System",
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            format!("{}: {}", label, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Interpret one stdout line. Known JSON shapes yield their text payload;
/// JSON without a recognizable payload is treated as housekeeping (skipped
/// upstream via `is_empty`); anything that is not JSON is forwarded raw.
pub(crate) fn decode_output_line(line: &str) -> StreamChunk {
    if let Ok(v) = serde_json::from_str::<Value>(line) {
        return match extract_json_content(&v) {
            Some(text) => StreamChunk::delta(text),
            None => StreamChunk {
                content: None,
                done: false,
            },
        };
    }
    StreamChunk::delta(line.trim_end())
}

fn extract_json_content(v: &Value) -> Option<String> {
    // Bare form: {"content": "..."}
    if let Some(s) = v.get("content").and_then(|c| c.as_str()) {
        return Some(s.to_string());
    }
    // Agent-CLI form: {"message": {"content": [{"type": "text", "text": "..."}]}}
    if let Some(blocks) = v.pointer("/message/content").and_then(|c| c.as_array()) {
        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        if !text.is_empty() {
            return Some(text);
        }
        return None;
    }
    // Delta form: {"delta": {"text": "..."}}
    if let Some(s) = v.pointer("/delta/text").and_then(|t| t.as_str()) {
        return Some(s.to_string());
    }
    None
}

fn command_failure(status: Option<i32>, stderr: &str) -> Error {
    let stderr = stderr.trim();
    Error::Command {
        status,
        stderr: if stderr.is_empty() {
            "process produced no diagnostics".to_string()
        } else {
            stderr.to_string()
        },
    }
}

#[async_trait]
impl ChatProvider for CommandProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Command
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let output = self.build_command(request).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(command_failure(output.status.code(), &stderr));
        }
        let content = String::from_utf8_lossy(&output.stdout);
        Ok(ChatResponse::new(
            content.trim_end_matches('\n'),
            Usage::default(),
        ))
    }

    /// Stream the child's stdout line by line.
    ///
    /// A process-level failure after at least one delivered chunk is
    /// swallowed (logged) and the stream ends normally with its terminal
    /// chunk; a failure before any output surfaces as the stream's only
    /// item.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let mut cmd = self.build_command(request);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Command {
            status: None,
            stderr: "child stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel::<Result<StreamChunk>>(CHANNEL_DEPTH);
        let program = self.program.clone();

        tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
            let mut emitted = 0usize;
            let mut framing_error: Option<String> = None;

            while let Some(item) = lines.next().await {
                match item {
                    Ok(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let chunk = decode_output_line(&line);
                        if chunk.is_empty() {
                            continue;
                        }
                        emitted += 1;
                        if tx.send(Ok(chunk)).await.is_err() {
                            // Consumer dropped the stream; kill_on_drop
                            // reaps the child when we return.
                            return;
                        }
                    }
                    Err(e) => {
                        debug!(program = %program, error = %e, "unreadable output line; stopping reader");
                        framing_error = Some(e.to_string());
                        break;
                    }
                }
            }

            // Release the stdout pipe before anything that waits on the
            // child. After a framing error the child may still be mid-write
            // on an over-long line; holding the pipe open would leave it
            // blocked, keeping stderr open and the consumer pending forever.
            drop(lines);
            if framing_error.is_some() {
                let _ = child.kill().await;
            }

            // Drain stderr before waiting so a chatty child cannot block on
            // a full pipe.
            let mut stderr_text = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut stderr_text).await;
            }

            if let Some(reason) = framing_error {
                if emitted > 0 {
                    warn!(
                        program = %program,
                        error = %reason,
                        "output framing failed after partial output; keeping delivered chunks"
                    );
                    let _ = tx.send(Ok(StreamChunk::terminal())).await;
                } else {
                    let mut context = ErrorContext::new().with_source(program.clone());
                    let diagnostics = stderr_text.trim();
                    if !diagnostics.is_empty() {
                        context = context.with_details(diagnostics);
                    }
                    let _ = tx
                        .send(Err(Error::parse_with_context(
                            format!("unreadable command output: {}", reason),
                            context,
                        )))
                        .await;
                }
                return;
            }

            let outcome = child.wait().await;
            match outcome {
                Ok(status) if status.success() => {
                    let _ = tx.send(Ok(StreamChunk::terminal())).await;
                }
                Ok(status) => {
                    if emitted > 0 {
                        warn!(
                            program = %program,
                            exit_code = status.code().unwrap_or(-1),
                            stderr = %stderr_text.trim(),
                            "command failed after partial output; keeping delivered chunks"
                        );
                        let _ = tx.send(Ok(StreamChunk::terminal())).await;
                    } else {
                        let _ = tx
                            .send(Err(command_failure(status.code(), &stderr_text)))
                            .await;
                    }
                }
                Err(e) => {
                    if emitted > 0 {
                        warn!(program = %program, error = %e, "could not reap command; keeping delivered chunks");
                        let _ = tx.send(Ok(StreamChunk::terminal())).await;
                    } else {
                        let _ = tx.send(Err(Error::Io(e))).await;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        // CLI tools expose no listing endpoint; the configured list is the
        // source of truth and catalog defaults cover the rest.
        Ok(self
            .model_list
            .iter()
            .map(|m| ModelInfo::new(&self.tag, m))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CommandProvider {
        CommandProvider::new(
            &ProviderConfig::new(ProviderKind::Command)
                .with_name("cli")
                .with_command("mycli")
                .with_args(vec!["-p".to_string()])
                .with_model_flag("--model"),
        )
        .unwrap()
    }

    #[test]
    fn test_flatten_transcript_sections() {
        let prompt = flatten_transcript(&[
            Message::system("Be brief."),
            Message::user("Hi"),
            Message::assistant("Hello."),
        ]);
        assert_eq!(prompt, "System: Be brief.\n\nUser: Hi\n\nAssistant: Hello.");
    }

    #[test]
    fn test_argv_layout() {
        let request = ChatRequest::new("cli:sonnet", vec![Message::user("Hi")]);
        let cmd = provider().build_command(&request);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-p", "--model", "sonnet", "User: Hi"]);
    }

    #[test]
    fn test_argv_without_model_flag() {
        let config = ProviderConfig::new(ProviderKind::Command)
            .with_name("cli")
            .with_command("mycli");
        let provider = CommandProvider::new(&config).unwrap();
        let request = ChatRequest::new("cli:sonnet", vec![Message::user("Hi")]);
        let args: Vec<String> = provider
            .build_command(&request)
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["User: Hi"]);
    }

    #[test]
    fn test_decode_bare_content_shape() {
        let chunk = decode_output_line(r#"{"content":"hello"}"#);
        assert_eq!(chunk, StreamChunk::delta("hello"));
    }

    #[test]
    fn test_decode_message_block_shape() {
        let line = r#"{"message":{"content":[{"type":"text","text":"Hel"},{"type":"text","text":"lo"}]}}"#;
        assert_eq!(decode_output_line(line), StreamChunk::delta("Hello"));
    }

    #[test]
    fn test_decode_delta_shape() {
        let chunk = decode_output_line(r#"{"delta":{"text":"partial"}}"#);
        assert_eq!(chunk, StreamChunk::delta("partial"));
    }

    #[test]
    fn test_decode_unrecognized_json_is_housekeeping() {
        let chunk = decode_output_line(r#"{"type":"system","subtype":"init"}"#);
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_decode_plain_text_falls_back_raw() {
        let chunk = decode_output_line("plain output line");
        assert_eq!(chunk, StreamChunk::delta("plain output line"));
    }
}
