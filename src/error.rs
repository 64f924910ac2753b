use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "providers[0].api_key", "choices/0/delta/content")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected shape, offending payload)
    pub details: Option<String>,
    /// Source of the error (e.g., "frame_decoder", "deployment_resolver")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for llm-conduit.
/// This aggregates all low-level failures into actionable, high-level categories.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-success HTTP status from an upstream backend. Carries the raw
    /// error body verbatim; never retried automatically.
    #[error("Backend error: HTTP {status}: {message}")]
    Backend { status: u16, message: String },

    /// Connection-level failure before any HTTP status was produced.
    #[error("Network transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Parse error: {message}{}", format_context(.context))]
    Parse {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// No running deployment matched the requested model name.
    #[error("No deployment found for model '{model}'")]
    Resolution { model: String },

    /// A cached deployment failed its liveness re-check. Recovered internally
    /// by eviction and re-resolution; surfaces only when re-resolution fails.
    #[error("Deployment '{deployment}' failed health check")]
    Health { deployment: String },

    /// A subprocess backend exited unsuccessfully before producing output.
    #[error("Command failed{}: {stderr}", format_exit(.status))]
    Command {
        status: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_exit(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!(" (exit code {})", code),
        None => " (terminated by signal)".to_string(),
    }
}

impl Error {
    /// Create a backend error from an HTTP status and raw response body.
    pub fn backend(status: u16, body: impl Into<String>) -> Self {
        Error::Backend {
            status,
            message: body.into(),
        }
    }

    /// Create a parse error without structured context
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a parse error with structured context
    pub fn parse_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Parse {
            message: msg.into(),
            context,
        }
    }

    /// Create a configuration error without structured context
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Parse { context, .. } | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// HTTP status carried by this error, when one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Backend { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
