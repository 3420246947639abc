// Error taxonomy shared by the client, the loop and the registry
//
// Lookup failures (unknown goal, metric or loop id) are not errors: they are
// reported as `bool` / `Option` / not-found snapshots by the owning type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LooperError>;

#[derive(Debug, Error)]
pub enum LooperError {
    /// Invalid or inconsistent configuration (fatal at construction time)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No credential supplied and none recoverable from env or key files
    #[error(
        "API keys not configured. Set LOOPER_API_KEYS (comma separated), LOOPER_API_KEY, \
         or create a .looper-keys file"
    )]
    MissingCredentials,

    /// Completion endpoint answered with a non-200 status
    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// Completion endpoint answered 200 but without any choice
    #[error("No choices in completion response")]
    EmptyResponse,

    /// Network-level failure, including request timeouts
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A phase exceeded its configured time budget
    #[error("{phase} phase timed out after {secs}s")]
    Timeout { phase: String, secs: u64 },

    /// A phase failed; aborts the current iteration only
    #[error("{phase} phase failed: {message}")]
    Phase { phase: String, message: String },

    /// Command sent to a loop that has already finished
    #[error("Loop {0} is no longer running")]
    LoopClosed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl LooperError {
    /// Transport-class errors are recoverable by the caller (retry, next iteration).
    pub fn is_transient(&self) -> bool {
        match self {
            LooperError::Transport(_) | LooperError::Timeout { .. } => true,
            LooperError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn phase(phase: impl Into<String>, err: impl std::fmt::Display) -> Self {
        LooperError::Phase {
            phase: phase.into(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for LooperError {
    fn from(e: toml::de::Error) -> Self {
        LooperError::Parse(e.to_string())
    }
}

impl From<toml::ser::Error> for LooperError {
    fn from(e: toml::ser::Error) -> Self {
        LooperError::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for LooperError {
    fn from(e: serde_json::Error) -> Self {
        LooperError::Parse(e.to_string())
    }
}
