//! Error types for dcx-action-core

use thiserror::Error;

/// Errors that abort a bootstrap run.
///
/// Discovery misses and poll timeouts are not errors; they are reported as
/// [`crate::output::ScanLocation::NotFound`] and
/// [`crate::poller::PollOutcome::TimedOut`].
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// A required environment variable is absent or empty
    #[error("missing required configuration: {name} is not set")]
    MissingConfig { name: String },

    /// An environment variable holds a value that cannot be used
    #[error("invalid configuration: {name}={value:?}: {reason}")]
    InvalidConfig {
        name: String,
        value: String,
        reason: String,
    },

    /// Non-2xx response from the release service or AI endpoint
    #[error("HTTP {status} from {url}: {snippet}")]
    HttpStatus {
        url: String,
        status: u16,
        snippet: String,
    },

    /// Connection, TLS or timeout failure
    #[error("network error: {0}")]
    Transport(String),

    /// A JSON envelope without a usable asset URL
    #[error("bad release envelope: {0}")]
    BadEnvelope(String),

    /// A status payload that cannot be interpreted
    #[error("bad status payload: {0}")]
    BadStatus(String),

    /// Both installation mechanisms failed
    #[error("installation failed\n  primary: {primary}\n  fallback: {fallback}")]
    Install { primary: String, fallback: String },

    /// The scanner exited non-zero
    #[error("dcx full-pipeline exited with code {exit_code}\n{output}")]
    Pipeline { exit_code: i32, output: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classes, one per process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Network,
    Format,
    Install,
    Pipeline,
    Io,
}

impl ErrorCategory {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCategory::Io => 1,
            ErrorCategory::Config => 2,
            ErrorCategory::Network => 3,
            ErrorCategory::Format => 4,
            ErrorCategory::Install => 5,
            ErrorCategory::Pipeline => 6,
        }
    }
}

impl BootstrapError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BootstrapError::MissingConfig { .. } | BootstrapError::InvalidConfig { .. } => {
                ErrorCategory::Config
            }
            BootstrapError::HttpStatus { .. } | BootstrapError::Transport(_) => {
                ErrorCategory::Network
            }
            BootstrapError::BadEnvelope(_) | BootstrapError::BadStatus(_) => ErrorCategory::Format,
            BootstrapError::Install { .. } => ErrorCategory::Install,
            BootstrapError::Pipeline { .. } => ErrorCategory::Pipeline,
            BootstrapError::Io(_) => ErrorCategory::Io,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        self.category().exit_code()
    }

    pub(crate) fn invalid(name: &str, value: &str, reason: impl Into<String>) -> Self {
        BootstrapError::InvalidConfig {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for BootstrapError {
    fn from(err: reqwest::Error) -> Self {
        BootstrapError::Transport(err.to_string())
    }
}

/// Cut a response body down to something that fits in one log line.
pub(crate) fn snippet(body: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(limit).collect();
    cut.push_str("...");
    cut
}
