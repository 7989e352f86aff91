//! Error types shared by the pipe engine, the command sets and the session.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ShellError> = std::result::Result<T, E>;

/// Errors raised by channels, stages and the surrounding session.
///
/// Only validation errors stop a pipeline before it starts. Every other
/// variant is local to the stage that produced it: the stage stops, its
/// writer closes, and downstream stages see an ordinary end-of-data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShellError {
    /// A write was attempted after every reader of the pipe closed (SIGPIPE).
    #[error("broken pipe: '{pipe}' is read-closed")]
    BrokenPipe { pipe: String },

    /// A write was attempted after every writer of the pipe closed.
    #[error("pipe already write-closed '{pipe}'")]
    AlreadyWriteClosed { pipe: String },

    /// `try_write` found the buffer at capacity.
    #[error("pipe '{pipe}' is full")]
    WouldBlock { pipe: String },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Fewer positional arguments than the command requires.
    #[error("{command}: expected {expected} argument(s), got {got}")]
    MissingArgument {
        command: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The host bridge answered with an `errors` field.
    #[error("host error: {0}")]
    Host(String),

    /// The executor refused to start a stage.
    #[error("failed to start stage: {0}")]
    Spawn(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("history error: {0}")]
    History(String),
}

impl ShellError {
    /// Whether this error is the expected way for a producer to learn that
    /// its consumer went away. Such errors are logged, not shown to the user.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, ShellError::BrokenPipe { .. })
    }

    pub fn missing(command: impl Into<String>, expected: usize, got: usize) -> Self {
        ShellError::MissingArgument {
            command: command.into(),
            expected,
            got,
        }
    }
}

impl From<regex::Error> for ShellError {
    fn from(err: regex::Error) -> Self {
        ShellError::InvalidArgument(err.to_string())
    }
}

impl From<futures::task::SpawnError> for ShellError {
    fn from(err: futures::task::SpawnError) -> Self {
        ShellError::Spawn(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ShellError::UnknownCommand("frob".into());
        assert_eq!(err.to_string(), "Unknown command: frob");

        let err = ShellError::missing("gsub", 2, 1);
        assert_eq!(err.to_string(), "gsub: expected 2 argument(s), got 1");
    }

    #[test]
    fn test_is_broken_pipe() {
        assert!(ShellError::BrokenPipe { pipe: "p".into() }.is_broken_pipe());
        assert!(!ShellError::AlreadyWriteClosed { pipe: "p".into() }.is_broken_pipe());
    }

    #[test]
    fn test_from_regex_error() {
        let err: ShellError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, ShellError::InvalidArgument(_)));
    }
}
