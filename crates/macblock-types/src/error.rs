//! Error types for macblock.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the macblock [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for macblock operations.
///
/// Each variant maps to a user-visible outcome: `User`, `StateCorrupt`,
/// `Conflict`, and `Partial` exit with code 1; `Platform` and `Privilege`
/// exit with code 2. `Transient` failures are retried inside the daemon and
/// surfaced to the CLI with code 1.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input from the user: invalid domain, invalid duration, unknown
    /// source name.
    #[error("{0}")]
    User(String),

    /// The state file is unreadable or malformed and needs admin attention.
    #[error("state file {} is corrupt ({reason}); repair or delete it and run the command again", path.display())]
    StateCorrupt {
        /// Path of the offending state file.
        path: PathBuf,
        /// What made the load fail.
        reason: String,
    },

    /// Wrong OS or a required system binary is missing.
    #[error("platform error: {0}")]
    Platform(String),

    /// Root required but absent, or an escalation loop was detected.
    #[error("{0}")]
    Privilege(String),

    /// Another process owns a resource we need, e.g. port 53.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Timeout, subprocess failure, or network unreachability. Retryable.
    #[error("{context}: {message}")]
    Transient {
        /// The operation that failed.
        context: String,
        /// Underlying failure text.
        message: String,
    },

    /// Some per-service operations applied, some failed.
    #[error("{summary}: {}", failures.join(", "))]
    Partial {
        /// Short description of the overall operation.
        summary: String,
        /// One entry per failed service, each naming the service and cause.
        failures: Vec<String>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a user error.
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Creates a platform error.
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Creates a privilege error.
    pub fn privilege(message: impl Into<String>) -> Self {
        Self::Privilege(message.into())
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a transient (retryable) error.
    pub fn transient(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Returns true if the operation may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Io(_))
    }

    /// Process exit code for this error per the command contract.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Platform(_) | Self::Privilege(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_command_contract() {
        assert_eq!(Error::user("bad").exit_code(), 1);
        assert_eq!(Error::conflict("port 53").exit_code(), 1);
        assert_eq!(Error::platform("not macOS").exit_code(), 2);
        assert_eq!(Error::privilege("root required").exit_code(), 2);
        assert_eq!(
            Error::StateCorrupt {
                path: PathBuf::from("/tmp/state.json"),
                reason: "not an object".into(),
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn state_corrupt_message_names_file_and_remediation() {
        let err = Error::StateCorrupt {
            path: PathBuf::from("/usr/local/etc/macblock/state.json"),
            reason: "schema_version is not an integer".into(),
        };
        let text = err.to_string();
        assert!(text.contains("state.json"));
        assert!(text.contains("repair or delete"));
    }

    #[test]
    fn partial_failure_lists_services() {
        let err = Error::Partial {
            summary: "failed to apply DNS on 2 services".into(),
            failures: vec!["Wi-Fi: timed out".into(), "Ethernet: exit 1".into()],
        };
        let text = err.to_string();
        assert!(text.contains("Wi-Fi"));
        assert!(text.contains("Ethernet"));
    }
}
