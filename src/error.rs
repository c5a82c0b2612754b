//! Error types for the provisioning controller
//!
//! Provides structured error types for all controller components and the
//! classification the actions use to decide between failing an instance and
//! waiting for the next poll.

use thiserror::Error;

/// Unified error type for the controller
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Instance name '{name}' does not match pattern '{pattern}'")]
    InvalidInstanceName { name: String, pattern: String },

    #[error("Required setting missing: {key}")]
    MissingSetting { key: String },

    #[error("Invalid value for setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Unsupported operation in state {state}: {operation}")]
    UnsupportedOperation { state: String, operation: String },

    // =========================================================================
    // Resource Availability Errors
    // =========================================================================
    #[error("No capacity in {scope}: {reason}")]
    NoCapacity { scope: String, reason: String },

    #[error("Resource unavailable: {resource} - {reason}")]
    ResourceUnavailable { resource: String, reason: String },

    // =========================================================================
    // Remote Call Errors
    // =========================================================================
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Remote call failed: {endpoint} - {operation}: {reason}")]
    RemoteCall {
        endpoint: String,
        operation: String,
        reason: String,
    },

    #[error("Remote task {task} failed: {reason}")]
    RemoteTaskFailed { task: String, reason: String },

    #[error("Script download failed: {0}")]
    ScriptDownload(#[from] reqwest::Error),

    // =========================================================================
    // Invariant Violations
    // =========================================================================
    #[error("{component} requires setting {key} from a previous step")]
    MissingPrecondition { component: String, key: String },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    // =========================================================================
    // Balancer / Inventory Errors
    // =========================================================================
    #[error("Unknown balancer kind: {kind}")]
    UnknownBalancer { kind: String },

    #[error("Inventory error: {0}")]
    Inventory(String),

    // =========================================================================
    // Secret Handling Errors
    // =========================================================================
    #[error("Secret cipher error: {0}")]
    Cipher(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error taxonomy used at the action boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input: name mismatch, missing required setting
    Validation,
    /// Pool exhaustion, no matching balancer target
    ResourceUnavailable,
    /// The management endpoint rejected or timed out a request
    RemoteCall,
    /// A component was used without its required preconditions
    Invariant,
    /// Anything else (configuration, parsing, IO)
    Internal,
}

/// What an action does with an error it caught
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Keep the current state and try again on the next poll
    RetryNextPoll,
    /// Record the message and move the instance to FAILED
    FailInstance,
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidInstanceName { .. }
            | Error::MissingSetting { .. }
            | Error::InvalidSetting { .. }
            | Error::UnsupportedOperation { .. } => ErrorClass::Validation,

            Error::NoCapacity { .. } | Error::ResourceUnavailable { .. } => {
                ErrorClass::ResourceUnavailable
            }

            Error::Connection { .. }
            | Error::RemoteCall { .. }
            | Error::RemoteTaskFailed { .. }
            | Error::ScriptDownload(_) => ErrorClass::RemoteCall,

            Error::MissingPrecondition { .. } | Error::InvariantViolation(_) => {
                ErrorClass::Invariant
            }

            _ => ErrorClass::Internal,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self.class() {
            ErrorClass::ResourceUnavailable => ErrorAction::RetryNextPoll,
            _ => ErrorAction::FailInstance,
        }
    }

    /// Check if this error is retryable by a later poll
    pub fn is_retryable(&self) -> bool {
        matches!(self.action(), ErrorAction::RetryNextPoll)
    }
}

/// Result type alias for the controller
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let err = Error::InvalidInstanceName {
            name: "Bad Name".into(),
            pattern: "^[a-z]+$".into(),
        };
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(err.action(), ErrorAction::FailInstance);

        let err = Error::NoCapacity {
            scope: "host balancer".into(),
            reason: "no hosts".into(),
        };
        assert_eq!(err.class(), ErrorClass::ResourceUnavailable);
        assert_eq!(err.action(), ErrorAction::RetryNextPoll);

        let err = Error::MissingPrecondition {
            component: "storage balancer".into(),
            key: "HOST".into(),
        };
        assert_eq!(err.class(), ErrorClass::Invariant);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::ResourceUnavailable {
            resource: "client pool vc-1".into(),
            reason: "timed out".into(),
        };
        assert!(transient.is_retryable());

        let remote = Error::RemoteCall {
            endpoint: "vc-1".into(),
            operation: "clone".into(),
            reason: "fault".into(),
        };
        assert!(!remote.is_retryable());
        assert_eq!(remote.class(), ErrorClass::RemoteCall);
    }

    #[test]
    fn test_invalid_name_message_carries_name_and_pattern() {
        let err = Error::InvalidInstanceName {
            name: "Bad Name".into(),
            pattern: "^[a-z]+$".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Bad Name"));
        assert!(msg.contains("^[a-z]+$"));
    }
}
