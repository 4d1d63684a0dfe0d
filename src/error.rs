//! Error types for the traffic-forecast crate.

use thiserror::Error;

/// Result type alias for traffic-forecast operations.
pub type Result<T> = std::result::Result<T, TrafficError>;

/// Errors that can occur while loading, modelling or rendering traffic data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrafficError {
    /// A required column is missing from the input header.
    #[error("missing required column: {column}")]
    Schema { column: String },

    /// A cell could not be converted to its expected type.
    #[error("cannot parse {column} value '{value}' on line {line}: {reason}")]
    Parse {
        line: u64,
        column: String,
        value: String,
        reason: String,
    },

    /// Data or arguments violate an invariant (duplicate dates, bad horizon, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// `predict` or `cross_validate` was called before `fit`.
    #[error("model must be fitted before prediction")]
    NotFitted,

    /// `fit` was called on an adapter that already holds a fitted model.
    #[error("model is already fitted; call reset() before fitting again")]
    AlreadyFitted,

    /// Not enough history for the requested window.
    #[error("insufficient data: need at least {needed} days, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// The configuration file is malformed or holds invalid values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Numerical failure inside the model (e.g. singular system).
    #[error("computation error: {0}")]
    Computation(String),
}

impl TrafficError {
    /// Build an [`TrafficError::Io`] from a path and any displayable cause.
    pub fn io(path: impl AsRef<std::path::Path>, cause: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = TrafficError::Schema {
            column: "Position".to_string(),
        };
        assert_eq!(err.to_string(), "missing required column: Position");

        let err = TrafficError::Parse {
            line: 4,
            column: "CTR".to_string(),
            value: "abc%".to_string(),
            reason: "not a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot parse CTR value 'abc%' on line 4: not a number"
        );

        let err = TrafficError::InsufficientData { needed: 395, got: 300 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 395 days, got 300"
        );

        let err = TrafficError::NotFitted;
        assert_eq!(err.to_string(), "model must be fitted before prediction");
    }

    #[test]
    fn io_helper_keeps_path_and_cause() {
        let err = TrafficError::io("/tmp/out/forecast.png", "permission denied");
        assert_eq!(
            err,
            TrafficError::Io {
                path: "/tmp/out/forecast.png".to_string(),
                message: "permission denied".to_string(),
            }
        );
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = TrafficError::AlreadyFitted;
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
