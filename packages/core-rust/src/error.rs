//! Error taxonomy shared by every layer of the controller.

use serde::{Deserialize, Serialize};

use crate::handle::Handle;

/// Error kinds reported by actions, the registry and the boundary traits.
///
/// Errors are plain data: actions store them, composites copy the first
/// child's error upward, and job reports carry them back to the originator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlError {
    /// A required action parameter is unbound or malformed.
    #[error("parameter error: {0}")]
    Parameter(String),
    /// The operation was rejected by a local precondition.
    #[error("not possible: {0}")]
    NotPossible(String),
    /// The referenced entity is unknown to the registry.
    #[error("unknown {kind}: {name}")]
    OutOfRange { kind: String, name: String },
    /// A database call failed.
    #[error("database error: {0}")]
    Database(String),
    /// The routing engine rejected or failed a request.
    #[error("communication error: {0}")]
    Communication(String),
    /// No acknowledgement arrived before the request deadline.
    #[error("request {0} timed out")]
    Timeout(Handle),
    /// The operation was a legal no-op.
    #[error("no change")]
    NoChange,
    /// A handle was registered twice while still outstanding.
    #[error("handle {0} is already registered")]
    DuplicateHandle(Handle),
    /// The action was torn down before it finished.
    #[error("aborted")]
    Aborted,
}

impl ControlError {
    /// `OutOfRange` error naming the unknown entity.
    #[must_use]
    pub fn out_of_range(kind: &str, name: impl Into<String>) -> Self {
        ControlError::OutOfRange {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Short machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ControlError::Parameter(_) => "PARAMETER",
            ControlError::NotPossible(_) => "NOT_POSSIBLE",
            ControlError::OutOfRange { .. } => "OUT_OF_RANGE",
            ControlError::Database(_) => "DATABASE",
            ControlError::Communication(_) => "COMMUNICATION",
            ControlError::Timeout(_) => "TIMEOUT",
            ControlError::NoChange => "NO_CHANGE",
            ControlError::DuplicateHandle(_) => "DUPLICATE_HANDLE",
            ControlError::Aborted => "ABORTED",
        }
    }
}

pub type ControlResult<T> = Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::RequestKind;

    #[test]
    fn display_messages() {
        let err = ControlError::out_of_range("sink", "AMP");
        assert_eq!(err.to_string(), "unknown sink: AMP");
        let err = ControlError::Timeout(Handle::new(RequestKind::SetSinkVolume, 3));
        assert_eq!(err.to_string(), "request H_SETSINKVOLUME#3 timed out");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(ControlError::Parameter("volume".into())).unwrap();
        assert_eq!(json["kind"], "PARAMETER");
        assert_eq!(json["detail"], "volume");
        let json = serde_json::to_value(ControlError::NoChange).unwrap();
        assert_eq!(json["kind"], "NO_CHANGE");
    }
}
