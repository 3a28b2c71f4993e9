//! Codec errors
//!
//! Every decode failure aborts the whole enclosing message; nothing in the
//! codec is retried or partially surfaced.

use thiserror::Error;

use super::MessageType;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated {what}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("Malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("Unknown {union} discriminant: {code:#04x}")]
    UnknownVariant { union: &'static str, code: u8 },

    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("{0} is outbound-only and cannot be decoded")]
    UnsupportedOperation(MessageType),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Message too large: {0} bytes (max: {1})")]
    MessageTooLarge(usize, usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

impl CodecError {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            what,
            reason: reason.into(),
        }
    }

    /// True for buffer overruns and structurally invalid fields.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CodecError::Truncated { .. } | CodecError::Malformed { .. }
        )
    }
}
