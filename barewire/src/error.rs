use thiserror::Error;

/// Error type shared by every layer of the crate.
///
/// Collaborator failures (transports, platform providers) are wrapped with
/// their message preserved verbatim; nothing in the core panics on malformed
/// input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BareWireError {
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("encoding failed: {0}")]
    Encoding(String),
    #[error("decoding failed: {0}")]
    Decoding(String),
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("out of bounds: {length} byte(s) at offset {offset}")]
    OutOfBounds { offset: usize, length: usize },
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("platform provider error: {0}")]
    Platform(String),
    #[error("rpc call failed: {0}")]
    Rpc(String),
    #[error("rpc call timed out after {waited_ms} ms")]
    RpcTimeout { waited_ms: u64 },
}

pub type Result<T> = std::result::Result<T, BareWireError>;

impl BareWireError {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        BareWireError::SchemaValidation(msg.into())
    }

    pub(crate) fn encoding(msg: impl Into<String>) -> Self {
        BareWireError::Encoding(msg.into())
    }

    pub(crate) fn decoding(msg: impl Into<String>) -> Self {
        BareWireError::Decoding(msg.into())
    }

    pub(crate) fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BareWireError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        BareWireError::InvalidValue(msg.into())
    }

    pub(crate) fn platform(msg: impl Into<String>) -> Self {
        BareWireError::Platform(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = BareWireError::OutOfBounds {
            offset: 12,
            length: 4,
        };
        assert_eq!(err.to_string(), "out of bounds: 4 byte(s) at offset 12");

        let err = BareWireError::mismatch("u32", "string");
        assert_eq!(err.to_string(), "type mismatch: expected u32, found string");
    }
}
