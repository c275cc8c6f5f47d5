use thiserror::Error;

/// Main error type for EKM meter operations
#[derive(Error, Debug)]
pub enum EkmError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    #[error("Checksum mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    ChecksumMismatch { computed: u16, received: u16 },

    #[error("Read timed out")]
    ReadTimeout,

    #[error("Malformed field {field}: byte 0x{byte:02X} at position {position}")]
    MalformedField {
        field: &'static str,
        position: usize,
        byte: u8,
    },

    #[error("Authentication rejected by meter")]
    AuthRejected,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl EkmError {
    /// Whether the error only spoils the current polling cycle.
    ///
    /// Everything the meter can do to us on the wire is transient: the
    /// reader logs it and tries again on the next tick. Local I/O failures
    /// and programming errors (wrong state, bad arguments) are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EkmError::ShortRead { .. }
                | EkmError::ChecksumMismatch { .. }
                | EkmError::ReadTimeout
                | EkmError::MalformedField { .. }
                | EkmError::AuthRejected
        )
    }

    /// Attach a field name to a `MalformedField` error.
    pub fn in_field(self, name: &'static str) -> Self {
        match self {
            EkmError::MalformedField { position, byte, .. } => EkmError::MalformedField {
                field: name,
                position,
                byte,
            },
            other => other,
        }
    }
}

/// Result type alias for EKM meter operations
pub type EkmResult<T> = Result<T, EkmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(EkmError::ReadTimeout.is_transient());
        assert!(EkmError::ChecksumMismatch { computed: 1, received: 2 }.is_transient());
        assert!(!EkmError::InvalidState("Idle".to_string()).is_transient());
    }

    #[test]
    fn test_in_field_renames_malformed() {
        let err = EkmError::MalformedField { field: "decimal", position: 3, byte: b'x' };
        match err.in_field("volts") {
            EkmError::MalformedField { field, position, byte } => {
                assert_eq!(field, "volts");
                assert_eq!(position, 3);
                assert_eq!(byte, b'x');
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(EkmError::ReadTimeout.in_field("volts"), EkmError::ReadTimeout));
    }
}
