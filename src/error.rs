use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmartRecordError {
    #[error("No assembler matched {0}")]
    NoMatchingAssembler(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Expected a dict, found {0}")]
    NotADict(String),

    #[error("Duplicate key: {0}")]
    KeyViolation(String),

    #[error("Malformed smart tag: {0}")]
    Assembly(String),

    #[error("Invalid signature by {0}")]
    InvalidSignature(String),

    #[error("Missing capability: {0}")]
    MissingCapability(String),

    #[error("Invalid multiaddress: {0}")]
    InvalidMultiaddress(String),

    #[error("Format error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SmartRecordError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        SmartRecordError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SmartRecordError>;
