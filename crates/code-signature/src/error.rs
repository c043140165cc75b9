use thiserror::Error;

/// Result type for signature extraction
pub type Result<T> = std::result::Result<T, SignatureError>;

/// Errors that can occur while extracting a structural signature
#[derive(Error, Debug)]
pub enum SignatureError {
    /// Content is not valid UTF-8 text
    #[error("Content is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// Content looks like a binary blob
    #[error("Binary content ({0} bytes)")]
    Binary(usize),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl SignatureError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
