use crate::types::Component;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Unreadable path during the directory walk; the path is skipped
    #[error("Scan error at {path}: {message}")]
    Scan { path: String, message: String },

    /// File vanished or became unreadable between scan and hash
    #[error("Hash error at {path}: {message}")]
    Hash { path: String, message: String },

    /// One downstream call failed for one file
    #[error("{component} update failed for {path}: {message}")]
    Downstream {
        path: String,
        component: Component,
        message: String,
    },

    #[error("Hash store error: {0}")]
    Store(String),

    #[error("Invalid sync strategy: {0}")]
    Policy(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Use with `.map_err(SyncError::store)`.
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        Self::Store(err.to_string())
    }

    pub fn config<E: std::fmt::Display>(err: E) -> Self {
        Self::Config(err.to_string())
    }

    /// Store, policy and configuration errors abort a run; everything else is scoped to a file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Store(_)
                | SyncError::Policy(_)
                | SyncError::Config(_)
                | SyncError::IoError(_)
                | SyncError::Other(_)
        )
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::store(err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::store(err)
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_file_scoped_errors_are_recoverable() {
        let downstream = SyncError::Downstream {
            path: "a.ts".into(),
            component: Component::Embedding,
            message: "boom".into(),
        };
        assert!(!downstream.is_fatal());
        assert_eq!(downstream.to_string(), "embedding update failed for a.ts: boom");
        assert!(!SyncError::Hash {
            path: "a.ts".into(),
            message: "gone".into()
        }
        .is_fatal());
        assert!(SyncError::Store("locked".into()).is_fatal());
        assert!(SyncError::Policy("bad".into()).is_fatal());
    }
}
