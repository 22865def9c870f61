//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Small file-backed stores owned by the maintenance agent."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! File-backed state that must outlive the agent process.

use std::path::PathBuf;

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// IO failure while reading or writing a store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A counter file held something other than a single integer.
    #[error("corrupt counter file {path}: '{contents}'")]
    Corrupt {
        /// File that failed to parse.
        path: PathBuf,
        /// Raw contents, trimmed.
        contents: String,
    },
}

pub mod ar_count;
pub mod journal;

pub use ar_count::ArCountStore;
pub use journal::replay as replay_journal;
pub use journal::{CustomerLogRecord, JournalReader, JournalWriter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_error_names_file() {
        let err = PersistenceError::Corrupt {
            path: PathBuf::from("/tmp/compute-1_ar_count"),
            contents: "abc".into(),
        };
        assert_eq!(
            format!("{err}"),
            "corrupt counter file /tmp/compute-1_ar_count: 'abc'"
        );
    }
}
