//! Error types for session lifecycle operations.

use thiserror::Error;

use super::{
    completion::CompletionError, retrieval::RetrievalError, session::SessionId,
};
use crate::utils::archive::ArchiveError;

/// Errors surfaced by [`ChatService`](super::chat::ChatService) operations.
///
/// None of these are retried by the service; each one reaches the caller
/// with a human-readable detail string.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Unknown session id or missing retrieval handle.
    #[error("{0}")]
    NotFound(String),

    /// A session with this id is already registered.
    #[error("session {0} already exists")]
    AlreadyExists(SessionId),

    /// Message index has no entry to delete.
    #[error("message index {index} out of range for dialogue of length {len}")]
    OutOfRange { index: usize, len: usize },

    /// Filesystem or archive I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted document or archive.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The completion or retrieval collaborator failed.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl ChatError {
    pub fn session_not_found(id: SessionId) -> Self {
        Self::NotFound(format!("session {id} not found"))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<ArchiveError> for ChatError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Io(e) => Self::Io(e),
            ArchiveError::Malformed(msg) => Self::Parse(format!("malformed archive: {msg}")),
            ArchiveError::UnsafePath(path) => {
                Self::Parse(format!("archive entry escapes destination: {path}"))
            }
            ArchiveError::Task(msg) => Self::Io(std::io::Error::other(msg)),
        }
    }
}

impl From<CompletionError> for ChatError {
    fn from(err: CompletionError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<RetrievalError> for ChatError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Io(e) => Self::Io(e),
            RetrievalError::MissingIndex(_) => Self::NotFound(err.to_string()),
            RetrievalError::Corrupt(msg) => Self::Parse(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

/// Result type for session lifecycle operations.
pub type ChatResult<T> = Result<T, ChatError>;
