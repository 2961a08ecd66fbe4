//! Retrieval-augmented generation support.
//!
//! The registry maps session ids to retrieval index handles produced by a
//! [`Retriever`]. Handles are built from a document directory or reloaded
//! from the index a previous build persisted under the session directory.

pub mod keyword;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
pub use keyword::{KeywordIndex, KeywordRetriever};
use thiserror::Error;

use crate::internal::ai::{
    error::{ChatError, ChatResult},
    session::SessionId,
};

/// Sub-directory of a session directory holding the persisted index.
pub const INDEX_DIR: &str = "chroma_db";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no persisted retrieval index at {}", .0.display())]
    MissingIndex(PathBuf),

    #[error("corrupt retrieval index: {0}")]
    Corrupt(String),

    #[error("retrieval backend failed: {0}")]
    Backend(String),
}

/// Builds or reloads retrieval indexes.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Index every document under `documents` and persist it into `index_dir`.
    async fn build(
        &self,
        index_dir: &Path,
        documents: &Path,
    ) -> Result<Arc<dyn RetrievalIndex>, RetrievalError>;

    /// Reload an index previously persisted into `index_dir`.
    async fn load(&self, index_dir: &Path) -> Result<Arc<dyn RetrievalIndex>, RetrievalError>;
}

/// A queryable index attached to one session.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// The `top_k` most relevant passages for `question`, best first.
    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<String>, RetrievalError>;
}

/// Session id -> attached retrieval index.
pub struct RetrievalRegistry {
    retriever: Arc<dyn Retriever>,
    handles: RwLock<HashMap<SessionId, Arc<dyn RetrievalIndex>>>,
}

impl RetrievalRegistry {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Build (when `documents` is given) or reload the index in `index_dir`
    /// and attach it to `id`, replacing any previous handle.
    pub async fn attach(
        &self,
        id: SessionId,
        index_dir: &Path,
        documents: Option<&Path>,
    ) -> Result<(), RetrievalError> {
        let index = match documents {
            Some(documents) => self.retriever.build(index_dir, documents).await?,
            None => self.retriever.load(index_dir).await?,
        };
        self.handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, index);
        tracing::info!(session_id = id, rebuilt = documents.is_some(), "retrieval index attached");
        Ok(())
    }

    /// Retrieve passages for `question` and join them with newlines.
    pub async fn query(&self, id: SessionId, question: &str, top_k: usize) -> ChatResult<String> {
        let index = self
            .handles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                ChatError::NotFound(format!("no retrieval index attached to session {id}"))
            })?;

        let passages = index.retrieve(question, top_k).await?;
        Ok(passages.join("\n"))
    }

    /// Drop the handle for `id`. Returns whether one was attached.
    pub fn detach(&self, id: SessionId) -> bool {
        self.handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn is_attached(&self, id: SessionId) -> bool {
        self.handles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }
}
