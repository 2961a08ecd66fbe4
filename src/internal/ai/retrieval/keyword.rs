//! Keyword-overlap retrieval backed by a JSON chunk file.
//!
//! Documents are split on blank lines into chunks of at most
//! [`MAX_CHUNK_CHARS`] characters. A query scores each chunk by the number of
//! distinct query terms (longer than two characters) it contains.

use std::{
    cmp::Reverse,
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{RetrievalError, RetrievalIndex, Retriever};

/// File name of the persisted index inside the index directory.
pub const INDEX_FILE: &str = "index.json";

/// Upper bound on chunk length, in characters.
pub const MAX_CHUNK_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Document path relative to the documents directory.
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordIndex {
    pub chunks: Vec<Chunk>,
}

impl KeywordIndex {
    /// Chunks ranked by descending score; ties keep document order.
    pub fn rank(&self, question: &str, top_k: usize) -> Vec<&Chunk> {
        let terms = query_terms(question);
        let mut scored: Vec<(usize, &Chunk)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let haystack = chunk.text.to_lowercase();
                let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score, chunk)
            })
            .collect();
        scored.sort_by_key(|(score, _)| Reverse(*score));
        scored.into_iter().take(top_k).map(|(_, c)| c).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl RetrievalIndex for KeywordIndex {
    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self
            .rank(question, top_k)
            .into_iter()
            .map(|c| c.text.clone())
            .collect())
    }
}

/// Builds [`KeywordIndex`]es from plain-text documents.
#[derive(Debug, Clone, Default)]
pub struct KeywordRetriever;

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn build(
        &self,
        index_dir: &Path,
        documents: &Path,
    ) -> Result<Arc<dyn RetrievalIndex>, RetrievalError> {
        let root = documents.to_path_buf();
        let chunks = tokio::task::spawn_blocking(move || load_documents(&root))
            .await
            .map_err(|e| RetrievalError::Backend(e.to_string()))??;
        let index = KeywordIndex { chunks };
        tracing::info!(
            chunks = index.len(),
            documents = %documents.display(),
            "built keyword index"
        );

        tokio::fs::create_dir_all(index_dir).await?;
        let json = serde_json::to_vec(&index).map_err(|e| RetrievalError::Backend(e.to_string()))?;
        tokio::fs::write(index_dir.join(INDEX_FILE), json).await?;
        Ok(Arc::new(index))
    }

    async fn load(&self, index_dir: &Path) -> Result<Arc<dyn RetrievalIndex>, RetrievalError> {
        let path = index_dir.join(INDEX_FILE);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RetrievalError::MissingIndex(index_dir.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let index: KeywordIndex =
            serde_json::from_slice(&data).map_err(|e| RetrievalError::Corrupt(e.to_string()))?;
        Ok(Arc::new(index))
    }
}

fn load_documents(root: &Path) -> Result<Vec<Chunk>, RetrievalError> {
    let mut chunks = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| RetrievalError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        let Ok(text) = String::from_utf8(bytes) else {
            tracing::debug!(file = %entry.path().display(), "skipping non-text document");
            continue;
        };
        let source = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()))
            .display()
            .to_string();
        let pieces = chunk_text(&text, MAX_CHUNK_CHARS);
        chunks.extend(pieces.into_iter().map(|text| Chunk {
            source: source.clone(),
            text,
        }));
    }
    Ok(chunks)
}

/// Split on blank lines, packing paragraphs into chunks of at most `max_chars`.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let pieces = split_long(paragraph, max_chars);
        for piece in pieces {
            let extra = if current.is_empty() { 0 } else { 2 };
            if !current.is_empty()
                && current.chars().count() + extra + piece.chars().count() > max_chars
            {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.chars().count() <= max_chars {
        return vec![paragraph.to_string()];
    }
    let chars: Vec<char> = paragraph.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}

fn query_terms(question: &str) -> BTreeSet<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 2)
        .collect()
}
