//! Reads and writes a session's `context.json`.
//!
//! Saves go through a sibling `.tmp` file and a rename, so an interrupted
//! write never truncates the previous copy.

use std::path::{Path, PathBuf};

use super::state::SessionContext;
use crate::internal::ai::error::{ChatError, ChatResult};

/// Name of the session document inside a session directory.
pub const CONTEXT_FILE: &str = "context.json";

pub fn context_path(dir: &Path) -> PathBuf {
    dir.join(CONTEXT_FILE)
}

/// Serialize `context` into `dir/context.json`, creating `dir` if needed.
pub async fn save(dir: &Path, context: &SessionContext) -> ChatResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    let json = serde_json::to_string_pretty(context)?;

    let path = context_path(dir);
    let staging = dir.join(format!("{CONTEXT_FILE}.tmp"));
    tokio::fs::write(&staging, json).await?;
    tokio::fs::rename(&staging, &path).await?;
    Ok(())
}

/// Deserialize `dir/context.json`.
pub async fn read(dir: &Path) -> ChatResult<SessionContext> {
    let path = context_path(dir);
    let content = tokio::fs::read_to_string(&path).await?;
    serde_json::from_str(&content)
        .map_err(|e| ChatError::Parse(format!("{}: {e}", path.display())))
}
