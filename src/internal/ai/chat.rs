//! Session lifecycle: start, mutate, generate, export, and import.
//!
//! [`ChatService`] is the only entry point the transport layer calls. Every
//! mutating operation holds the session's lock from start to finish, so two
//! requests for the same id never interleave; requests for different ids run
//! independently.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{
    completion::{CompletionModel, CompletionRequest, Message},
    error::{ChatError, ChatResult},
    retrieval::{INDEX_DIR, RetrievalRegistry},
    session::{
        DIALOGUE_WINDOW, SessionContext, SessionGuard, SessionId, SessionStore,
        persist::CONTEXT_FILE,
    },
};
use crate::utils::archive;

/// Passages requested from the retrieval index per question.
pub const RETRIEVAL_TOP_K: usize = 1;

/// Wrap a question and its retrieved context into the message sent to the model.
pub fn compose_retrieval_prompt(question: &str, context: &str) -> String {
    format!(
        "Please, respond to this question:\n{question}\n\nBased on this context:\n{context}\n\nSend only response to the question, without mentioning this prompt."
    )
}

pub struct ChatService {
    store: Arc<SessionStore>,
    retrieval: Arc<RetrievalRegistry>,
    completion: Arc<dyn CompletionModel>,
    archive_dir: PathBuf,
    temperature: Option<f64>,
}

impl ChatService {
    pub fn new(
        store: Arc<SessionStore>,
        retrieval: Arc<RetrievalRegistry>,
        completion: Arc<dyn CompletionModel>,
        archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            retrieval,
            completion,
            archive_dir: archive_dir.into(),
            temperature: None,
        }
    }

    /// Sampling temperature forwarded with every completion request.
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn retrieval(&self) -> &RetrievalRegistry {
        &self.retrieval
    }

    /// Path the archive for `id` is written to on export.
    pub fn archive_path(&self, id: SessionId) -> PathBuf {
        self.archive_dir.join(format!("{id}.zip"))
    }

    /// Reload sessions persisted by a previous run.
    pub async fn recover(&self) -> ChatResult<usize> {
        let loaded = self.store.recover().await?;
        if loaded > 0 {
            tracing::info!(
                sessions = loaded,
                root = %self.store.root().display(),
                "recovered sessions"
            );
        }
        Ok(loaded)
    }

    /// Create a session and persist it. Returns its id.
    pub async fn start(
        &self,
        model: impl Into<String>,
        prompt: Vec<Message>,
        dialogue: Vec<Message>,
    ) -> ChatResult<SessionId> {
        let id = self.store.allocate_id();
        let context = SessionContext::new(model, prompt, dialogue);
        self.store.create(id, context).await?;
        tracing::info!(session_id = id, "session started");
        Ok(id)
    }

    /// Current durable fields of the session.
    pub async fn context(&self, id: SessionId) -> ChatResult<SessionContext> {
        self.store.snapshot(id).await
    }

    pub async fn change_prompt(&self, id: SessionId, prompt: Vec<Message>) -> ChatResult<()> {
        self.store
            .mutate(id, |ctx| {
                ctx.prompt = prompt;
                Ok(())
            })
            .await
    }

    pub async fn change_model(&self, id: SessionId, model: impl Into<String>) -> ChatResult<()> {
        let model = model.into();
        self.store
            .mutate(id, |ctx| {
                ctx.model = model;
                Ok(())
            })
            .await
    }

    /// Empty the dialogue, keeping prompt and model.
    pub async fn clear(&self, id: SessionId) -> ChatResult<()> {
        self.store
            .mutate(id, |ctx| {
                ctx.clear_dialogue();
                Ok(())
            })
            .await
    }

    /// Remove the entry at `index` and the one following it.
    ///
    /// Always two entries, meant to drop a user turn with its reply. The
    /// remaining dialogue is not checked for alternation.
    pub async fn delete_message(&self, id: SessionId, index: usize) -> ChatResult<()> {
        self.store
            .mutate(id, |ctx| {
                ctx.remove_pair(index)
                    .map_err(|len| ChatError::OutOfRange { index, len })
            })
            .await
    }

    /// Send `message` as the next user turn and return the assistant's reply.
    pub async fn generate(&self, id: SessionId, message: &str) -> ChatResult<String> {
        let mut guard = self.store.lock(id).await?;
        self.generate_locked(&mut guard, message).await
    }

    /// Answer `message` using passages from the session's retrieval index.
    ///
    /// The composed prompt, not the raw question, is what lands in the dialogue.
    pub async fn retrieval_generate(&self, id: SessionId, message: &str) -> ChatResult<String> {
        let mut guard = self.store.lock(id).await?;
        let retrieved = self
            .retrieval
            .query(id, message, RETRIEVAL_TOP_K)
            .await?;
        let composed = compose_retrieval_prompt(message, &retrieved);
        self.generate_locked(&mut guard, &composed).await
    }

    async fn generate_locked(&self, guard: &mut SessionGuard, message: &str) -> ChatResult<String> {
        let mut pending = guard.context.clone();
        pending.truncate_dialogue(DIALOGUE_WINDOW);
        pending.add_user_message(message);
        // The user turn hits disk before the upstream call and before memory
        // sees it, so the durable copy is never behind memory.
        self.store.commit(guard, pending).await?;

        let request = CompletionRequest::new(
            guard.context.model.clone(),
            guard.context.completion_messages(),
        )
        .with_temperature(self.temperature);
        let response = self.completion.completion(request).await.map_err(|e| {
            tracing::warn!(session_id = guard.id, error = %e, "completion failed");
            ChatError::from(e)
        })?;

        let mut answered = guard.context.clone();
        answered.add_assistant_message(&response.content);
        self.store.commit(guard, answered).await?;
        Ok(response.content)
    }

    /// Build (from `documents`) or reload the session's retrieval index.
    pub async fn attach_retrieval(
        &self,
        id: SessionId,
        documents: Option<&Path>,
    ) -> ChatResult<()> {
        let _guard = self.store.lock(id).await?;
        let index_dir = self.store.session_dir(id).join(INDEX_DIR);
        self.retrieval.attach(id, &index_dir, documents).await?;
        Ok(())
    }

    /// Archive the session directory to `{archive_dir}/{id}.zip`, then forget
    /// the session and delete its directory. Returns the archive path.
    ///
    /// If packing fails the session stays live and untouched. Once the archive
    /// is written, failing to delete the directory is only logged.
    pub async fn export(&self, id: SessionId) -> ChatResult<PathBuf> {
        let mut guard = self.store.lock(id).await?;
        let dir = self.store.session_dir(id);
        let archive_path = self.archive_path(id);

        archive::pack(&dir, &archive_path).await?;

        guard.retired = true;
        self.store.delete(id);
        self.retrieval.detach(id);
        drop(guard);

        // The archive is committed at this point; a leftover directory must
        // not turn a finished export into a failure.
        discard_dir(id, &dir).await;
        tracing::info!(session_id = id, archive = %archive_path.display(), "session exported");
        Ok(archive_path)
    }

    /// Restore an exported archive as a new session under a fresh id.
    ///
    /// The new id is unrelated to the one the session had before export. On
    /// failure the partially restored directory is removed.
    pub async fn import(&self, archive_path: &Path) -> ChatResult<SessionId> {
        let id = self.store.allocate_id();
        let dir = self.store.session_dir(id);

        let restored = async {
            archive::unpack(archive_path, &dir).await?;
            self.store.load(id).await.map_err(|err| match err {
                ChatError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    ChatError::Parse(format!("archive holds no {CONTEXT_FILE}"))
                }
                other => other,
            })
        }
        .await;

        if let Err(err) = restored {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                tracing::debug!(session_id = id, error = %cleanup, "no partial import to clean up");
            }
            return Err(err);
        }

        tracing::info!(session_id = id, archive = %archive_path.display(), "session imported");
        Ok(id)
    }
}

/// Remove an exported session's directory. Returns whether it is gone.
async fn discard_dir(id: SessionId, dir: &Path) -> bool {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(
                session_id = id,
                dir = %dir.display(),
                error = %e,
                "exported session directory left on disk"
            );
            false
        }
    }
}
