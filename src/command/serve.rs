//! `serve` command: the HTTP surface over [`ChatService`].
//!
//! Routes live under `/chat`. Successful calls answer
//! `{"status": "SUCCESSFUL", ...}`; failures answer `{"detail": "..."}` with a
//! status derived from the [`ChatError`] variant. `generate` and
//! `rag_generate` answer 400 for every failure.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::internal::{
    ai::{
        ChatError, ChatService, Message, RetrievalRegistry, SessionContext, SessionId,
        SessionStore,
        providers::openai::{ChatCompletions, Client},
        retrieval::KeywordRetriever,
    },
    config::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig, TOKEN_ENV},
};

/// Largest accepted request body (archive and document uploads).
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding one sub-directory per session
    #[arg(long, default_value = "./chats")]
    pub chats_dir: PathBuf,

    /// Directory exported archives are written to
    #[arg(long, default_value = ".")]
    pub archive_dir: PathBuf,

    /// Provider base URL (overrides `BASE_URL`)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Sampling temperature sent with every completion request
    #[arg(long)]
    pub temperature: Option<f64>,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            chats_dir: args.chats_dir,
            archive_dir: args.archive_dir,
            base_url: ServerConfig::resolve_base_url(args.base_url),
            temperature: args.temperature,
        }
    }
}

pub async fn execute(args: ServeArgs) -> anyhow::Result<()> {
    let config = ServerConfig::from(args);
    let token = std::env::var(TOKEN_ENV)
        .with_context(|| format!("{TOKEN_ENV} must hold the provider access token"))?;

    let model = ChatCompletions::new(Client::with_base_url(&config.base_url, token));
    let chat = ChatService::new(
        Arc::new(SessionStore::new(&config.chats_dir)),
        Arc::new(RetrievalRegistry::new(Arc::new(KeywordRetriever))),
        Arc::new(model),
        &config.archive_dir,
    )
    .with_temperature(config.temperature);
    chat.recover().await.with_context(|| {
        format!(
            "failed to recover sessions from {}",
            config.chats_dir.display()
        )
    })?;

    let addr = config.addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!(%addr, base_url = %config.base_url, "parley server listening");

    axum::serve(listener, router(Arc::new(chat)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

/// Build the `/chat` router around a shared service.
pub fn router(chat: Arc<ChatService>) -> Router {
    Router::new()
        .route("/chat/start", post(start))
        .route("/chat/change-prompt", post(change_prompt))
        .route("/chat/change-model", post(change_model))
        .route("/chat/generate", post(generate))
        .route("/chat/delete-message", post(delete_message))
        .route("/chat/clear-context", post(clear_context))
        .route("/chat/end/{id}", get(end))
        .route("/chat/load", post(load))
        .route("/chat/add_rag", post(add_rag))
        .route("/chat/rag_generate", post(rag_generate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(chat)
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Chat(ChatError),
    BadRequest(String),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self::Chat(err)
    }
}

impl ApiError {
    /// Generation failures all answer 400 with the error text, whatever the cause.
    fn generation(err: ChatError) -> Self {
        if matches!(err, ChatError::Io(_)) {
            tracing::error!(error = %err, "generation failed");
        }
        Self::BadRequest(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::Chat(ChatError::Io(err))
    }
}

fn status_for(err: &ChatError) -> StatusCode {
    match err {
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::AlreadyExists(_) => StatusCode::CONFLICT,
        ChatError::OutOfRange { .. } | ChatError::Parse(_) | ChatError::Upstream(_) => {
            StatusCode::BAD_REQUEST
        }
        ChatError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Chat(err) => (status_for(&err), err.to_string()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
        };
        if status.is_server_error() {
            tracing::error!(%status, %detail, "request failed");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T = Json<Value>> = Result<T, ApiError>;

fn successful() -> Json<Value> {
    Json(json!({ "status": "SUCCESSFUL" }))
}

// ── JSON endpoints ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub model: String,
    /// Omitted means the default system prompt; `[]` means no prompt.
    #[serde(default)]
    pub prompt: Option<Vec<Message>>,
    #[serde(default)]
    pub dialogue: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePromptRequest {
    pub id: SessionId,
    pub prompt: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeModelRequest {
    pub id: SessionId,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub id: SessionId,
    pub msg: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageRequest {
    pub id: SessionId,
    pub message_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub id: SessionId,
}

async fn start(State(chat): State<Arc<ChatService>>, Json(req): Json<StartRequest>) -> ApiResult {
    let prompt = req.prompt.unwrap_or_else(SessionContext::default_prompt);
    let id = chat.start(req.model, prompt, req.dialogue).await?;
    Ok(Json(json!({ "status": "SUCCESSFUL", "id": id })))
}

async fn change_prompt(
    State(chat): State<Arc<ChatService>>,
    Json(req): Json<ChangePromptRequest>,
) -> ApiResult {
    chat.change_prompt(req.id, req.prompt).await?;
    Ok(successful())
}

async fn change_model(
    State(chat): State<Arc<ChatService>>,
    Json(req): Json<ChangeModelRequest>,
) -> ApiResult {
    chat.change_model(req.id, req.model).await?;
    Ok(successful())
}

async fn generate(
    State(chat): State<Arc<ChatService>>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    let response = chat
        .generate(req.id, &req.msg)
        .await
        .map_err(ApiError::generation)?;
    Ok(Json(json!({ "status": "SUCCESSFUL", "response": response })))
}

async fn rag_generate(
    State(chat): State<Arc<ChatService>>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    let response = chat
        .retrieval_generate(req.id, &req.msg)
        .await
        .map_err(ApiError::generation)?;
    Ok(Json(json!({ "status": "SUCCESSFUL", "response": response })))
}

async fn delete_message(
    State(chat): State<Arc<ChatService>>,
    Json(req): Json<DeleteMessageRequest>,
) -> ApiResult {
    chat.delete_message(req.id, req.message_index).await?;
    Ok(successful())
}

async fn clear_context(
    State(chat): State<Arc<ChatService>>,
    Json(req): Json<SessionRequest>,
) -> ApiResult {
    chat.clear(req.id).await?;
    Ok(successful())
}

// ── File endpoints ───────────────────────────────────────────────

async fn end(
    State(chat): State<Arc<ChatService>>,
    AxumPath(id): AxumPath<SessionId>,
) -> ApiResult<Response> {
    let archive = chat.export(id).await?;
    let file = tokio::fs::File::open(&archive).await?;
    let filename = format!("{id}.zip");

    let response = (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response();
    Ok(response)
}

async fn load(State(chat): State<Arc<ChatService>>, mut multipart: Multipart) -> ApiResult {
    let staging = tempfile::TempDir::new()?;
    let mut archive = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("chat_file") {
            continue;
        }
        let path = staging.path().join("upload.zip");
        tokio::fs::write(&path, field.bytes().await?).await?;
        archive = Some(path);
    }

    let archive =
        archive.ok_or_else(|| ApiError::BadRequest("missing chat_file upload".to_string()))?;
    let id = chat.import(&archive).await?;
    Ok(Json(json!({ "status": "SUCCESSFUL", "id": id })))
}

async fn add_rag(State(chat): State<Arc<ChatService>>, mut multipart: Multipart) -> ApiResult {
    let staging = tempfile::TempDir::new()?;
    let docs = staging.path().join("docs");
    let mut id = None;
    let mut has_document = false;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("id") => {
                let text = field.text().await?;
                let parsed = text
                    .trim()
                    .parse::<SessionId>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid session id: {text}")))?;
                id = Some(parsed);
            }
            Some("doc_file") => {
                let name = document_name(field.file_name());
                let data = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if data.is_empty() && name == DEFAULT_DOCUMENT_NAME {
                    continue;
                }
                tokio::fs::create_dir_all(&docs).await?;
                tokio::fs::write(docs.join(name), data).await?;
                has_document = true;
            }
            _ => {}
        }
    }

    let id = id.ok_or_else(|| ApiError::BadRequest("missing id field".to_string()))?;
    let documents = has_document.then_some(docs.as_path());
    chat.attach_retrieval(id, documents).await?;
    Ok(successful())
}

const DEFAULT_DOCUMENT_NAME: &str = "document.txt";

/// Keep only the final component of an uploaded file name.
fn document_name(uploaded: Option<&str>) -> String {
    uploaded
        .map(Path::new)
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DOCUMENT_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ChatError::session_not_found(1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&ChatError::AlreadyExists(1)), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&ChatError::OutOfRange { index: 4, len: 2 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ChatError::Upstream("boom".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ChatError::Io(std::io::Error::other("disk"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_generation_errors_are_bad_request() {
        for err in [
            ChatError::session_not_found(3),
            ChatError::Io(std::io::Error::other("disk")),
            ChatError::Upstream("boom".to_string()),
        ] {
            let detail = err.to_string();
            let response = ApiError::generation(err).into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{detail}");
        }
    }

    #[test]
    fn test_document_name_strips_directories() {
        assert_eq!(document_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(document_name(Some("notes.md")), "notes.md");
        assert_eq!(document_name(Some("")), DEFAULT_DOCUMENT_NAME);
        assert_eq!(document_name(None), DEFAULT_DOCUMENT_NAME);
    }

    #[test]
    fn test_start_request_prompt_is_optional() {
        let req: StartRequest = serde_json::from_str(r#"{"model": "m1"}"#).unwrap();
        assert!(req.prompt.is_none());
        assert!(req.dialogue.is_empty());

        let req: StartRequest = serde_json::from_str(r#"{"model": "m1", "prompt": []}"#).unwrap();
        assert_eq!(req.prompt, Some(vec![]));
    }
}
