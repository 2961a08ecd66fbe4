pub mod message;
pub mod request;

use async_trait::async_trait;
pub use message::{Message, Role};
pub use request::{CompletionRequest, CompletionResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("HttpError: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JsonError: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("ProviderError: {0}")]
    ProviderError(String),

    #[error("ResponseError: {0}")]
    ResponseError(String),
}

/// The external text-generation collaborator.
///
/// Implementations receive the fully assembled message list and return the
/// assistant's reply. They must not retry on their own; failures propagate
/// to the caller unchanged.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}
