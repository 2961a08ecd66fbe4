//! OpenAI-compatible API client.

use std::fmt;

use crate::internal::ai::client::{Client as GenericClient, Provider};

/// Base URL used when neither the CLI nor `BASE_URL` provide one.
pub const DEFAULT_BASE_URL: &str = "https://api.deepinfra.com/v1/openai";

/// OpenAI-compatible API provider (bearer token authentication).
#[derive(Clone)]
pub struct OpenAIProvider {
    api_key: String,
}

impl fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("api_key", &"***")
            .finish()
    }
}

impl OpenAIProvider {
    /// Creates a new provider with the given API key.
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Returns the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl Provider for OpenAIProvider {
    fn on_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", self.api_key),
        )
    }
}

/// OpenAI-compatible client type.
pub type Client = GenericClient<OpenAIProvider>;

impl Client {
    /// Creates a client from environment variables.
    ///
    /// Reads `TOKEN` for the access token and `BASE_URL` for the endpoint,
    /// falling back to [`DEFAULT_BASE_URL`].
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("TOKEN")?;
        let base_url = std::env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::with_base_url(&base_url, api_key))
    }

    /// Creates a client with a custom base URL and API key.
    pub fn with_base_url(base_url: &str, api_key: String) -> Self {
        Self::new(base_url, OpenAIProvider::new(api_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_debug() {
        let provider = OpenAIProvider::new("sk-test-key".to_string());
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("sk-test-key"));
        assert!(debug_str.contains("***"));
    }

    #[test]
    fn test_with_base_url() {
        let client = Client::with_base_url("http://localhost:8080/v1", "k".to_string());
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.provider.api_key(), "k");
    }
}
