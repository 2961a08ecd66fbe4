use std::time::Duration;

use reqwest::Client as HttpClient;

/// Default request timeout for completion calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A generic client for AI providers.
///
/// It holds the shared HTTP client, base URL, and provider-specific extension.
#[derive(Clone, Debug)]
pub struct Client<P> {
    /// The base URL of the AI provider's API.
    pub base_url: String,
    /// The shared HTTP client (reqwest).
    pub http_client: HttpClient,
    /// Provider-specific logic (e.g., authentication).
    pub provider: P,
}

impl<P> Client<P> {
    /// Creates a new generic Client with [`DEFAULT_TIMEOUT`] and system proxy support.
    pub fn new(base_url: &str, provider: P) -> Self {
        Self::with_timeout(base_url, provider, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, provider: P, timeout: Duration) -> Self {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    "Failed to build HTTP client with timeout: {}. Using default client.",
                    e
                );
                HttpClient::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            provider,
        }
    }
}

/// Trait defining provider-specific behavior.
pub trait Provider: Send + Sync {
    /// Allows the provider to customize the HTTP request (e.g., adding headers).
    fn on_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
    }
}
