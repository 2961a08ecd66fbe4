use super::message::Message;

/// A chat completion request: the target model plus the full message list
/// (system prompt followed by dialogue).
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: Option<f64>, // Sampling temperature
}

/// Represents a response from the AI completion service.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Text of the first choice returned by the provider.
    pub content: String,
    /// Model id echoed back by the provider, when present.
    pub model: Option<String>,
}

impl CompletionRequest {
    /// Create a new CompletionRequest for `model` with the given messages.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }
}
