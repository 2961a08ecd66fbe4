//! OpenAI-compatible API provider.
//!
//! # Example
//! ```no_run
//! use parley::internal::ai::providers::openai;
//!
//! let client = openai::Client::from_env().unwrap();
//! let completions = openai::ChatCompletions::new(client);
//! ```

pub mod client;
pub mod completion;

pub use client::{Client, DEFAULT_BASE_URL, OpenAIProvider};
pub use completion::ChatCompletions;
