//! Chat session infrastructure for Parley
//!
//! - **Sessions**: [`SessionStore`] registry and the `context.json` writer
//! - **Orchestration**: [`ChatService`] runs every lifecycle operation under
//!   the session's lock
//! - **Providers**: [`CompletionModel`] trait with an OpenAI-compatible backend
//! - **Retrieval**: [`RetrievalRegistry`] mapping sessions to document indexes
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use parley::internal::ai::{
//!     ChatService, RetrievalRegistry, SessionStore,
//!     providers::openai::{ChatCompletions, Client},
//!     retrieval::KeywordRetriever,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let model = ChatCompletions::new(Client::from_env()?);
//! let chat = ChatService::new(
//!     Arc::new(SessionStore::new("./chats")),
//!     Arc::new(RetrievalRegistry::new(Arc::new(KeywordRetriever))),
//!     Arc::new(model),
//!     ".",
//! );
//! let id = chat.start("meta-llama/Meta-Llama-3-8B-Instruct", vec![], vec![]).await?;
//! let reply = chat.generate(id, "hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod client;
pub mod completion;
pub mod error;
pub mod providers;
pub mod retrieval;
pub mod session;

pub use chat::ChatService;
pub use completion::{CompletionModel, Message, Role};
pub use error::{ChatError, ChatResult};
pub use retrieval::RetrievalRegistry;
pub use session::{SessionContext, SessionId, SessionStore};
