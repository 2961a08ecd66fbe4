//! Session records, their on-disk representation, and the live registry.
//!
//! Every session owns a directory `{chats}/{id}/` holding `context.json`
//! (`{prompt, model, dialogue}`) and, once retrieval is attached, the
//! retrieval index under `chroma_db/`.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn example() -> parley::internal::ai::error::ChatResult<()> {
//! use parley::internal::ai::session::{SessionContext, SessionStore};
//!
//! let store = SessionStore::new("./chats");
//! let id = store.allocate_id();
//! store
//!     .create(id, SessionContext::new("m1", SessionContext::default_prompt(), vec![]))
//!     .await?;
//!
//! store
//!     .mutate(id, |ctx| {
//!         ctx.add_user_message("hello");
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod persist;
pub mod state;
pub mod store;

pub use state::{
    DEFAULT_SYSTEM_PROMPT, DIALOGUE_WINDOW, SessionContext, SessionId, SessionState,
};
pub use store::{SessionGuard, SessionHandle, SessionStore};
