//! Internal layer exports for chat sessions and server configuration.

pub mod ai;
pub mod config;
