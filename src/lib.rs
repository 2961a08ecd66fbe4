//! Parley: a multi-session chat server over OpenAI-compatible completion APIs.

pub mod cli;
pub mod command;
pub mod internal;
pub mod utils;
