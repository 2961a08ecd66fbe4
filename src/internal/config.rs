//! Runtime configuration for the chat server.

use std::{net::SocketAddr, path::PathBuf};

use crate::internal::ai::providers::openai::DEFAULT_BASE_URL;

/// Environment variable holding the provider access token.
pub const TOKEN_ENV: &str = "TOKEN";
/// Environment variable overriding the provider base URL.
pub const BASE_URL_ENV: &str = "BASE_URL";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 1205;

/// Everything `serve` needs to build the router.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root holding one directory per session.
    pub chats_dir: PathBuf,
    /// Where exported `{id}.zip` archives are written.
    pub archive_dir: PathBuf,
    pub base_url: String,
    pub temperature: Option<f64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            chats_dir: PathBuf::from("./chats"),
            archive_dir: PathBuf::from("."),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Resolve the provider base URL: explicit value, then `BASE_URL`, then the default.
    pub fn resolve_base_url(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}
