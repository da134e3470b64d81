//! pullscan-srv: HTTP front end for baseline-diffed security scanning.
//!
//! Accepts `POST /pull` with `{"base": "...", "head": "..."}` where each
//! field is a `base64(gzip(tar))` archive, and answers with
//! `{"simpleFindings": "..."}`, empty when the change introduces nothing
//! new. Each request gets its own workspace and scanner processes; nothing
//! is shared between requests.

pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;

// Re-exports for convenience.
pub use config::ServerConfig;
pub use error::SrvError;

/// Result type for pullscan-srv operations.
pub type Result<T> = std::result::Result<T, SrvError>;
