//! Error types for the pullscan HTTP service.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur while starting or running the service.
#[derive(Error, Debug)]
pub enum SrvError {
    /// Configuration is invalid or could not be read.
    #[error("config error: {0}")]
    Config(String),

    /// Failed to bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error.
    #[error("http server error: {0}")]
    Server(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
