//! Server errors.

use std::net::SocketAddr;

/// Errors raised while starting or running the relay.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Host/port pair is not a valid socket address.
    #[error("invalid listen address {0}")]
    InvalidAddress(String),

    /// I/O error after the listener was bound.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Build a bind error for `addr`.
    pub fn bind(addr: &SocketAddr, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}
