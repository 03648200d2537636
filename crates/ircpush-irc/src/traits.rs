//! Delivery abstraction used by the relay.
//!
//! The relay only needs to send `PRIVMSG` lines and know which channels it
//! serves, so it talks to this trait rather than to the client directly.

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::ProtocolError;

/// IRC client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Client configuration is unusable.
    #[error("Invalid client configuration: {0}")]
    Config(String),

    /// TCP connection could not be established.
    #[error("Connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Server rejected the connection password.
    #[error("Server password rejected")]
    PasswordMismatch,

    /// Operation did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Client was closed.
    #[error("Client closed")]
    Closed,

    /// Message could not be queued or sent.
    #[error("Send failed: {0}")]
    Send(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can deliver text to IRC channels.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver one `PRIVMSG` to `target`.
    async fn privmsg(&self, target: &str, text: &str) -> Result<(), ClientError>;

    /// Configured channels, used as broadcast targets.
    fn channels(&self) -> &[String];
}
