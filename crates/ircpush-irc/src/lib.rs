//! # ircpush-irc
//!
//! IRC side of ircpush: line protocol, codec and a reconnecting client.
//!
//! - **Message** - Parse and format IRC lines
//! - **Codec** - CRLF framing for `tokio_util::codec::Framed`
//! - **Client** - Registration, channel joins, keepalive and reconnects
//! - **MessageSink** - The delivery trait the relay is written against
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ircpush_irc::{ClientConfig, IrcClient, MessageSink};
//!
//! # async fn example() -> Result<(), ircpush_irc::ClientError> {
//! let config = ClientConfig::new("irc.libera.chat:6667", "pushbot").with_channels(["#ops"]);
//! let client = IrcClient::spawn(config)?;
//! client.start(Duration::from_secs(30)).await?;
//! client.privmsg("#ops", "deploy finished").await?;
//! client.quit("bye").await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod message;
pub mod tls;
pub mod traits;

pub use client::{ClientConfig, ConnectionState, IrcClient};
pub use codec::{IrcCodec, ProtocolError, MAX_LINE_LENGTH};
pub use message::IrcMessage;
pub use tls::TlsOptions;
pub use traits::{ClientError, MessageSink};
