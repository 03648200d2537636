//! TCP line input.
//!
//! Every accepted connection gets its own task. Lines are framed with
//! `LinesCodec`; over-long lines and lines that are not UTF-8 are skipped
//! and the connection keeps going.

use crate::metrics::{self, ConnectionMetricsGuard};
use crate::relay::Relay;
use anyhow::{Context, Result};
use bytes::BytesMut;
use ircpush_irc::MessageSink;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time connection tasks get to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Pause after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound TCP input listener.
pub struct InputServer<S> {
    listener: TcpListener,
    relay: Arc<Relay<S>>,
    max_line_bytes: usize,
}

impl<S: MessageSink + 'static> InputServer<S> {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: &str, relay: Arc<Relay<S>>, max_line_bytes: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to listen on {addr}"))?;
        info!(addr = %listener.local_addr()?, "TCP input listening");
        Ok(Self {
            listener,
            relay,
            max_line_bytes,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            self.relay.clone(),
                            self.max_line_bytes,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        metrics::record_error("accept");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                // Reap finished connection tasks
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        drop(self.listener);
        info!(open = connections.len(), "TCP input closed");

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(open = connections.len(), "Aborting connections after grace period");
            connections.abort_all();
        }
    }
}

async fn handle_connection<S: MessageSink>(
    mut stream: TcpStream,
    peer: SocketAddr,
    relay: Arc<Relay<S>>,
    max_line_bytes: usize,
    shutdown: CancellationToken,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    info!(peer = %peer, "TCP input connected");

    let mut codec = LinesCodec::new_with_max_length(max_line_bytes);
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        while let Some(line) = next_line(&mut codec, &mut buf, peer, false) {
            forward(&relay, peer, &line).await;
        }

        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = stream.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                while let Some(line) = next_line(&mut codec, &mut buf, peer, true) {
                    forward(&relay, peer, &line).await;
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(peer = %peer, error = %e, "TCP input read failed");
                break;
            }
        }
    }

    info!(peer = %peer, "TCP input closed");
}

/// Decode the next line from `buf`, skipping lines that cannot be used.
fn next_line(
    codec: &mut LinesCodec,
    buf: &mut BytesMut,
    peer: SocketAddr,
    eof: bool,
) -> Option<String> {
    loop {
        let decoded = if eof {
            codec.decode_eof(buf)
        } else {
            codec.decode(buf)
        };
        match decoded {
            Ok(line) => return line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(peer = %peer, max = codec.max_length(), "Discarding over-long line");
                metrics::record_dropped("too_long");
            }
            Err(LinesCodecError::Io(e)) if e.kind() == ErrorKind::InvalidData => {
                warn!(peer = %peer, "Discarding line that is not valid UTF-8");
                metrics::record_dropped("invalid_utf8");
            }
            Err(LinesCodecError::Io(e)) => {
                warn!(peer = %peer, error = %e, "TCP input decode failed");
                return None;
            }
        }
    }
}

async fn forward<S: MessageSink>(relay: &Relay<S>, peer: SocketAddr, line: &str) {
    debug!(peer = %peer, line = %line, "Line received");
    match relay.relay_line(line).await {
        Ok(outcome) => debug!(
            peer = %peer,
            messages = outcome.messages,
            chunks = outcome.chunks,
            "Line relayed"
        ),
        Err(e) => {
            warn!(peer = %peer, error = %e, "Relay failed");
            metrics::record_error("relay");
        }
    }
}
