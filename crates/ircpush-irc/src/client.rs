//! Reconnecting IRC client.
//!
//! The client runs as a background task that owns the connection. Callers
//! queue messages through a handle; the queue outlives individual connections,
//! so lines sent while the server is unreachable go out after the next
//! successful registration. The queue is bounded: once it is full, senders
//! wait until the connection drains it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use ircpush_core::{ensure_channel_prefix, style};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{IrcCodec, ProtocolError, MAX_LINE_LENGTH};
use crate::message::{IrcMessage, ERR_NICKNAMEINUSE, ERR_PASSWDMISMATCH, RPL_WELCOME};
use crate::tls::{self, TlsOptions};
use crate::traits::{ClientError, MessageSink};

/// Bytes reserved for the `:nick!user@host ` prefix the server adds when relaying.
const PREFIX_RESERVE: usize = 64;

/// How long `quit` waits for the QUIT line to go out before forcing shutdown.
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// Outbound messages buffered before senders have to wait.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Connection settings for [`IrcClient`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub server: String,
    /// TLS settings; `None` for plain TCP.
    pub tls: Option<TlsOptions>,
    /// Nickname, also used as ident.
    pub nick: String,
    /// Real name; empty means the nickname.
    pub realname: String,
    /// Server password sent with `PASS`.
    pub server_pass: Option<String>,
    /// NickServ password sent after registration.
    pub identify_pass: Option<String>,
    /// Channels to join. A missing `#` is added.
    pub channels: Vec<String>,
    /// Channel keys by channel name.
    pub keys: HashMap<String, String>,
    /// Minimum gap between outgoing messages.
    pub flood_delay: Duration,
    /// TCP connect plus TLS handshake limit.
    pub connect_timeout: Duration,
    /// First reconnect delay.
    pub reconnect_min: Duration,
    /// Reconnect delay ceiling.
    pub reconnect_max: Duration,
    /// Drop the connection after this long without any inbound line.
    pub read_timeout: Duration,
    /// Capacity of the outbound queue.
    pub queue_size: usize,
}

impl ClientConfig {
    /// Settings with defaults for everything but the server and nickname.
    #[must_use]
    pub fn new(server: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tls: None,
            nick: nick.into(),
            realname: String::new(),
            server_pass: None,
            identify_pass: None,
            channels: Vec::new(),
            keys: HashMap::new(),
            flood_delay: Duration::ZERO,
            connect_timeout: Duration::from_secs(15),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            read_timeout: Duration::from_secs(300),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    /// Set the channels to join.
    #[must_use]
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Host part of `server`, without port or IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        let host = match self.server.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => host,
            _ => self.server.as_str(),
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }

    fn realname(&self) -> &str {
        if self.realname.is_empty() {
            &self.nick
        } else {
            &self.realname
        }
    }

    fn key_for(&self, channel: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(name, _)| ensure_channel_prefix(name).eq_ignore_ascii_case(channel))
            .map(|(_, key)| key.as_str())
            .filter(|key| !key.is_empty())
    }

    /// Check that the settings can produce a connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ClientError> {
        let port_ok = self
            .server
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !port_ok {
            return Err(ClientError::Config(format!(
                "server must be host:port, got {:?}",
                self.server
            )));
        }
        if self.nick.is_empty() || self.nick.contains([' ', '\r', '\n']) {
            return Err(ClientError::Config(format!("invalid nick {:?}", self.nick)));
        }
        if self.reconnect_min.is_zero() || self.reconnect_max < self.reconnect_min {
            return Err(ClientError::Config("invalid reconnect backoff".into()));
        }
        if self.queue_size == 0 {
            return Err(ClientError::Config("queue size must be positive".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("tls", &self.tls)
            .field("nick", &self.nick)
            .field("channels", &self.channels)
            .field("flood_delay", &self.flood_delay)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of the background connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connecting or registering.
    Connecting,
    /// Registered and joined; messages flow.
    Registered,
    /// Waiting before the next reconnect attempt.
    Disconnected,
    /// Stopped for good.
    Closed,
}

#[derive(Debug)]
enum Outbound {
    Privmsg(IrcMessage),
    Quit(String),
}

enum SessionEnd {
    Quit,
    Shutdown,
    Lost { registered: bool, reason: String },
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type Connection = Framed<Box<dyn AsyncStream>, IrcCodec>;

/// Handle to a running IRC client.
pub struct IrcClient {
    tx: mpsc::Sender<Outbound>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    channels: Vec<String>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IrcClient {
    /// Validate `config` and start the background connection task.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the TLS connector
    /// cannot be built.
    pub fn spawn(mut config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        config.channels = normalize_channels(&config.channels);

        let connector = config.tls.as_ref().map(TlsOptions::connector).transpose()?;
        let (tx, rx) = mpsc::channel(config.queue_size);
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let shutdown = CancellationToken::new();
        let channels = config.channels.clone();

        let task = tokio::spawn(run(config, connector, rx, state_tx, shutdown.clone()));

        Ok(Self {
            tx,
            state,
            shutdown,
            channels,
            task: Mutex::new(Some(task)),
        })
    }

    /// Wait for the first successful registration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] if registration does not complete in
    /// time, or [`ClientError::Closed`] if the client stopped.
    pub async fn start(&self, limit: Duration) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        let reached = timeout(limit, async {
            state
                .wait_for(|s| matches!(s, ConnectionState::Registered | ConnectionState::Closed))
                .await
                .map(|s| *s)
        })
        .await
        .map_err(|_| ClientError::Timeout(limit))?;

        match reached {
            Ok(ConnectionState::Registered) => Ok(()),
            _ => Err(ClientError::Closed),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Send QUIT after the queued messages and stop.
    ///
    /// Falls back to [`close`](Self::close) if the server is not reachable.
    pub async fn quit(&self, reason: &str) {
        let queued = timeout(QUIT_GRACE, self.tx.send(Outbound::Quit(reason.to_string())))
            .await
            .is_ok_and(|sent| sent.is_ok());
        if queued {
            let mut state = self.state.clone();
            let done = timeout(QUIT_GRACE, state.wait_for(|s| *s == ConnectionState::Closed));
            if done.await.is_err() {
                debug!("QUIT not delivered in time");
            }
        }
        self.close().await;
    }

    /// Stop the client and its reconnect loop.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "IRC task failed");
            }
        }
    }

    /// Queue a message, waiting for room while the queue is full.
    async fn enqueue(&self, message: IrcMessage) -> Result<(), ClientError> {
        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Err(ClientError::Closed),
            sent = self.tx.send(Outbound::Privmsg(message)) => {
                sent.map_err(|_| ClientError::Closed)
            }
        }
    }
}

impl Drop for IrcClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl MessageSink for IrcClient {
    async fn privmsg(&self, target: &str, text: &str) -> Result<(), ClientError> {
        if target.is_empty() || target.contains([' ', ',', '\r', '\n', '\0']) {
            return Err(ClientError::Send(format!("invalid target {target:?}")));
        }

        let text = sanitize(text);
        for piece in split_payload(&text, payload_budget(target)) {
            self.enqueue(IrcMessage::privmsg(target, &piece)).await?;
        }
        Ok(())
    }

    fn channels(&self) -> &[String] {
        &self.channels
    }
}

fn normalize_channels(channels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(channels.len());
    for channel in channels.iter().map(|c| ensure_channel_prefix(c)) {
        if !channel.is_empty() && !out.iter().any(|c| c.eq_ignore_ascii_case(&channel)) {
            out.push(channel);
        }
    }
    out
}

/// Replace bytes that would break line framing.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\0') { ' ' } else { c })
        .collect()
}

/// Payload bytes available in one `PRIVMSG <target> :<text>\r\n` line.
fn payload_budget(target: &str) -> usize {
    let overhead = PREFIX_RESERVE + "PRIVMSG ".len() + target.len() + " :".len() + 2;
    MAX_LINE_LENGTH.saturating_sub(overhead).max(1)
}

/// Split `text` into pieces of at most `budget` bytes.
///
/// Pieces break before the last space that fits, falling back to a char
/// boundary for long words, and never inside a color code. Formatting that is
/// still active at a break is replayed at the start of the next piece.
fn split_payload(text: &str, budget: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut carry = String::new();
    let mut rest = text;
    while !rest.is_empty() && carry.len() + rest.len() > budget {
        let cut = split_point(rest, budget.saturating_sub(carry.len()));
        let piece = format!("{carry}{}", &rest[..cut]);
        carry = active_style(&piece);
        pieces.push(piece);
        rest = rest[cut..].trim_start_matches(' ');
    }
    if !rest.is_empty() {
        pieces.push(format!("{carry}{rest}"));
    }
    pieces
}

/// Byte offset at which to end the next piece of `text`. Always at least one char.
fn split_point(text: &str, room: usize) -> usize {
    let mut cut = room.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    // A code longer than the whole room has to be cut anyway.
    let cut = match outside_color_code(text.as_bytes(), cut) {
        0 => cut,
        safe => safe,
    };
    if cut == 0 {
        return text.chars().next().map_or(text.len(), char::len_utf8);
    }

    match text[..cut].rfind(' ') {
        Some(space) => match text[..space].trim_end_matches(' ').len() {
            0 => cut,
            end => end,
        },
        None => cut,
    }
}

/// Move `cut` back to the start of a color code it would otherwise split.
fn outside_color_code(bytes: &[u8], cut: usize) -> usize {
    match bytes[..cut].iter().rposition(|&b| b == COLOR_BYTE) {
        Some(at) if at + color_code_len(bytes, at) > cut => at,
        _ => cut,
    }
}

const COLOR_BYTE: u8 = style::COLOR.as_bytes()[0];
const BOLD_BYTE: u8 = style::BOLD.as_bytes()[0];
const UNDERLINE_BYTE: u8 = style::UNDERLINE.as_bytes()[0];
const RESET_BYTE: u8 = style::RESET.as_bytes()[0];

/// Length of the `\x03[fg[,bg]]` code starting at `at`.
fn color_code_len(bytes: &[u8], at: usize) -> usize {
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take(2)
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut end = at + 1;
    let fg = digits(end);
    end += fg;
    if fg > 0 && bytes.get(end) == Some(&b',') {
        let bg = digits(end + 1);
        if bg > 0 {
            end += 1 + bg;
        }
    }
    end - at
}

/// Formatting codes still in effect at the end of `text`.
fn active_style(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut active = String::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            RESET_BYTE => {
                active.clear();
                i += 1;
            }
            BOLD_BYTE | UNDERLINE_BYTE => {
                active.push(char::from(bytes[i]));
                i += 1;
            }
            COLOR_BYTE => {
                let len = color_code_len(bytes, i);
                active.push_str(&text[i..i + len]);
                i += len;
            }
            _ => i += 1,
        }
    }
    active
}

async fn run(
    config: ClientConfig,
    connector: Option<TlsConnector>,
    mut rx: mpsc::Receiver<Outbound>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
) {
    let mut backoff = config.reconnect_min;
    let mut pending: Option<IrcMessage> = None;

    loop {
        state.send_replace(ConnectionState::Connecting);
        info!(server = %config.server, nick = %config.nick, tls = connector.is_some(), "Connecting to IRC");

        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = connect(&config, connector.as_ref()) => result,
        };

        match connected {
            Ok(stream) => {
                let conn = Framed::new(stream, IrcCodec::new());
                match session(&config, conn, &mut rx, &mut pending, &state, &shutdown).await {
                    SessionEnd::Quit | SessionEnd::Shutdown => break,
                    SessionEnd::Lost { registered, reason } => {
                        warn!(server = %config.server, reason = %reason, "IRC connection lost");
                        if registered {
                            backoff = config.reconnect_min;
                        }
                    }
                }
            }
            Err(e) => warn!(server = %config.server, error = %e, "IRC connect failed"),
        }

        state.send_replace(ConnectionState::Disconnected);
        info!(delay = ?backoff, "Reconnecting");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }

    state.send_replace(ConnectionState::Closed);
    info!("IRC client stopped");
}

async fn connect(
    config: &ClientConfig,
    connector: Option<&TlsConnector>,
) -> Result<Box<dyn AsyncStream>, ClientError> {
    let attempt = async {
        let tcp = TcpStream::connect(&config.server)
            .await
            .map_err(|source| ClientError::Connect {
                addr: config.server.clone(),
                source,
            })?;
        tcp.set_nodelay(true)?;

        let stream: Box<dyn AsyncStream> = match connector {
            Some(connector) => Box::new(tls::handshake(connector, config.host(), tcp).await?),
            None => Box::new(tcp),
        };
        Ok::<_, ClientError>(stream)
    };

    timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| ClientError::Timeout(config.connect_timeout))?
}

/// Drive one connection from registration until it ends.
async fn session(
    config: &ClientConfig,
    mut conn: Connection,
    rx: &mut mpsc::Receiver<Outbound>,
    pending: &mut Option<IrcMessage>,
    state: &watch::Sender<ConnectionState>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let mut nick = config.nick.clone();
    let mut registered = false;
    let mut next_send = Instant::now();

    let lost = |registered: bool, reason: String| SessionEnd::Lost { registered, reason };

    let mut greeting = Vec::with_capacity(3);
    if let Some(pass) = &config.server_pass {
        greeting.push(IrcMessage::pass(pass));
    }
    greeting.push(IrcMessage::nick_cmd(&nick));
    greeting.push(IrcMessage::user(&nick, config.realname()));
    for message in greeting {
        if let Err(e) = conn.feed(message).await {
            return lost(false, e.to_string());
        }
    }
    if let Err(e) = conn.flush().await {
        return lost(false, e.to_string());
    }

    let idle = sleep(config.read_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                let _ = conn.send(IrcMessage::quit("shutdown")).await;
                return SessionEnd::Shutdown;
            }

            frame = conn.next() => {
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return lost(registered, e.to_string()),
                    None => return lost(registered, "connection closed by server".into()),
                };
                idle.as_mut().reset(Instant::now() + config.read_timeout);

                match message.command.as_str() {
                    "PING" => {
                        if let Err(e) = conn.send(IrcMessage::pong(&message)).await {
                            return lost(registered, e.to_string());
                        }
                    }
                    RPL_WELCOME => {
                        if let Some(assigned) = message.params.first() {
                            nick.clone_from(assigned);
                        }
                        info!(nick = %nick, "Registered with IRC server");
                        if let Err(e) = on_welcome(config, &mut conn, pending).await {
                            return lost(true, e.to_string());
                        }
                        registered = true;
                        state.send_replace(ConnectionState::Registered);
                    }
                    ERR_NICKNAMEINUSE if !registered => {
                        nick.push('_');
                        warn!(nick = %nick, "Nickname in use, retrying");
                        if let Err(e) = conn.send(IrcMessage::nick_cmd(&nick)).await {
                            return lost(false, e.to_string());
                        }
                    }
                    ERR_PASSWDMISMATCH => {
                        error!(error = %ClientError::PasswordMismatch, "Registration rejected");
                    }
                    "403" | "405" | "471" | "473" | "474" | "475" => {
                        let channel = message.params.get(1).map_or("", String::as_str);
                        warn!(channel = %channel, code = %message.command, reason = message.trailing().unwrap_or(""), "Cannot join channel");
                    }
                    "JOIN" if message.nick().is_some_and(|n| n.eq_ignore_ascii_case(&nick)) => {
                        info!(channel = message.params.first().map_or("", String::as_str), "Joined channel");
                    }
                    "ERROR" => {
                        warn!(reason = message.trailing().unwrap_or(""), "Server error");
                    }
                    "NOTICE" => {
                        info!(from = message.nick().unwrap_or("server"), text = message.trailing().unwrap_or(""), "Notice");
                    }
                    _ => debug!(line = %message, "IRC"),
                }
            }

            _ = &mut idle => {
                return lost(registered, format!("no data for {:?}", config.read_timeout));
            }

            outbound = recv_paced(rx, next_send), if registered => {
                match outbound {
                    Some(Outbound::Privmsg(message)) => {
                        *pending = Some(message.clone());
                        match conn.send(message).await {
                            Ok(()) => *pending = None,
                            Err(ProtocolError::Io(e)) => return lost(true, e.to_string()),
                            Err(e) => {
                                *pending = None;
                                warn!(error = %e, "Dropping unsendable message");
                            }
                        }
                        next_send = Instant::now() + config.flood_delay;
                    }
                    Some(Outbound::Quit(reason)) => {
                        let _ = conn.send(IrcMessage::quit(&reason)).await;
                        return SessionEnd::Quit;
                    }
                    // Every handle is gone.
                    None => {
                        let _ = conn.send(IrcMessage::quit("shutdown")).await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }
}

/// Identify, join channels and resend the message interrupted by the last disconnect.
async fn on_welcome(
    config: &ClientConfig,
    conn: &mut Connection,
    pending: &mut Option<IrcMessage>,
) -> Result<(), ProtocolError> {
    if let Some(pass) = &config.identify_pass {
        conn.feed(IrcMessage::privmsg("NickServ", &format!("IDENTIFY {pass}")))
            .await?;
    }
    for channel in &config.channels {
        conn.feed(IrcMessage::join(channel, config.key_for(channel)))
            .await?;
    }
    conn.flush().await?;

    if let Some(message) = pending.clone() {
        debug!(line = %message, "Resending interrupted message");
        conn.send(message).await?;
        *pending = None;
    }
    Ok(())
}

async fn recv_paced(
    rx: &mut mpsc::Receiver<Outbound>,
    not_before: Instant,
) -> Option<Outbound> {
    sleep_until(not_before).await;
    rx.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    struct FakeServer {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl FakeServer {
        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
            let (read, writer) = stream.into_split();
            Self {
                lines: BufReader::new(read).lines(),
                writer,
            }
        }

        async fn expect(&mut self, prefix: &str) -> String {
            loop {
                let line = timeout(WAIT, self.lines.next_line())
                    .await
                    .unwrap()
                    .unwrap()
                    .unwrap_or_else(|| panic!("connection closed waiting for {prefix:?}"));
                if line.starts_with(prefix) {
                    return line;
                }
            }
        }

        async fn say(&mut self, line: &str) {
            self.writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
        }

        async fn register(&mut self, nick: &str) {
            self.expect("NICK ").await;
            self.expect("USER ").await;
            self.say(&format!(":irc.test 001 {nick} :Welcome")).await;
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    fn test_config(addr: &str) -> ClientConfig {
        let mut config = ClientConfig::new(addr, "pushbot").with_channels(["ops", "#Alerts"]);
        config.reconnect_min = Duration::from_millis(20);
        config.reconnect_max = Duration::from_millis(100);
        config
    }

    #[test]
    fn test_split_payload_respects_char_boundaries() {
        assert_eq!(split_payload("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(split_payload("ééé", 3), vec!["é", "é", "é"]);
        assert!(split_payload("", 4).is_empty());
        assert_eq!(split_payload("€", 1), vec!["€"]);
    }

    #[test]
    fn test_split_payload_breaks_at_spaces() {
        assert_eq!(split_payload("alpha beta gamma", 11), vec!["alpha beta", "gamma"]);
        assert_eq!(split_payload("alpha   beta", 7), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_split_payload_keeps_color_codes_whole() {
        let text = format!("{} \x0304,01{}\x0F tail", "a".repeat(10), "b".repeat(10));
        assert_eq!(
            split_payload(&text, 16),
            vec![
                "a".repeat(10),
                format!("\x0304,01{}", "b".repeat(10)),
                "\x0304,01\x0F tail".to_string(),
            ]
        );
    }

    #[test]
    fn test_split_payload_replays_active_style() {
        let text = format!("\x0304{}\x0F", "x".repeat(20));
        let pieces = split_payload(&text, 10);
        assert_eq!(
            pieces,
            vec![
                format!("\x0304{}", "x".repeat(7)),
                format!("\x0304{}", "x".repeat(7)),
                format!("\x0304{}\x0F", "x".repeat(6)),
            ]
        );
        assert!(pieces.iter().all(|p| p.len() <= 10));
    }

    #[test]
    fn test_active_style() {
        assert_eq!(active_style("plain"), "");
        assert_eq!(active_style("\x02\x0304hi\x0F after"), "");
        assert_eq!(active_style("\x02x\x0312,01y"), "\x02\x0312,01");
        assert_eq!(color_code_len(b"\x03x", 0), 1);
        assert_eq!(color_code_len(b"\x034,x", 0), 2);
        assert_eq!(color_code_len(b"\x03123", 0), 3);
    }

    #[test]
    fn test_payload_budget_fits_line() {
        let target = "#ops";
        let text = "x".repeat(payload_budget(target));
        let line = IrcMessage::privmsg(target, &text).to_string();
        assert!(line.len() + 2 + PREFIX_RESERVE <= MAX_LINE_LENGTH);
    }

    #[test]
    fn test_config_validation() {
        assert!(ClientConfig::new("irc.example.net:6697", "bot").validate().is_ok());
        assert!(ClientConfig::new("irc.example.net", "bot").validate().is_err());
        assert!(ClientConfig::new("irc.example.net:6697", "").validate().is_err());
        assert!(ClientConfig::new("irc.example.net:6697", "two words").validate().is_err());

        let mut config = ClientConfig::new("irc.example.net:6697", "bot");
        config.queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_host_and_keys() {
        let mut config = ClientConfig::new("[::1]:6697", "bot");
        assert_eq!(config.host(), "::1");
        config.keys.insert("secret".into(), "hunter2".into());
        assert_eq!(config.key_for("#Secret"), Some("hunter2"));
        assert_eq!(config.key_for("#other"), None);
    }

    #[test]
    fn test_normalize_channels() {
        let channels = vec!["ops".to_string(), "#OPS".to_string(), " ".to_string(), "&x".to_string()];
        assert_eq!(normalize_channels(&channels), vec!["#ops", "&x"]);
    }

    #[tokio::test]
    async fn test_register_join_and_send() {
        let (listener, addr) = listener().await;
        let mut config = test_config(&addr);
        config.server_pass = Some("letmein".into());
        config.identify_pass = Some("nickpw".into());
        config.keys.insert("#alerts".into(), "k3y".into());
        let client = IrcClient::spawn(config).unwrap();
        assert_eq!(client.channels(), ["#ops", "#Alerts"]);

        let mut server = FakeServer::accept(&listener).await;
        assert_eq!(server.expect("PASS ").await, "PASS letmein");
        assert_eq!(server.expect("NICK ").await, "NICK pushbot");
        assert_eq!(server.expect("USER ").await, "USER pushbot 0 * pushbot");
        server.say(":irc.test 001 pushbot :Welcome").await;

        assert_eq!(server.expect("PRIVMSG NickServ").await, "PRIVMSG NickServ :IDENTIFY nickpw");
        assert_eq!(server.expect("JOIN ").await, "JOIN #ops");
        assert_eq!(server.expect("JOIN ").await, "JOIN #Alerts k3y");

        client.start(WAIT).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Registered);

        client.privmsg("#ops", "disk full").await.unwrap();
        assert_eq!(server.expect("PRIVMSG ").await, "PRIVMSG #ops :disk full");

        client.quit("bye").await;
        assert_eq!(server.expect("QUIT").await, "QUIT bye");
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_nick_in_use_and_ping() {
        let (listener, addr) = listener().await;
        let client = IrcClient::spawn(test_config(&addr)).unwrap();

        let mut server = FakeServer::accept(&listener).await;
        server.expect("USER ").await;
        server.say(":irc.test 433 * pushbot :Nickname is already in use").await;
        assert_eq!(server.expect("NICK ").await, "NICK pushbot_");

        server.say("PING :irc.test").await;
        assert_eq!(server.expect("PONG").await, "PONG irc.test");

        server.say(":irc.test 001 pushbot_ :Welcome").await;
        client.start(WAIT).await.unwrap();
        client.close().await;
    }

    #[tokio::test]
    async fn test_messages_queued_before_registration() {
        let (listener, addr) = listener().await;
        let client = IrcClient::spawn(test_config(&addr)).unwrap();
        client.privmsg("#ops", "early").await.unwrap();

        let mut server = FakeServer::accept(&listener).await;
        server.register("pushbot").await;
        server.expect("JOIN #Alerts").await;
        assert_eq!(server.expect("PRIVMSG ").await, "PRIVMSG #ops early");
        client.close().await;
    }

    #[tokio::test]
    async fn test_reconnects_after_drop() {
        let (listener, addr) = listener().await;
        let client = IrcClient::spawn(test_config(&addr)).unwrap();

        let mut first = FakeServer::accept(&listener).await;
        first.register("pushbot").await;
        client.start(WAIT).await.unwrap();
        drop(first);

        let mut second = FakeServer::accept(&listener).await;
        client.privmsg("#ops", "after reconnect").await.unwrap();
        second.register("pushbot").await;
        assert_eq!(second.expect("PRIVMSG ").await, "PRIVMSG #ops :after reconnect");
        client.close().await;
    }

    #[tokio::test]
    async fn test_start_times_out_without_welcome() {
        let (listener, addr) = listener().await;
        let client = IrcClient::spawn(test_config(&addr)).unwrap();
        let _server = FakeServer::accept(&listener).await;

        let result = client.start(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_long_message_is_split_and_sanitized() {
        let (listener, addr) = listener().await;
        let client = IrcClient::spawn(test_config(&addr)).unwrap();
        let mut server = FakeServer::accept(&listener).await;
        server.register("pushbot").await;
        client.start(WAIT).await.unwrap();

        let text = format!("{}\r\n{}", "a".repeat(300), "b".repeat(300));
        client.privmsg("#ops", &text).await.unwrap();

        let first = server.expect("PRIVMSG ").await;
        let second = server.expect("PRIVMSG ").await;
        assert!(first.len() + 2 + PREFIX_RESERVE <= MAX_LINE_LENGTH);
        assert_eq!(first, format!("PRIVMSG #ops {}", "a".repeat(300)));
        assert_eq!(second, format!("PRIVMSG #ops {}", "b".repeat(300)));
        client.close().await;
    }

    #[tokio::test]
    async fn test_full_queue_blocks_senders_until_closed() {
        let mut config = test_config("127.0.0.1:9");
        config.queue_size = 2;
        let client = Arc::new(IrcClient::spawn(config).unwrap());

        client.privmsg("#ops", "one").await.unwrap();
        client.privmsg("#ops", "two").await.unwrap();
        let third = timeout(Duration::from_millis(100), client.privmsg("#ops", "three")).await;
        assert!(third.is_err(), "send should wait while the queue is full");

        let blocked = tokio::spawn({
            let client = client.clone();
            async move { client.privmsg("#ops", "four").await }
        });
        sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        client.close().await;
        let result = timeout(WAIT, blocked).await.unwrap().unwrap();
        assert!(matches!(result, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_privmsg_rejects_bad_target_and_closed_client() {
        let client = IrcClient::spawn(test_config("127.0.0.1:9")).unwrap();
        assert!(matches!(
            client.privmsg("#a b", "x").await,
            Err(ClientError::Send(_))
        ));
        client.close().await;
        assert!(matches!(
            client.privmsg("#ops", "x").await,
            Err(ClientError::Closed)
        ));
    }
}
