//! `client` command: send lines typed on stdin.
//!
//! `#chan[,#other] text` goes to the listed channels that were joined;
//! anything else is sent to every channel, highlighted per channel.
//! `/quit` (or end of input) leaves.

use crate::config::{Config, Purpose};
use crate::relay::Relay;
use anyhow::{Context, Result};
use ircpush_core::RuleSetHandle;
use ircpush_irc::{IrcClient, MessageSink};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Connect, then relay stdin until `/quit` or end of input.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete, the connection
/// cannot be established, or stdin cannot be read.
pub async fn run(config: &Config) -> Result<()> {
    config.validate(Purpose::Client)?;

    let client = Arc::new(
        IrcClient::spawn(config.irc.client_config()).context("Invalid IRC settings")?,
    );
    client
        .start(config.irc.connect_timeout())
        .await
        .context("IRC connection failed")?;
    info!(channels = ?client.channels(), "Connected; type messages, /quit to exit");

    let relay = Relay::new(
        client.clone(),
        RuleSetHandle::new(config.highlight.rule_set()),
        config.irc.segment_policy(),
    )
    .interactive();

    let result = session(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &relay,
        config.irc.nick.trim(),
    )
    .await;

    client.quit("bye").await;
    result
}

async fn session<S, R, W>(input: R, mut output: W, relay: &Relay<S>, nick: &str) -> Result<()>
where
    S: MessageSink,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let prompt = format!("[{nick}] ");
    let mut lines = input.lines();

    loop {
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("/quit") {
            break;
        }

        if let Err(e) = relay.relay_line(line).await {
            warn!(error = %e, "Send failed");
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
