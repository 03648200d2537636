//! # ircpush
//!
//! Forwards text lines received over TCP to IRC channels, colorizing them
//! with configurable highlight rules.
//!
//! ## Usage
//!
//! ```bash
//! # Relay TCP input to IRC
//! ircpush serve
//!
//! # Use a specific config file
//! ircpush --config /path/to/ircpush.toml serve
//!
//! # Override settings from the environment
//! IRCPUSH__IRC__NICK=pushbot IRCPUSH__TCP__LISTEN=:9000 ircpush serve
//!
//! # Send one line
//! echo "#ops deploy finished" | nc 127.0.0.1 9000
//! ```

mod config;
mod generate;
mod info;
mod interactive;
mod listener;
mod metrics;
mod relay;
mod reload;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Purpose};
use ircpush_core::RuleSetHandle;
use ircpush_irc::IrcClient;
use listener::InputServer;
use relay::Relay;
use reload::Reloader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Forward and colorize text lines from TCP to IRC.
#[derive(Parser, Debug)]
#[command(name = "ircpush", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./ircpush.toml, ~/.config/ircpush/ircpush.toml, /etc/ircpush/ircpush.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to IRC and relay lines from the TCP listener
    Serve,

    /// Connect to IRC and send lines typed on stdin
    Client,

    /// Show the effective configuration and where it came from
    Info,

    /// Send generated log lines to a running `serve`
    Gen(generate::GenArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "ircpush=debug" } else { "ircpush=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Serve => serve(cli.config.as_deref()).await,
        Command::Client => {
            let (_, config) = load(cli.config.as_deref())?;
            interactive::run(&config).await
        }
        Command::Info => info::run(cli.config.as_deref()),
        Command::Gen(args) => {
            // The generator works without a config file.
            let listen = match load(cli.config.as_deref()) {
                Ok((_, config)) => config.tcp.listen,
                Err(e) => {
                    warn!(error = format!("{e:#}"), "Ignoring configuration");
                    String::new()
                }
            };
            generate::run(args, &listen).await
        }
    }
}

fn load(explicit: Option<&std::path::Path>) -> Result<(Option<PathBuf>, Config)> {
    let path = Config::locate(explicit);
    match &path {
        Some(path) => info!(path = %path.display(), "Using config file"),
        None => info!("No config file found, using environment and defaults"),
    }
    let config = Config::load(path.as_deref())?;
    Ok((path, config))
}

async fn serve(explicit: Option<&std::path::Path>) -> Result<()> {
    let (path, config) = load(explicit)?;
    config.validate(Purpose::Serve)?;

    metrics::init_metrics();
    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)
            .map_err(|e| anyhow::anyhow!("Failed to start metrics server: {e}"))?;
    }

    let client = Arc::new(
        IrcClient::spawn(config.irc.client_config()).context("Invalid IRC settings")?,
    );
    client
        .start(config.irc.connect_timeout())
        .await
        .context("IRC connection failed")?;

    let relay = Arc::new(Relay::new(
        client.clone(),
        RuleSetHandle::new(config.highlight.rule_set()),
        config.irc.segment_policy(),
    ));
    let rules = relay.rules().clone();
    info!(rules = rules.load().len(), "Highlight rules loaded");

    let server = InputServer::bind(
        &config.tcp.listen_addr(),
        relay,
        config.tcp.max_line_bytes(),
    )
    .await?;

    let shutdown = CancellationToken::new();
    let listener_task = tokio::spawn(server.run(shutdown.clone()));
    let reload_task = tokio::spawn(Reloader::new(path, rules, config).run(shutdown.clone()));

    info!("ircpush running");
    wait_for_shutdown().await;
    info!("Shutting down");

    shutdown.cancel();
    if let Err(e) = listener_task.await {
        warn!(error = %e, "Listener task failed");
    }
    match reload_task.await {
        Ok(Err(e)) => warn!(error = format!("{e:#}"), "Reload handling failed"),
        Err(e) => warn!(error = %e, "Reload task failed"),
        Ok(Ok(())) => {}
    }
    client.quit("shutdown").await;
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
