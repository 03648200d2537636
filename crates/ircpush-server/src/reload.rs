//! Configuration reload.
//!
//! `SIGHUP` always triggers a reload. With `highlight.auto_reload` the config
//! file is also watched and changes trigger a reload after a short debounce.
//! Only the highlight rules are hot; other changed settings are reported.

use crate::config::Config;
use crate::metrics;
use anyhow::{Context, Result};
use ircpush_core::{RuleSet, RuleSetHandle};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Quiet period after a file event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Reloads the rule set into a shared handle.
pub struct Reloader {
    path: Option<PathBuf>,
    rules: RuleSetHandle,
    current: Config,
}

impl Reloader {
    /// Create a reloader for the config at `path` (environment only if `None`).
    #[must_use]
    pub fn new(path: Option<PathBuf>, rules: RuleSetHandle, current: Config) -> Self {
        Self {
            path,
            rules,
            current,
        }
    }

    /// Re-read the configuration and swap in its rule set.
    ///
    /// On error the previous rule set stays active.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded.
    pub fn reload(&mut self, trigger: &str) -> Result<()> {
        let new = Config::load(self.path.as_deref()).context("Reload failed, keeping current rules")?;

        let (rules, rejected) = RuleSet::build_with_report(&new.highlight.rules);
        for r in &rejected {
            warn!(index = r.index, pattern = %r.pattern, reason = %r.reason, "Skipping highlight rule");
        }
        let count = rules.len();
        self.rules.store(rules);

        for setting in self.current.restart_required(&new) {
            warn!(setting = %setting, "Changed setting takes effect after a restart");
        }
        self.current = new;

        info!(trigger, rules = count, rejected = rejected.len(), "Configuration reloaded");
        Ok(())
    }

    fn reload_logged(&mut self, trigger: &str) {
        match self.reload(trigger) {
            Ok(()) => metrics::record_reload(true),
            Err(e) => {
                warn!(trigger, error = format!("{e:#}"), "Configuration reload failed");
                metrics::record_reload(false);
            }
        }
    }

    /// Handle reload triggers until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler or file watcher cannot be set up.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let (tx, rx) = mpsc::channel(16);

        let _watcher = match (&self.path, self.current.highlight.auto_reload) {
            (Some(path), true) => {
                let watcher = watch_file(path, tx)
                    .with_context(|| format!("Failed to watch {}", path.display()))?;
                info!(path = %path.display(), "Highlight auto-reload enabled");
                Some(watcher)
            }
            _ => {
                info!("Highlight auto-reload disabled (send SIGHUP to reload)");
                None
            }
        };

        self.run_with_events(rx, shutdown).await
    }

    async fn run_with_events(
        mut self,
        mut changes: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut hangup = hangup_signal().context("Failed to install SIGHUP handler")?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                Some(()) = hangup_received(&mut hangup) => {
                    info!("SIGHUP received, reloading configuration");
                    self.reload_logged("SIGHUP");
                }

                Some(()) = changes.recv() => {
                    // Editors often write a file in several steps
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(DEBOUNCE) => {}
                    }
                    while changes.try_recv().is_ok() {}
                    info!("Config file changed, reloading configuration");
                    self.reload_logged("file change");
                }
            }
        }
        Ok(())
    }
}

/// Watch the directory holding `path` and signal changes to that file.
///
/// The directory is watched so that editors replacing the file are noticed.
fn watch_file(path: &Path, tx: mpsc::Sender<()>) -> notify::Result<RecommendedWatcher> {
    let file_name = path.file_name().map(ToOwned::to_owned);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        match event {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                if relevant {
                    // A full queue already has a pending reload.
                    let _ = tx.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "Config watcher error"),
        }
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(unix)]
type Hangup = tokio::signal::unix::Signal;

#[cfg(unix)]
fn hangup_signal() -> std::io::Result<Hangup> {
    use tokio::signal::unix::{signal, SignalKind};
    signal(SignalKind::hangup())
}

#[cfg(unix)]
async fn hangup_received(hangup: &mut Hangup) -> Option<()> {
    hangup.recv().await
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
fn hangup_signal() -> std::io::Result<Hangup> {
    Ok(Hangup)
}

#[cfg(not(unix))]
async fn hangup_received(_hangup: &mut Hangup) -> Option<()> {
    std::future::pending().await
}
