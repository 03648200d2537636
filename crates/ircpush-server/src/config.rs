//! Application configuration.
//!
//! Configuration is loaded from, in increasing priority:
//! - Built-in defaults
//! - TOML configuration file (`--config`, or the first file found in the search path)
//! - Environment variables (`IRCPUSH__SECTION__KEY`, e.g. `IRCPUSH__IRC__NICK`)

use anyhow::{bail, Context, Result};
use ircpush_core::{ensure_channel_prefix, RuleSet, RuleSpec, SegmentPolicy};
use ircpush_irc::{ClientConfig, TlsOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file search order when `--config` is not given.
pub const SEARCH_PATHS: [&str; 3] = [
    "ircpush.toml",
    "~/.config/ircpush/ircpush.toml",
    "/etc/ircpush/ircpush.toml",
];

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "IRCPUSH";

/// Separator between prefix, section and key in environment overrides.
pub const ENV_SEPARATOR: &str = "__";

/// Replacement shown for secrets.
pub const MASK: &str = "********";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// IRC connection settings.
    #[serde(default)]
    pub irc: IrcConfig,

    /// TCP input settings.
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Highlighting rules.
    #[serde(default)]
    pub highlight: HighlightConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// IRC connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Server address as `host:port`.
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub tls: bool,

    #[serde(default)]
    pub tls_skip_verify: bool,

    /// PEM client certificate for CertFP.
    #[serde(default)]
    pub tls_client_cert: String,

    #[serde(default)]
    pub tls_client_key: String,

    #[serde(default)]
    pub nick: String,

    /// Defaults to the nickname.
    #[serde(default)]
    pub realname: String,

    #[serde(default)]
    pub server_pass: String,

    /// NickServ password.
    #[serde(default)]
    pub identify_pass: String,

    /// Channels to join and broadcast to.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Characters per message after highlighting. 0 = unlimited.
    #[serde(default)]
    pub max_message_len: usize,

    /// Split over-long messages instead of truncating them.
    #[serde(default)]
    pub split_long: bool,

    /// Delay between outgoing messages in milliseconds.
    #[serde(default = "default_flood_delay_ms")]
    pub flood_delay_ms: u64,

    /// Connect and initial registration timeout.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Channel keys by channel name.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

/// TCP input settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Listen address, e.g. `127.0.0.1:9000` or `:9000`.
    #[serde(default)]
    pub listen: String,

    /// Maximum line length in bytes. 0 = 65536.
    #[serde(default)]
    pub max_line_bytes: usize,
}

/// Highlighting configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Watch the config file and reload rules on change.
    #[serde(default)]
    pub auto_reload: bool,

    /// Ordered highlight rules.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_flood_delay_ms() -> u64 {
    250
}

fn default_connect_timeout_secs() -> u64 {
    20
}

fn default_metrics_port() -> u16 {
    9090
}

const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            tls: false,
            tls_skip_verify: false,
            tls_client_cert: String::new(),
            tls_client_key: String::new(),
            nick: String::new(),
            realname: String::new(),
            server_pass: String::new(),
            identify_pass: String::new(),
            channels: Vec::new(),
            max_message_len: 0,
            split_long: false,
            flood_delay_ms: default_flood_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            keys: BTreeMap::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Which command the configuration is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// TCP listener plus IRC client.
    Serve,
    /// Interactive IRC client.
    Client,
}

impl Config {
    /// Find the config file to use.
    ///
    /// An explicit path is returned as-is; otherwise the first existing file
    /// in [`SEARCH_PATHS`] is used.
    #[must_use]
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        SEARCH_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.is_file())
    }

    /// Load configuration from `path` (if any) with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the merged settings do
    /// not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("irc.channels"),
        );

        let settings = builder.build().with_context(|| match path {
            Some(path) => format!("Failed to read config file: {}", path.display()),
            None => "Failed to read environment configuration".to_string(),
        })?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Load a configuration from a TOML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration")
    }

    /// Check that the settings a command needs are present.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing setting.
    pub fn validate(&self, purpose: Purpose) -> Result<()> {
        if self.irc.server.trim().is_empty() || self.irc.nick.trim().is_empty() {
            bail!("irc.server and irc.nick must be set");
        }
        if self.irc.channels().is_empty() {
            bail!("irc.channels must contain at least one channel");
        }
        if purpose == Purpose::Serve && self.tcp.listen.trim().is_empty() {
            bail!("tcp.listen must be set (e.g. 10.20.30.40:9000 or :9000)");
        }
        Ok(())
    }

    /// A copy with passwords replaced, for display.
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut config = self.clone();
        for secret in [&mut config.irc.server_pass, &mut config.irc.identify_pass] {
            if !secret.is_empty() {
                *secret = MASK.to_string();
            }
        }
        for key in config.irc.keys.values_mut() {
            *key = MASK.to_string();
        }
        config
    }

    /// Settings that changed in `new` but only take effect after a restart.
    #[must_use]
    pub fn restart_required(&self, new: &Self) -> Vec<String> {
        let mut changed = Vec::new();
        if self.tcp.listen != new.tcp.listen {
            changed.push(format!(
                "tcp.listen ({} -> {})",
                self.tcp.listen, new.tcp.listen
            ));
        }
        if self.irc.server != new.irc.server {
            changed.push(format!("irc.server ({} -> {})", self.irc.server, new.irc.server));
        }
        if self.irc.nick != new.irc.nick {
            changed.push(format!("irc.nick ({} -> {})", self.irc.nick, new.irc.nick));
        }
        if self.irc.channels() != new.irc.channels() {
            changed.push("irc.channels".to_string());
        }
        changed
    }
}

impl IrcConfig {
    /// Configured channels with `#` ensured, empty entries removed.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|c| ensure_channel_prefix(c))
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Message length policy.
    #[must_use]
    pub fn segment_policy(&self) -> SegmentPolicy {
        SegmentPolicy::new(self.max_message_len, self.split_long)
    }

    /// Connect and registration timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// Settings for the IRC client.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        let mut client = ClientConfig::new(self.server.trim(), self.nick.trim());
        client.tls = self.tls.then(|| TlsOptions {
            skip_verify: self.tls_skip_verify,
            client_cert: non_empty(&self.tls_client_cert).map(|p| expand_path(&p)),
            client_key: non_empty(&self.tls_client_key).map(|p| expand_path(&p)),
        });
        client.realname = self.realname.clone();
        client.server_pass = non_empty(&self.server_pass);
        client.identify_pass = non_empty(&self.identify_pass);
        client.channels = self.channels();
        client.keys = self.keys.clone().into_iter().collect();
        client.flood_delay = Duration::from_millis(self.flood_delay_ms);
        client.connect_timeout = self.connect_timeout();
        client
    }
}

impl TcpConfig {
    /// Listen address; a bare `:port` binds all interfaces.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        let listen = self.listen.trim();
        if listen.starts_with(':') {
            format!("0.0.0.0{listen}")
        } else {
            listen.to_string()
        }
    }

    /// Effective maximum line length.
    #[must_use]
    pub fn max_line_bytes(&self) -> usize {
        if self.max_line_bytes == 0 {
            DEFAULT_MAX_LINE_BYTES
        } else {
            self.max_line_bytes
        }
    }
}

impl HighlightConfig {
    /// Compile the configured rules.
    #[must_use]
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::build(&self.rules)
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
