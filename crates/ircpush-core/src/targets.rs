//! Target channel parsing for inbound lines.
//!
//! A line may start with a comma-separated list of channels:
//!
//! ```text
//! #security disk full          -> ["#security"], "disk full"
//! #a,b,#A hello                -> ["#a", "#b"],  "hello"
//! plain text                   -> [],            "plain text"
//! ```

use std::collections::HashSet;

/// Channel name prefixes recognized on input.
pub const CHANNEL_PREFIXES: [char; 2] = ['#', '&'];

/// Channels parsed from the start of a line, and the message that follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets<'a> {
    /// Target channels in first-seen order. Empty means broadcast.
    pub channels: Vec<String>,
    /// Message text.
    pub message: &'a str,
}

impl Targets<'_> {
    /// No explicit channels were given.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.channels.is_empty()
    }

    /// There is something to deliver.
    #[must_use]
    pub fn has_message(&self) -> bool {
        !self.message.trim().is_empty()
    }
}

/// Check whether `s` starts with a channel prefix.
#[must_use]
pub fn has_channel_prefix(s: &str) -> bool {
    s.starts_with(CHANNEL_PREFIXES)
}

/// Trim `channel` and prefix it with `#` unless it already has a prefix.
#[must_use]
pub fn ensure_channel_prefix(channel: &str) -> String {
    let channel = channel.trim();
    if channel.is_empty() || has_channel_prefix(channel) {
        channel.to_string()
    } else {
        format!("#{channel}")
    }
}

/// Split an optional leading channel list off `line`.
///
/// Without a leading channel token the whole line is the message. Tokens
/// without a prefix get `#`; duplicates are dropped case-insensitively.
#[must_use]
pub fn parse_targets(line: &str) -> Targets<'_> {
    let trimmed = line.trim();
    if !has_channel_prefix(trimmed) {
        return Targets {
            channels: Vec::new(),
            message: line,
        };
    }

    let (first, rest) = match trimmed.split_once(' ') {
        Some((first, rest)) => (first, rest.trim()),
        None => (trimmed, ""),
    };

    let mut seen = HashSet::new();
    let channels = first
        .split(',')
        .map(ensure_channel_prefix)
        .filter(|ch| !ch.is_empty())
        .filter(|ch| seen.insert(ch.to_lowercase()))
        .collect();

    Targets {
        channels,
        message: rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_channel() {
        let t = parse_targets("#security hello world");
        assert_eq!(t.channels, vec!["#security"]);
        assert_eq!(t.message, "hello world");
        assert!(!t.is_broadcast());
        assert!(t.has_message());
    }

    #[test]
    fn test_channel_list_prefix_and_dedup() {
        let t = parse_targets("#a,b,&c,#A,,#b hi");
        assert_eq!(t.channels, vec!["#a", "#b", "&c"]);
        assert_eq!(t.message, "hi");
    }

    #[test]
    fn test_no_prefix_is_broadcast() {
        let t = parse_targets("plain text #notachannel");
        assert!(t.is_broadcast());
        assert_eq!(t.message, "plain text #notachannel");
    }

    #[test]
    fn test_channels_without_message() {
        let t = parse_targets("#a,#b");
        assert_eq!(t.channels, vec!["#a", "#b"]);
        assert!(!t.has_message());

        let t = parse_targets("  #a    ");
        assert_eq!(t.channels, vec!["#a"]);
        assert!(!t.has_message());
    }

    #[test]
    fn test_ensure_channel_prefix() {
        assert_eq!(ensure_channel_prefix(" ops "), "#ops");
        assert_eq!(ensure_channel_prefix("&local"), "&local");
        assert_eq!(ensure_channel_prefix("#x"), "#x");
        assert_eq!(ensure_channel_prefix("  "), "");
    }
}
