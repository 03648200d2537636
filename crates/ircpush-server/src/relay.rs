//! Line relay: target parsing, highlighting, segmentation and delivery.

use crate::metrics;
use ircpush_core::{parse_targets, RuleSet, RuleSetHandle, SegmentPolicy, Targets};
use ircpush_irc::{ClientError, MessageSink};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// How lines without explicit targets and unknown targets are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// TCP input. A broadcast is highlighted once without channel context;
    /// explicit targets are used as given.
    Input,
    /// Interactive sending. A broadcast is highlighted for each channel;
    /// explicit targets are limited to configured channels.
    Interactive,
}

/// What a relayed line turned into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Channels the line was delivered to.
    pub messages: usize,
    /// `PRIVMSG` lines handed to the sink.
    pub chunks: usize,
}

impl Outcome {
    fn add(&mut self, other: Outcome) {
        self.messages += other.messages;
        self.chunks += other.chunks;
    }
}

/// Turns input lines into IRC messages.
pub struct Relay<S> {
    sink: Arc<S>,
    rules: RuleSetHandle,
    policy: SegmentPolicy,
    mode: Mode,
}

impl<S: MessageSink> Relay<S> {
    /// Create a relay for TCP input.
    #[must_use]
    pub fn new(sink: Arc<S>, rules: RuleSetHandle, policy: SegmentPolicy) -> Self {
        Self {
            sink,
            rules,
            policy,
            mode: Mode::Input,
        }
    }

    /// Switch to interactive mode.
    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.mode = Mode::Interactive;
        self
    }

    /// The rule set handle, for reloads.
    #[must_use]
    pub fn rules(&self) -> &RuleSetHandle {
        &self.rules
    }

    /// Relay one input line.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink refuses a message. Chunks handed over
    /// before the failure stay delivered.
    pub async fn relay_line(&self, line: &str) -> Result<Outcome, ClientError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(Outcome::default());
        }
        metrics::record_line();

        // One snapshot for the whole line, so a reload never splits it.
        let rules = self.rules.load();
        let Targets { channels, message } = parse_targets(line);

        if channels.is_empty() {
            return self.broadcast(&rules, line).await;
        }

        if message.trim().is_empty() {
            debug!(targets = ?channels, "No message after targets, dropping line");
            metrics::record_dropped("no_message");
            return Ok(Outcome::default());
        }

        let channels = match self.mode {
            Mode::Input => channels,
            Mode::Interactive => self.known_channels(&channels),
        };
        if channels.is_empty() {
            warn!(line = %line, "None of the targets is a configured channel");
            metrics::record_dropped("unknown_target");
            return Ok(Outcome::default());
        }

        debug!(targets = ?channels, "Relaying to targets");
        let mut outcome = Outcome::default();
        for channel in &channels {
            let chunks = self.render(&rules, channel, message);
            outcome.add(self.deliver(&chunks, std::slice::from_ref(channel)).await?);
        }
        Ok(outcome)
    }

    async fn broadcast(&self, rules: &RuleSet, line: &str) -> Result<Outcome, ClientError> {
        let channels = self.sink.channels();
        if channels.is_empty() {
            metrics::record_dropped("no_channels");
            return Ok(Outcome::default());
        }
        debug!(channels = channels.len(), "Broadcasting line");

        match self.mode {
            Mode::Input => {
                let chunks = self.render(rules, "", line);
                self.deliver(&chunks, channels).await
            }
            Mode::Interactive => {
                let mut outcome = Outcome::default();
                for channel in channels {
                    let chunks = self.render(rules, channel, line);
                    outcome.add(self.deliver(&chunks, std::slice::from_ref(channel)).await?);
                }
                Ok(outcome)
            }
        }
    }

    /// Configured spellings of the requested channels that are configured.
    fn known_channels(&self, requested: &[String]) -> Vec<String> {
        let configured = self.sink.channels();
        requested
            .iter()
            .filter_map(|want| configured.iter().find(|c| c.eq_ignore_ascii_case(want)))
            .cloned()
            .collect()
    }

    fn render(&self, rules: &RuleSet, channel: &str, text: &str) -> Vec<String> {
        let start = Instant::now();
        let styled = rules.apply_for(channel, text);
        metrics::record_highlight(start.elapsed().as_secs_f64());
        self.policy.segment(&styled)
    }

    /// Send every chunk to every channel, chunk by chunk.
    async fn deliver(&self, chunks: &[String], channels: &[String]) -> Result<Outcome, ClientError> {
        for chunk in chunks {
            for channel in channels {
                self.sink.privmsg(channel, chunk).await?;
            }
        }
        for channel in channels {
            metrics::record_delivery(channel, chunks.len());
        }
        Ok(Outcome {
            messages: channels.len(),
            chunks: chunks.len() * channels.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use ircpush_irc::{ClientError, MessageSink};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Sink that records every message instead of sending it.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        channels: Vec<String>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        pub(crate) fn with_channels(channels: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                channels: channels.iter().map(|c| c.to_string()).collect(),
                sent: Mutex::default(),
            })
        }

        pub(crate) fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        /// Wait until at least `count` messages were recorded.
        pub(crate) async fn wait_for(&self, count: usize) -> Vec<(String, String)> {
            for _ in 0..500 {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("expected {count} messages, got {:?}", self.sent());
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn privmsg(&self, target: &str, text: &str) -> Result<(), ClientError> {
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), text.to_string()));
            Ok(())
        }

        fn channels(&self) -> &[String] {
            &self.channels
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use ircpush_core::RuleSpec;

    fn pair(channel: &str, text: &str) -> (String, String) {
        (channel.to_string(), text.to_string())
    }

    fn relay(sink: &Arc<RecordingSink>, rules: &[RuleSpec], policy: SegmentPolicy) -> Relay<RecordingSink> {
        Relay::new(sink.clone(), RuleSetHandle::new(RuleSet::build(rules)), policy)
    }

    #[tokio::test]
    async fn test_broadcast_uses_channel_less_highlighting() {
        let sink = RecordingSink::with_channels(&["#a", "#b"]);
        let relay = relay(
            &sink,
            &[
                RuleSpec::word("error", "red"),
                RuleSpec::word("disk", "blue").in_channels(["#a"]),
            ],
            SegmentPolicy::unlimited(),
        );

        let outcome = relay.relay_line("disk error\r\n").await.unwrap();
        assert_eq!(outcome, Outcome { messages: 2, chunks: 2 });
        assert_eq!(
            sink.sent(),
            vec![
                pair("#a", "disk \x0304error\x0F"),
                pair("#b", "disk \x0304error\x0F"),
            ]
        );
    }

    #[tokio::test]
    async fn test_targets_highlight_per_channel() {
        let sink = RecordingSink::with_channels(&["#ops"]);
        let relay = relay(
            &sink,
            &[RuleSpec::word("boom", "red").in_channels(["#sec*"])],
            SegmentPolicy::unlimited(),
        );

        relay.relay_line("#security,ops boom").await.unwrap();
        assert_eq!(
            sink.sent(),
            vec![pair("#security", "\x0304boom\x0F"), pair("#ops", "boom")]
        );
    }

    #[tokio::test]
    async fn test_targets_without_message_are_dropped() {
        let sink = RecordingSink::with_channels(&["#a"]);
        let relay = relay(&sink, &[], SegmentPolicy::unlimited());

        assert_eq!(relay.relay_line("#a,#b   ").await.unwrap(), Outcome::default());
        assert_eq!(relay.relay_line("\r\n").await.unwrap(), Outcome::default());
        assert_eq!(relay.relay_line("   ").await.unwrap(), Outcome::default());
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_chunks_are_interleaved_across_channels() {
        let sink = RecordingSink::with_channels(&["#a", "#b"]);
        let relay = relay(&sink, &[], SegmentPolicy::new(5, true));

        let outcome = relay.relay_line("aaaa bbbb").await.unwrap();
        assert_eq!(outcome, Outcome { messages: 2, chunks: 4 });
        assert_eq!(
            sink.sent(),
            vec![
                pair("#a", "aaaa"),
                pair("#b", "aaaa"),
                pair("#a", "bbbb"),
                pair("#b", "bbbb"),
            ]
        );
    }

    #[tokio::test]
    async fn test_truncation_after_highlighting() {
        let sink = RecordingSink::with_channels(&["#a"]);
        let relay = relay(&sink, &[], SegmentPolicy::new(8, false));

        relay.relay_line("#a 0123456789").await.unwrap();
        assert_eq!(sink.sent(), vec![pair("#a", "01234...")]);
    }

    #[tokio::test]
    async fn test_reload_applies_to_next_line() {
        let sink = RecordingSink::with_channels(&["#a"]);
        let relay = relay(&sink, &[RuleSpec::word("up", "green")], SegmentPolicy::unlimited());

        relay.relay_line("link up").await.unwrap();
        relay
            .rules()
            .store(RuleSet::build(&[RuleSpec::word("up", "red")]));
        relay.relay_line("link up").await.unwrap();

        assert_eq!(
            sink.sent(),
            vec![pair("#a", "link \x0303up\x0F"), pair("#a", "link \x0304up\x0F")]
        );
    }

    #[tokio::test]
    async fn test_interactive_broadcast_and_target_filter() {
        let sink = RecordingSink::with_channels(&["#a", "#Sec"]);
        let relay = relay(
            &sink,
            &[RuleSpec::word("alert", "red").in_channels(["#sec"])],
            SegmentPolicy::unlimited(),
        )
        .interactive();

        relay.relay_line("alert").await.unwrap();
        relay.relay_line("#sec,#unknown alert").await.unwrap();
        let outcome = relay.relay_line("#unknown alert").await.unwrap();

        assert_eq!(outcome, Outcome::default());
        assert_eq!(
            sink.sent(),
            vec![
                pair("#a", "alert"),
                pair("#Sec", "\x0304alert\x0F"),
                pair("#Sec", "\x0304alert\x0F"),
            ]
        );
    }
}
