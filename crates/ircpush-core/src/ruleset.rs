//! Ordered, immutable rule sets and the hot-swappable handle around them.

use crate::highlight;
use crate::rule::{compile, CompiledRule, RuleRejected, RuleSpec};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A rule that was dropped during [`RuleSet::build_with_report`].
#[derive(Debug)]
pub struct Rejection {
    /// Position of the rule in the input list.
    pub index: usize,
    /// The rule's pattern, for operator-facing messages.
    pub pattern: String,
    /// Why it was dropped.
    pub reason: RuleRejected,
}

/// An ordered collection of compiled rules.
///
/// Order is declaration order and is significant: the first matching
/// whole-line rule wins, and per-match rules are applied one after another.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// An empty rule set. Highlighting with it is the identity.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile rule descriptions into a new rule set.
    ///
    /// Rejected rules are skipped and logged.
    #[must_use]
    pub fn build(specs: &[RuleSpec]) -> Self {
        let (set, rejected) = Self::build_with_report(specs);
        for r in &rejected {
            warn!(index = r.index, pattern = %r.pattern, reason = %r.reason, "Skipping highlight rule");
        }
        set
    }

    /// Compile rule descriptions, returning the rejections alongside the set.
    #[must_use]
    pub fn build_with_report(specs: &[RuleSpec]) -> (Self, Vec<Rejection>) {
        let mut rules = Vec::with_capacity(specs.len());
        let mut rejected = Vec::new();

        for (index, spec) in specs.iter().enumerate() {
            match compile(spec) {
                Ok(rule) => rules.push(rule),
                Err(reason) => rejected.push(Rejection {
                    index,
                    pattern: spec.pattern.clone(),
                    reason,
                }),
            }
        }

        debug!(
            compiled = rules.len(),
            rejected = rejected.len(),
            "Built highlight rule set"
        );
        (Self { rules }, rejected)
    }

    /// Number of compiled rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Highlight `text` for `channel`. See [`highlight::apply_for`].
    #[must_use]
    pub fn apply_for(&self, channel: &str, text: &str) -> String {
        highlight::apply_for(channel, text, self)
    }
}

impl FromIterator<CompiledRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = CompiledRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// Shared, atomically replaceable reference to the active rule set.
///
/// Readers take a snapshot with [`RuleSetHandle::load`] and work on it for the
/// whole call; [`RuleSetHandle::store`] swaps the pointer without waiting for
/// readers. A replaced set is dropped once the last snapshot goes away.
#[derive(Debug, Clone)]
pub struct RuleSetHandle {
    inner: Arc<ArcSwap<RuleSet>>,
}

impl RuleSetHandle {
    /// Create a handle seeded with `rules`.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(rules)),
        }
    }

    /// Snapshot of the current rule set. Lock-free.
    #[must_use]
    pub fn load(&self) -> Arc<RuleSet> {
        self.inner.load_full()
    }

    /// Replace the active rule set.
    pub fn store(&self, rules: RuleSet) {
        let count = rules.len();
        self.inner.store(Arc::new(rules));
        info!(rules = count, "Highlight rules replaced");
    }

    /// Highlight against whatever rule set is active when the call starts.
    #[must_use]
    pub fn apply_for(&self, channel: &str, text: &str) -> String {
        let rules = self.inner.load();
        highlight::apply_for(channel, text, &rules)
    }
}

impl Default for RuleSetHandle {
    fn default() -> Self {
        Self::new(RuleSet::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_skips_rejected_rules() {
        let specs = vec![
            RuleSpec::word("error", "red"),
            RuleSpec::word("", "red"),
            RuleSpec::regex("(bad", "red"),
            RuleSpec::word("warn", "yellow"),
        ];
        let (set, rejected) = RuleSet::build_with_report(&specs);
        assert_eq!(set.len(), 2);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].index, 1);
        assert_eq!(rejected[1].index, 2);
        assert_eq!(rejected[1].pattern, "(bad");
    }

    #[test]
    fn test_build_preserves_order() {
        let set = RuleSet::build(&[RuleSpec::word("a", "red"), RuleSpec::word("b", "blue")]);
        assert_eq!(set.rules()[0].style(), "\x0304");
        assert_eq!(set.rules()[1].style(), "\x0302");
    }

    #[test]
    fn test_handle_swap() {
        let handle = RuleSetHandle::default();
        assert_eq!(handle.apply_for("", "error"), "error");

        let before = handle.load();
        handle.store(RuleSet::build(&[RuleSpec::word("error", "red")]));

        // A snapshot taken before the swap keeps the old rules.
        assert_eq!(before.apply_for("", "error"), "error");
        assert_eq!(handle.apply_for("", "error"), "\x0304error\x0F");
    }

    #[test]
    fn test_handle_clone_shares_state() {
        let handle = RuleSetHandle::default();
        let clone = handle.clone();
        handle.store(RuleSet::build(&[RuleSpec::word("x", "red")]));
        assert_eq!(clone.load().len(), 1);
    }
}
