//! Highlight rule descriptions and their compiled form.
//!
//! A [`RuleSpec`] is what operators write in the config file. [`compile`]
//! turns it into an immutable [`CompiledRule`] or explains why it was dropped.

use crate::style;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a rule description does not produce a compiled rule.
///
/// None of these are fatal: the rule is left out of the rule set and the
/// rest of the configuration still applies.
#[derive(Debug, Error)]
pub enum RuleRejected {
    /// Pattern was empty after trimming.
    #[error("Empty pattern")]
    EmptyPattern,

    /// Kind was neither `word` nor `regex`.
    #[error("Unknown rule kind: {0}")]
    UnknownKind(String),

    /// Pattern did not compile as a regular expression.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// A declarative highlight rule, as read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    /// `word` (default) or `regex`.
    pub kind: String,
    /// Literal word or regular expression.
    pub pattern: String,
    /// Palette name or numeric color (`"4"`, `"04,01"`).
    pub color: String,
    pub bold: bool,
    pub underline: bool,
    pub case_insensitive: bool,
    /// Style the whole line instead of the match.
    pub whole_line: bool,
    /// Channel globs the rule is limited to.
    pub channels: Vec<String>,
    /// Channel globs the rule never applies to.
    pub exclude_channels: Vec<String>,
    /// Capture groups to style, by 1-based index or by name.
    pub groups: Vec<String>,
}

impl RuleSpec {
    /// Create a `word` rule for `pattern` with the given color.
    #[must_use]
    pub fn word(pattern: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            kind: "word".to_string(),
            pattern: pattern.into(),
            color: color.into(),
            ..Self::default()
        }
    }

    /// Create a `regex` rule for `pattern` with the given color.
    #[must_use]
    pub fn regex(pattern: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            kind: "regex".to_string(),
            pattern: pattern.into(),
            color: color.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter for the whole-line flag.
    #[must_use]
    pub fn whole_line(mut self) -> Self {
        self.whole_line = true;
        self
    }

    /// Builder-style setter for bold.
    #[must_use]
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Builder-style setter for case-insensitive matching.
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Limit the rule to channels matching these globs.
    #[must_use]
    pub fn in_channels<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = globs.into_iter().map(Into::into).collect();
        self
    }

    /// Never apply the rule to channels matching these globs.
    #[must_use]
    pub fn except_channels<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_channels = globs.into_iter().map(Into::into).collect();
        self
    }

    /// Style only these capture groups.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// A lower-cased channel glob.
///
/// Shell-style: `*` and `?` never match `/`, `[!x]` and `[^x]` both negate
/// a class, and `\` escapes the next character. Malformed globs are kept so
/// they can be reported, but never match.
#[derive(Debug, Clone)]
pub struct ChannelGlob {
    source: String,
    matcher: Option<GlobMatcher>,
}

impl ChannelGlob {
    fn new(source: String) -> Self {
        let matcher = GlobBuilder::new(&source)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .ok()
            .map(|g| g.compile_matcher());
        Self { source, matcher }
    }

    /// The normalized glob text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a normalized (trimmed, lower-cased) channel name.
    #[must_use]
    pub fn matches(&self, channel: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(channel))
    }
}

/// An executable highlight rule. Immutable once compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    regex: Regex,
    style: String,
    whole_line: bool,
    includes: Vec<ChannelGlob>,
    excludes: Vec<ChannelGlob>,
    has_filters: bool,
    groups: Vec<usize>,
}

impl CompiledRule {
    /// The compiled matcher.
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// The precomputed style prefix.
    #[must_use]
    pub fn style(&self) -> &str {
        &self.style
    }

    #[must_use]
    pub fn is_whole_line(&self) -> bool {
        self.whole_line
    }

    /// Resolved capture group indices, ascending. Empty styles the whole match.
    #[must_use]
    pub fn groups(&self) -> &[usize] {
        &self.groups
    }

    #[must_use]
    pub fn has_filters(&self) -> bool {
        self.has_filters
    }

    #[must_use]
    pub fn includes(&self) -> &[ChannelGlob] {
        &self.includes
    }

    #[must_use]
    pub fn excludes(&self) -> &[ChannelGlob] {
        &self.excludes
    }

    /// Whether the rule is eligible for a normalized channel name.
    ///
    /// An empty channel means "no channel context": only unscoped rules apply.
    /// Exclusions are checked before inclusions.
    #[must_use]
    pub fn applies_to(&self, channel: &str) -> bool {
        if channel.is_empty() {
            return !self.has_filters;
        }
        if self.excludes.iter().any(|g| g.matches(channel)) {
            return false;
        }
        if !self.includes.is_empty() {
            return self.includes.iter().any(|g| g.matches(channel));
        }
        true
    }
}

/// Compile a rule description.
///
/// # Errors
///
/// Returns the reason the rule was dropped: empty pattern, unknown kind, or a
/// pattern that is not a valid regular expression.
pub fn compile(spec: &RuleSpec) -> Result<CompiledRule, RuleRejected> {
    let regex = compile_pattern(spec)?;

    let includes = normalize_globs(&spec.channels);
    let excludes = normalize_globs(&spec.exclude_channels);
    let has_filters = !includes.is_empty() || !excludes.is_empty();
    let groups = resolve_groups(&regex, &spec.groups);

    Ok(CompiledRule {
        style: style::style_prefix(spec.bold, spec.underline, &spec.color),
        whole_line: spec.whole_line,
        includes,
        excludes,
        has_filters,
        groups,
        regex,
    })
}

/// ASCII word boundary, so letters like `é` or `Ñ` count as non-word
/// characters next to a `word` rule.
const WORD_BOUNDARY: &str = r"(?-u:\b)";

fn compile_pattern(spec: &RuleSpec) -> Result<Regex, RuleRejected> {
    let pattern = spec.pattern.trim();
    if pattern.is_empty() {
        return Err(RuleRejected::EmptyPattern);
    }

    let mut source = match spec.kind.trim().to_lowercase().as_str() {
        "" | "word" => format!(r"{WORD_BOUNDARY}{}{WORD_BOUNDARY}", regex::escape(pattern)),
        "regex" => pattern.to_string(),
        other => return Err(RuleRejected::UnknownKind(other.to_string())),
    };
    if spec.case_insensitive && !source.starts_with("(?i)") {
        source.insert_str(0, "(?i)");
    }

    Ok(Regex::new(&source)?)
}

fn normalize_globs(globs: &[String]) -> Vec<ChannelGlob> {
    globs
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(|g| ChannelGlob::new(g.to_lowercase()))
        .collect()
}

/// Resolve group selectors to capture indices. Numeric selectors are 1-based
/// indices; anything else is looked up as a named group. Unresolvable
/// selectors are dropped.
fn resolve_groups(regex: &Regex, selectors: &[String]) -> Vec<usize> {
    let mut groups: Vec<usize> = selectors
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(index) => usize::try_from(index).ok().filter(|&i| i > 0),
            Err(_) => regex
                .capture_names()
                .position(|name| name == Some(s))
                .filter(|&i| i > 0),
        })
        .collect();
    groups.sort_unstable();
    groups.dedup();
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_rule_is_escaped_and_bounded() {
        let rule = compile(&RuleSpec::word("a.b", "red")).unwrap();
        assert!(rule.regex().is_match("x a.b y"));
        assert!(!rule.regex().is_match("axb"));
        assert!(!rule.regex().is_match("ca.bc"));
        assert_eq!(rule.style(), "\x0304");
    }

    #[test]
    fn test_unset_kind_defaults_to_word() {
        let spec = RuleSpec {
            pattern: "error".into(),
            ..RuleSpec::default()
        };
        let rule = compile(&spec).unwrap();
        assert!(rule.regex().is_match("an error occurred"));
        assert!(!rule.regex().is_match("errors"));
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            compile(&RuleSpec::word("   ", "red")),
            Err(RuleRejected::EmptyPattern)
        ));

        let mut spec = RuleSpec::word("x", "red");
        spec.kind = "glob".into();
        assert!(matches!(compile(&spec), Err(RuleRejected::UnknownKind(k)) if k == "glob"));

        assert!(matches!(
            compile(&RuleSpec::regex("(unclosed", "red")),
            Err(RuleRejected::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_case_insensitive_prefix() {
        let rule = compile(&RuleSpec::word("Error", "red").case_insensitive()).unwrap();
        assert_eq!(rule.regex().as_str(), r"(?i)(?-u:\b)Error(?-u:\b)");
        assert!(rule.regex().is_match("ERROR"));

        let rule = compile(&RuleSpec::regex("(?i)warn", "red").case_insensitive()).unwrap();
        assert_eq!(rule.regex().as_str(), "(?i)warn");
    }

    #[test]
    fn test_group_resolution() {
        let spec = RuleSpec::regex(r"(?P<a>\w+)=(?P<b>\w+)", "red")
            .with_groups(["b", "2", " 1 ", "0", "-3", "missing", ""]);
        let rule = compile(&spec).unwrap();
        assert_eq!(rule.groups(), &[1, 2]);
    }

    #[test]
    fn test_channel_globs_normalized() {
        let spec = RuleSpec::word("x", "red")
            .in_channels([" #Sec* ", ""])
            .except_channels(["#NOISY"]);
        let rule = compile(&spec).unwrap();
        assert_eq!(rule.includes()[0].as_str(), "#sec*");
        assert_eq!(rule.excludes()[0].as_str(), "#noisy");
        assert!(rule.has_filters());
    }

    #[test]
    fn test_applies_to() {
        let scoped = compile(&RuleSpec::word("x", "red").in_channels(["#sec*"])).unwrap();
        assert!(scoped.applies_to("#security"));
        assert!(!scoped.applies_to("#general"));
        assert!(!scoped.applies_to(""));

        let unscoped = compile(&RuleSpec::word("x", "red")).unwrap();
        assert!(unscoped.applies_to(""));
        assert!(unscoped.applies_to("#anything"));

        let excluded = compile(
            &RuleSpec::word("x", "red")
                .in_channels(["#*"])
                .except_channels(["#noisy"]),
        )
        .unwrap();
        assert!(!excluded.applies_to("#noisy"));
        assert!(excluded.applies_to("#ops"));

        let only_excludes =
            compile(&RuleSpec::word("x", "red").except_channels(["#noisy"])).unwrap();
        assert!(only_excludes.applies_to("#ops"));
        assert!(!only_excludes.applies_to(""));
    }

    #[test]
    fn test_malformed_glob_fails_closed() {
        let rule = compile(&RuleSpec::word("x", "red").in_channels(["#[abc"])).unwrap();
        assert!(!rule.applies_to("#[abc"));
        assert!(!rule.applies_to("#a"));

        let rule = compile(&RuleSpec::word("x", "red").except_channels(["#[abc"])).unwrap();
        assert!(rule.applies_to("#a"));
    }

    #[test]
    fn test_word_boundary_is_ascii() {
        let rule = compile(&RuleSpec::word("error", "red")).unwrap();
        assert!(rule.regex().is_match("Ñerror"));
        assert!(rule.regex().is_match("erroré"));
        assert!(!rule.regex().is_match("xerror"));
    }

    #[test]
    fn test_glob_negated_class() {
        let rule = compile(&RuleSpec::word("x", "red").in_channels(["#[^x]*"])).unwrap();
        assert!(rule.applies_to("#ops"));
        assert!(!rule.applies_to("#xyz"));

        let rule = compile(&RuleSpec::word("x", "red").in_channels(["#[!x]*"])).unwrap();
        assert!(rule.applies_to("#ops"));
        assert!(!rule.applies_to("#xyz"));

        let rule = compile(&RuleSpec::word("x", "red").except_channels(["#[^s]*"])).unwrap();
        assert!(!rule.applies_to("#ops"));
        assert!(rule.applies_to("#sec"));
    }

    #[test]
    fn test_glob_escape_and_separator() {
        let rule = compile(&RuleSpec::word("x", "red").in_channels([r"#a\*"])).unwrap();
        assert!(rule.applies_to("#a*"));
        assert!(!rule.applies_to("#ab"));

        let rule = compile(&RuleSpec::word("x", "red").in_channels(["#*"])).unwrap();
        assert!(rule.applies_to("#ops"));
        assert!(!rule.applies_to("#ops/eu"));

        let rule = compile(&RuleSpec::word("x", "red").in_channels(["#ops?eu"])).unwrap();
        assert!(rule.applies_to("#ops-eu"));
        assert!(!rule.applies_to("#ops/eu"));
    }

    #[test]
    fn test_spec_from_toml() {
        let spec: RuleSpec = toml::from_str(
            r#"
            kind = "regex"
            pattern = "\\d+"
            color = "green"
            groups = ["1"]
            "#,
        )
        .unwrap();
        assert_eq!(spec.kind, "regex");
        assert!(!spec.whole_line);
        assert_eq!(spec.groups, vec!["1".to_string()]);
    }
}
