//! The highlighting engine.
//!
//! Highlighting runs in two passes over a single line:
//!
//! 1. **Whole-line pass** - the first applicable whole-line rule that matches
//!    the original text styles the entire line, and nothing else runs.
//! 2. **Per-match pass** - every applicable per-match rule runs in declaration
//!    order against the output of the previous one.
//!
//! Later rules see the control codes inserted by earlier ones and may match
//! them. That is existing behavior and is kept as is.

use crate::rule::CompiledRule;
use crate::ruleset::RuleSet;
use crate::style;
use regex::Captures;

/// A styled byte range `[start, end)` in the text being rewritten.
type Span = (usize, usize);

/// Highlight `text` for `channel` using `rules`.
///
/// `channel` is trimmed and lower-cased before rule scoping. An empty channel
/// means "no channel context", in which case only unscoped rules apply.
#[must_use]
pub fn apply_for(channel: &str, text: &str, rules: &RuleSet) -> String {
    if text.is_empty() || rules.is_empty() {
        return text.to_string();
    }
    let channel = channel.trim().to_lowercase();

    let whole_line = rules
        .rules()
        .iter()
        .filter(|r| r.is_whole_line() && r.applies_to(&channel))
        .find(|r| r.regex().is_match(text));
    if let Some(rule) = whole_line {
        return style::wrap(rule.style(), text);
    }

    rules
        .rules()
        .iter()
        .filter(|r| !r.is_whole_line() && r.applies_to(&channel))
        .fold(text.to_string(), |out, rule| apply_rule(rule, &out))
}

/// Apply a single per-match rule.
fn apply_rule(rule: &CompiledRule, text: &str) -> String {
    if rule.groups().is_empty() {
        return rule
            .regex()
            .replace_all(text, |caps: &Captures<'_>| style::wrap(rule.style(), &caps[0]))
            .into_owned();
    }
    apply_groups(rule, text)
}

/// Style only the selected capture groups of every match.
///
/// Group spans from all matches are collected, sorted and merged so that
/// overlapping or touching spans become one styled span.
fn apply_groups(rule: &CompiledRule, text: &str) -> String {
    let mut spans: Vec<Span> = Vec::new();
    for caps in rule.regex().captures_iter(text) {
        for &group in rule.groups() {
            if let Some(m) = caps.get(group) {
                if m.end() > m.start() {
                    spans.push((m.start(), m.end()));
                }
            }
        }
    }
    if spans.is_empty() {
        return text.to_string();
    }

    let merged = merge_spans(spans);

    let mut out = String::with_capacity(text.len() + merged.len() * 8);
    let mut last = 0;
    for (start, end) in merged {
        out.push_str(&text[last..start]);
        out.push_str(rule.style());
        out.push_str(&text[start..end]);
        out.push_str(style::RESET);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// Sort spans by start and merge any that overlap or touch.
fn merge_spans(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_unstable_by_key(|&(start, _)| start);

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}
