//! Length policy for outbound messages.
//!
//! Lengths are counted in Unicode scalar values, never bytes, so a message
//! is never cut in the middle of a multi-byte character.

use serde::{Deserialize, Serialize};

/// Marker appended to truncated messages.
pub const ELLIPSIS: &str = "...";

/// How over-long messages are reshaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPolicy {
    /// Maximum characters per chunk. `0` means unlimited.
    pub max_len: usize,
    /// Split into several chunks instead of truncating.
    pub split_long: bool,
}

impl SegmentPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(max_len: usize, split_long: bool) -> Self {
        Self {
            max_len,
            split_long,
        }
    }

    /// A policy that never changes a message.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self::new(0, false)
    }

    /// Apply this policy to `message`.
    #[must_use]
    pub fn segment(&self, message: &str) -> Vec<String> {
        segment(message, self.max_len, self.split_long)
    }
}

/// Reshape `message` into chunks of at most `max_len` characters.
///
/// - `max_len == 0`, or a message that already fits, yields `[message]`.
/// - Truncate mode keeps `max_len - 3` characters plus `"..."`, or just
///   `max_len` characters when there is no room for the ellipsis.
/// - Split mode breaks before the last space inside each window and drops the
///   spaces at the start of the next chunk. A window without a usable space is
///   emitted whole.
#[must_use]
pub fn segment(message: &str, max_len: usize, split_long: bool) -> Vec<String> {
    if max_len == 0 {
        return vec![message.to_string()];
    }

    let chars: Vec<char> = message.chars().collect();
    if chars.len() <= max_len {
        return vec![message.to_string()];
    }

    if !split_long {
        return vec![truncate(&chars, max_len)];
    }
    split(&chars, max_len)
}

fn truncate(chars: &[char], max_len: usize) -> String {
    if max_len > ELLIPSIS.len() {
        let mut out: String = chars[..max_len - ELLIPSIS.len()].iter().collect();
        out.push_str(ELLIPSIS);
        out
    } else {
        chars[..max_len].iter().collect()
    }
}

fn split(chars: &[char], max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + max_len).min(chars.len());

        if end < chars.len() {
            if let Some(space) = chars[start..end].iter().rposition(|&c| c == ' ') {
                if space > 0 {
                    end = start + space;
                }
            }
        }

        chunks.push(chars[start..end].iter().collect());

        start = end;
        while start < chars.len() && chars[start] == ' ' {
            start += 1;
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited() {
        assert_eq!(segment("anything at all", 0, true), vec!["anything at all"]);
        assert_eq!(segment("anything at all", 0, false), vec!["anything at all"]);
        assert_eq!(SegmentPolicy::unlimited().segment(""), vec![""]);
    }

    #[test]
    fn test_fits() {
        assert_eq!(segment("hello", 5, false), vec!["hello"]);
        assert_eq!(segment("hello", 10, true), vec!["hello"]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(segment("abcdefghi", 5, false), vec!["ab..."]);
        assert_eq!(segment("abcdef", 3, false), vec!["abc"]);
        assert_eq!(segment("abcdef", 4, false), vec!["a..."]);
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let out = segment("😊😊😊😊", 3, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chars().count(), 3);
        assert_eq!(out[0].len(), 12);
    }

    #[test]
    fn test_split_on_spaces() {
        let msg = "Hello this is a message that should be split properly. Let's see how it works! :)";
        assert_eq!(
            segment(msg, 30, true),
            vec![
                "Hello this is a message that",
                "should be split properly.",
                "Let's see how it works! :)",
            ]
        );
    }

    #[test]
    fn test_split_long_word() {
        assert_eq!(
            segment("abcdefghij", 4, true),
            vec!["abcd", "efgh", "ij"]
        );
    }

    #[test]
    fn test_split_skips_leading_spaces() {
        assert_eq!(segment("abcd    efgh", 4, true), vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_split_space_at_window_start_is_kept() {
        assert_eq!(segment("ab cdefgh", 3, true), vec!["ab", "cde", "fgh"]);
        // A space at position 0 is not a usable break.
        assert_eq!(segment(" abcdef", 3, true), vec![" ab", "cde", "f"]);
    }

    #[test]
    fn test_policy_roundtrip_fields() {
        let policy = SegmentPolicy::new(10, true);
        assert_eq!(policy.segment("one two three four"), vec!["one two", "three four"]);
    }
}
