//! IRC formatting control codes and style prefixes.
//!
//! A style prefix is built once per rule at compile time. Every styled span
//! in the output is `prefix + text + RESET`.

/// Color control code, followed by `FG[,BG]` digits.
pub const COLOR: &str = "\x03";

/// Bold toggle.
pub const BOLD: &str = "\x02";

/// Underline toggle.
pub const UNDERLINE: &str = "\x1F";

/// Resets all formatting. Shared by every styled span.
pub const RESET: &str = "\x0F";

/// The 16-entry mIRC palette, keyed by the names operators use in configs.
const PALETTE: &[(&[&str], &str)] = &[
    (&["white"], "00"),
    (&["black"], "01"),
    (&["blue", "navy"], "02"),
    (&["green"], "03"),
    (&["red"], "04"),
    (&["brown", "maroon"], "05"),
    (&["purple"], "06"),
    (&["orange", "olive"], "07"),
    (&["yellow"], "08"),
    (&["lightgreen", "lime"], "09"),
    (&["teal", "cyan"], "10"),
    (&["lightcyan", "aqua"], "11"),
    (&["lightblue", "royal"], "12"),
    (&["pink", "fuchsia"], "13"),
    (&["grey", "gray"], "14"),
    (&["lightgrey", "lightgray", "silver"], "15"),
];

/// Map a color specifier to its two-digit code(s).
///
/// Accepts palette names (case-insensitive) or numeric specifiers such as
/// `"4"` or `"04,01"`. Returns `None` for empty or unknown input.
#[must_use]
pub fn color_code(spec: &str) -> Option<String> {
    let spec = spec.trim().to_lowercase();
    if spec.is_empty() {
        return None;
    }
    if spec.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return Some(normalize_numeric(&spec));
    }
    PALETTE
        .iter()
        .find(|(names, _)| names.contains(&spec.as_str()))
        .map(|(_, code)| (*code).to_string())
}

/// Zero-pad each comma-separated component to two digits, truncating longer ones.
fn normalize_numeric(spec: &str) -> String {
    spec.split(',')
        .map(|part| match part.len() {
            1 => format!("0{part}"),
            n if n > 2 => part[..2].to_string(),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Build a style prefix from its parts: bold, underline, then color.
#[must_use]
pub fn style_prefix(bold: bool, underline: bool, color: &str) -> String {
    let mut prefix = String::new();
    if bold {
        prefix.push_str(BOLD);
    }
    if underline {
        prefix.push_str(UNDERLINE);
    }
    if let Some(code) = color_code(color) {
        prefix.push_str(COLOR);
        prefix.push_str(&code);
    }
    prefix
}

/// Wrap `text` in `prefix` and the shared reset code.
#[must_use]
pub fn wrap(prefix: &str, text: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + text.len() + RESET.len());
    out.push_str(prefix);
    out.push_str(text);
    out.push_str(RESET);
    out
}
