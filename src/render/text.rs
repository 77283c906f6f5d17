//! Text shaping helpers for the layout engine: encoding sanitisation,
//! word wrapping, and the flowchart/monospace split.

/// Placeholder for characters the built-in fonts cannot encode.
pub const PLACEHOLDER: char = '?';

/// Keywords that mark a body as containing a plain-text flowchart.
pub const FLOWCHART_MARKERS: &[&str] = &["flowchart", "-->", "[start]"];

/// Phrases that end the flowchart part of a body.
pub const FLOWCHART_DELIMITERS: &[&str] = &["explanation:", "description:", "notes:", "key points:"];

fn substitute(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{2013}' => "-",
        '\u{2014}' => "--",
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => "\"",
        '\u{2026}' => "...",
        '\u{00A0}' | '\u{2007}' | '\u{202F}' => " ",
        '\u{2022}' => "*",
        '\u{2192}' => "->",
        _ => return None,
    })
}

/// Reduce `text` to what the built-in (Latin-1) fonts can encode.
///
/// Smart punctuation becomes its ASCII look-alike; anything else outside
/// Latin-1 becomes [`PLACEHOLDER`]. Tabs become spaces and other control
/// characters are dropped. Idempotent.
pub fn sanitize_latin1(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if let Some(rep) = substitute(c) {
            out.push_str(rep);
        } else if c == '\t' {
            out.push_str("    ");
        } else if c == '\n' {
            out.push('\n');
        } else if c.is_control() {
            continue;
        } else if (c as u32) <= 0xFF {
            out.push(c);
        } else {
            out.push(PLACEHOLDER);
        }
    }
    out
}

/// Greedy word wrap to `max_chars` columns.
///
/// Words longer than a line are hard-split. Blank input lines are kept as
/// empty output lines so paragraph spacing survives.
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for raw in text.lines() {
        if raw.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if current_len > 0 && current_len + 1 + word.len() > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }
        if current_len > 0 {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Split preformatted lines to `max_chars` without touching inner spacing.
pub fn wrap_preformatted(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for raw in text.lines() {
        let chars: Vec<char> = raw.trim_end().chars().collect();
        if chars.is_empty() {
            lines.push(String::new());
            continue;
        }
        for chunk in chars.chunks(max_chars) {
            lines.push(chunk.iter().collect());
        }
    }
    lines
}

/// A body split into its fixed-width head and proportional tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoSplit<'a> {
    pub monospace: &'a str,
    pub normal: &'a str,
}

/// Detect a flowchart body and split it for mixed-font rendering.
///
/// Returns `None` when the body carries no flowchart marker. Otherwise the
/// text before the earliest delimiter phrase is monospace and the remainder
/// (delimiter included) uses the body font; with no delimiter the whole body
/// is monospace.
pub fn split_monospace(body: &str) -> Option<MonoSplit<'_>> {
    let lowered = body.to_lowercase();
    if !FLOWCHART_MARKERS.iter().any(|m| lowered.contains(m)) {
        return None;
    }
    // Lowercasing can change byte lengths for some scripts; search the
    // original text case-insensitively per delimiter instead of reusing
    // offsets from `lowered`.
    let cut = FLOWCHART_DELIMITERS
        .iter()
        .filter_map(|d| find_ignore_ascii_case(body, d))
        .min();
    Some(match cut {
        Some(idx) => MonoSplit {
            monospace: &body[..idx],
            normal: &body[idx..],
        },
        None => MonoSplit {
            monospace: body,
            normal: "",
        },
    })
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || n.len() > h.len() {
        return None;
    }
    (0..=h.len() - n.len())
        .filter(|&i| haystack.is_char_boundary(i))
        .find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}
