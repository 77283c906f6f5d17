//! Deterministic cleanup of generated SOP text.
//!
//! Models wrap answers in code fences, mix line endings and sprinkle
//! zero-width characters even when told not to. These passes undo that
//! without touching content, so the audit and the section parser see the
//! text the way a reader would.
//!
//! Order matters: line endings are normalised before fences are stripped
//! (the fence regex expects `\n`) and the final-newline pass runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup pass to a successful generation.
///
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip outer code fences (```` ``` ````, ```` ```text ````, ```` ```markdown ````)
/// 3. Trim trailing whitespace per line
/// 4. Collapse runs of 3+ blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. End with exactly one newline
pub fn clean_generation(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fences(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Fences ──────────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Line endings ────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Whitespace ──────────────────────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}

// ── Invisible characters ────────────────────────────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

fn remove_invisible_chars(input: &str) -> String {
    input.replace(INVISIBLE, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_outer_fences("```markdown\nStep 1\n```"), "Step 1");
        assert_eq!(strip_outer_fences("```\nStep 1\nStep 2\n```"), "Step 1\nStep 2");
        assert_eq!(strip_outer_fences("```text\nA\n```\n"), "A");
    }

    #[test]
    fn inner_fences_are_left_alone() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_outer_fences(input), input);
    }

    #[test]
    fn line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn trailing_whitespace() {
        assert_eq!(trim_trailing_whitespace("  hi   \nthere\t"), "  hi\nthere");
    }

    #[test]
    fn blank_runs_collapse_to_two() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(
            remove_invisible_chars("Step\u{200B} 1\u{FEFF}: pre\u{00AD}ss"),
            "Step 1: press"
        );
    }

    #[test]
    fn single_final_newline() {
        assert_eq!(ensure_final_newline("x"), "x\n");
        assert_eq!(ensure_final_newline("x\n\n\n"), "x\n");
        assert_eq!(ensure_final_newline("   "), "\n");
    }

    #[test]
    fn full_pass() {
        let input = "```markdown\r\nSECTION 1:   \r\nOverview\r\n\r\n\r\n\r\n\r\nSECTION 2:\r\nStep 1: go\u{200B}\r\n```";
        let out = clean_generation(input);
        assert_eq!(out, "SECTION 1:\nOverview\n\n\nSECTION 2:\nStep 1: go\n");
    }

    #[test]
    fn clean_text_is_a_fixed_point() {
        let once = clean_generation("Step 1: a\n\n\n\n\nStep 2: b   \n");
        assert_eq!(clean_generation(&once), once);
    }
}
