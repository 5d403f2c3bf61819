//! Post-processing: deterministic cleanup of describe replies.
//!
//! Even well-prompted models wrap output in code fences, emit CRLF line
//! endings, or sprinkle zero-width characters. These rules fix such quirks
//! without touching content, so the prompt can stay focused on what to
//! extract.

use crate::region::RegionType;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean the raw text a model returned for one region.
///
/// Rules, in order:
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Tables: insert a missing GFM separator row
/// 7. Headings: drop leading `#` markers
///
/// The result has no leading or trailing blank lines.
pub fn clean_content(input: &str, region_type: RegionType) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    let s = match region_type {
        RegionType::Table => fix_missing_table_separator(&s),
        RegionType::Heading => strip_heading_markers(&s),
        _ => s,
    };
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Remove a single pair of ``` fences wrapping the whole reply.
pub fn strip_outer_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Missing table separator ─────────────────────────────────────────

fn fix_missing_table_separator(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let Some(first) = lines.iter().position(|l| is_table_row(l)) else {
        return input.to_string();
    };
    let next = lines.get(first + 1).copied().unwrap_or("");
    if is_separator_row(next) {
        return input.to_string();
    }
    let col_count = lines[first].matches('|').count().saturating_sub(1).max(1);
    let sep: String = std::iter::once("|")
        .chain(std::iter::repeat_n(" --- |", col_count))
        .collect();
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    out.insert(first + 1, sep);
    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 7: Heading markers ─────────────────────────────────────────────────

fn strip_heading_markers(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_start_matches('#').trim_start())
        .collect::<Vec<_>>()
        .join("\n")
}
