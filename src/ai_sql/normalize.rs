//! Canonicalization of raw model output
//!
//! Models are asked for bare SQL or a bare list, but answers still arrive
//! wrapped in markdown fences, with typographic quotes, or with quotes escaped
//! as if they were inside a string literal. `normalize` undoes all three and
//! is idempotent.

use regex::Regex;
use std::fmt;
use std::ops::Deref;
use std::sync::LazyLock;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_+.\-]*[ \t]*(?:\r?\n|$)").unwrap());

static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\r?\n)[ \t]*```[ \t]*$").unwrap());

const FENCE: &str = "```";

/// Info strings recognised after an opening fence on a single-line block
const FENCE_LANGUAGES: &[&str] = &[
    "sql", "postgresql", "postgres", "psql", "mysql", "sqlite", "plsql", "tsql", "json",
    "python", "py", "text", "txt", "plaintext",
];

/// Text with no code fences and only straight quotes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Deref for NormalizedText {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<NormalizedText> for String {
    fn from(text: NormalizedText) -> Self {
        text.0
    }
}

/// Normalize a raw completion. Total: never fails.
pub fn normalize(raw_text: &str) -> NormalizedText {
    let unfenced = strip_code_fences(raw_text);
    let unescaped = unescape_single_quotes(&unfenced);
    NormalizedText(straighten_quotes(&unescaped))
}

fn is_single_quote(ch: char) -> bool {
    matches!(ch, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}')
}

fn is_curly_double_quote(ch: char) -> bool {
    matches!(ch, '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}')
}

/// Remove markdown fence lines around the payload, then any stray fence marker
fn strip_code_fences(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let without_leading = LEADING_FENCE.replace(&current, "");
        let without_trailing = TRAILING_FENCE.replace(&without_leading, "");
        let next = without_trailing.trim();
        if next == current {
            break;
        }
        current = next.to_string();
    }

    if current.contains(FENCE) {
        if let Some(rest) = current.strip_prefix(FENCE) {
            current = strip_language_tag(rest).to_string();
        }
        current = current.replace(FENCE, "").trim().to_string();
    }
    current
}

/// Drop a leading fence info string such as `json` in "```json [...]```".
/// Unknown words are kept so "```SELECT 1;```" keeps its keyword.
fn strip_language_tag(text: &str) -> &str {
    let tag_end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-')))
        .unwrap_or(text.len());
    let tag = &text[..tag_end];
    if FENCE_LANGUAGES.iter().any(|lang| lang.eq_ignore_ascii_case(tag)) {
        &text[tag_end..]
    } else {
        text
    }
}

/// `\'` becomes `'`. A whole run of backslashes before a quote collapses,
/// so a second pass has nothing left to unescape.
fn unescape_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_backslashes = 0usize;

    for ch in text.chars() {
        if ch == '\\' {
            pending_backslashes += 1;
            continue;
        }
        if !is_single_quote(ch) {
            out.extend(std::iter::repeat_n('\\', pending_backslashes));
        }
        pending_backslashes = 0;
        out.push(ch);
    }
    out.extend(std::iter::repeat_n('\\', pending_backslashes));
    out
}

fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|ch| {
            if is_single_quote(ch) {
                '\''
            } else if is_curly_double_quote(ch) {
                '"'
            } else {
                ch
            }
        })
        .collect()
}
