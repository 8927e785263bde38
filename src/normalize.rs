//! Output Normalizer
//!
//! Best-effort cleanup of model output before record parsing: removes code
//! fences and drops commentary lines that cannot be records. Parsing proper
//! lives in [`crate::records`].

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[\w+-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("fence pattern is valid")
});

/// Contents of the first fenced block, else the text without a leading or
/// trailing fence line. Always trimmed.
pub fn strip_code_fences(raw: &str) -> String {
    if let Some(inner) = FENCED_BLOCK.captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str().trim().to_string();
    }

    let mut lines: Vec<&str> = raw.trim().lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Keeps only lines that look like quoted, delimited records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNormalizer {
    delimiters: Vec<char>,
    quote: char,
}

impl Default for OutputNormalizer {
    fn default() -> Self {
        Self {
            delimiters: vec!['|', '\t'],
            quote: '"',
        }
    }
}

impl OutputNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiters(mut self, delimiters: impl IntoIterator<Item = char>) -> Self {
        self.delimiters = delimiters.into_iter().collect();
        self
    }

    pub fn delimiters(&self) -> &[char] {
        &self.delimiters
    }

    pub fn normalize(&self, raw: &str) -> String {
        strip_code_fences(raw)
            .lines()
            .map(|line| line.trim_end_matches(['\r', ' ']))
            .filter(|line| self.is_record_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn is_record_line(&self, line: &str) -> bool {
        line.contains(self.quote) && line.contains(self.delimiters.as_slice())
    }
}
