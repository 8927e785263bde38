//! Card records
//!
//! Tolerant parsing of the two-field tabular output contract: one card per
//! line, every field quoted, embedded quotes doubled. Malformed lines are
//! skipped, never reported.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub front: String,
    pub back: String,
}

impl Card {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
        }
    }
}

/// Parse every usable card out of `text`.
///
/// The delimiter is picked per line: tab, then pipe, then comma. Fields past
/// the second are appended to the back.
pub fn parse_cards(text: &str) -> Vec<Card> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Card> {
    let line = line.trim();
    let delimiter = ['\t', '|', ','].into_iter().find(|d| line.contains(*d))?;

    let mut fields = split_outside_quotes(line, delimiter)
        .into_iter()
        .map(unquote);
    let front = fields.next()?;
    let mut back = fields.next()?;
    for extra in fields {
        if !extra.is_empty() {
            back.push(' ');
            back.push_str(&extra);
        }
    }

    let back = back.trim().to_string();
    if front.is_empty() {
        return None;
    }
    Some(Card { front, back })
}

fn split_outside_quotes(line: &str, delimiter: char) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            fields.push(&line[start..i]);
            start = i + c.len_utf8();
        }
    }
    fields.push(&line[start..]);
    fields
}

fn unquote(field: &str) -> String {
    let field = field.trim();
    match field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => field.to_string(),
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Render `card` as one contract line.
pub fn format_card(card: &Card, delimiter: char) -> String {
    format!("{}{delimiter}{}", quote(&card.front), quote(&card.back))
}

/// Drop cards whose front (trimmed, lowercased) matches one of
/// `existing_questions` or an earlier card.
pub fn dedupe_cards<S: AsRef<str>>(cards: Vec<Card>, existing_questions: &[S]) -> Vec<Card> {
    let mut seen: HashSet<String> = existing_questions
        .iter()
        .map(|q| normalize_question(q.as_ref()))
        .collect();
    cards
        .into_iter()
        .filter(|card| seen.insert(normalize_question(&card.front)))
        .collect()
}

fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipe_and_tab_lines() {
        let cards = parse_cards("\"What is ATP?\"|\"Energy currency\"\n\"Q2\"\t\"A2\"");
        assert_eq!(
            cards,
            vec![
                Card::new("What is ATP?", "Energy currency"),
                Card::new("Q2", "A2"),
            ]
        );
    }

    #[test]
    fn delimiter_inside_quotes_is_kept() {
        let cards = parse_cards(r#""Ca | Mg ratio?"|"About ""2:1"", roughly""#);
        assert_eq!(cards, vec![Card::new("Ca | Mg ratio?", "About \"2:1\", roughly")]);
    }

    #[test]
    fn extra_fields_join_the_back() {
        let cards = parse_cards("\"Q\"|\"part one\"|\"part two\"");
        assert_eq!(cards, vec![Card::new("Q", "part one part two")]);
    }

    #[test]
    fn unusable_lines_are_skipped() {
        let text = "just commentary\n\n\"\"|\"no front\"\nfront only|\nQ,A";
        let cards = parse_cards(text);
        assert_eq!(cards, vec![Card::new("front only", ""), Card::new("Q", "A")]);
    }

    #[test]
    fn format_quotes_every_field() {
        let card = Card::new("Say \"hi\"", "ok");
        assert_eq!(format_card(&card, '|'), r#""Say ""hi"""|"ok""#);
        assert_eq!(parse_cards(&format_card(&card, '\t')), vec![card]);
    }

    #[test]
    fn dedupe_against_existing_and_within_batch() {
        let cards = vec![
            Card::new("What is ATP?", "a"),
            Card::new("  what is atp? ", "b"),
            Card::new("Krebs cycle location?", "c"),
            Card::new("Known question", "d"),
        ];
        let kept = dedupe_cards(cards, &["KNOWN QUESTION"]);
        assert_eq!(
            kept.iter().map(|c| c.back.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
    }
}
