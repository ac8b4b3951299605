//! Reply splitting: one assistant reply becomes several chat messages.
//!
//! Paragraphs (separated by two or more line breaks) are sent as separate
//! messages, and citation markers like `【4:0†source】 ` are stripped.

use regex::Regex;
use std::sync::OnceLock;

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"(?:\r?\n){2,}").expect("valid separator pattern"))
}

fn citation() -> &'static Regex {
    static CITATION: OnceLock<Regex> = OnceLock::new();
    CITATION.get_or_init(|| Regex::new(r"【[^【】]*】 ").expect("valid citation pattern"))
}

/// Split `reply` into cleaned, non-empty chunks.
pub fn split_reply(reply: &str) -> Chunks<'_> {
    Chunks {
        reply,
        pos: 0,
        finished: false,
    }
}

/// Lazy iterator over the chunks of one reply. Clone it to start over.
#[derive(Clone, Debug)]
pub struct Chunks<'a> {
    reply: &'a str,
    pos: usize,
    finished: bool,
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while !self.finished {
            let start = self.pos;
            let segment = match separator().find_at(self.reply, start) {
                Some(m) => {
                    self.pos = m.end();
                    &self.reply[start..m.start()]
                }
                None => {
                    self.finished = true;
                    &self.reply[start..]
                }
            };

            let cleaned = clean_segment(segment);
            if !cleaned.is_empty() {
                return Some(cleaned);
            }
        }
        None
    }
}

fn clean_segment(segment: &str) -> String {
    citation().replace_all(segment.trim(), "").trim().to_string()
}

/// Break `chunk` into pieces of at most `limit` characters, preferring the
/// last whitespace before the limit.
pub fn fit_to_limit(chunk: &str, limit: usize) -> Vec<String> {
    if limit == 0 || chunk.chars().count() <= limit {
        return vec![chunk.to_string()];
    }

    let mut pieces = Vec::new();
    let mut rest = chunk;
    while rest.chars().count() > limit {
        let hard = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = rest[..hard]
            .rfind(char::is_whitespace)
            .filter(|&i| i > 0)
            .unwrap_or(hard);

        let (head, tail) = rest.split_at(cut);
        let head = head.trim_end();
        if !head.is_empty() {
            pieces.push(head.to_string());
        }
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}
