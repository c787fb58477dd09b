//! Manual highlighting for documents the engine returned no snippet for.
//!
//! Output is HTML-escaped text with every occurrence wrapped in the same
//! `<b>`/`</b>` markers the engine's snippets use. Matching runs on the raw
//! text, so a keyword can never match inside an entity like `&amp;`.

use regex::{Regex, RegexBuilder};

pub const HIGHLIGHT_START: &str = "<b>";
pub const HIGHLIGHT_END: &str = "</b>";

#[derive(Debug, Clone)]
pub struct Highlighter {
    pattern: Regex,
}

impl Highlighter {
    /// Case-insensitive matcher for any of `words`, longest first. `None`
    /// when there is nothing to match.
    pub fn new<S: AsRef<str>>(words: &[S]) -> Option<Self> {
        let mut words: Vec<&str> = words.iter().map(|w| w.as_ref().trim()).filter(|w| !w.is_empty()).collect();
        if words.is_empty() {
            return None;
        }
        words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
        let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
        match RegexBuilder::new(&alternation).case_insensitive(true).build() {
            Ok(pattern) => Some(Self { pattern }),
            Err(e) => {
                tracing::warn!(error = %e, "keyword too large to highlight");
                None
            }
        }
    }

    /// Escapes `text` and marks every occurrence. Returns the marked text and
    /// the number of occurrences.
    pub fn highlight_all(&self, text: &str) -> (String, usize) {
        let mut out = String::with_capacity(text.len() + 16);
        let mut last = 0;
        let mut count = 0;
        for m in self.pattern.find_iter(text) {
            out.push_str(&htmlescape::encode_minimal(&text[last..m.start()]));
            out.push_str(HIGHLIGHT_START);
            out.push_str(&htmlescape::encode_minimal(m.as_str()));
            out.push_str(HIGHLIGHT_END);
            last = m.end();
            count += 1;
        }
        out.push_str(&htmlescape::encode_minimal(&text[last..]));
        (out, count)
    }

    /// About `max_chars` characters of `text` around the first occurrence,
    /// escaped and marked. `None` if the keyword does not occur.
    pub fn snippet(&self, text: &str, max_chars: usize) -> Option<String> {
        let first = self.pattern.find(text)?;
        let match_chars = first.as_str().chars().count();
        let lead = max_chars.saturating_sub(match_chars) / 2;

        let before: Vec<usize> = text[..first.start()].char_indices().map(|(i, _)| i).collect();
        // `lead == 0` leaves no room before the match, so the snippet opens on it.
        let start = match before.len().checked_sub(lead) {
            Some(i) => before.get(i).copied().unwrap_or(first.start()),
            None => 0,
        };
        let budget = max_chars.max(match_chars);
        let end = text[start..].char_indices().nth(budget).map_or(text.len(), |(i, _)| start + i).max(first.end());

        let (marked, _) = self.highlight_all(&text[start..end]);
        Some(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_every_case_insensitive_occurrence() {
        let h = Highlighter::new(&["fox"]).unwrap();
        let (out, n) = h.highlight_all("Fox & fox <FOX>");
        assert_eq!(n, 3);
        assert_eq!(out, "<b>Fox</b> &amp; <b>fox</b> &lt;<b>FOX</b>&gt;");
    }

    #[test]
    fn escaped_keyword_does_not_match_inside_entities() {
        let h = Highlighter::new(&["amp"]).unwrap();
        let (out, n) = h.highlight_all("a & b");
        assert_eq!(n, 0);
        assert_eq!(out, "a &amp; b");
        let h = Highlighter::new(&["a&b"]).unwrap();
        assert_eq!(h.highlight_all("x A&B y").0, "x <b>A&amp;B</b> y");
    }

    #[test]
    fn snippet_is_cropped_around_first_match() {
        let text = format!("{}needle{}", "a".repeat(100), "b".repeat(100));
        let h = Highlighter::new(&["needle"]).unwrap();
        let snippet = h.snippet(&text, 20).unwrap();
        assert_eq!(snippet, format!("{}<b>needle</b>{}", "a".repeat(7), "b".repeat(7)));
        assert!(h.snippet("no match here", 20).is_none());
    }

    #[test]
    fn budget_smaller_than_keyword_yields_the_match_alone() {
        let h = Highlighter::new(&["needle"]).unwrap();
        let text = "some hay before needle after";
        for budget in [0, 1, 6] {
            assert_eq!(h.snippet(text, budget).unwrap(), "<b>needle</b>", "budget {budget}");
        }
        assert_eq!(h.snippet(text, 7).unwrap(), "<b>needle</b> ");
        assert_eq!(h.snippet(text, 8).unwrap(), " <b>needle</b> ");

        let long = "k".repeat(200);
        let h = Highlighter::new(&[long.as_str()]).unwrap();
        let text = format!("prefix {long} suffix");
        assert_eq!(h.snippet(&text, 150).unwrap(), format!("<b>{long}</b>"));
    }

    #[test]
    fn snippet_keeps_multibyte_boundaries() {
        let h = Highlighter::new(&["ü"]).unwrap();
        assert_eq!(h.snippet("ääääüöööö", 3).unwrap(), "ä<b>ü</b>ö");
    }

    #[test]
    fn blank_words_yield_no_highlighter() {
        assert!(Highlighter::new(&["  ", ""]).is_none());
    }
}
