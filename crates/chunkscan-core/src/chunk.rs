//! Sentence-aligned text chunker.
//!
//! Turns extracted page text into [`TextChunk`]s no longer than a
//! configurable number of characters. Text is normalized first (bullet
//! markers, hard line breaks, ellipsis runs, repeated whitespace), then
//! split into sentences which are packed greedily into chunks.
//!
//! Chunks never span pages, so every chunk carries the page it came from.
//! Lengths are measured in Unicode scalar values, not bytes.

use crate::models::{PageText, TextChunk};

/// Default maximum chunk length in characters.
pub const DEFAULT_MAX_CHARS: usize = 500;

/// Words whose trailing period does not end a sentence (compared lowercase).
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "nr", "dhr",
    "mevr", "ir", "ing", "drs", "bijv", "o.a", "m.b.t", "t.a.v",
];

const BULLETS: &[char] = &[
    '•', '·', '▪', '◦', '‣', '●', '○', '■', '□', '➢', '✓', '-', '–', '—', '*', '>',
];

/// Splits page text into bounded, sentence-aligned chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl Chunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Chunk every page in order. Empty pages produce no chunks.
    pub fn chunk_pages(&self, pages: &[PageText]) -> Vec<TextChunk> {
        pages
            .iter()
            .flat_map(|p| self.chunk_page(p.page, &p.text))
            .collect()
    }

    pub fn chunk_page(&self, page: u32, raw: &str) -> Vec<TextChunk> {
        self.chunk_text(raw)
            .into_iter()
            .map(|text| TextChunk { page, text })
            .collect()
    }

    /// Normalize `raw` and pack its sentences into chunks.
    pub fn chunk_text(&self, raw: &str) -> Vec<String> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Vec::new();
        }
        pack(split_sentences(&normalized), self.max_chars)
    }
}

/// Clean extracted text: strip per-line bullet/numbering markers, join
/// lines with spaces, replace runs of 3+ periods with a space, collapse
/// whitespace, and trim.
pub fn normalize(raw: &str) -> String {
    let joined = raw.lines().map(strip_marker).collect::<Vec<_>>().join(" ");
    collapse_ellipses(&joined)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    match strip_bullet(trimmed).or_else(|| strip_numbering(trimmed)) {
        Some(rest) => rest.trim_start(),
        None => trimmed,
    }
}

fn strip_bullet(s: &str) -> Option<&str> {
    let mut chars = s.chars();
    let first = chars.next()?;
    let rest = chars.as_str();
    if BULLETS.contains(&first) && rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Strips `1.`, `1)`, `1.2.`, `1.2)`, `(1)`, `a)`, `(a)` when followed by
/// whitespace. A bare `1.2` counts only before a capitalized word.
fn strip_numbering(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let count_digits = |from: usize| {
        bytes[from.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let close = if bytes.first() == Some(&b'(') {
        Some(b')')
    } else {
        None
    };
    let mut i = usize::from(close.is_some());

    let digits = count_digits(i);
    if (1..=3).contains(&digits) {
        i += digits;
        let mut levels = 1;
        while bytes.get(i) == Some(&b'.') && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
            let d = count_digits(i + 1);
            if d > 3 {
                return None;
            }
            i += 1 + d;
            levels += 1;
        }
        match close {
            Some(c) => {
                if bytes.get(i) != Some(&c) {
                    return None;
                }
                i += 1;
            }
            None => {
                if matches!(bytes.get(i), Some(b'.') | Some(b')')) {
                    i += 1;
                } else if levels == 1 || !starts_capitalized_word(&s[i..]) {
                    // a bare `2.5` is a quantity unless a heading follows
                    return None;
                }
            }
        }
    } else if digits == 0 && bytes.get(i).is_some_and(u8::is_ascii_lowercase) {
        i += 1;
        if bytes.get(i) != Some(&close.unwrap_or(b')')) {
            return None;
        }
        i += 1;
    } else {
        return None;
    }

    let rest = &s[i..];
    rest.starts_with(char::is_whitespace).then_some(rest)
}

fn starts_capitalized_word(s: &str) -> bool {
    s.starts_with(char::is_whitespace)
        && s.trim_start().chars().next().is_some_and(char::is_uppercase)
}

fn collapse_ellipses(s: &str) -> String {
    fn flush(out: &mut String, run: usize) {
        if run >= 3 {
            out.push(' ');
        } else {
            out.extend(std::iter::repeat('.').take(run));
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut run = 0;
    for ch in s.chars() {
        if ch == '.' {
            run += 1;
            continue;
        }
        flush(&mut out, run);
        run = 0;
        out.push(if ch == '…' { ' ' } else { ch });
    }
    flush(&mut out, run);
    out
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | '”' | '’' | '»' | ')' | ']')
}

/// True when the last word of `prefix` is a known abbreviation or a
/// single-letter initial, i.e. a following `.` is not a sentence end.
fn ends_with_abbreviation(prefix: &str) -> bool {
    let word = prefix
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| !c.is_alphanumeric());
    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (None, _) => false,
        (Some(c), None) => c.is_uppercase(),
        _ => ABBREVIATIONS.contains(&word.to_lowercase().as_str()),
    }
}

/// Split normalized text into sentences.
///
/// A sentence ends at a run of `.`, `!` or `?`, plus any closing quotes or
/// brackets, when followed by whitespace, a closing quote, or the end of
/// the text. A single `.` after an abbreviation or initial is skipped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];
        if !is_terminal(ch) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && is_terminal(chars[j].1) {
            j += 1;
        }
        let run_end = j;
        while j < chars.len() && is_closing(chars[j].1) {
            j += 1;
        }

        let at_boundary = j == chars.len() || j > run_end || chars[j].1.is_whitespace();
        let abbreviation = ch == '.' && j == i + 1 && ends_with_abbreviation(&text[start..pos]);

        if at_boundary && !abbreviation {
            let end = chars.get(j).map_or(text.len(), |(b, _)| *b);
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
        i = j;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Greedily join sentences with single spaces while the chunk stays within
/// `max` characters.
fn pack(sentences: Vec<&str>, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0;

    for sentence in sentences {
        for piece in split_oversized(sentence, max) {
            let piece_len = piece.chars().count();
            let would_be = if buf.is_empty() {
                piece_len
            } else {
                buf_len + 1 + piece_len
            };

            if would_be > max && !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            if !buf.is_empty() {
                buf.push(' ');
                buf_len += 1;
            }
            buf.push_str(piece);
            buf_len += piece_len;
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

/// Split a sentence longer than `max` characters into pieces that fit.
///
/// Beyond twice the limit the text is halved at the whitespace nearest the
/// midpoint; otherwise it is cut at the last whitespace or punctuation at
/// or before the limit (or exactly at the limit if there is none). Both
/// sides recurse until every piece fits.
fn split_oversized(text: &str, max: usize) -> Vec<&str> {
    let text = text.trim();
    let len = text.chars().count();
    if len == 0 {
        return Vec::new();
    }
    if len <= max {
        return vec![text];
    }

    let cut = if len > 2 * max {
        let mid = byte_offset(text, len / 2);
        nearest_whitespace(text, mid).unwrap_or(mid)
    } else {
        let limit = byte_offset(text, max);
        last_boundary(text, limit).unwrap_or(limit)
    };

    let (left, right) = text.split_at(cut);
    let mut pieces = split_oversized(left, max);
    pieces.extend(split_oversized(right, max));
    pieces
}

fn byte_offset(text: &str, n_chars: usize) -> usize {
    text.char_indices()
        .nth(n_chars)
        .map_or(text.len(), |(i, _)| i)
}

fn nearest_whitespace(text: &str, mid: usize) -> Option<usize> {
    text.char_indices()
        .filter(|(i, c)| *i > 0 && c.is_whitespace())
        .min_by_key(|(i, _)| i.abs_diff(mid))
        .map(|(i, _)| i)
}

/// Byte index to cut at: before whitespace at or before `limit`, or just
/// after punctuation strictly before it.
fn last_boundary(text: &str, limit: usize) -> Option<usize> {
    text.char_indices()
        .take_while(|(i, _)| *i <= limit)
        .filter_map(|(i, c)| {
            if c.is_whitespace() && i > 0 {
                Some(i)
            } else if i < limit && (c.is_ascii_punctuation() || matches!(c, '–' | '—' | '…')) {
                Some(i + c.len_utf8()).filter(|cut| *cut < text.len())
            } else {
                None
            }
        })
        .last()
}
