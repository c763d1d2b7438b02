//! VL-006: Statement tokenizer.
//!
//! Splits merged template text into literal text and bracketed statements. A
//! statement opens with `{` directly followed by a quote, `!`, `/`, or an ASCII
//! alphanumeric character, and closes at the next `}`. Anything else, such as
//! `{ color: red }` in inline CSS, stays literal.

/// A piece of template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Statement(RawStatement<'a>),
}

/// A bracketed statement as it appears in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement<'a> {
    /// Exact source text, braces included
    pub source: &'a str,
    /// Whitespace-separated tokens of the trimmed inner text
    pub tokens: Vec<&'a str>,
}

impl RawStatement<'_> {
    /// Lowercased first token.
    pub fn keyword(&self) -> String {
        self.tokens.first().map(|t| t.to_lowercase()).unwrap_or_default()
    }
}

fn opens_statement(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'"' | b'\'' | b'!' | b'/')
}

/// Split text into segments. Adjacent literal text is kept in one segment.
pub fn tokenize(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(found) = text[pos..].find('{') {
        let open = pos + found;
        let starts = bytes.get(open + 1).copied().is_some_and(opens_statement);
        let close = if starts {
            text[open + 2..].find('}').map(|c| open + 2 + c)
        } else {
            None
        };

        match close {
            Some(close) => {
                if literal_start < open {
                    segments.push(Segment::Text(&text[literal_start..open]));
                }
                let source = &text[open..=close];
                let tokens = text[open + 1..close].split_whitespace().collect();
                segments.push(Segment::Statement(RawStatement { source, tokens }));
                pos = close + 1;
                literal_start = pos;
            }
            None => pos = open + 1,
        }
    }

    if literal_start < text.len() {
        segments.push(Segment::Text(&text[literal_start..]));
    }
    segments
}
