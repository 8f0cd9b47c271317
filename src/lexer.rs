//! Line-oriented token stream.
//!
//! The assembler consumes plain-string tokens one at a time, with a one-token
//! peek that never crosses a line boundary — the driver uses a `None` peek to
//! detect the end of a logical instruction. Comments (`#` to end of line) are
//! stripped and tokens are split on spaces, tabs, and commas.
//!
//! One piece of look-ahead lives here: after a `db` token, a quoted run
//! (optionally `_`-prefixed) is consumed as a single token, quotes included,
//! so string literals may contain spaces and commas.

use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;

/// A stream of tokens over assembly source text, grouped by source line.
#[derive(Debug)]
pub struct TokenStream {
    lines: Vec<Vec<String>>,
    line: usize,
    tok: usize,
}

impl TokenStream {
    /// Tokenize the whole source up front.
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            lines: source.lines().map(tokenize_line).collect(),
            line: 0,
            tok: 0,
        }
    }

    /// Consume and return the next token, crossing line boundaries as needed.
    pub fn advance(&mut self) -> Option<String> {
        while self.line < self.lines.len() {
            if let Some(t) = self.lines[self.line].get(self.tok) {
                self.tok += 1;
                return Some(t.clone());
            }
            self.line += 1;
            self.tok = 0;
        }
        None
    }

    /// Peek at the next token on the *current* line, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&str> {
        self.lines
            .get(self.line)
            .and_then(|l| l.get(self.tok))
            .map(String::as_str)
    }

    /// 0-based index of the line the last advanced token came from.
    #[must_use]
    pub fn loc(&self) -> usize {
        self.line
    }

    /// Total number of source lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

fn is_sep(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b','
}

fn tokenize_line(line: &str) -> Vec<String> {
    let code = match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    };
    let bytes = code.as_bytes();
    let mut toks: Vec<String> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && is_sep(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        // String-literal look-ahead after `db`: the quoted run is one token.
        if toks.last().map(String::as_str) == Some("db")
            && (bytes[i] == b'"' || (bytes[i] == b'_' && bytes.get(i + 1) == Some(&b'"')))
        {
            let start = i;
            let open = if bytes[i] == b'_' { i + 2 } else { i + 1 };
            if let Some(close) = code.get(open..).and_then(|rest| rest.find('"')) {
                let end = open + close + 1;
                toks.push(code[start..end].to_string());
                i = end;
                continue;
            }
        }

        let start = i;
        while i < bytes.len() && !is_sep(bytes[i]) {
            i += 1;
        }
        toks.push(code[start..i].to_string());
    }

    toks
}
