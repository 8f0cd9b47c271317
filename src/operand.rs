//! Operand explosion and resolution.
//!
//! Every operand token is first unescaped and *exploded*: a quoted string
//! becomes one byte-sized sub-operand per character (plus a terminating zero
//! unless the `_"` form suppresses it), anything else stays a single sub.
//! Resolution then classifies each sub into a [`TypeMask`], rewriting the sub
//! text in place as it goes — a matched symbol is replaced by its address in
//! hex, so the later immediate-emission step can re-parse the sub without
//! knowing where the value came from.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::catalog::{imm_size, lookup_register, TypeMask};
use crate::error::AsmError;
use crate::symtab::SymbolTable;

/// One decoded operand of the current instruction.
#[derive(Debug, Clone, Default)]
pub struct Operand {
    /// Operand text as written in the source.
    pub text: String,
    /// Exploded sub-operands; more than one only for string literals.
    pub subs: Vec<String>,
    /// Bracket displacement (`[rbp-8]` carries `Some(-8)`, `[rsp]` `Some(0)`).
    pub disp: Option<i64>,
    /// Resolved symbol index, if the operand named one.
    pub sym: Option<usize>,
    /// Operand is PC-relative (memory reference to a symbol, or forward ref).
    pub rel: bool,
    /// Relocation must be deferred until the symbol is defined.
    pub deferred: bool,
    /// Operand names an extended (r8–r15) register.
    pub extended: bool,
    /// Legacy operand-size prefix, set by the matcher's override retry.
    pub legacy: Option<u8>,
}

impl Operand {
    /// Unescape and explode a raw operand token.
    ///
    /// # Errors
    ///
    /// Fails on a malformed escape sequence inside the token.
    pub fn from_token(token: &str, line: usize) -> Result<Self, AsmError> {
        let raw = unescape(token, line)?;
        let mut subs = Vec::new();

        if raw.first() == Some(&b'"') {
            // String literal: one byte per character, NUL-terminated.
            for &b in inner_bytes(&raw, 1) {
                subs.push(format!("{:#04x}", b));
            }
            subs.push("0".to_string());
        } else if raw.starts_with(b"_\"") {
            // Raw string literal: no terminator.
            for &b in inner_bytes(&raw, 2) {
                subs.push(format!("{:#04x}", b));
            }
        } else {
            subs.push(String::from_utf8_lossy(&raw).into_owned());
        }

        Ok(Self {
            text: token.to_string(),
            subs,
            ..Self::default()
        })
    }

    /// Resolve one sub-operand into its type mask, updating the operand's
    /// displacement, symbol, and relocation state as side effects.
    ///
    /// A name that is neither a register, a symbol, nor a number resolves as
    /// a zero immediate flagged for a deferred relocation — it is assumed to
    /// be a forward reference, settled when the section closes.
    ///
    /// # Errors
    ///
    /// Fails when a numeric literal exceeds the 64-bit range.
    pub fn resolve(
        &mut self,
        sub: usize,
        table: &SymbolTable,
        line: usize,
    ) -> Result<TypeMask, AsmError> {
        let mut text = self.subs[sub].clone();
        let mut referenced = false;

        if text.len() > 2 && text.starts_with('[') && text.ends_with(']') {
            let inner = &text[1..text.len() - 1];
            referenced = true;
            self.disp = Some(0);

            if let Some(pos) = inner.find('+') {
                self.disp = Some(parse_imm(&inner[pos + 1..], line)?);
                text = inner[..pos].to_string();
            } else if let Some(pos) = inner.find('-') {
                self.disp = Some(parse_imm(&inner[pos + 1..], line)?.wrapping_neg());
                text = inner[..pos].to_string();
            } else {
                text = inner.to_string();
            }
        }

        if let Some(idx) = table.find(&text) {
            self.sym = Some(idx);
            if referenced {
                self.rel = true;
            }
            text = format!("{:#018x}", table.symbols[idx].addr);
        }

        self.subs[sub] = text.clone();

        if let Some(reg) = lookup_register(&text) {
            if reg.extended {
                self.extended = true;
            }
            return Ok(reg.mask);
        }

        let value = parse_imm(&text, line)?;
        let digits = text.strip_prefix("0x").unwrap_or(&text);
        if value == 0 && self.sym.is_none() && !digits.starts_with('0') {
            self.rel = true;
            self.deferred = true;
        }
        Ok(imm_size(value))
    }
}

/// Inner bytes of a quoted run, skipping `open` leading characters and the
/// closing quote.
fn inner_bytes(raw: &[u8], open: usize) -> &[u8] {
    raw.get(open..raw.len().saturating_sub(1)).unwrap_or(&[])
}

/// Parse a numeric literal: optional leading `-`, then a `0x` hex or decimal
/// digit run. Parsing stops at the first non-digit, and a digit-free text
/// yields zero — callers decide whether that means "forward reference".
///
/// # Errors
///
/// Fails when the accumulated magnitude exceeds the 64-bit range.
pub fn parse_imm(text: &str, line: usize) -> Result<i64, AsmError> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (radix, digits) = match body.strip_prefix("0x") {
        Some(rest) => (16u32, rest),
        None => (10u32, body),
    };

    let mut value: u128 = 0;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = value * u128::from(radix) + u128::from(d);
        if value > u128::from(u64::MAX) {
            return Err(AsmError::ImmediateOverflow {
                text: text.to_string(),
                line,
            });
        }
    }

    let magnitude = value as u64 as i64;
    Ok(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

/// Process C-style escape sequences in a token, yielding raw bytes.
fn unescape(token: &str, line: usize) -> Result<Vec<u8>, AsmError> {
    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&b) = bytes.get(i) else {
            return Err(AsmError::Syntax {
                msg: "null escape sequence".to_string(),
                line,
            });
        };
        match b {
            b'"' | b'\'' | b'\\' => {
                out.push(b);
                i += 1;
            }
            b'a' => {
                out.push(0x07);
                i += 1;
            }
            b'b' => {
                out.push(0x08);
                i += 1;
            }
            b'E' | b'e' => {
                out.push(0x1B);
                i += 1;
            }
            b'f' => {
                out.push(0x0C);
                i += 1;
            }
            b'n' => {
                out.push(b'\n');
                i += 1;
            }
            b'r' => {
                out.push(b'\r');
                i += 1;
            }
            b't' => {
                out.push(b'\t');
                i += 1;
            }
            b'v' => {
                out.push(0x0B);
                i += 1;
            }
            b'0'..=b'7' => {
                // Octal run, up to four digits, clamped to a byte.
                let mut q: u32 = 0;
                let mut m = 4;
                while m > 0 {
                    let Some(d) = bytes.get(i).and_then(|&c| char::from(c).to_digit(8)) else {
                        break;
                    };
                    q = q * 8 + d;
                    i += 1;
                    m -= 1;
                }
                out.push(q.min(255) as u8);
            }
            b'x' if bytes.get(i + 1).map_or(false, u8::is_ascii_hexdigit) => {
                i += 1;
                let mut q: u32 = 0;
                let mut m = 2;
                while m > 0 {
                    let Some(d) = bytes.get(i).and_then(|&c| char::from(c).to_digit(16)) else {
                        break;
                    };
                    q = q * 16 + d;
                    i += 1;
                    m -= 1;
                }
                out.push(q as u8);
            }
            _ => {
                return Err(AsmError::InvalidEscape {
                    escape: char::from(b),
                    line,
                });
            }
        }
    }

    Ok(out)
}
