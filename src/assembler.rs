//! The single-pass driver.
//!
//! Tokens stream through a small state machine: labels and `extern`
//! declarations are consumed on the spot, a `section` keyword closes the open
//! section and the following token opens the next one, and everything else
//! accumulates into the current instruction, which is resolved, matched, and
//! encoded the moment its line ends. There is no separate fixup pass —
//! forward references become deferred relocations, settled when the section
//! closes.
//!
//! Assembly starts inside an implicit `.text` section so a bare instruction
//! stream is a valid program; the implicit section is dropped again if a
//! `section` directive appears before any byte was emitted.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Write as _;
use core::mem;

use crate::catalog::{TypeMask, EMPTY};
use crate::elf;
use crate::encoder::{encode, match_op};
use crate::error::AsmError;
use crate::lexer::TokenStream;
use crate::operand::Operand;
use crate::symtab::{Reloc, Section, Symbol, SymbolKind, SymbolTable};

/// Single-pass assembler: feed it source, read back machine code, symbols,
/// relocations, a listing, and a relocatable object.
#[derive(Debug)]
pub struct Assembler {
    out: Vec<u8>,
    table: SymbolTable,
    listing: String,

    section: Option<String>,
    section_start: usize,
    implicit: bool,

    pending_extern: bool,
    mnemonic: Option<String>,
    ops: Vec<Operand>,

    last_out: usize,
    last_sym: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// A fresh assembler, positioned at the start of the implicit `.text`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            table: SymbolTable::default(),
            listing: String::new(),
            section: Some(".text".to_string()),
            section_start: 0,
            implicit: true,
            pending_extern: false,
            mnemonic: None,
            ops: Vec::new(),
            last_out: 0,
            last_sym: 0,
        }
    }

    /// Run the pass over `source`.
    ///
    /// The first error aborts assembly; the listing built so far stays
    /// available through [`Assembler::listing`].
    ///
    /// # Errors
    ///
    /// Any [`AsmError`] raised by lexing, resolution, matching, encoding, or
    /// section bookkeeping.
    pub fn assemble(&mut self, source: &str) -> Result<(), AsmError> {
        let mut stream = TokenStream::new(source);
        let mut loc: Option<usize> = None;
        let mut text = String::new();
        let mut written = 0usize;

        while let Some(token) = stream.advance() {
            // Lines without tokens still get their index in the listing.
            let new_loc = stream.loc();
            for i in loc.map_or(0, |l| l + 1)..new_loc {
                let _ = writeln!(self.listing, "{i}");
            }
            loc = Some(new_loc);

            let last_on_line = stream.peek().is_none();
            let visible = self.advance_state(&token, last_on_line, new_loc)?;

            if visible {
                match written {
                    0 => text.push_str(&token),
                    1 => {
                        text.push(' ');
                        text.push_str(&token);
                    }
                    _ => {
                        text.push_str(", ");
                        text.push_str(&token);
                    }
                }
                written += 1;
            }

            if last_on_line {
                self.flush_line(new_loc, &text);
                text.clear();
                written = 0;
            }
        }

        self.finish()?;

        for i in loc.map_or(0, |l| l + 1)..stream.line_count() {
            let _ = writeln!(self.listing, "{i}");
        }

        Ok(())
    }

    /// Step the state machine with one token. Returns whether the token
    /// should appear in the listing's source column.
    fn advance_state(
        &mut self,
        token: &str,
        last_on_line: bool,
        line: usize,
    ) -> Result<bool, AsmError> {
        if self.consume_label(token) || self.consume_extern(token) {
            return Ok(false);
        }

        if token == "section" {
            self.close_current()?;
            return Ok(false);
        }

        if self.section.is_none() {
            // Refuse at open time, before any byte lands in the new section.
            if self.table.section_closed(token) {
                return Err(AsmError::SectionReclosed {
                    name: token.to_string(),
                });
            }
            self.section = Some(token.to_string());
            self.section_start = self.out.len();
            self.implicit = false;
            return Ok(false);
        }

        if self.mnemonic.is_none() {
            self.mnemonic = Some(token.to_string());
        } else {
            self.ops.push(Operand::from_token(token, line)?);
        }

        if last_on_line {
            self.finish_instr(line)?;
        }

        Ok(true)
    }

    /// Consume `name:` and `name::` tokens, pinning the label to the current
    /// output position.
    fn consume_label(&mut self, token: &str) -> bool {
        if token.len() < 2 || !token.ends_with(':') {
            return false;
        }

        let (name, kind) = match token.strip_suffix("::") {
            Some(name) if !name.is_empty() => (name, SymbolKind::Global),
            _ => (&token[..token.len() - 1], SymbolKind::Local),
        };

        let addr = (self.out.len() - self.section_start) as u64;
        self.table.define_label(name.to_string(), kind, addr);
        true
    }

    fn consume_extern(&mut self, token: &str) -> bool {
        if self.pending_extern {
            self.table.declare_extern(token.to_string());
            self.pending_extern = false;
            return true;
        }
        if token == "extern" {
            self.pending_extern = true;
            return true;
        }
        false
    }

    /// Resolve, match, and encode the accumulated instruction.
    fn finish_instr(&mut self, line: usize) -> Result<(), AsmError> {
        let Some(mnemonic) = self.mnemonic.take() else {
            return Ok(());
        };
        let mut ops = mem::take(&mut self.ops);

        let mut masks: Vec<TypeMask> = Vec::with_capacity(ops.len());
        for op in &mut ops {
            let mut mask = EMPTY;
            for j in 0..op.subs.len() {
                mask = op.resolve(j, &self.table, line)?;
            }
            masks.push(mask);
        }

        let spec = match_op(&mnemonic, &mut ops, &masks, line)?;
        encode(
            spec,
            &mut ops,
            &mut self.out,
            &mut self.table,
            self.section_start,
            line,
        )
    }

    /// Close the open section. An implicit `.text` nothing was emitted into
    /// is dropped without being registered.
    fn close_current(&mut self) -> Result<(), AsmError> {
        let Some(name) = self.section.take() else {
            return Ok(());
        };
        if !(self.implicit && self.out.len() == self.section_start) {
            self.table
                .close_section(&name, self.section_start, self.out.len())?;
        }
        self.implicit = false;
        Ok(())
    }

    /// Finalize the pass: register the last open section, unless it is the
    /// untouched implicit `.text` and nothing is waiting on it.
    fn finish(&mut self) -> Result<(), AsmError> {
        let Some(name) = self.section.take() else {
            return Ok(());
        };
        let pending = self
            .table
            .symbols
            .iter()
            .any(|s| s.kind != SymbolKind::Extern && s.section.is_none());
        if self.implicit
            && self.out.len() == self.section_start
            && !pending
            && self.table.deferred.is_empty()
        {
            return Ok(());
        }
        self.table
            .close_section(&name, self.section_start, self.out.len())
    }

    /// Append one finished listing line: index, new labels, emitted hex,
    /// reconstructed source.
    fn flush_line(&mut self, loc: usize, text: &str) {
        let mut hex = String::new();
        for (n, i) in (self.last_out..self.out.len()).enumerate() {
            if n > 9 {
                hex.push_str("...");
                break;
            }
            let _ = write!(hex, "{:02X} ", self.out[i]);
        }
        self.last_out = self.out.len();

        let mut labels = String::new();
        for sym in &self.table.symbols[self.last_sym..] {
            match sym.kind {
                SymbolKind::Global => {
                    let _ = write!(labels, "{}:: ", sym.name);
                }
                SymbolKind::Local => {
                    let _ = write!(labels, "{}: ", sym.name);
                }
                SymbolKind::Extern => {
                    let _ = write!(labels, "{} ", sym.name);
                }
            }
        }
        self.last_sym = self.table.symbols.len();

        let _ = writeln!(self.listing, "{loc:<6}{labels:<22}{hex:<38}{text:<20}");
    }

    // ─── Accessors ───

    /// The annotated listing produced so far.
    #[must_use]
    pub fn listing(&self) -> &str {
        &self.listing
    }

    /// The raw output buffer, all sections concatenated in emission order.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.out
    }

    /// All closed sections.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.table.sections
    }

    /// All symbols, in definition order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.table.symbols
    }

    /// All resolved relocations.
    #[must_use]
    pub fn relocations(&self) -> &[Reloc] {
        &self.table.relocs
    }

    /// The bytes of one closed section, by name.
    #[must_use]
    pub fn section_bytes(&self, name: &str) -> Option<&[u8]> {
        let sec = self.table.sections.iter().find(|s| s.name == name)?;
        self.out.get(sec.start..sec.start + sec.size)
    }

    /// Serialize the assembled program as a relocatable ELF64 object.
    ///
    /// # Errors
    ///
    /// Fails when a symbol was defined in a section the object format cannot
    /// place.
    pub fn object(&self) -> Result<Vec<u8>, AsmError> {
        elf::serialize(&self.table, &self.out)
    }
}
