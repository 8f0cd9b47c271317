//! Symbols, sections, and relocation bookkeeping.
//!
//! All collections grow append-only during the single pass. Cross-references
//! are integer indices into the owning vectors (never pointers), so the data
//! survives reallocation and hands the object emitter a stable view.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::AsmError;

/// Classification of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SymbolKind {
    /// `name:` — local label.
    Local,
    /// `name::` — global label.
    Global,
    /// `extern name` — defined in another object.
    Extern,
}

/// A defined or declared symbol.
///
/// `addr` is fixed at the moment the label token is consumed, as the byte
/// offset from the opening of the current section. `section` stays `None`
/// until the enclosing section closes; extern symbols never receive one.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbol {
    /// Symbol classification.
    pub kind: SymbolKind,
    /// Symbol name, without the trailing colon(s).
    pub name: String,
    /// Index into the section list, stamped at section close.
    pub section: Option<usize>,
    /// Section-relative address at the definition point.
    pub addr: u64,
    /// Symbol size in bytes (the object format wants a nonzero value).
    pub size: u64,
}

/// How a relocation patches its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelocKind {
    /// Absolute 64-bit address (`R_X86_64_64`).
    Absolute,
    /// 32-bit PC-relative (`R_X86_64_PC32`).
    Relative,
}

/// A relocation against a known symbol.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reloc {
    /// Patch kind.
    pub kind: RelocKind,
    /// Index into the symbol list.
    pub sym: usize,
    /// Patch offset, relative to the start of the enclosing section.
    pub addr: u64,
    /// Constant addend (a pending bracket displacement).
    pub addend: i64,
}

/// A relocation whose target was not yet a known symbol at encode time.
/// Resolved by name lookup when the enclosing section closes.
#[derive(Debug, Clone)]
pub struct DeferredReloc {
    /// Patch kind.
    pub kind: RelocKind,
    /// Referenced symbol name.
    pub name: String,
    /// Patch offset, relative to the start of the enclosing section.
    pub addr: u64,
    /// Constant addend.
    pub addend: i64,
}

/// A closed, contiguous region of the output buffer.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Section {
    /// Section name as written in the source (e.g. `.text`).
    pub name: String,
    /// Start offset in the output buffer.
    pub start: usize,
    /// Size in bytes.
    pub size: usize,
}

/// The accumulated symbol, section, and relocation state of one pass.
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// All symbols, in definition order.
    pub symbols: Vec<Symbol>,
    /// All closed sections, in close order.
    pub sections: Vec<Section>,
    /// All concrete relocations.
    pub relocs: Vec<Reloc>,
    /// Relocations awaiting a forward-declared symbol.
    pub deferred: Vec<DeferredReloc>,
}

impl SymbolTable {
    /// Find a symbol by exact name. Linear, first match wins.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    /// Whether a section of this name (case-insensitive) was already closed.
    #[must_use]
    pub fn section_closed(&self, name: &str) -> bool {
        self.sections
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Define a label at the given section-relative offset.
    pub fn define_label(&mut self, name: String, kind: SymbolKind, addr: u64) {
        self.symbols.push(Symbol {
            kind,
            name,
            section: None,
            addr,
            size: 1,
        });
    }

    /// Declare an extern symbol (no address, never a section).
    pub fn declare_extern(&mut self, name: String) {
        self.symbols.push(Symbol {
            kind: SymbolKind::Extern,
            name,
            section: None,
            addr: 0,
            size: 1,
        });
    }

    /// Close a section spanning `start..end` of the output buffer.
    ///
    /// Stamps every label still waiting for a section with this section's
    /// index, and drains the deferred-relocation list, resolving each entry
    /// by name exactly once.
    ///
    /// # Errors
    ///
    /// [`AsmError::SectionReclosed`] if the name was closed before;
    /// [`AsmError::UndefinedSymbol`] if a deferred relocation names a symbol
    /// that was never defined.
    pub fn close_section(&mut self, name: &str, start: usize, end: usize) -> Result<(), AsmError> {
        if self.section_closed(name) {
            return Err(AsmError::SectionReclosed { name: name.into() });
        }

        self.sections.push(Section {
            name: name.into(),
            start,
            size: end - start,
        });
        let index = self.sections.len() - 1;

        for sym in &mut self.symbols {
            if sym.kind != SymbolKind::Extern && sym.section.is_none() {
                sym.section = Some(index);
            }
        }

        for def in core::mem::take(&mut self.deferred) {
            let sym = self
                .find(&def.name)
                .ok_or(AsmError::UndefinedSymbol { name: def.name })?;
            self.relocs.push(Reloc {
                kind: def.kind,
                sym,
                addr: def.addr,
                addend: def.addend,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn close_stamps_pending_labels_but_not_externs() {
        let mut tab = SymbolTable::default();
        tab.define_label("a".into(), SymbolKind::Local, 0);
        tab.declare_extern("e".into());
        tab.close_section(".text", 0, 4).unwrap();
        assert_eq!(tab.symbols[0].section, Some(0));
        assert_eq!(tab.symbols[1].section, None);
        assert_eq!(tab.sections[0].size, 4);
    }

    #[test]
    fn reclosing_a_section_fails() {
        let mut tab = SymbolTable::default();
        tab.close_section(".text", 0, 0).unwrap();
        let err = tab.close_section(".TEXT", 0, 0).unwrap_err();
        assert!(matches!(err, AsmError::SectionReclosed { .. }));
    }

    #[test]
    fn deferred_relocations_drain_exactly_once() {
        let mut tab = SymbolTable::default();
        tab.deferred.push(DeferredReloc {
            kind: RelocKind::Relative,
            name: "target".to_string(),
            addr: 2,
            addend: 0,
        });
        tab.define_label("target".into(), SymbolKind::Local, 8);
        tab.close_section(".text", 0, 16).unwrap();
        assert_eq!(tab.relocs.len(), 1);
        assert_eq!(tab.relocs[0].sym, 0);
        assert!(tab.deferred.is_empty());

        // A second close must not re-resolve anything.
        tab.close_section(".data", 16, 16).unwrap();
        assert_eq!(tab.relocs.len(), 1);
    }

    #[test]
    fn deferred_relocation_without_definition_fails() {
        let mut tab = SymbolTable::default();
        tab.deferred.push(DeferredReloc {
            kind: RelocKind::Relative,
            name: "ghost".to_string(),
            addr: 0,
            addend: 0,
        });
        let err = tab.close_section(".text", 0, 8).unwrap_err();
        assert!(matches!(err, AsmError::UndefinedSymbol { .. }));
    }
}
