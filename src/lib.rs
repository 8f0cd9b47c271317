//! # relasm — Single-Pass x86-64 Assembler
//!
//! `relasm` turns Intel-flavored assembly text into relocatable ELF64
//! objects in one pass over the source: no AST, no fixup pass, no second
//! scan. Instructions are encoded the moment their line ends, forward
//! references become relocations settled when the enclosing section closes,
//! and an annotated listing is built alongside the machine code.
//!
//! ## Quick Start
//!
//! ```rust
//! use relasm::Assembler;
//!
//! let mut asm = Assembler::new();
//! asm.assemble("mov rdi, 0\nmov rax, 60\nsyscall").unwrap();
//! assert_eq!(&asm.output()[..3], &[0x48, 0xC7, 0xC7]);
//! assert_eq!(asm.sections()[0].name, ".text");
//! ```
//!
//! ## Features
//!
//! - **Pure Rust** — no C/C++ FFI, no system assembler, no binutils.
//! - **Single pass** — source streams straight into bytes and relocations.
//! - **Relocatable ELF64** — `ET_REL` objects ready for `ld` or `gcc`.
//! - **Annotated listings** — per-line labels, hex dump, and source echo.
//! - **`no_std` + `alloc`** — the `std` feature only adds `std::error::Error`
//!   and the command-line binary.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// An assembler intentionally performs many narrowing / sign-changing casts
// between integer widths (i64→u8, usize→i64, etc.) and uses dense hex
// literals without separators (0xB8, 0x0F05).  The lints below are expected
// and acceptable in this context.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::bool_to_int_with_if,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::map_unwrap_or,
    clippy::many_single_char_names,
    clippy::redundant_else,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::needless_continue
)]

extern crate alloc;

/// The single-pass driver: section lifecycle, labels, listing.
pub mod assembler;
/// Static instruction and register catalogs.
pub mod catalog;
/// Relocatable ELF64 object serialization.
pub mod elf;
/// Opcode matching and instruction encoding (REX, ModRM, SIB, immediates).
pub mod encoder;
/// Error types.
pub mod error;
/// Line-oriented token stream.
pub mod lexer;
/// Operand explosion and resolution.
pub mod operand;
/// Symbols, sections, and relocation bookkeeping.
pub mod symtab;

// Re-exports
pub use assembler::Assembler;
pub use error::AsmError;
pub use symtab::{Reloc, RelocKind, Section, Symbol, SymbolKind};

use alloc::string::String;
use alloc::vec::Vec;

/// Assemble a source string straight into a relocatable ELF64 object.
///
/// # Errors
///
/// Returns [`AsmError`] if the input contains syntax errors, unmatched
/// instructions, undefined forward references, or section misuse.
///
/// # Examples
///
/// ```rust
/// let obj = relasm::assemble_object("ret").unwrap();
/// assert_eq!(&obj[..4], b"\x7FELF");
/// ```
pub fn assemble_object(source: &str) -> Result<Vec<u8>, AsmError> {
    let mut asm = Assembler::new();
    asm.assemble(source)?;
    asm.object()
}

/// Assemble a source string and return the annotated listing.
///
/// # Errors
///
/// Returns [`AsmError`] on assembly failure (see [`assemble_object`]).
///
/// # Examples
///
/// ```rust
/// let listing = relasm::assemble_listing("ret").unwrap();
/// assert!(listing.contains("C3"));
/// ```
pub fn assemble_listing(source: &str) -> Result<String, AsmError> {
    let mut asm = Assembler::new();
    asm.assemble(source)?;
    Ok(asm.listing().into())
}
