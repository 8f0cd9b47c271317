//! Error types for the assembler.
//!
//! Every failure in the pipeline — lexing, operand resolution, opcode
//! matching, encoding, section bookkeeping, object serialization — is
//! represented as an [`AsmError`] and propagated by `Result` up to a single
//! reporting point. The first error aborts the whole run; no partial object
//! file is ever produced.

#[allow(unused_imports)]
use alloc::format;
use alloc::string::String;
#[allow(unused_imports)]
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// Assembly error with enough context to diagnose the offending construct.
///
/// Source lines are 0-based, matching the line indices of the listing output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// Generic syntax error (unterminated escape, malformed construct).
    Syntax {
        /// The syntax error message.
        msg: String,
        /// 0-based source line.
        line: usize,
    },

    /// An escape sequence in a string literal is not recognized.
    InvalidEscape {
        /// The character following the backslash.
        escape: char,
        /// 0-based source line.
        line: usize,
    },

    /// An operand in register position does not name a known register.
    UnknownRegister {
        /// The unrecognized register name.
        name: String,
        /// 0-based source line.
        line: usize,
    },

    /// A numeric literal exceeds the 64-bit range.
    ImmediateOverflow {
        /// The literal text that overflowed.
        text: String,
        /// 0-based source line.
        line: usize,
    },

    /// No catalog entry matches the mnemonic and resolved operand types.
    UnmatchedInstruction {
        /// The instruction mnemonic.
        mnemonic: String,
        /// The raw operand texts, in order.
        operands: Vec<String>,
        /// 0-based source line.
        line: usize,
    },

    /// Both operands of one instruction carry a displacement.
    TwoDisplacements {
        /// 0-based source line.
        line: usize,
    },

    /// A `section` directive names a section that was already closed.
    SectionReclosed {
        /// The section name.
        name: String,
    },

    /// A deferred relocation's symbol name was never defined.
    UndefinedSymbol {
        /// The symbol name that could not be resolved.
        name: String,
    },

    /// A label was defined in a section the object format cannot place.
    LabelOutsideSection {
        /// The section name the label landed in.
        section: String,
        /// The label name.
        label: String,
    },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::Syntax { msg, line } => {
                write!(f, "line {}: {}", line, msg)
            }
            AsmError::InvalidEscape { escape, line } => {
                write!(f, "line {}: invalid escape sequence '\\{}'", line, escape)
            }
            AsmError::UnknownRegister { name, line } => {
                write!(f, "line {}: unknown register `{}`", line, name)
            }
            AsmError::ImmediateOverflow { text, line } => {
                write!(
                    f,
                    "line {}: immediate `{}` exceeds the 64-bit range",
                    line, text
                )
            }
            AsmError::UnmatchedInstruction {
                mnemonic,
                operands,
                line,
            } => {
                write!(
                    f,
                    "line {}: failed to match instruction to an opcode\nmnemonic: {}\noperand count: {}",
                    line,
                    mnemonic,
                    operands.len()
                )?;
                for (i, op) in operands.iter().enumerate() {
                    write!(f, "\noperand {}: {}", i, op)?;
                }
                Ok(())
            }
            AsmError::TwoDisplacements { line } => {
                write!(
                    f,
                    "line {}: two displacements in one instruction are impossible",
                    line
                )
            }
            AsmError::SectionReclosed { name } => {
                write!(f, "section {} was already closed", name)
            }
            AsmError::UndefinedSymbol { name } => {
                write!(f, "undefined symbol `{}` in deferred relocation", name)
            }
            AsmError::LabelOutsideSection { section, label } => {
                write!(
                    f,
                    "label {}:{} lies outside the object's defined sections",
                    section, label
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AsmError {}
