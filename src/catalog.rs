//! Static instruction and register catalogs.
//!
//! Pure data: the opcode table mapping mnemonics to encodings, the register
//! table mapping names to hardware encodings, and the operand type-mask
//! vocabulary shared by the matcher and the encoder. Both tables are
//! process-lifetime constants and are never mutated — the operand-size
//! override of the matcher works on local copies of the masks.

/// Operand type masks. Single-bit flags: register classes in bits 0–3,
/// immediate classes in bits 4–7. The matcher's size-override retry promotes
/// a mask one tier with `<< 1`; the encoder's legacy-prefix demotion is `>> 1`.
pub type TypeMask = u16;

/// No operand in this slot.
pub const EMPTY: TypeMask = 0;
/// 8-bit register.
pub const REG8: TypeMask = 1 << 0;
/// 16-bit register.
pub const REG16: TypeMask = 1 << 1;
/// 32-bit register.
pub const REG32: TypeMask = 1 << 2;
/// 64-bit register.
pub const REG64: TypeMask = 1 << 3;
/// 8-bit immediate.
pub const IMM8: TypeMask = 1 << 4;
/// 16-bit immediate.
pub const IMM16: TypeMask = 1 << 5;
/// 32-bit immediate.
pub const IMM32: TypeMask = 1 << 6;
/// 64-bit immediate.
pub const IMM64: TypeMask = 1 << 7;

/// Whether the mask describes a register class.
#[inline]
#[must_use]
pub fn is_reg(mask: TypeMask) -> bool {
    mask & (REG8 | REG16 | REG32 | REG64) != 0
}

/// Whether the mask describes an immediate class.
#[inline]
#[must_use]
pub fn is_imm(mask: TypeMask) -> bool {
    mask & (IMM8 | IMM16 | IMM32 | IMM64) != 0
}

/// Operand field width in bytes for a type mask (0 for [`EMPTY`]).
#[inline]
#[must_use]
pub fn op_size(mask: TypeMask) -> usize {
    if mask & (IMM64 | REG64) != 0 {
        8
    } else if mask & (IMM32 | REG32) != 0 {
        4
    } else if mask & (IMM16 | REG16) != 0 {
        2
    } else if mask & (IMM8 | REG8) != 0 {
        1
    } else {
        0
    }
}

/// Classify an immediate value into the narrowest holding IMM class.
///
/// The comparison is signed, so negative values classify as [`IMM8`] — this
/// lets `mov al, -5` match the byte-immediate encodings and truncate on emit.
#[inline]
#[must_use]
pub fn imm_size(value: i64) -> TypeMask {
    if value <= 0xFF {
        IMM8
    } else if value <= 0xFFFF {
        IMM16
    } else if value <= 0xFFFF_FFFF {
        IMM32
    } else {
        IMM64
    }
}

/// Operand-encoding shape of a catalog entry.
///
/// Names follow the Intel SDM "Op/En" column: which operand lands in the
/// ModRM reg/rm fields, in the opcode byte itself, or in a trailing
/// immediate/displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpEn {
    /// No operands, no ModRM.
    Z,
    /// No operands, opcode bytes only.
    Zo,
    /// Single immediate operand.
    I,
    /// Register encoded in the low 3 bits of the opcode byte.
    O,
    /// Opcode-register plus trailing immediate.
    Oi,
    /// Single r/m operand in ModRM.
    M,
    /// r/m operand plus immediate.
    Mi,
    /// ModRM with operand 1 in rm, operand 2 in reg.
    Mr,
    /// ModRM with operand 1 in reg, operand 2 in rm (canonicalized to MR).
    Rm,
    /// PC-relative displacement operand (branches and calls).
    D,
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy)]
pub struct OpSpec {
    /// Instruction mnemonic (lowercase; matched case-insensitively).
    pub mnemonic: &'static str,
    /// Operand-encoding shape.
    pub shape: OpEn,
    /// Operand defaults to 64-bit in long mode (push/pop): REX.W is never
    /// needed, though REX.B still is for extended registers.
    pub default64: bool,
    /// Type mask for operand slot 1 ([`EMPTY`] if unused).
    pub op1: TypeMask,
    /// Type mask for operand slot 2 ([`EMPTY`] if unused).
    pub op2: TypeMask,
    /// Primary opcode byte; `None` marks a pseudo-op (raw byte emission).
    pub primary: Option<u8>,
    /// Secondary opcode byte, if the encoding has one (0x0F escapes).
    pub secondary: Option<u8>,
    /// ModRM opcode-extension bits (the /digit), OR-ed into the reg field.
    pub ext: u8,
}

const fn ent(
    mnemonic: &'static str,
    shape: OpEn,
    default64: bool,
    op1: TypeMask,
    op2: TypeMask,
    primary: Option<u8>,
    secondary: Option<u8>,
    ext: u8,
) -> OpSpec {
    OpSpec {
        mnemonic,
        shape,
        default64,
        op1,
        op2,
        primary,
        secondary,
        ext,
    }
}

/// The opcode table.
///
/// The matcher does not search for the smallest possible instruction; it
/// picks the first entry that fits all operands. To produce the best output,
/// entries for a mnemonic must be ordered by ascending encoded size.
pub static OPCODES: &[OpSpec] = &[
    // LEA — Load Effective Address
    ent("lea", OpEn::Rm, false, REG16, IMM16, Some(0x8D), None, 0),
    ent("lea", OpEn::Rm, false, REG32, IMM32, Some(0x8D), None, 0),
    ent("lea", OpEn::Rm, false, REG64, IMM32, Some(0x8D), None, 0),
    // MOV — Move
    ent("mov", OpEn::Oi, false, REG8, IMM8, Some(0xB0), None, 0),
    ent("mov", OpEn::Oi, false, REG32, IMM32, Some(0xB8), None, 0),
    ent("mov", OpEn::Mi, false, REG64, IMM32, Some(0xC7), None, 0),
    ent("mov", OpEn::Oi, false, REG64, IMM64, Some(0xB8), None, 0),
    ent("mov", OpEn::Mr, false, REG64, REG64, Some(0x89), None, 0),
    ent("mov", OpEn::Rm, false, REG64, REG64, Some(0x8B), None, 0),
    // PUSH — Push Onto the Stack
    ent("push", OpEn::O, true, REG64, EMPTY, Some(0x50), None, 0),
    ent("push", OpEn::I, false, IMM32, EMPTY, Some(0x68), None, 0),
    // POP — Pop a Value from the Stack
    ent("pop", OpEn::O, true, REG64, EMPTY, Some(0x58), None, 0),
    // ADD — Add
    ent("add", OpEn::Mi, false, REG8, IMM8, Some(0x80), None, 0),
    ent("add", OpEn::Mi, false, REG32, IMM8, Some(0x83), None, 0),
    ent("add", OpEn::Mi, false, REG64, IMM8, Some(0x83), None, 0),
    ent("add", OpEn::Mi, false, REG64, IMM32, Some(0x81), None, 0),
    ent("add", OpEn::Mr, false, REG8, REG8, Some(0x00), None, 0),
    ent("add", OpEn::Mr, false, REG16, REG16, Some(0x01), None, 0),
    ent("add", OpEn::Mr, false, REG32, REG32, Some(0x01), None, 0),
    ent("add", OpEn::Mr, false, REG64, REG64, Some(0x01), None, 0),
    ent("add", OpEn::Rm, false, REG64, REG64, Some(0x03), None, 0),
    // INC — Increment by 1
    ent("inc", OpEn::M, false, REG64, EMPTY, Some(0xFF), None, 0),
    // IMUL — Signed Multiply
    ent("imul", OpEn::Rm, false, REG32, REG32, Some(0x0F), Some(0xAF), 0),
    ent("imul", OpEn::Rm, false, REG64, REG64, Some(0x0F), Some(0xAF), 0),
    // IDIV — Signed Divide
    ent("idiv", OpEn::M, false, REG32, EMPTY, Some(0xF7), None, 0x07),
    ent("idiv", OpEn::M, false, REG64, EMPTY, Some(0xF7), None, 0x07),
    // SUB — Subtract
    ent("sub", OpEn::Mi, false, REG8, IMM8, Some(0x80), None, 0x05),
    ent("sub", OpEn::Mi, false, REG32, IMM8, Some(0x83), None, 0x05),
    ent("sub", OpEn::Mi, false, REG64, IMM8, Some(0x83), None, 0x05),
    ent("sub", OpEn::Mi, false, REG64, IMM32, Some(0x81), None, 0x05),
    ent("sub", OpEn::Mr, false, REG8, REG8, Some(0x28), None, 0),
    ent("sub", OpEn::Mr, false, REG16, REG16, Some(0x29), None, 0),
    ent("sub", OpEn::Mr, false, REG32, REG32, Some(0x29), None, 0),
    ent("sub", OpEn::Mr, false, REG64, REG64, Some(0x29), None, 0),
    ent("sub", OpEn::Rm, false, REG64, REG64, Some(0x2B), None, 0),
    // DEC — Decrement by 1
    ent("dec", OpEn::M, false, REG64, EMPTY, Some(0xFF), None, 0x01),
    // XOR — Logical Exclusive OR
    ent("xor", OpEn::Mr, false, REG8, REG8, Some(0x30), None, 0),
    ent("xor", OpEn::Mr, false, REG32, REG32, Some(0x31), None, 0),
    ent("xor", OpEn::Mr, false, REG64, REG64, Some(0x31), None, 0),
    ent("xor", OpEn::Mi, false, REG8, IMM8, Some(0x80), None, 0x06),
    ent("xor", OpEn::Mi, false, REG16, IMM16, Some(0x81), None, 0x06),
    ent("xor", OpEn::Mi, false, REG32, IMM32, Some(0x81), None, 0x06),
    ent("xor", OpEn::Mi, false, REG64, IMM32, Some(0x81), None, 0x06),
    // CMP — Compare Two Operands
    ent("cmp", OpEn::Mi, false, REG64, IMM8, Some(0x83), None, 0x07),
    ent("cmp", OpEn::Mi, false, REG64, IMM32, Some(0x81), None, 0x07),
    // TEST — Logical Compare
    ent("test", OpEn::Mi, false, REG64, IMM32, Some(0xF7), None, 0),
    // JMP — Jump
    ent("jmp", OpEn::D, false, IMM32, EMPTY, Some(0xE9), None, 0),
    // Jcc — Jump if Condition Is Met
    ent("je", OpEn::D, false, IMM32, EMPTY, Some(0x0F), Some(0x84), 0),
    ent("jne", OpEn::D, false, IMM32, EMPTY, Some(0x0F), Some(0x85), 0),
    // INT n — Call to Interrupt Procedure
    ent("int", OpEn::I, false, IMM8, EMPTY, Some(0xCD), None, 0),
    // SYSCALL — Fast System Call
    ent("syscall", OpEn::Zo, false, EMPTY, EMPTY, Some(0x0F), Some(0x05), 0),
    // CALL — Call Procedure
    ent("call", OpEn::D, false, IMM32, EMPTY, Some(0xE8), None, 0),
    // RET — Return from Procedure
    ent("ret", OpEn::Zo, false, EMPTY, EMPTY, Some(0xC3), None, 0),
    ent("ret", OpEn::I, false, IMM16, EMPTY, Some(0xC2), None, 0),
    // Pseudo-operations
    ent("db", OpEn::Z, false, IMM8, EMPTY, None, None, 0),
];

/// One row of the register table.
#[derive(Debug, Clone, Copy)]
pub struct RegSpec {
    /// Register name (lowercase; matched case-insensitively).
    pub name: &'static str,
    /// 3-bit hardware encoding.
    pub code: u8,
    /// Size class as a single-bit [`TypeMask`].
    pub mask: TypeMask,
    /// Requires a REX B/R bit (r8–r15 family).
    pub extended: bool,
    /// Legacy high-byte register (ah/bh/ch/dh) — mutually exclusive with REX.
    pub high: bool,
}

const fn reg(name: &'static str, code: u8, mask: TypeMask, extended: bool, high: bool) -> RegSpec {
    RegSpec {
        name,
        code,
        mask,
        extended,
        high,
    }
}

const RAX: u8 = 0b000;
const RCX: u8 = 0b001;
const RDX: u8 = 0b010;
const RBX: u8 = 0b011;
/// Stack-pointer encoding; as a ModRM base it demands a SIB byte.
pub const RSP: u8 = 0b100;
const RBP: u8 = 0b101;
const RSI: u8 = 0b110;
const RDI: u8 = 0b111;

/// The register table: every addressable name of the 16 general-purpose
/// registers at all four widths, plus the legacy high-byte registers.
pub static REGISTERS: &[RegSpec] = &[
    reg("rax", RAX, REG64, false, false),
    reg("eax", RAX, REG32, false, false),
    reg("ax", RAX, REG16, false, false),
    reg("al", RAX, REG8, false, false),
    reg("ah", RAX, REG8, false, true),
    reg("rcx", RCX, REG64, false, false),
    reg("ecx", RCX, REG32, false, false),
    reg("cx", RCX, REG16, false, false),
    reg("cl", RCX, REG8, false, false),
    reg("ch", RCX, REG8, false, true),
    reg("rdx", RDX, REG64, false, false),
    reg("edx", RDX, REG32, false, false),
    reg("dx", RDX, REG16, false, false),
    reg("dl", RDX, REG8, false, false),
    reg("dh", RDX, REG8, false, true),
    reg("rbx", RBX, REG64, false, false),
    reg("ebx", RBX, REG32, false, false),
    reg("bx", RBX, REG16, false, false),
    reg("bl", RBX, REG8, false, false),
    reg("bh", RBX, REG8, false, true),
    reg("rsp", RSP, REG64, false, false),
    reg("esp", RSP, REG32, false, false),
    reg("sp", RSP, REG16, false, false),
    reg("spl", RSP, REG8, false, false),
    reg("rbp", RBP, REG64, false, false),
    reg("ebp", RBP, REG32, false, false),
    reg("bp", RBP, REG16, false, false),
    reg("bpl", RBP, REG8, false, false),
    reg("rsi", RSI, REG64, false, false),
    reg("esi", RSI, REG32, false, false),
    reg("si", RSI, REG16, false, false),
    reg("sil", RSI, REG8, false, false),
    reg("rdi", RDI, REG64, false, false),
    reg("edi", RDI, REG32, false, false),
    reg("di", RDI, REG16, false, false),
    reg("dil", RDI, REG8, false, false),
    reg("r8", RAX, REG64, true, false),
    reg("r8d", RAX, REG32, true, false),
    reg("r8w", RAX, REG16, true, false),
    reg("r8b", RAX, REG8, true, false),
    reg("r9", RCX, REG64, true, false),
    reg("r9d", RCX, REG32, true, false),
    reg("r9w", RCX, REG16, true, false),
    reg("r9b", RCX, REG8, true, false),
    reg("r10", RDX, REG64, true, false),
    reg("r10d", RDX, REG32, true, false),
    reg("r10w", RDX, REG16, true, false),
    reg("r10b", RDX, REG8, true, false),
    reg("r11", RBX, REG64, true, false),
    reg("r11d", RBX, REG32, true, false),
    reg("r11w", RBX, REG16, true, false),
    reg("r11b", RBX, REG8, true, false),
    reg("r12", RSP, REG64, true, false),
    reg("r12d", RSP, REG32, true, false),
    reg("r12w", RSP, REG16, true, false),
    reg("r12b", RSP, REG8, true, false),
    reg("r13", RBP, REG64, true, false),
    reg("r13d", RBP, REG32, true, false),
    reg("r13w", RBP, REG16, true, false),
    reg("r13b", RBP, REG8, true, false),
    reg("r14", RSI, REG64, true, false),
    reg("r14d", RSI, REG32, true, false),
    reg("r14w", RSI, REG16, true, false),
    reg("r14b", RSI, REG8, true, false),
    reg("r15", RDI, REG64, true, false),
    reg("r15d", RDI, REG32, true, false),
    reg("r15w", RDI, REG16, true, false),
    reg("r15b", RDI, REG8, true, false),
];

/// Look up a register by name, case-insensitively.
#[must_use]
pub fn lookup_register(name: &str) -> Option<&'static RegSpec> {
    REGISTERS.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}
