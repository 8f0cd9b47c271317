//! Property-based tests using proptest.
//!
//! These tests verify assembler invariants across large, randomly generated
//! input spaces — complementing the byte-exact integration tests and the
//! iced-x86 cross-validation suite.

use proptest::prelude::*;
use relasm::{assemble_object, Assembler, RelocKind};

// ── Strategies ──────────────────────────────────────────────────────────

/// Generates arbitrary ASCII strings (the assembler only accepts text input).
fn arb_asm_input() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::char::range('\0', '\x7f'), 0..256)
        .prop_map(|v| v.into_iter().collect())
}

/// Generates valid instruction strings from a curated pool.
fn valid_insn() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "ret",
        "ret 8",
        "syscall",
        "int 0x80",
        "mov rax, rbx",
        "mov eax, 42",
        "mov ax, 42",
        "mov al, 5",
        "mov rdi, 0",
        "mov rax, 0x123456789",
        "mov [rbp-8], rax",
        "mov rax, [rbp-8]",
        "x: lea rax, [x]",
        "push rax",
        "push r15",
        "push 1",
        "pop rbx",
        "add rax, 5",
        "add rax, rbx",
        "add [rsp], rax",
        "sub rsp, 32",
        "xor eax, eax",
        "xor rax, rax",
        "inc rcx",
        "dec rdx",
        "imul rax, rbx",
        "idiv rbx",
        "cmp rax, 10",
        "test rax, 1",
        "top: jmp top",
        "top: je top",
        "top: jne top",
        "db 1, 2, 3",
        "db \"hello\"",
    ])
}

/// Generates label names that can never collide with a register or mnemonic.
fn arb_label() -> impl Strategy<Value = String> {
    "lbl_[a-z]{1,8}"
}

fn output_of(source: &str) -> Vec<u8> {
    let mut asm = Assembler::new();
    asm.assemble(source).unwrap();
    asm.output().to_vec()
}

// ── Property: No panics on arbitrary input ──────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// The assembler must NEVER panic on arbitrary input — only Ok/Err.
    #[test]
    fn no_panic_on_arbitrary_input(input in arb_asm_input()) {
        let mut asm = Assembler::new();
        let _ = asm.assemble(&input);
    }

    /// Same through the one-shot object API, covering ELF serialization.
    #[test]
    fn no_panic_on_arbitrary_object(input in arb_asm_input()) {
        let _ = assemble_object(&input);
    }
}

// ── Property: Valid instructions always succeed ─────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn valid_instructions_always_assemble(insn in valid_insn()) {
        let mut asm = Assembler::new();
        let result = asm.assemble(insn);
        prop_assert!(result.is_ok(), "Failed to assemble: {}", insn);
        prop_assert!(!asm.output().is_empty(), "Empty output: {}", insn);
    }

    /// Assembly is deterministic: the same source yields the same bytes.
    #[test]
    fn assembly_is_deterministic(insn in valid_insn()) {
        prop_assert_eq!(output_of(insn), output_of(insn));
    }
}

// ── Property: Encoding invariants ───────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// 64-bit immediates above the 32-bit range always take the movabs
    /// form: REX.W, opcode B8, then the value in little-endian order.
    #[test]
    fn wide_mov_uses_the_full_immediate_form(
        n in (u64::from(u32::MAX) + 1)..=i64::MAX as u64,
    ) {
        let bytes = output_of(&format!("mov rax, {n}"));
        prop_assert_eq!(&bytes[..2], &[0x48, 0xB8]);
        prop_assert_eq!(&bytes[2..], &n.to_le_bytes());
    }

    /// Pushing an extended register costs exactly one REX prefix byte.
    #[test]
    fn push_rex_tracks_register_extension(idx in 0usize..16) {
        let names = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi",
            "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
        ];
        let bytes = output_of(&format!("push {}", names[idx]));
        if idx < 8 {
            prop_assert_eq!(bytes, vec![0x50 + idx as u8]);
        } else {
            prop_assert_eq!(bytes, vec![0x41, 0x50 + (idx - 8) as u8]);
        }
    }

    /// A forward call settles into exactly one PC-relative relocation when
    /// the section closes, whatever the label is called.
    #[test]
    fn forward_call_resolves_to_one_relocation(name in arb_label()) {
        let mut asm = Assembler::new();
        asm.assemble(&format!("call {name}\n{name}: ret")).unwrap();

        prop_assert_eq!(asm.output(), &[0xE8, 0, 0, 0, 0, 0xC3]);
        prop_assert_eq!(asm.relocations().len(), 1);
        let rel = &asm.relocations()[0];
        prop_assert_eq!(rel.kind, RelocKind::Relative);
        prop_assert_eq!(rel.addr, 1);
        prop_assert_eq!(&asm.symbols()[rel.sym].name, &name);
    }

    /// Every assembled program serializes to a well-formed object: magic,
    /// six section headers, and a size covering all recorded entries.
    #[test]
    fn objects_always_carry_the_elf_preamble(insn in valid_insn()) {
        let obj = assemble_object(insn).unwrap();
        prop_assert_eq!(&obj[..4], b"\x7FELF");
        let shnum = u16::from_le_bytes([obj[60], obj[61]]);
        prop_assert_eq!(shnum, 6);
    }
}
