//! Opcode matching and instruction encoding.
//!
//! The matcher scans the opcode catalog front to back and takes the first
//! entry whose operand types fit — catalog order, not a search for the
//! shortest encoding, decides which form wins. When nothing fits and every
//! operand is 16-bit or narrower, the operand types are promoted one tier and
//! the scan runs once more with a legacy operand-size prefix pending; the
//! catalog itself is never mutated, all size adjustments happen on local
//! copies of the masks.
//!
//! The encoder then walks the classic byte order: legacy prefix, REX, opcode
//! byte(s), ModRM, SIB, displacement, immediate. The RM shape is folded into
//! MR up front by swapping which operand index feeds the rm and reg fields.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::catalog::{
    is_imm, is_reg, op_size, OpEn, OpSpec, RegSpec, TypeMask, IMM16, IMM32, IMM64, IMM8, OPCODES,
    REG64, REG8, RSP,
};
use crate::error::AsmError;
use crate::operand::{parse_imm, Operand};
use crate::symtab::{DeferredReloc, Reloc, RelocKind, SymbolKind, SymbolTable};

/// Find the first catalog entry fitting the mnemonic and operand types.
///
/// `masks` holds one resolved [`TypeMask`] per operand. On the override
/// retry, the first operand is tagged with the `0x66` prefix; the tag is
/// cleared again if the retry also fails.
///
/// # Errors
///
/// [`AsmError::UnmatchedInstruction`] when no entry fits.
pub fn match_op(
    mnemonic: &str,
    ops: &mut [Operand],
    masks: &[TypeMask],
    line: usize,
) -> Result<&'static OpSpec, AsmError> {
    if let Some(spec) = scan(mnemonic, ops, masks) {
        return Ok(spec);
    }

    // Operand-size override: promote every operand one size tier and rescan
    // once, with the 0x66 prefix pending on the instruction.
    if !masks.is_empty() && masks.iter().all(|&m| op_size(m) <= 2) {
        let promoted: Vec<TypeMask> = masks.iter().map(|&m| m << 1).collect();
        if let Some(op) = ops.first_mut() {
            op.legacy = Some(0x66);
        }
        if let Some(spec) = scan(mnemonic, ops, &promoted) {
            return Ok(spec);
        }
        if let Some(op) = ops.first_mut() {
            op.legacy = None;
        }
    }

    Err(AsmError::UnmatchedInstruction {
        mnemonic: mnemonic.to_string(),
        operands: ops.iter().map(|o| o.text.clone()).collect(),
        line,
    })
}

fn scan(mnemonic: &str, ops: &[Operand], masks: &[TypeMask]) -> Option<&'static OpSpec> {
    'next: for spec in OPCODES {
        if !spec.mnemonic.eq_ignore_ascii_case(mnemonic) {
            continue;
        }

        // Pseudo-ops take any number of immediates.
        if spec.primary.is_none() {
            if masks.iter().all(|&m| is_imm(m)) {
                return Some(spec);
            }
            continue;
        }

        let wants = [spec.op1, spec.op2];
        let declared = wants.iter().filter(|&&w| w != 0).count();
        if declared != masks.len() {
            continue;
        }

        for (&want, &got) in wants.iter().zip(masks) {
            if is_reg(want) && want != got {
                continue 'next;
            }
            if is_imm(want) != is_imm(got) {
                continue 'next;
            }
            // An immediate slot accepts anything up to its declared width.
            if is_imm(want) && want < got {
                continue 'next;
            }
        }

        // Memory operands pin which ModRM side an entry may serve.
        if spec.shape == OpEn::Mr && ops.get(1).map_or(false, |o| o.disp.is_some()) {
            continue;
        }
        if spec.shape == OpEn::Rm && ops.first().map_or(false, |o| o.disp.is_some()) {
            continue;
        }

        return Some(spec);
    }

    None
}

/// Encode one matched instruction into `out`, recording relocations as a
/// side effect.
///
/// `section_start` is the offset where the open section began; relocation
/// and branch arithmetic is relative to it.
///
/// # Errors
///
/// Fails on conflicting displacements or an operand that should name a
/// register but does not.
pub fn encode(
    spec: &OpSpec,
    ops: &mut [Operand],
    out: &mut Vec<u8>,
    table: &mut SymbolTable,
    section_start: usize,
    line: usize,
) -> Result<(), AsmError> {
    let Some(mut primary) = spec.primary else {
        // Pseudo-op: emit every sub-operand at the declared width.
        for op in ops.iter() {
            for sub in &op.subs {
                let value = parse_imm(sub, line)?;
                emit_imm(out, spec.op1, value);
            }
        }
        return Ok(());
    };

    let mut m1 = spec.op1;
    let mut m2 = spec.op2;

    if let Some(prefix) = ops.first().and_then(|o| o.legacy) {
        out.push(prefix);
        if op_size(m1) >= 4 {
            m1 >>= 1;
        }
        if op_size(m2) >= 4 {
            m2 >>= 1;
        }
    }

    // Fold RM into MR: operand 2 feeds the rm field, operand 1 the reg field.
    let (shape, i1, i2) = if spec.shape == OpEn::Rm {
        core::mem::swap(&mut m1, &mut m2);
        (OpEn::Mr, 1, 0)
    } else {
        (spec.shape, 0, 1)
    };

    let r1 = decode_reg(ops, i1, m1, line)?;
    let r2 = decode_reg(ops, i2, m2, line)?;
    let reg1 = r1.map_or(0, |r| r.code | (u8::from(r.high) << 2));
    let reg2 = r2.map_or(0, |r| r.code | (u8::from(r.high) << 2));

    if r1.is_some() || r2.is_some() {
        if matches!(shape, OpEn::O | OpEn::Oi) {
            primary = primary.wrapping_add(reg1);
        }

        // REX.W for 64-bit operands unless the operation defaults to 64-bit;
        // B and R whenever an extended register is named, ModRM or not; a
        // bare REX selects the low-byte spl/bpl/sil/dil encodings.
        let wide = !spec.default64 && (m1 | m2) & REG64 != 0;
        let ext1 = ops.get(i1).map_or(false, |o| o.extended);
        let ext2 = ops.get(i2).map_or(false, |o| o.extended);
        let low8 = (m1 & REG8 != 0 && r1.map_or(false, |r| r.code & 0b100 != 0))
            || (m2 & REG8 != 0 && r2.map_or(false, |r| r.code & 0b100 != 0));

        if wide || ext1 || ext2 || low8 {
            let mut rex = 0b0100_0000u8;
            if wide {
                rex |= 1 << 3;
            }
            if ext2 {
                rex |= 1 << 2;
            }
            if ext1 {
                rex |= 1;
            }
            out.push(rex);
        }
    }

    out.push(primary);
    if let Some(secondary) = spec.secondary {
        out.push(secondary);
    }

    if matches!(shape, OpEn::M | OpEn::Mi | OpEn::Mr) {
        let rel1 = ops.get(i1).map_or(false, |o| o.rel);
        let rel2 = ops.get(i2).map_or(false, |o| o.rel);
        let d1 = ops.get(i1).and_then(|o| o.disp);
        let d2 = ops.get(i2).and_then(|o| o.disp);

        if d1.is_some() && d2.is_some() {
            return Err(AsmError::TwoDisplacements { line });
        }

        let mut modrm = reg1 | (reg2 << 3) | (spec.ext << 3);
        if rel1 || rel2 {
            // mod=00 rm=101: RIP-relative, displacement patched by relocation.
            modrm |= 0b101;
        } else if let Some(d) = d1.or(d2) {
            modrm |= (if fits_i8(d) { 0b01 } else { 0b10 }) << 6;
        } else {
            modrm |= 0b11 << 6;
        }
        out.push(modrm);

        let sym1 = ops.get(i1).and_then(|o| o.sym);
        if let Some(d) = d1 {
            if sym1.is_none() {
                // An RSP-coded base (rsp or r12) forces the trivial SIB byte.
                if r1.map_or(false, |r| r.code == RSP) {
                    out.push(0b0010_0100);
                }
                emit_disp(out, d);
            }
        } else if let Some(d) = d2 {
            if sym1.is_none() {
                emit_disp(out, d);
            }
        }
    }

    for (slot, mask, first) in [(i1, m1, true), (i2, m2, false)] {
        if !is_imm(mask) || slot >= ops.len() {
            continue;
        }
        let mut imm = parse_imm(&ops[slot].subs[0], line)?;

        if first && shape == OpEn::D {
            // Branch displacement counts from the end of the instruction.
            imm = imm.wrapping_sub((out.len() - section_start + op_size(m1) + op_size(m2)) as i64);
            ops[slot].rel = true;
        }

        let op = &ops[slot];
        let addr = (out.len() - section_start) as u64;
        let addend = op.disp.unwrap_or(0);
        let kind = if op.rel {
            RelocKind::Relative
        } else {
            RelocKind::Absolute
        };

        if let Some(sym) = op.sym {
            // Branches to already-defined local labels need no relocation.
            if table.symbols[sym].kind == SymbolKind::Extern || shape != OpEn::D {
                table.relocs.push(Reloc {
                    kind,
                    sym,
                    addr,
                    addend,
                });
                imm = 0;
            }
        } else if op.deferred {
            table.deferred.push(DeferredReloc {
                kind,
                name: op.subs[0].clone(),
                addr,
                addend,
            });
            imm = 0;
        }

        emit_imm(out, mask, imm);
    }

    Ok(())
}

fn decode_reg(
    ops: &[Operand],
    idx: usize,
    mask: TypeMask,
    line: usize,
) -> Result<Option<&'static RegSpec>, AsmError> {
    if !is_reg(mask) {
        return Ok(None);
    }
    let name = ops
        .get(idx)
        .and_then(|o| o.subs.first())
        .map_or("", String::as_str);
    match crate::catalog::lookup_register(name) {
        Some(reg) => Ok(Some(reg)),
        None => Err(AsmError::UnknownRegister {
            name: name.to_string(),
            line,
        }),
    }
}

fn fits_i8(value: i64) -> bool {
    i8::try_from(value).is_ok()
}

fn emit_disp(out: &mut Vec<u8>, disp: i64) {
    if let Ok(b) = i8::try_from(disp) {
        out.push(b as u8);
    } else {
        out.extend_from_slice(&(disp as i32).to_le_bytes());
    }
}

fn emit_imm(out: &mut Vec<u8>, mask: TypeMask, value: i64) {
    let bytes = value.to_le_bytes();
    let width = if mask & IMM8 != 0 {
        1
    } else if mask & IMM16 != 0 {
        2
    } else if mask & IMM32 != 0 {
        4
    } else if mask & IMM64 != 0 {
        8
    } else {
        0
    };
    out.extend_from_slice(&bytes[..width]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EMPTY;
    use alloc::vec;

    fn assemble_one(mnemonic: &str, operands: &[&str]) -> (Vec<u8>, SymbolTable) {
        let mut table = SymbolTable::default();
        let mut ops: Vec<Operand> = operands
            .iter()
            .map(|t| Operand::from_token(t, 0).unwrap())
            .collect();

        let mut masks = Vec::new();
        for op in &mut ops {
            let mut mask = EMPTY;
            for j in 0..op.subs.len() {
                mask = op.resolve(j, &table, 0).unwrap();
            }
            masks.push(mask);
        }

        let spec = match_op(mnemonic, &mut ops, &masks, 0).unwrap();
        let mut out = Vec::new();
        encode(spec, &mut ops, &mut out, &mut table, 0, 0).unwrap();
        (out, table)
    }

    fn bytes_of(mnemonic: &str, operands: &[&str]) -> Vec<u8> {
        assemble_one(mnemonic, operands).0
    }

    #[test]
    fn mov_imm_forms() {
        assert_eq!(
            bytes_of("mov", &["rdi", "0"]),
            vec![0x48, 0xC7, 0xC7, 0, 0, 0, 0]
        );
        assert_eq!(bytes_of("mov", &["al", "5"]), vec![0xB0, 0x05]);
        assert_eq!(bytes_of("mov", &["eax", "70000"]), vec![0xB8, 0x70, 0x11, 0x01, 0x00]);
    }

    #[test]
    fn mov_reg_reg_uses_the_mr_form_first() {
        assert_eq!(bytes_of("mov", &["rax", "rbx"]), vec![0x48, 0x89, 0xD8]);
    }

    #[test]
    fn extended_registers_force_rex_without_w() {
        assert_eq!(bytes_of("push", &["r8"]), vec![0x41, 0x50]);
        assert_eq!(bytes_of("pop", &["r9"]), vec![0x41, 0x59]);
        // Plain push/pop default to 64-bit and take no REX at all.
        assert_eq!(bytes_of("push", &["rax"]), vec![0x50]);
    }

    #[test]
    fn low_byte_registers_need_a_bare_rex() {
        assert_eq!(bytes_of("mov", &["spl", "1"]), vec![0x40, 0xB4, 0x01]);
        assert_eq!(bytes_of("mov", &["r8b", "1"]), vec![0x41, 0xB0, 0x01]);
        // The legacy high-byte registers must not trigger REX.
        assert_eq!(bytes_of("mov", &["ah", "1"]), vec![0xB4, 0x01]);
    }

    #[test]
    fn first_fit_prefers_the_sign_extended_byte_form() {
        assert_eq!(bytes_of("add", &["rax", "5"]), vec![0x48, 0x83, 0xC0, 0x05]);
        assert_eq!(
            bytes_of("add", &["rax", "0x1000"]),
            vec![0x48, 0x81, 0xC0, 0x00, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn operand_size_override_retries_with_a_prefix() {
        assert_eq!(bytes_of("mov", &["ax", "42"]), vec![0x66, 0xB8, 0x2A, 0x00]);
    }

    #[test]
    fn memory_operands_pick_modrm_sides() {
        assert_eq!(
            bytes_of("mov", &["[rbp-8]", "rax"]),
            vec![0x48, 0x89, 0x45, 0xF8]
        );
        assert_eq!(
            bytes_of("mov", &["rax", "[rbp-8]"]),
            vec![0x48, 0x8B, 0x45, 0xF8]
        );
    }

    #[test]
    fn rsp_base_gets_a_sib_byte() {
        assert_eq!(
            bytes_of("add", &["[rsp]", "rax"]),
            vec![0x48, 0x01, 0x44, 0x24, 0x00]
        );
    }

    #[test]
    fn wide_displacement_widens_the_mod_field() {
        assert_eq!(
            bytes_of("mov", &["[rbp-256]", "rax"]),
            vec![0x48, 0x89, 0x85, 0x00, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn two_byte_opcodes() {
        assert_eq!(bytes_of("imul", &["rax", "rbx"]), vec![0x48, 0x0F, 0xAF, 0xC3]);
        assert_eq!(bytes_of("syscall", &[]), vec![0x0F, 0x05]);
    }

    #[test]
    fn modrm_extension_selects_the_operation() {
        assert_eq!(bytes_of("inc", &["rax"]), vec![0x48, 0xFF, 0xC0]);
        assert_eq!(bytes_of("dec", &["rcx"]), vec![0x48, 0xFF, 0xC9]);
        assert_eq!(bytes_of("idiv", &["rbx"]), vec![0x48, 0xF7, 0xFB]);
        assert_eq!(bytes_of("sub", &["rsp", "16"]), vec![0x48, 0x83, 0xEC, 0x10]);
    }

    #[test]
    fn forward_reference_defers_a_relocation_and_emits_zero() {
        let (bytes, table) = assemble_one("call", &["later"]);
        assert_eq!(bytes, vec![0xE8, 0, 0, 0, 0]);
        assert_eq!(table.deferred.len(), 1);
        assert_eq!(table.deferred[0].name, "later");
        assert_eq!(table.deferred[0].addr, 1);
        assert_eq!(table.deferred[0].kind, RelocKind::Relative);
    }

    #[test]
    fn known_local_branch_needs_no_relocation() {
        let mut table = SymbolTable::default();
        table.define_label("top".into(), SymbolKind::Local, 0);

        let mut ops = vec![Operand::from_token("top", 0).unwrap()];
        let mask = ops[0].resolve(0, &table, 0).unwrap();
        let spec = match_op("jmp", &mut ops, &[mask], 0).unwrap();
        let mut out = Vec::new();
        encode(spec, &mut ops, &mut out, &mut table, 0, 0).unwrap();

        assert_eq!(out, vec![0xE9, 0xFB, 0xFF, 0xFF, 0xFF]);
        assert!(table.relocs.is_empty() && table.deferred.is_empty());
    }

    #[test]
    fn extern_call_records_a_relative_relocation() {
        let mut table = SymbolTable::default();
        table.declare_extern("puts".into());

        let mut ops = vec![Operand::from_token("puts", 0).unwrap()];
        let mask = ops[0].resolve(0, &table, 0).unwrap();
        let spec = match_op("call", &mut ops, &[mask], 0).unwrap();
        let mut out = Vec::new();
        encode(spec, &mut ops, &mut out, &mut table, 0, 0).unwrap();

        assert_eq!(out, vec![0xE8, 0, 0, 0, 0]);
        assert_eq!(table.relocs.len(), 1);
        assert_eq!(table.relocs[0].kind, RelocKind::Relative);
        assert_eq!(table.relocs[0].addr, 1);
    }

    #[test]
    fn rip_relative_lea_carries_the_bracket_displacement() {
        let mut table = SymbolTable::default();
        table.define_label("x".into(), SymbolKind::Local, 0);

        let mut ops = vec![
            Operand::from_token("rax", 0).unwrap(),
            Operand::from_token("[x+8]", 0).unwrap(),
        ];
        let m0 = ops[0].resolve(0, &table, 0).unwrap();
        let m1 = ops[1].resolve(0, &table, 0).unwrap();
        let spec = match_op("lea", &mut ops, &[m0, m1], 0).unwrap();
        let mut out = Vec::new();
        encode(spec, &mut ops, &mut out, &mut table, 0, 0).unwrap();

        assert_eq!(out, vec![0x48, 0x8D, 0x05, 0, 0, 0, 0]);
        assert_eq!(table.relocs.len(), 1);
        assert_eq!(table.relocs[0].addend, 8);
        assert_eq!(table.relocs[0].addr, 3);
    }

    #[test]
    fn pseudo_op_emits_raw_bytes() {
        assert_eq!(bytes_of("db", &["\"AB\"", "0x0A"]), vec![0x41, 0x42, 0x00, 0x0A]);
        assert_eq!(bytes_of("db", &["_\"AB\""]), vec![0x41, 0x42]);
    }

    #[test]
    fn unmatched_instruction_reports_its_operands() {
        let mut ops = vec![Operand::from_token("rax", 0).unwrap()];
        let table = SymbolTable::default();
        let mask = ops[0].resolve(0, &table, 0).unwrap();
        let err = match_op("lea", &mut ops, &[mask], 4).unwrap_err();
        assert!(matches!(
            err,
            AsmError::UnmatchedInstruction { line: 4, .. }
        ));
        // The failed override retry must not leave a prefix behind.
        assert!(ops[0].legacy.is_none());
    }

    #[test]
    fn conditional_branches_use_the_two_byte_opcode() {
        let mut table = SymbolTable::default();
        table.define_label("top".into(), SymbolKind::Local, 0);

        let mut ops = vec![Operand::from_token("top", 0).unwrap()];
        let mask = ops[0].resolve(0, &table, 0).unwrap();
        let spec = match_op("je", &mut ops, &[mask], 0).unwrap();
        let mut out = Vec::new();
        encode(spec, &mut ops, &mut out, &mut table, 0, 0).unwrap();
        assert_eq!(out, vec![0x0F, 0x84, 0xFA, 0xFF, 0xFF, 0xFF]);
    }
}
