//! Relocatable ELF64 object serialization.
//!
//! The object carries a fixed set of six section headers — the null section,
//! the string table, `.text`, `.data`, the symbol table, and `.rela.text` —
//! immediately after the file header, followed by the string table, the raw
//! output buffer, the symbol entries, and the relocation entries. Other
//! object formats could slot in beside this one; the assembler only hands
//! over its tables and bytes.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::AsmError;
use crate::symtab::{RelocKind, SymbolKind, SymbolTable};

const SECTION_NAMES: [&str; 6] = ["", ".strtab", ".text", ".data", ".symtab", ".rela.text"];

const EHSIZE: usize = 64;
const SHENTSIZE: usize = 64;
const SYM_ENTSIZE: usize = 24;
const RELA_ENTSIZE: usize = 24;

const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ET_REL: u16 = 1;
const EM_X86_64: u16 = 62;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_RELA: u32 = 4;
const SHF_WRITE: u64 = 1;
const SHF_ALLOC: u64 = 2;
const SHF_EXECINSTR: u64 = 4;

const STB_LOCAL: u8 = 0;
const STB_GLOBAL: u8 = 1;
const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;

const SHSTRNDX: u16 = 1;
const TEXT_SHNDX: u16 = 2;
const DATA_SHNDX: u16 = 3;
const SYMTAB_SHNDX: u32 = 4;

const R_X86_64_64: u32 = 1;
const R_X86_64_PC32: u32 = 2;

/// Serialize the assembled tables and output buffer as an `ET_REL` object.
///
/// # Errors
///
/// [`AsmError::LabelOutsideSection`] when a defined symbol sits in a section
/// the object layout has no header for.
pub fn serialize(table: &SymbolTable, out: &[u8]) -> Result<Vec<u8>, AsmError> {
    // String table: section names first, then every symbol name.
    let mut strtab: Vec<u8> = Vec::new();
    let mut section_names = [0u32; 6];
    for (i, name) in SECTION_NAMES.iter().enumerate() {
        section_names[i] = strtab.len() as u32;
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
    }
    let mut symbol_names = Vec::with_capacity(table.symbols.len());
    for sym in &table.symbols {
        symbol_names.push(strtab.len() as u32);
        strtab.extend_from_slice(sym.name.as_bytes());
        strtab.push(0);
    }

    let strtab_off = EHSIZE + SECTION_NAMES.len() * SHENTSIZE;
    let content_off = strtab_off + strtab.len();
    let symtab_off = content_off + out.len();
    let symtab_size = (table.symbols.len() + 1) * SYM_ENTSIZE;
    let rela_off = symtab_off + symtab_size;
    let rela_size = table.relocs.len() * RELA_ENTSIZE;

    let text = table.sections.iter().position(|s| s.name == ".text");
    let data = table.sections.iter().position(|s| s.name == ".data");
    let section_span = |idx: Option<usize>| {
        idx.map_or((content_off as u64, 0), |i| {
            let s = &table.sections[i];
            ((content_off + s.start) as u64, s.size as u64)
        })
    };
    let (text_off, text_size) = section_span(text);
    let (data_off, data_size) = section_span(data);

    // Local symbols precede global and undefined ones; sh_info points one
    // past the last local.
    let mut order: Vec<usize> = Vec::with_capacity(table.symbols.len());
    for pass in 0..2 {
        for (i, sym) in table.symbols.iter().enumerate() {
            if (pass == 0) == (sym.kind == SymbolKind::Local) {
                order.push(i);
            }
        }
    }
    let mut sy2esy = vec![0u64; table.symbols.len()];
    for (ind, &i) in order.iter().enumerate() {
        sy2esy[i] = ind as u64;
    }
    let locals = order
        .iter()
        .filter(|&&i| table.symbols[i].kind == SymbolKind::Local)
        .count();

    let mut buf = Vec::with_capacity(rela_off + rela_size);

    // ─── File header ───

    buf.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
    buf.extend_from_slice(&[ELFCLASS64, ELFDATA2LSB, EV_CURRENT]);
    buf.extend_from_slice(&[0; 9]);
    w16(&mut buf, ET_REL);
    w16(&mut buf, EM_X86_64);
    w32(&mut buf, u32::from(EV_CURRENT));
    w64(&mut buf, 0); // e_entry
    w64(&mut buf, 0); // e_phoff
    w64(&mut buf, EHSIZE as u64); // e_shoff
    w32(&mut buf, 0); // e_flags
    w16(&mut buf, EHSIZE as u16);
    w16(&mut buf, 0); // e_phentsize
    w16(&mut buf, 0); // e_phnum
    w16(&mut buf, SHENTSIZE as u16);
    w16(&mut buf, SECTION_NAMES.len() as u16);
    w16(&mut buf, SHSTRNDX);

    // ─── Section headers ───

    write_shdr(&mut buf, &Shdr::default()); // null section

    write_shdr(
        &mut buf,
        &Shdr {
            name: section_names[1],
            kind: SHT_STRTAB,
            offset: strtab_off as u64,
            size: strtab.len() as u64,
            ..Shdr::default()
        },
    );
    write_shdr(
        &mut buf,
        &Shdr {
            name: section_names[2],
            kind: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_EXECINSTR,
            offset: text_off,
            size: text_size,
            ..Shdr::default()
        },
    );
    write_shdr(
        &mut buf,
        &Shdr {
            name: section_names[3],
            kind: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_WRITE,
            offset: data_off,
            size: data_size,
            ..Shdr::default()
        },
    );
    write_shdr(
        &mut buf,
        &Shdr {
            name: section_names[4],
            kind: SHT_SYMTAB,
            offset: symtab_off as u64,
            size: symtab_size as u64,
            link: u32::from(SHSTRNDX),
            info: 1 + locals as u32,
            entsize: SYM_ENTSIZE as u64,
            ..Shdr::default()
        },
    );
    write_shdr(
        &mut buf,
        &Shdr {
            name: section_names[5],
            kind: SHT_RELA,
            offset: rela_off as u64,
            size: rela_size as u64,
            link: SYMTAB_SHNDX,
            info: u32::from(TEXT_SHNDX),
            entsize: RELA_ENTSIZE as u64,
            ..Shdr::default()
        },
    );

    buf.extend_from_slice(&strtab);
    buf.extend_from_slice(out);

    // ─── Symbol table ───

    buf.extend_from_slice(&[0; SYM_ENTSIZE]); // null symbol
    for &i in &order {
        let sym = &table.symbols[i];
        let mut info = (STB_GLOBAL << 4) | STT_FUNC;
        let shndx = match sym.kind {
            SymbolKind::Extern => 0,
            local_or_global => {
                if local_or_global == SymbolKind::Local {
                    info = (STB_LOCAL << 4) | STT_FUNC;
                }
                if sym.section == text {
                    TEXT_SHNDX
                } else if sym.section == data {
                    info = (info & !0xF) | STT_OBJECT;
                    DATA_SHNDX
                } else {
                    let section = sym
                        .section
                        .map_or_else(String::new, |s| table.sections[s].name.clone());
                    return Err(AsmError::LabelOutsideSection {
                        section,
                        label: sym.name.clone(),
                    });
                }
            }
        };

        w32(&mut buf, symbol_names[i]);
        buf.push(info);
        buf.push(0); // st_other
        w16(&mut buf, shndx);
        w64(&mut buf, sym.addr);
        w64(&mut buf, sym.size);
    }

    // ─── Relocations ───

    for rel in &table.relocs {
        let sym = sy2esy[rel.sym] + 1;
        let (kind, addend) = match rel.kind {
            RelocKind::Absolute => (R_X86_64_64, rel.addend),
            // The PC32 field sits four bytes before the next instruction.
            RelocKind::Relative => (R_X86_64_PC32, rel.addend.wrapping_sub(4)),
        };
        w64(&mut buf, rel.addr);
        w64(&mut buf, sym << 32 | u64::from(kind));
        w64(&mut buf, addend as u64);
    }

    Ok(buf)
}

#[derive(Default)]
struct Shdr {
    name: u32,
    kind: u32,
    flags: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    entsize: u64,
}

fn write_shdr(buf: &mut Vec<u8>, s: &Shdr) {
    w32(buf, s.name);
    w32(buf, s.kind);
    w64(buf, s.flags);
    w64(buf, 0); // sh_addr
    w64(buf, s.offset);
    w64(buf, s.size);
    w32(buf, s.link);
    w32(buf, s.info);
    w64(buf, 0); // sh_addralign
    w64(buf, s.entsize);
}

fn w16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn w32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn w64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
