//! ELF32 layout and emission.
//!
//! File order: ELF header, `.text` (literal pool then code, padded to 4),
//! `.rodata` (padded to 4), `.rela.text`, `.symtab`, `.strtab`,
//! `.shstrtab`, then the section header table at the next 4-byte boundary.
//! `.bss` occupies no file bytes but still gets an address right after
//! `.rodata`.
//!
//! Two quirks are load-bearing for downstream tooling and must not be
//! "fixed":
//!
//! * relocation entries are 12 bytes (the `.rela` entsize) but carry only
//!   `r_offset` and `r_info`; the addend word stays zero;
//! * `e_entry` is written with `main`'s address even though the file is
//!   `ET_REL` and linkers ignore the field.

use xtcc_gen::{CompiledUnit, LitKind};

use crate::error::{ObjError, Result};

/// `e_machine` for Xtensa.
pub const EM_XTENSA: u16 = 94;
/// `e_type` for relocatable objects.
pub const ET_REL: u16 = 1;
/// `e_flags` value the ESP32 toolchain expects.
pub const E_FLAGS: u32 = 0x300;

/// Add the section load address to the 32-bit value at the offset.
pub const R_XTENSA_RELATIVE: u32 = 5;
/// Store the referenced symbol's address into the 32-bit slot.
pub const R_XTENSA_JMP_SLOT: u32 = 4;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_RELA: u32 = 4;
const SHT_NOBITS: u32 = 8;

const EHDR_SIZE: u32 = 52;
const SHDR_SIZE: u16 = 40;
const SYM_SIZE: u32 = 16;
const REL_SIZE: u32 = 12;

/// Fixed section name table, including the trailing NUL (53 bytes).
const SHSTRTAB: &[u8] = b"\0.text\0.rodata\0.bss\0.rela\0.symtab\0.strtab\0.shstrtab\0\0";

// Section header indices; also the `sh_link`/`sh_info` cross references.
const SHN_TEXT: u16 = 1;
const SHN_SYMTAB: u32 = 5;
const SHN_STRTAB: u32 = 6;
const SHN_SHSTRTAB: u16 = 7;
const N_SECTIONS: u16 = 8;

/// One section header table entry.
#[derive(Default)]
struct SectionHeader {
    name: u32,
    sh_type: u32,
    flags: u32,
    addr: u32,
    offset: u32,
    size: u32,
    link: u32,
    info: u32,
    addralign: u32,
    entsize: u32,
}

impl SectionHeader {
    fn write_to(&self, out: &mut Vec<u8>) {
        for field in [
            self.name,
            self.sh_type,
            self.flags,
            self.addr,
            self.offset,
            self.size,
            self.link,
            self.info,
            self.addralign,
            self.entsize,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
}

/// Builds the complete object file image for a compiled unit.
pub fn build_object(unit: &CompiledUnit) -> Result<Vec<u8>> {
    let code_start = (unit.lits.len() * 4) as u32;
    let code_size = unit.code.len() as u32;

    // Section placement mirrors emission order; .bss consumes no bytes.
    let text_off = EHDR_SIZE;
    let text_addr = text_off;
    let rodata_off = text_off + align4(code_start + code_size);
    let rodata_addr = rodata_off;
    let bss_off = rodata_off + align4(unit.rodata.len() as u32);
    let bss_addr = bss_off;

    // Symbol table: null symbol, then one global per function.
    let n_syms = unit.funcs.len() as u32 + 1;
    let mut syms = vec![0u8; (n_syms * SYM_SIZE) as usize];
    let mut strtab = vec![0u8];
    for (i, func) in unit.funcs.iter().enumerate() {
        let sym = (i + 1) * SYM_SIZE as usize;
        let name_off = strtab.len() as u32;
        strtab.extend_from_slice(func.name.as_bytes());
        strtab.push(0);
        syms[sym..sym + 4].copy_from_slice(&name_off.to_le_bytes());
        match func.addr {
            Some(addr) => {
                // STB_GLOBAL | STT_FUNC, defined in .text.
                syms[sym + 12] = 0x12;
                syms[sym + 14..sym + 16].copy_from_slice(&SHN_TEXT.to_le_bytes());
                let value = code_start + addr;
                syms[sym + 4..sym + 8].copy_from_slice(&value.to_le_bytes());
            }
            None => {
                // STB_GLOBAL | STT_NOTYPE, undefined.
                syms[sym + 12] = 0x10;
            }
        }
    }

    // Literal slot values and their relocations, in slot order.
    let mut lit_bytes = vec![0u8; code_start as usize];
    let mut rels: Vec<u8> = Vec::new();
    for (i, &(value, kind)) in unit.lits.iter().enumerate() {
        let r_offset = text_addr + (i as u32) * 4;
        let mut slot: u32 = 0;
        match kind {
            LitKind::Int => slot = value as u32,
            LitKind::Str => {
                slot = rodata_addr.wrapping_add(value as u32);
                push_rel(&mut rels, r_offset, R_XTENSA_RELATIVE);
            }
            LitKind::Bss => {
                slot = bss_addr.wrapping_add(value as u32);
                push_rel(&mut rels, r_offset, R_XTENSA_RELATIVE);
            }
            LitKind::Func => {
                let fidx = value as usize;
                match unit.funcs[fidx].addr {
                    Some(addr) => {
                        slot = text_addr + code_start + addr;
                        push_rel(&mut rels, r_offset, R_XTENSA_RELATIVE);
                    }
                    None => {
                        // The slot stays zero; the linker stores the
                        // symbol's address.
                        let info = (((fidx as u32) + 1) << 8) | R_XTENSA_JMP_SLOT;
                        push_rel(&mut rels, r_offset, info);
                    }
                }
            }
        }
        lit_bytes[i * 4..i * 4 + 4].copy_from_slice(&slot.to_le_bytes());
    }
    let rels_size = rels.len() as u32;

    // Resolve every L32R displacement now that the pool layout is fixed.
    let mut code = unit.code.clone();
    for patch in &unit.patches {
        let target = (text_addr + (patch.lit as u32) * 4) as i64;
        let pc = (text_addr + code_start) as i64 + patch.code_off as i64;
        let imm = (target - ((pc + 3) & !3)) >> 2;
        if !(-(1i64 << 15)..0).contains(&imm) {
            return Err(ObjError::DisplacementOutOfRange { lit: patch.lit });
        }
        code[patch.code_off + 1] = imm as u8;
        code[patch.code_off + 2] = (imm >> 8) as u8;
    }

    // Remaining file offsets.
    let rela_off = bss_off;
    let symtab_off = rela_off + align4(rels_size);
    let strtab_off = symtab_off + n_syms * SYM_SIZE;
    let shstrtab_off = strtab_off + strtab.len() as u32;
    let shoff = align4(shstrtab_off + SHSTRTAB.len() as u32);

    // e_entry carries main's address; an undefined or absent main yields
    // the -1 sentinel folded into the address arithmetic.
    let main_addr = unit
        .funcs
        .iter()
        .find(|f| f.name == "main")
        .and_then(|f| f.addr)
        .map(i64::from)
        .unwrap_or(-1);
    let entry_vaddr = (i64::from(text_addr + code_start) + main_addr) as u32;

    let mut out = Vec::with_capacity(shoff as usize + (N_SECTIONS * SHDR_SIZE) as usize);

    // ELF header.
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    out.extend_from_slice(&ET_REL.to_le_bytes());
    out.extend_from_slice(&EM_XTENSA.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&entry_vaddr.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // e_phoff
    out.extend_from_slice(&shoff.to_le_bytes());
    out.extend_from_slice(&E_FLAGS.to_le_bytes());
    out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&SHDR_SIZE.to_le_bytes());
    out.extend_from_slice(&N_SECTIONS.to_le_bytes());
    out.extend_from_slice(&SHN_SHSTRTAB.to_le_bytes());

    // .text: literal pool, then code.
    out.extend_from_slice(&lit_bytes);
    out.extend_from_slice(&code);
    pad_to(&mut out, rodata_off);

    out.extend_from_slice(&unit.rodata);
    pad_to(&mut out, rela_off);

    out.extend_from_slice(&rels);
    pad_to(&mut out, symtab_off);

    out.extend_from_slice(&syms);
    out.extend_from_slice(&strtab);
    out.extend_from_slice(SHSTRTAB);
    pad_to(&mut out, shoff);

    // Section header table; entry 0 stays zeroed.
    SectionHeader::default().write_to(&mut out);
    SectionHeader {
        name: 1, // .text
        sh_type: SHT_PROGBITS,
        flags: 6,
        addr: text_addr,
        offset: text_off,
        size: code_start + code_size,
        addralign: 4,
        ..Default::default()
    }
    .write_to(&mut out);
    SectionHeader {
        name: 7, // .rodata
        sh_type: SHT_PROGBITS,
        flags: 2,
        addr: rodata_addr,
        offset: rodata_off,
        size: align4(unit.rodata.len() as u32),
        addralign: 4,
        ..Default::default()
    }
    .write_to(&mut out);
    SectionHeader {
        name: 15, // .bss
        sh_type: SHT_NOBITS,
        flags: 3,
        addr: bss_addr,
        offset: bss_off,
        size: unit.bss_size,
        addralign: 4,
        ..Default::default()
    }
    .write_to(&mut out);
    SectionHeader {
        name: 20, // .rela
        sh_type: SHT_RELA,
        flags: 2,
        offset: rela_off,
        size: rels_size,
        link: SHN_SYMTAB,
        info: SHN_TEXT as u32,
        addralign: 4,
        entsize: REL_SIZE,
        ..Default::default()
    }
    .write_to(&mut out);
    SectionHeader {
        name: 26, // .symtab
        sh_type: SHT_SYMTAB,
        offset: symtab_off,
        size: n_syms * SYM_SIZE,
        link: SHN_STRTAB,
        info: 1, // one local symbol (the null entry)
        addralign: 4,
        entsize: SYM_SIZE,
        ..Default::default()
    }
    .write_to(&mut out);
    SectionHeader {
        name: 34, // .strtab
        sh_type: SHT_STRTAB,
        offset: strtab_off,
        size: strtab.len() as u32,
        addralign: 1,
        ..Default::default()
    }
    .write_to(&mut out);
    SectionHeader {
        name: 42, // .shstrtab
        sh_type: SHT_STRTAB,
        offset: shstrtab_off,
        size: SHSTRTAB.len() as u32,
        addralign: 1,
        ..Default::default()
    }
    .write_to(&mut out);

    Ok(out)
}

fn push_rel(rels: &mut Vec<u8>, r_offset: u32, r_info: u32) {
    rels.extend_from_slice(&r_offset.to_le_bytes());
    rels.extend_from_slice(&r_info.to_le_bytes());
    rels.extend_from_slice(&0u32.to_le_bytes()); // addend word, always zero
}

fn pad_to(out: &mut Vec<u8>, target: u32) {
    while out.len() < target as usize {
        out.push(0);
    }
}

fn align4(x: u32) -> u32 {
    (x + 3) & !3
}
