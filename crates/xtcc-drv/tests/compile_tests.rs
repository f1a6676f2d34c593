//! End-to-end compilation tests.
//!
//! Each test drives a full [`Session`] over a real input file and inspects
//! the produced object image structurally: header identity, section sizes,
//! symbols and relocations. (Actually linking and running the objects needs
//! an Xtensa toolchain and lives outside this suite.)

use std::path::PathBuf;

use tempfile::TempDir;
use xtcc_drv::{Config, Session, Stats};

const R_XTENSA_JMP_SLOT: u32 = 4;
const R_XTENSA_RELATIVE: u32 = 5;

fn compile(source: &str) -> (Vec<u8>, Stats) {
    let dir = TempDir::new().expect("create temp dir");
    let input = dir.path().join("input.c");
    let output = dir.path().join("output.elf");
    std::fs::write(&input, source).expect("write source");

    let session = Session::new(Config {
        input,
        output: output.clone(),
    });
    let stats = session.compile().expect("compilation succeeds");
    let image = std::fs::read(&output).expect("read object");
    assert_eq!(stats.file_size, image.len());
    (image, stats)
}

fn rd16(image: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([image[at], image[at + 1]])
}

fn rd32(image: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]])
}

/// Offset of section header `index`.
fn section(image: &[u8], index: usize) -> usize {
    rd32(image, 32) as usize + index * 40
}

fn section_size(image: &[u8], index: usize) -> u32 {
    rd32(image, section(image, index) + 20)
}

fn section_offset(image: &[u8], index: usize) -> usize {
    rd32(image, section(image, index) + 16) as usize
}

/// (name, st_info, st_shndx, st_value) for each non-null symbol.
fn symbols(image: &[u8]) -> Vec<(String, u8, u16, u32)> {
    let symtab = section_offset(image, 5);
    let count = section_size(image, 5) as usize / 16;
    let strtab = section_offset(image, 6);
    (1..count)
        .map(|i| {
            let sym = symtab + i * 16;
            let name_off = strtab + rd32(image, sym) as usize;
            let end = image[name_off..].iter().position(|&b| b == 0).unwrap() + name_off;
            (
                String::from_utf8_lossy(&image[name_off..end]).into_owned(),
                image[sym + 12],
                rd16(image, sym + 14),
                rd32(image, sym + 4),
            )
        })
        .collect()
}

/// Relocation type bytes in emission order.
fn relocation_types(image: &[u8]) -> Vec<u32> {
    let rela = section_offset(image, 4);
    let size = section_size(image, 4) as usize;
    (0..size)
        .step_by(12)
        .map(|entry| rd32(image, rela + entry + 4) & 0xff)
        .collect()
}

#[test]
fn test_minimal_program_is_a_valid_xtensa_object() {
    let (image, stats) = compile("int main() { return 42; }");
    assert_eq!(&image[..4], b"\x7fELF");
    assert_eq!(rd16(&image, 16), 1); // ET_REL
    assert_eq!(rd16(&image, 18), 94); // EM_XTENSA
    assert_eq!(rd16(&image, 48), 8); // eight sections
    assert_eq!(stats.funcs, 1);
    assert_eq!(stats.globals, 0);
    assert_eq!(stats.text_size, 12);
}

#[test]
fn test_global_array_program_bss_sixteen() {
    let (image, _) = compile("int g[4]; int main() { g[0] = 7; g[1] = g[0] + 1; return g[1]; }");
    assert_eq!(section_size(&image, 3), 16); // .bss
    // Global addresses relocate section-relative.
    assert!(relocation_types(&image)
        .iter()
        .all(|&t| t == R_XTENSA_RELATIVE));
}

#[test]
fn test_string_program_rodata_and_relocation() {
    let (image, stats) = compile("char *s; int main() { s = \"hi\"; return s[0] + s[1]; }");
    let rodata = section_offset(&image, 2);
    assert_eq!(&image[rodata..rodata + 3], b"hi\0");
    assert_eq!(stats.rodata_size, 3);
    // One relocation for the string pointer, one for the global it lands in.
    let types = relocation_types(&image);
    assert_eq!(types.len(), 2);
    assert!(types.iter().all(|&t| t == R_XTENSA_RELATIVE));
}

#[test]
fn test_recursive_program_has_no_undefined_symbols() {
    let (image, stats) = compile(
        "int fact(int n) { if (n < 2) return 1; return n * fact(n - 1); }\n\
         int main() { return fact(5); }",
    );
    let syms = symbols(&image);
    assert_eq!(stats.funcs, 2);
    assert!(syms.iter().any(|(name, ..)| name == "fact"));
    for (name, info, shndx, _) in &syms {
        assert_eq!(*info, 0x12, "{name} is a defined function symbol");
        assert_eq!(*shndx, 1, "{name} lives in .text");
    }
}

#[test]
fn test_enum_sized_array_and_loop() {
    let (image, stats) = compile(
        "enum { N = 3 };\n\
         int a[N];\n\
         int main() {\n\
             int i;\n\
             i = 0;\n\
             while (i < N) { a[i] = i; i = i + 1; }\n\
             return a[0] + a[1] + a[2];\n\
         }",
    );
    assert_eq!(section_size(&image, 3), 12); // .bss
    assert_eq!(stats.globals, 2); // the constant and the array
}

#[test]
fn test_external_call_gets_jmp_slot() {
    let (image, _) = compile("void exit(int); int main() { exit(7); return 0; }");
    let syms = symbols(&image);
    let (_, info, shndx, value) = syms
        .iter()
        .find(|(name, ..)| name == "exit")
        .expect("exit symbol");
    assert_eq!(*info, 0x10); // STB_GLOBAL | STT_NOTYPE
    assert_eq!(*shndx, 0); // undefined
    assert_eq!(*value, 0);
    assert!(relocation_types(&image).contains(&R_XTENSA_JMP_SLOT));
}

#[test]
fn test_defined_functions_value_includes_pool_size() {
    let (image, _) = compile(
        "int first() { return 100000; }\n\
         int main() { return first(); }",
    );
    let syms = symbols(&image);
    let (_, _, _, first_value) = syms.iter().find(|(name, ..)| name == "first").unwrap();
    // Two literal slots (the wide constant and the function address), so
    // code starts 8 bytes into .text and first sits right there.
    assert_eq!(*first_value, 8);
}

#[test]
fn test_stats_report_counts() {
    let (_, stats) = compile("int g;\nint main() { g = 1; return g; }\n");
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.funcs, 1);
    assert_eq!(stats.globals, 1);
    assert!(stats.tokens > 10);
    assert!(stats.lits >= 1); // g's address
    assert!(stats.patches >= stats.lits);
}

#[test]
fn test_missing_input_reports_original_wording() {
    let session = Session::new(Config {
        input: PathBuf::from("definitely-not-here.c"),
        output: PathBuf::from("unused.elf"),
    });
    let err = session.compile().unwrap_err().to_string();
    assert!(err.starts_with("Cannot open input file:"));
}

#[test]
fn test_compile_error_carries_line_number() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.c");
    std::fs::write(&input, "int main() {\n    return 1\n}\n").unwrap();
    let session = Session::new(Config {
        input,
        output: dir.path().join("out.elf"),
    });
    let err = session.compile().unwrap_err().to_string();
    assert_eq!(err, "Line 3: expected ';', got '}'");
}
