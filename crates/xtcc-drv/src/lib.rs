//! xtcc-drv - Compilation driver.
//!
//! The driver owns the pipeline: read the source file, run the single-pass
//! compiler, build the object image, write it out, and collect the
//! end-of-build statistics. One [`Session`] is one compilation; there is no
//! incremental state.
//!
//! Error surface: the first error of any phase aborts the run. `Display`
//! strings are the diagnostic bodies the CLI prints behind an `Error: `
//! prefix, except the two file I/O failures which keep their traditional
//! wording.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use xtcc_gen::CompiledUnit;

/// Compiler configuration for one session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Input source file.
    pub input: PathBuf,

    /// Output object file.
    pub output: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: PathBuf::from("input.c"),
            output: PathBuf::from("output.elf"),
        }
    }
}

/// Driver error type.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The input file could not be read.
    #[error("Cannot open input file: {}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output file could not be written.
    #[error("Cannot open output file: {}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A parse or code-generation error.
    #[error(transparent)]
    Compile(#[from] xtcc_gen::CodeGenError),

    /// An object-emission error.
    #[error(transparent)]
    Object(#[from] xtcc_obj::ObjError),
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// One compiler invocation.
pub struct Session {
    config: Config,
}

impl Session {
    /// Creates a session for the given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the whole pipeline and returns the build statistics.
    pub fn compile(&self) -> Result<Stats> {
        let started = Instant::now();

        debug!(input = %self.config.input.display(), "reading source");
        let source = fs::read_to_string(&self.config.input).map_err(|source| {
            DriverError::Input {
                path: self.config.input.clone(),
                source,
            }
        })?;

        debug!("parsing and generating code");
        let unit = xtcc_gen::compile(&source)?;
        drop(source); // the source buffer is dead once parsing finishes

        debug!(
            functions = unit.funcs.len(),
            literals = unit.lits.len(),
            patches = unit.patches.len(),
            "building object image"
        );
        let image = xtcc_obj::build_object(&unit)?;

        debug!(output = %self.config.output.display(), bytes = image.len(), "writing output");
        fs::write(&self.config.output, &image).map_err(|source| DriverError::Output {
            path: self.config.output.clone(),
            source,
        })?;

        let elapsed_ms = started.elapsed().as_millis() as u32;
        Ok(Stats::collect(&unit, image.len(), elapsed_ms))
    }
}

/// End-of-build report, printed after a successful compilation.
#[derive(Debug, Clone)]
pub struct Stats {
    pub lines: u32,
    pub tokens: u32,
    pub funcs: usize,
    pub globals: usize,
    pub lits: usize,
    pub patches: usize,
    pub rodata_size: usize,
    pub bss_size: u32,
    pub text_size: usize,
    pub file_size: usize,
    pub elapsed_ms: u32,
}

impl Stats {
    fn collect(unit: &CompiledUnit, file_size: usize, elapsed_ms: u32) -> Self {
        Stats {
            lines: unit.lines,
            tokens: unit.tokens,
            funcs: unit.funcs.len(),
            globals: unit.globals,
            lits: unit.lits.len(),
            patches: unit.patches.len(),
            rodata_size: unit.rodata.len(),
            bss_size: unit.bss_size,
            text_size: unit.code.len(),
            file_size,
            elapsed_ms,
        }
    }

    /// Throughput in source lines per second; zero when the build was too
    /// fast to measure.
    pub fn lines_per_sec(&self) -> u32 {
        if self.elapsed_ms > 0 {
            self.lines * 1000 / self.elapsed_ms
        } else {
            0
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "[ xtcc ] BUILD COMPLETED > OK")?;
        writeln!(f, "> IN  : {} Lines / {} Tokens", self.lines, self.tokens)?;
        writeln!(f, "> SYM : {} Funcs / {} Globals", self.funcs, self.globals)?;
        writeln!(f, "> REL : {} Literals / {} Patches", self.lits, self.patches)?;
        writeln!(
            f,
            "> MEM : {} B .rodata / {} B .bss",
            self.rodata_size, self.bss_size
        )?;
        writeln!(
            f,
            "> OUT : {} B .text / {} B ELF",
            self.text_size, self.file_size
        )?;
        write!(
            f,
            "[ {} ms ] >> {} Lines/sec <<",
            self.elapsed_ms,
            self.lines_per_sec()
        )
    }
}
