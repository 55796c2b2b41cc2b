use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

// Execution errors

/// Failure of a single fetch/decode/execute cycle.
///
/// PC is left wherever the fetch phase moved it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, Diagnostic)]
pub enum StepError {
    #[error("Invalid addressing mode in opcode 0x{opcode:02X} at 0x{pc:04X}")]
    #[diagnostic(
        code(step::addressing_mode),
        help("only immediate (0xAn) and direct (0xBn) addressing are supported")
    )]
    InvalidAddressingMode { opcode: u8, pc: u16 },

    #[error("Invalid opcode 0x{opcode:02X} at 0x{pc:04X}")]
    #[diagnostic(
        code(step::opcode),
        help("supported instructions are ADD, AND, LDA, STA, BRA and BEQ; reset and reload to retry")
    )]
    InvalidOpcode { opcode: u8, pc: u16 },
}

// Loading errors

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, Diagnostic)]
pub enum LoadError {
    #[error("Memory out of bounds: record data runs past 0xFFFF (write to 0x{addr:X})")]
    #[diagnostic(
        code(load::out_of_bounds),
        help("memory up to the failing byte has been written; reset before loading another file")
    )]
    OutOfBounds { addr: u32 },

    #[error("No program has been loaded")]
    #[diagnostic(code(load::nothing_loaded), help("load a valid record file first"))]
    NothingLoaded,
}

// Record file errors

/// A record which failed validation. The whole file is rejected.
#[derive(Debug, Error, Diagnostic)]
#[error("Malformed record #{index}: {defect}")]
#[diagnostic(
    code(srec::malformed),
    help("nothing was loaded; fix or regenerate the record file")
)]
pub struct MalformedRecord {
    /// Zero-based position of the record within the file
    pub index: usize,
    pub defect: Defect,
    #[source_code]
    src: String,
    #[label("{defect}")]
    span: SourceSpan,
}

impl MalformedRecord {
    pub(crate) fn new(index: usize, defect: Defect, src: &str, span: SourceSpan) -> Self {
        MalformedRecord {
            index,
            defect,
            src: src.to_string(),
            span,
        }
    }

    pub fn span(&self) -> SourceSpan {
        self.span
    }
}

/// What exactly is wrong with a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Defect {
    #[error("record is empty")]
    Empty,
    #[error("unsupported record type 'S{0}'")]
    UnsupportedType(char),
    #[error("record has an odd number of hex digits")]
    OddLength,
    #[error("'{0}' is not a hex digit")]
    BadHexDigit(char),
    #[error("record is too short to hold an address and checksum")]
    TooShort,
    #[error("declared byte count {declared:#04x} but found {actual:#04x}")]
    CountMismatch { declared: u8, actual: usize },
    #[error("checksum should be {expected:02X} but is {found:02X}")]
    ChecksumMismatch { expected: u8, found: u8 },
}
