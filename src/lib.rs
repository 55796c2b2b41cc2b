// Loading
pub mod srec;
pub use srec::SrecImage;

// Running
mod runtime;
pub use runtime::{Emulator, Instruction, Mnemonic, Mode};
mod memory;
pub use memory::{
    AddressSpace, Region, Switch, MEMORY_MAX, PORT_A_DATA, PORT_A_DIRECTION, PORT_A_PULLUPS,
};
mod registers;
pub use registers::{Flag, RegisterFile};

mod error;
pub use error::{Defect, LoadError, MalformedRecord, StepError};

pub mod env;
pub mod output;

/// Amount of lines to show as context, each side of a malformed record.
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 2;
