use std::fmt::Write as _;

use colored::Colorize;

use crate::memory::AddressSpace;
use crate::registers::RegisterFile;

/// Bytes shown per line of a memory dump
const ROW_WIDTH: u32 = 16;

/// Register listing framed the same way as a memory dump.
pub fn registers(regs: &RegisterFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "------ Registers ------".bold());
    let _ = writeln!(out, "{regs}");
    let _ = write!(out, "{}", "-----------------------".bold());
    out
}

/// Hex dump of `len` stored bytes starting at `start`, clipped to the end of memory.
///
/// Bytes are shown as stored, without the port A read policy, so a viewer sees what is really
/// there.
pub fn memory(mem: &AddressSpace, start: u16, len: u16) -> String {
    let start = u32::from(start);
    let end = (start + u32::from(len)).min(crate::memory::MEMORY_MAX as u32);

    let mut out = String::new();
    let mut addr = start;
    while addr < end {
        let row_end = (addr + ROW_WIDTH).min(end);
        let _ = write!(
            out,
            "{} {:<8}",
            format!("{addr:04X}").cyan(),
            mem.region(addr).to_string()
        );
        for byte_addr in addr..row_end {
            let _ = write!(out, " {:02X}", mem.peek(byte_addr));
        }
        out.push('\n');
        addr = row_end;
    }
    out
}
