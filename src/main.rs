use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use hc08sim::{output, srec, Emulator, RegisterFile, Switch};

/// Runs S-record programs on an emulated 8-bit HC08-style microcontroller core.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a record file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Load a record file and execute it, then print the registers
    Run {
        /// `.s19`/`.srec` file to run
        name: PathBuf,
        /// Stop after this many instructions
        #[arg(short, long)]
        steps: Option<u64>,
        /// Close a port A input switch (1-4) before starting
        #[arg(long = "switch", value_name = "N")]
        switches: Vec<Switch>,
        /// Alter a register before starting, e.g. `a=0x10` or `pc=$0100`
        #[arg(long = "set", value_name = "REG=VALUE")]
        assigns: Vec<RegAssign>,
        /// Show memory once stopped
        #[arg(short, long, value_name = "START[:LEN]")]
        dump: Option<MemRange>,
        /// Print every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Validate a record file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
}

struct RunOptions {
    steps: u64,
    switches: Vec<Switch>,
    assigns: Vec<RegAssign>,
    dump: Option<MemRange>,
    trace: bool,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    hc08sim::env::init();

    let minimal = matches!(args.command, Some(Command::Run { minimal: true, .. }));
    if minimal {
        colored::control::set_override(false);
    }
    miette::set_hook(Box::new(move |_| {
        let opts = miette::MietteHandlerOpts::new() //
            .context_lines(hc08sim::DIAGNOSTIC_CONTEXT_LINES);
        let opts = if minimal { opts.color(false) } else { opts };
        Box::new(opts.build())
    }))?;

    if hc08sim::env::is_trace_enabled() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("hc08sim=trace")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Some(Command::Run {
            name,
            steps,
            switches,
            assigns,
            dump,
            trace,
            minimal: _,
        }) => {
            let opts = RunOptions {
                steps: steps.unwrap_or_else(hc08sim::env::step_limit),
                switches,
                assigns,
                dump,
                trace,
            };
            run(&name, opts)
        }
        Some(Command::Check { name }) => {
            file_message(Green, "Checking", &name);
            let image = read_image(&name)?;
            message(
                Green,
                "Success",
                format!(
                    "{} data records, {} bytes, entry 0x{:04X}",
                    image.payloads().len(),
                    image.data_len(),
                    image.entry()
                ),
            );
            Ok(())
        }
        None => {
            if let Some(path) = args.path {
                let opts = RunOptions {
                    steps: hc08sim::env::step_limit(),
                    switches: Vec::new(),
                    assigns: Vec::new(),
                    dump: None,
                    trace: false,
                };
                run(&path, opts)
            } else {
                println!("\n~ hc08sim v{VERSION} ~");
                println!("{SHORT_INFO}");
                Ok(())
            }
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, right);
}

fn message(color: MsgColor, left: &str, right: impl Display) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// Read and validate a record file, refusing files with nothing to load
fn read_image(name: &Path) -> Result<hc08sim::SrecImage> {
    let contents = fs::read_to_string(name).into_diagnostic()?;
    let image = srec::parse(&contents)?;
    if image.is_empty() {
        bail!("File contains no data records. Nothing to load.");
    }
    Ok(image)
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    file_message(MsgColor::Green, "Loading", name);
    let image = read_image(name)?;

    let mut emu = Emulator::new();
    emu.load(image)?;
    for switch in opts.switches {
        emu.set_switch(switch, true);
    }
    if !opts.assigns.is_empty() {
        let mut regs = *emu.registers();
        for assign in &opts.assigns {
            assign.apply(&mut regs);
        }
        emu.set_registers(regs);
    }

    message(
        MsgColor::Green,
        "Running",
        format!("from 0x{:04X}", emu.registers().pc()),
    );
    let mut executed = 0;
    let fault = loop {
        if executed == opts.steps {
            break None;
        }
        let pc = emu.registers().pc();
        match emu.step() {
            Ok(instr) => {
                executed += 1;
                if opts.trace {
                    println!("{:>12} {instr}", format!("{pc:04X}").cyan());
                }
            }
            Err(err) => break Some(err),
        }
    };

    match fault {
        None => message(
            MsgColor::Green,
            "Completed",
            format!("{executed} instructions"),
        ),
        Some(_) => message(
            MsgColor::Red,
            "Faulted",
            format!("after {executed} instructions"),
        ),
    }
    println!("{}", output::registers(emu.registers()));
    if let Some(range) = opts.dump {
        print!("{}", output::memory(emu.memory(), range.start, range.len));
    }

    match fault {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Decimal, or hexadecimal with a `0x` or `$` prefix
fn parse_number(string: &str) -> Result<u32, String> {
    let (digits, radix) = match string
        .strip_prefix("0x")
        .or_else(|| string.strip_prefix("0X"))
        .or_else(|| string.strip_prefix('$'))
    {
        Some(hex) => (hex, 16),
        None => (string, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| format!("Invalid number '{}': {}", string, e))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reg {
    A,
    Pc,
    Sp,
    Hx,
    H,
    X,
    Ccr,
}

/// A register alteration given on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RegAssign {
    reg: Reg,
    value: u16,
}

impl RegAssign {
    fn apply(&self, regs: &mut RegisterFile) {
        // Width checked when parsed
        let byte = self.value as u8;
        match self.reg {
            Reg::A => regs.set_a(byte),
            Reg::Pc => regs.set_pc(self.value),
            Reg::Sp => regs.set_sp(self.value),
            Reg::Hx => regs.set_hx(self.value),
            Reg::H => regs.set_h(byte),
            Reg::X => regs.set_x(byte),
            Reg::Ccr => regs.set_ccr(byte),
        }
    }
}

impl FromStr for RegAssign {
    type Err = String;
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let Some((name, value)) = string.split_once('=') else {
            return Err(format!("Expected REG=VALUE, found '{}'", string));
        };
        let (reg, max) = match name.trim().to_ascii_lowercase().as_str() {
            "a" => (Reg::A, 0xFF),
            "pc" => (Reg::Pc, 0xFFFF),
            "sp" => (Reg::Sp, 0xFFFF),
            "hx" => (Reg::Hx, 0xFFFF),
            "h" => (Reg::H, 0xFF),
            "x" => (Reg::X, 0xFF),
            "ccr" => (Reg::Ccr, 0xFF),
            _ => return Err(format!("Unknown register '{}'", name)),
        };
        let value = parse_number(value.trim())?;
        if value > max {
            return Err(format!(
                "Value {:#x} does not fit in register '{}' (max {:#x})",
                value, name, max
            ));
        }
        Ok(RegAssign {
            reg,
            value: value as u16,
        })
    }
}

/// Range of memory to dump
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MemRange {
    start: u16,
    len: u16,
}

impl FromStr for MemRange {
    type Err = String;
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (start, len) = match string.split_once(':') {
            Some((start, len)) => (start, Some(len)),
            None => (string, None),
        };
        let start = parse_number(start)?;
        let start =
            u16::try_from(start).map_err(|_| format!("Address {:#x} is out of range", start))?;
        let len = match len {
            Some(len) => parse_number(len)?,
            None => DEFAULT_DUMP_LEN,
        };
        let len = u16::try_from(len).map_err(|_| format!("Length {:#x} is too large", len))?;
        Ok(MemRange { start, len })
    }
}

const DEFAULT_DUMP_LEN: u32 = 0x40;

const SHORT_INFO: &str = r"
Emulates a minimal 8-bit microcontroller core (ADD, AND, LDA, STA, BRA, BEQ)
and runs programs from Motorola S-record files.
Please use `-h` or `--help` to access the usage instructions.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
