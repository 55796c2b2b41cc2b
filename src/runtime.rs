use std::fmt;

use crate::error::{LoadError, StepError};
use crate::memory::{AddressSpace, Switch};
use crate::registers::{Flag, RegisterFile};
use crate::srec::SrecImage;

/// Opcodes at or above this carry an addressing mode in their high nibble.
const ADDRESSED_MIN: u8 = 0xA0;

const MODE_IMMEDIATE: u8 = 0xA0;
const MODE_DIRECT: u8 = 0xB0;

const OP_BRA: u8 = 0x20;
const OP_BEQ: u8 = 0x27;

/// Complete emulator state: registers, memory, and the last program loaded.
///
/// Every call runs to completion; nothing here loops or blocks on its own. A driver wanting to
/// "run" calls [`Emulator::step`] repeatedly and stops when it chooses to.
pub struct Emulator {
    regs: RegisterFile,
    mem: AddressSpace,
    /// Last successful load, replayed by `reload`
    image: Option<SrecImage>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mnemonic {
    Add,
    And,
    Lda,
    Sta,
    Bra,
    Beq,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mnemonic::Add => "ADD",
            Mnemonic::And => "AND",
            Mnemonic::Lda => "LDA",
            Mnemonic::Sta => "STA",
            Mnemonic::Bra => "BRA",
            Mnemonic::Beq => "BEQ",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    /// Operand is the byte following the opcode
    Immediate,
    /// Operand is stored at the 8-bit address following the opcode
    Direct,
    /// Signed 8-bit offset from the address after the instruction
    Relative,
}

/// An instruction which has been executed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: Mode,
    /// The byte following the opcode
    pub operand: u8,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Immediate => write!(f, "{} #$", self.mnemonic)?,
            Mode::Direct => write!(f, "{} $", self.mnemonic)?,
            Mode::Relative => return write!(f, "{} {:+}", self.mnemonic, self.operand as i8),
        }
        write!(f, "{:02X}", self.operand)
    }
}

#[derive(Clone, Copy)]
struct Operand {
    /// Data the instruction works on
    value: u8,
    /// Direct address; the literal itself in immediate mode
    addr: u8,
}

type Op = fn(&mut Emulator, Operand);

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Emulator {
    pub fn new() -> Self {
        Emulator {
            regs: RegisterFile::new(),
            mem: AddressSpace::new(),
            image: None,
        }
    }

    /// Place a program in memory and point PC at its entry address.
    ///
    /// The image is remembered for [`Emulator::reload`] only if every byte fit.
    pub fn load(&mut self, image: SrecImage) -> Result<(), LoadError> {
        self.regs.set_pc(image.entry());
        self.mem.load(image.payloads())?;
        tracing::debug!(
            entry = image.entry(),
            bytes = image.data_len(),
            "loaded program"
        );
        self.image = Some(image);
        Ok(())
    }

    /// Replace registers and memory with fresh zeroed state. The loaded program is kept.
    pub fn reset(&mut self) {
        self.regs = RegisterFile::new();
        self.mem = AddressSpace::new();
        tracing::debug!("reset");
    }

    /// Load the last successfully loaded program again.
    pub fn reload(&mut self) -> Result<(), LoadError> {
        let image = self.image.take().ok_or(LoadError::NothingLoaded)?;
        let result = self.load(image.clone());
        if result.is_err() {
            self.image = Some(image);
        }
        result
    }

    pub fn image(&self) -> Option<&SrecImage> {
        self.image.as_ref()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn set_registers(&mut self, regs: RegisterFile) {
        self.regs = regs;
    }

    pub fn memory(&self) -> &AddressSpace {
        &self.mem
    }

    pub fn read_byte(&self, addr: u32) -> u8 {
        self.mem.read_byte(addr)
    }

    pub fn write_byte(&mut self, value: u8, addr: u32) {
        self.mem.write_byte(value, addr)
    }

    pub fn read_word(&self, addr: u32) -> u16 {
        self.mem.read_word(addr)
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        self.mem.write_word(addr, value)
    }

    pub fn peek(&self, addr: u32) -> u8 {
        self.mem.peek(addr)
    }

    pub fn poke(&mut self, addr: u32, value: u8) -> bool {
        self.mem.poke(addr, value)
    }

    pub fn set_switch(&mut self, switch: Switch, state: bool) {
        self.mem.set_switch(switch, state)
    }

    // Indexed by low nibble of an addressed opcode
    const OP_TABLE: [Option<(Mnemonic, Op)>; 16] = [
        None,                                   // 0x0
        None,                                   // 0x1
        None,                                   // 0x2
        None,                                   // 0x3
        Some((Mnemonic::And, Self::and as Op)), // 0x4
        None,                                   // 0x5
        Some((Mnemonic::Lda, Self::lda as Op)), // 0x6
        Some((Mnemonic::Sta, Self::sta as Op)), // 0x7
        None,                                   // 0x8
        None,                                   // 0x9
        None,                                   // 0xA
        Some((Mnemonic::Add, Self::add as Op)), // 0xB
        None,                                   // 0xC
        None,                                   // 0xD
        None,                                   // 0xE
        None,                                   // 0xF
    ];

    /// Execute a single instruction.
    ///
    /// On failure, PC stays past whatever bytes were already fetched.
    pub fn step(&mut self) -> Result<Instruction, StepError> {
        let pc = self.regs.pc();
        let opcode = self.fetch();
        let instr = if opcode >= ADDRESSED_MIN {
            self.execute(opcode, pc)?
        } else {
            self.execute_branch(opcode, pc)?
        };
        tracing::trace!(pc, opcode, "{instr}");
        Ok(instr)
    }

    /// Read the byte at PC and move past it
    #[inline]
    fn fetch(&mut self) -> u8 {
        let byte = self.mem.read_byte(u32::from(self.regs.pc()));
        self.regs.bump_pc();
        byte
    }

    fn execute(&mut self, opcode: u8, pc: u16) -> Result<Instruction, StepError> {
        let (mode, operand) = match opcode & 0xF0 {
            MODE_IMMEDIATE => {
                let value = self.fetch();
                (Mode::Immediate, Operand { value, addr: value })
            }
            MODE_DIRECT => {
                let addr = self.fetch();
                let value = self.mem.read_byte(u32::from(addr));
                (Mode::Direct, Operand { value, addr })
            }
            _ => return Err(StepError::InvalidAddressingMode { opcode, pc }),
        };

        let Some((mnemonic, op)) = Self::OP_TABLE[usize::from(opcode & 0x0F)] else {
            return Err(StepError::InvalidOpcode { opcode, pc });
        };
        // Nowhere to store to
        if mnemonic == Mnemonic::Sta && mode == Mode::Immediate {
            return Err(StepError::InvalidAddressingMode { opcode, pc });
        }
        op(self, operand);

        Ok(Instruction {
            opcode,
            mnemonic,
            mode,
            operand: operand.addr,
        })
    }

    fn execute_branch(&mut self, opcode: u8, pc: u16) -> Result<Instruction, StepError> {
        let (mnemonic, taken) = match opcode {
            OP_BRA => (Mnemonic::Bra, true),
            OP_BEQ => (Mnemonic::Beq, self.regs.flag(Flag::Zero)),
            _ => return Err(StepError::InvalidOpcode { opcode, pc }),
        };
        let offset = self.fetch();
        if taken {
            self.branch_by(offset);
        }
        Ok(Instruction {
            opcode,
            mnemonic,
            mode: Mode::Relative,
            operand: offset,
        })
    }

    /// Move PC by a signed offset, modulo the size of memory.
    #[inline]
    fn branch_by(&mut self, offset: u8) {
        let pc = self.regs.pc().wrapping_add_signed(i16::from(offset as i8));
        self.regs.set_pc(pc);
    }

    #[inline]
    fn set_nz(&mut self, val: u8) {
        self.regs.set_flag(Flag::Negative, val & 0x80 != 0);
        self.regs.set_flag(Flag::Zero, val == 0);
    }

    fn add(&mut self, operand: Operand) {
        let a = self.regs.a();
        let m = operand.value;
        let (res, carry) = a.overflowing_add(m);
        self.regs.set_a(res);

        // Both operands share a sign which the result does not
        self.regs
            .set_flag(Flag::Overflow, (a ^ res) & (m ^ res) & 0x80 != 0);
        // Carry out of bit 3
        self.regs
            .set_flag(Flag::Half, (a & 0x0F) + (m & 0x0F) > 0x0F);
        self.set_nz(res);
        self.regs.set_flag(Flag::Carry, carry);
    }

    fn and(&mut self, operand: Operand) {
        let res = self.regs.a() & operand.value;
        self.regs.set_a(res);
        self.regs.set_flag(Flag::Overflow, false);
        self.set_nz(res);
    }

    fn lda(&mut self, operand: Operand) {
        self.regs.set_a(operand.value);
        self.regs.set_flag(Flag::Overflow, false);
        self.set_nz(operand.value);
    }

    fn sta(&mut self, operand: Operand) {
        let a = self.regs.a();
        self.mem.write_byte(a, u32::from(operand.addr));
        self.regs.set_flag(Flag::Overflow, false);
        self.set_nz(a);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::{PORT_A_DATA, PORT_A_DIRECTION};

    const ORIGIN: u16 = 0x0080;

    fn with_program(program: &[u8]) -> Emulator {
        let mut emu = Emulator::new();
        for (i, &byte) in program.iter().enumerate() {
            assert!(emu.poke(u32::from(ORIGIN) + i as u32, byte));
        }
        let mut regs = *emu.registers();
        regs.set_pc(ORIGIN);
        emu.set_registers(regs);
        emu
    }

    fn flags(emu: &Emulator) -> [bool; 6] {
        Flag::ALL.map(|flag| emu.registers().flag(flag))
    }

    #[test]
    fn load_then_lda_immediate() {
        let mut emu = Emulator::new();
        let image = SrecImage::new(0x0080, vec![vec![0x00, 0x80, 0xA6, 0x05]]);
        emu.load(image).unwrap();
        assert_eq!(emu.registers().pc(), 0x0080);

        let instr = emu.step().unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Lda);
        assert_eq!(instr.mode, Mode::Immediate);
        assert_eq!(instr.to_string(), "LDA #$05");

        let regs = emu.registers();
        assert_eq!(regs.a(), 0x05);
        assert_eq!(regs.pc(), 0x0082);
        assert!(!regs.flag(Flag::Zero));
        assert!(!regs.flag(Flag::Negative));
    }

    #[test]
    fn add_all_operand_pairs() {
        let mut emu = with_program(&[0xAB, 0x00]);
        for a in 0..=u8::MAX {
            for b in 0..=u8::MAX {
                let mut regs = *emu.registers();
                regs.set_pc(ORIGIN);
                regs.set_a(a);
                emu.set_registers(regs);
                emu.poke(u32::from(ORIGIN) + 1, b);
                emu.step().unwrap();

                let regs = emu.registers();
                let sum = u16::from(a) + u16::from(b);
                let res = (sum % 256) as u8;
                let sign = |v: u8| v & 0x80 != 0;
                let ctx = format!("{a:#04x} + {b:#04x}");

                assert_eq!(regs.a(), res, "{ctx}");
                assert_eq!(regs.flag(Flag::Carry), sum > 0xFF, "{ctx}");
                assert_eq!(
                    regs.flag(Flag::Overflow),
                    sign(a) == sign(b) && sign(res) != sign(a),
                    "{ctx}"
                );
                assert_eq!(regs.flag(Flag::Zero), res == 0, "{ctx}");
                assert_eq!(regs.flag(Flag::Negative), sign(res), "{ctx}");
            }
        }
    }

    #[test]
    fn half_carry_over_nibble_pairs() {
        let mut emu = with_program(&[0xAB, 0x00]);
        for x in 0..16u8 {
            for y in 0..16u8 {
                // Upper nibbles must not affect the result
                for high in [0x00, 0x70, 0xF0] {
                    let mut regs = *emu.registers();
                    regs.set_pc(ORIGIN);
                    regs.set_a(high | x);
                    emu.set_registers(regs);
                    emu.poke(u32::from(ORIGIN) + 1, y);
                    emu.step().unwrap();
                    assert_eq!(
                        emu.registers().flag(Flag::Half),
                        x + y > 0x0F,
                        "{:#04x} + {y:#04x}",
                        high | x
                    );
                }
            }
        }
    }

    #[test]
    fn and_leaves_carry_and_half() {
        let mut emu = with_program(&[0xA4, 0x0F, 0xA4, 0xF0]);
        let mut regs = *emu.registers();
        regs.set_a(0x8C);
        regs.set_flag(Flag::Carry, true);
        regs.set_flag(Flag::Half, true);
        regs.set_flag(Flag::Overflow, true);
        emu.set_registers(regs);

        emu.step().unwrap();
        let regs = emu.registers();
        assert_eq!(regs.a(), 0x0C);
        // [V, H, I, N, Z, C]
        assert_eq!(flags(&emu), [false, true, false, false, false, true]);
        assert_eq!(regs.pc(), 0x0082);

        emu.step().unwrap();
        assert_eq!(emu.registers().a(), 0x00);
        assert_eq!(flags(&emu), [false, true, false, false, true, true]);
    }

    #[test]
    fn lda_direct_and_negative() {
        let mut emu = with_program(&[0xB6, 0x90]);
        emu.poke(0x0090, 0x80);
        let instr = emu.step().unwrap();
        assert_eq!(instr.to_string(), "LDA $90");
        assert_eq!(emu.registers().a(), 0x80);
        assert!(emu.registers().flag(Flag::Negative));
        assert!(!emu.registers().flag(Flag::Zero));
    }

    #[test]
    fn lda_from_port_a_honours_direction() {
        let mut emu = with_program(&[0xB6, 0x00, 0xB6, 0x00]);
        emu.set_switch(Switch::One, true);
        emu.set_switch(Switch::Three, true);
        emu.step().unwrap();
        assert_eq!(emu.registers().a(), 0x50);

        emu.write_byte(0xFF, u32::from(PORT_A_DIRECTION));
        emu.step().unwrap();
        assert_eq!(emu.registers().a(), 0x00);
        assert!(emu.registers().flag(Flag::Zero));
    }

    #[test]
    fn sta_direct() {
        let mut emu = with_program(&[0xA6, 0x00, 0xB7, 0x90, 0xA6, 0x42, 0xB7, 0x90]);
        emu.poke(0x0090, 0x11);
        let mut regs = *emu.registers();
        regs.set_flag(Flag::Overflow, true);
        emu.set_registers(regs);

        emu.step().unwrap();
        emu.step().unwrap();
        assert_eq!(emu.peek(0x0090), 0x00);
        assert!(emu.registers().flag(Flag::Zero));
        assert!(!emu.registers().flag(Flag::Overflow));

        emu.step().unwrap();
        emu.step().unwrap();
        assert_eq!(emu.peek(0x0090), 0x42);
        assert!(!emu.registers().flag(Flag::Zero));
    }

    #[test]
    fn sta_to_port_a_is_dropped() {
        let mut emu = with_program(&[0xA6, 0xFF, 0xB7, 0x00]);
        emu.poke(PORT_A_DATA.into(), 0x10);
        emu.step().unwrap();
        emu.step().unwrap();
        assert_eq!(emu.peek(PORT_A_DATA.into()), 0x10);
    }

    #[test]
    fn sta_immediate_is_rejected() {
        let mut emu = with_program(&[0xA7, 0x90]);
        assert_eq!(
            emu.step(),
            Err(StepError::InvalidAddressingMode {
                opcode: 0xA7,
                pc: ORIGIN
            })
        );
        assert_eq!(emu.registers().pc(), ORIGIN + 2);
        assert_eq!(emu.peek(0x0090), 0x00);
    }

    #[test]
    fn decode_failures() {
        #[rustfmt::skip]
        let cases = [
            // (opcode, error, pc advance)
            (0x01, StepError::InvalidOpcode { opcode: 0x01, pc: ORIGIN }, 1),
            (0x9F, StepError::InvalidOpcode { opcode: 0x9F, pc: ORIGIN }, 1),
            (0xC6, StepError::InvalidAddressingMode { opcode: 0xC6, pc: ORIGIN }, 1),
            (0xFF, StepError::InvalidAddressingMode { opcode: 0xFF, pc: ORIGIN }, 1),
            (0xA0, StepError::InvalidOpcode { opcode: 0xA0, pc: ORIGIN }, 2),
            (0xBC, StepError::InvalidOpcode { opcode: 0xBC, pc: ORIGIN }, 2),
        ];
        for (opcode, error, advance) in cases {
            let mut emu = with_program(&[opcode, 0x12]);
            let mut regs = *emu.registers();
            regs.set_a(0x33);
            emu.set_registers(regs);

            assert_eq!(emu.step(), Err(error), "{opcode:#04x}");
            let regs = emu.registers();
            assert_eq!(regs.pc(), ORIGIN + advance, "{opcode:#04x}");
            assert_eq!(regs.a(), 0x33);
            assert_eq!(regs.ccr(), 0x00);
        }
    }

    #[test]
    fn fetch_wraps_pc() {
        let mut emu = Emulator::new();
        emu.poke(0xFFFF, 0xA6);
        emu.poke(0x0000, 0x07);
        let mut regs = *emu.registers();
        regs.set_pc(0xFFFF);
        emu.set_registers(regs);

        emu.step().unwrap();
        assert_eq!(emu.registers().a(), 0x07);
        assert_eq!(emu.registers().pc(), 0x0001);
    }

    #[test]
    fn bra_forward_and_back() {
        let mut emu = with_program(&[0x20, 0x04]);
        emu.step().unwrap();
        assert_eq!(emu.registers().pc(), ORIGIN + 6);

        let mut emu = with_program(&[0x20, 0xFE]);
        let instr = emu.step().unwrap();
        assert_eq!(instr.to_string(), "BRA -2");
        assert_eq!(emu.registers().pc(), ORIGIN);
    }

    #[test]
    fn bra_wraps_around_memory() {
        // Forward across the top
        let mut emu = Emulator::new();
        emu.poke(0xFFFD, 0x20);
        emu.poke(0xFFFE, 0x05);
        let mut regs = *emu.registers();
        regs.set_pc(0xFFFD);
        emu.set_registers(regs);
        emu.step().unwrap();
        assert_eq!(emu.registers().pc(), 0x0004);

        // Backward across the bottom
        let mut emu = Emulator::new();
        emu.poke(0x0002, 0x20);
        emu.poke(0x0003, 0xF8);
        let mut regs = *emu.registers();
        regs.set_pc(0x0002);
        emu.set_registers(regs);
        emu.step().unwrap();
        assert_eq!(emu.registers().pc(), 0xFFFC);
    }

    #[test]
    fn branch_there_and_back() {
        let mut emu = Emulator::new();
        for start in [0x0000, 0x0001, 0x007F, 0x8000, 0xFF80, 0xFFFF] {
            for n in 0..=127u8 {
                let mut regs = *emu.registers();
                regs.set_pc(start);
                emu.set_registers(regs);

                emu.branch_by(n);
                emu.branch_by(n.wrapping_neg());
                assert_eq!(emu.registers().pc(), start, "{start:#06x} by {n}");

                emu.branch_by(n.wrapping_neg());
                emu.branch_by(n);
                assert_eq!(emu.registers().pc(), start, "{start:#06x} by -{n}");
            }
        }
    }

    #[test]
    fn beq_follows_zero_flag() {
        for offset in [0x00, 0x10, 0x7F, 0x80, 0xF0] {
            let mut beq = with_program(&[0x27, offset]);
            beq.step().unwrap();
            assert_eq!(beq.registers().pc(), ORIGIN + 2, "not taken {offset:#04x}");

            let mut beq = with_program(&[0x27, offset]);
            let mut regs = *beq.registers();
            regs.set_flag(Flag::Zero, true);
            beq.set_registers(regs);
            beq.step().unwrap();

            let mut bra = with_program(&[0x20, offset]);
            bra.step().unwrap();
            assert_eq!(
                beq.registers().pc(),
                bra.registers().pc(),
                "taken {offset:#04x}"
            );
        }
    }

    #[test]
    fn runs_small_program() {
        // LDA #$05, ADD #$03, STA $90, AND #$00, BEQ -2
        let mut emu = with_program(&[
            0xA6, 0x05, 0xAB, 0x03, 0xB7, 0x90, 0xA4, 0x00, 0x27, 0xFE,
        ]);
        let mnemonics: Vec<_> = (0..5).map(|_| emu.step().unwrap().mnemonic).collect();
        assert_eq!(
            mnemonics,
            [
                Mnemonic::Lda,
                Mnemonic::Add,
                Mnemonic::Sta,
                Mnemonic::And,
                Mnemonic::Beq
            ]
        );
        assert_eq!(emu.peek(0x0090), 0x08);
        assert_eq!(emu.registers().a(), 0x00);
        assert!(emu.registers().flag(Flag::Zero));
        assert_eq!(emu.registers().pc(), 0x0088);

        // Spins on the branch
        emu.step().unwrap();
        assert_eq!(emu.registers().pc(), 0x0088);
    }

    #[test]
    fn reset_and_reload() {
        let mut emu = Emulator::new();
        assert_eq!(emu.reload(), Err(LoadError::NothingLoaded));

        let image = SrecImage::new(0x0100, vec![vec![0x01, 0x00, 0xA6, 0x09]]);
        emu.load(image.clone()).unwrap();
        emu.step().unwrap();
        emu.write_byte(0x77, 0x0200);
        assert_eq!(emu.registers().a(), 0x09);

        emu.reset();
        assert_eq!(*emu.registers(), RegisterFile::new());
        assert_eq!(emu.peek(0x0100), 0x00);
        assert_eq!(emu.image(), Some(&image));

        emu.reload().unwrap();
        assert_eq!(emu.registers().pc(), 0x0100);
        assert_eq!(emu.peek(0x0101), 0x09);
        assert_eq!(emu.peek(0x0200), 0x00);
        emu.step().unwrap();
        assert_eq!(emu.registers().a(), 0x09);
    }

    #[test]
    fn failed_load_is_not_remembered() {
        let mut emu = Emulator::new();
        let image = SrecImage::new(0x0000, vec![vec![0xFF, 0xFF, 0x01, 0x02]]);
        assert_eq!(
            emu.load(image),
            Err(LoadError::OutOfBounds { addr: 0x10000 })
        );
        assert!(emu.image().is_none());
        assert_eq!(emu.peek(0xFFFF), 0x01);
    }

    #[test]
    fn word_access() {
        let mut emu = Emulator::new();
        emu.write_word(0x0090, 0x1234);
        assert_eq!(emu.read_word(0x0090), 0x1234);
        assert_eq!(emu.read_byte(0x0091), 0x34);
    }
}
