use std::fmt;

/// Condition code register bits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flag {
    Carry,
    Zero,
    Negative,
    Interrupt,
    Half,
    Overflow,
}

impl Flag {
    /// Every flag, in CCR display order (high bit first).
    pub const ALL: [Flag; 6] = [
        Flag::Overflow,
        Flag::Half,
        Flag::Interrupt,
        Flag::Negative,
        Flag::Zero,
        Flag::Carry,
    ];

    // Indexed by discriminant
    const MASKS: [u8; 6] = [
        0x01, // Carry
        0x02, // Zero
        0x04, // Negative
        0x08, // Interrupt
        0x10, // Half
        0x80, // Overflow
    ];

    #[inline]
    pub const fn mask(self) -> u8 {
        Self::MASKS[self as usize]
    }

    pub const fn letter(self) -> char {
        match self {
            Flag::Carry => 'C',
            Flag::Zero => 'Z',
            Flag::Negative => 'N',
            Flag::Interrupt => 'I',
            Flag::Half => 'H',
            Flag::Overflow => 'V',
        }
    }
}

/// CPU register state.
///
/// The index register is stored once as a 16-bit value; `h` and `x` are views onto its high and
/// low bytes, so the two can never drift apart.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct RegisterFile {
    /// Accumulator
    a: u8,
    /// Program counter
    pc: u16,
    /// Stack pointer, not touched by any modelled instruction
    sp: u16,
    /// Index register, H:X
    hx: u16,
    /// Condition code register
    ccr: u8,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn a(&self) -> u8 {
        self.a
    }

    pub fn set_a(&mut self, value: u8) {
        self.a = value;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn set_sp(&mut self, value: u16) {
        self.sp = value;
    }

    pub fn hx(&self) -> u16 {
        self.hx
    }

    pub fn set_hx(&mut self, value: u16) {
        self.hx = value;
    }

    /// High byte of the index register
    pub fn h(&self) -> u8 {
        (self.hx >> 8) as u8
    }

    pub fn set_h(&mut self, value: u8) {
        self.hx = (u16::from(value) << 8) | (self.hx & 0x00FF);
    }

    /// Low byte of the index register
    pub fn x(&self) -> u8 {
        (self.hx & 0x00FF) as u8
    }

    pub fn set_x(&mut self, value: u8) {
        self.hx = (self.hx & 0xFF00) | u16::from(value);
    }

    pub fn ccr(&self) -> u8 {
        self.ccr
    }

    pub fn set_ccr(&mut self, value: u8) {
        self.ccr = value;
    }

    #[inline]
    pub fn flag(&self, flag: Flag) -> bool {
        self.ccr & flag.mask() != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag, state: bool) {
        if state {
            self.ccr |= flag.mask();
        } else {
            self.ccr &= !flag.mask();
        }
    }

    /// Increment PC by one, wrapping at the top of memory.
    #[inline]
    pub(crate) fn bump_pc(&mut self) {
        self.pc = self.pc.wrapping_add(1);
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "A   0x{:02X}", self.a)?;
        writeln!(f, "PC  0x{:04X}", self.pc)?;
        writeln!(f, "SP  0x{:04X}", self.sp)?;
        writeln!(f, "HX  0x{:04X}  (H 0x{:02X}, X 0x{:02X})", self.hx, self.h(), self.x())?;
        write!(f, "CCR 0x{:02X}  ", self.ccr)?;
        for flag in Flag::ALL {
            let ch = if self.flag(flag) { flag.letter() } else { '.' };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}
