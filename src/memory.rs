use std::fmt;
use std::str::FromStr;

use crate::error::LoadError;

/// Size of the address space: 64KB.
pub const MEMORY_MAX: usize = 0x10000;

/// Port A data register. Read-only for the CPU, and only readable while port A is an input.
pub const PORT_A_DATA: u16 = 0x0000;
/// Port A pull-up enable register
pub const PORT_A_PULLUPS: u16 = 0x0001;
/// Port A data direction register. `0x00` means every pin is an input.
pub const PORT_A_DIRECTION: u16 = 0x0003;

const HARDWARE_END: usize = 0x007F;
const RAM_END: usize = 0x107F;

/// What is attached at an address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Region {
    Unmapped,
    Hardware,
    Ram,
    Rom,
}

impl Region {
    fn of(addr: usize) -> Region {
        match addr {
            0..=HARDWARE_END => Region::Hardware,
            0x0080..=RAM_END => Region::Ram,
            0x1080..=0xFFFF => Region::Rom,
            _ => Region::Unmapped,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Unmapped => "unmapped",
            Region::Hardware => "hardware",
            Region::Ram => "RAM",
            Region::Rom => "ROM",
        };
        f.write_str(name)
    }
}

/// Input switches wired to the upper nibble of port A.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Switch {
    One,
    Two,
    Three,
    Four,
}

impl Switch {
    // Indexed by discriminant
    const MASKS: [u8; 4] = [0x10, 0x20, 0x40, 0x80];

    #[inline]
    pub const fn mask(self) -> u8 {
        Self::MASKS[self as usize]
    }
}

impl FromStr for Switch {
    type Err = String;
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let digit = string
            .strip_prefix("sw")
            .or_else(|| string.strip_prefix("SW"))
            .unwrap_or(string);
        match digit {
            "1" => Ok(Switch::One),
            "2" => Ok(Switch::Two),
            "3" => Ok(Switch::Three),
            "4" => Ok(Switch::Four),
            _ => Err(format!("Unknown switch '{}', expected 1 to 4", string)),
        }
    }
}

/// The 64KB byte store along with its fixed region map.
///
/// `read_byte`/`write_byte` are the CPU's view and apply the port A policy. `peek`/`poke` are the
/// raw view used for loading and inspection.
pub struct AddressSpace {
    mem: Box<[u8]>,
    map: Box<[Region]>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        AddressSpace {
            mem: vec![0; MEMORY_MAX].into_boxed_slice(),
            map: (0..MEMORY_MAX).map(Region::of).collect(),
        }
    }

    pub fn region(&self, addr: u32) -> Region {
        self.map
            .get(addr as usize)
            .copied()
            .unwrap_or(Region::Unmapped)
    }

    /// Read as the CPU would. Out of range addresses read as zero.
    pub fn read_byte(&self, addr: u32) -> u8 {
        let Some(&value) = self.mem.get(addr as usize) else {
            return 0;
        };
        match self.map[addr as usize] {
            Region::Hardware if addr == u32::from(PORT_A_DATA) => {
                if self.mem[PORT_A_DIRECTION as usize] == 0x00 {
                    value
                } else {
                    // Port is driving outputs
                    0
                }
            }
            Region::Hardware | Region::Ram | Region::Rom => value,
            Region::Unmapped => 0,
        }
    }

    /// Write as the CPU would. Out of range writes and writes to port A data are dropped.
    pub fn write_byte(&mut self, value: u8, addr: u32) {
        if addr as usize >= MEMORY_MAX {
            return;
        }
        match self.map[addr as usize] {
            Region::Hardware if addr == u32::from(PORT_A_DATA) => {}
            Region::Hardware | Region::Ram | Region::Rom => self.mem[addr as usize] = value,
            Region::Unmapped => {}
        }
    }

    /// Big-endian read of the bytes at `addr` and `addr + 1`.
    pub fn read_word(&self, addr: u32) -> u16 {
        u16::from_be_bytes([self.read_byte(addr), self.read_byte(addr.saturating_add(1))])
    }

    /// Big-endian write to `addr` and `addr + 1`.
    pub fn write_word(&mut self, addr: u32, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.write_byte(high, addr);
        self.write_byte(low, addr.saturating_add(1));
    }

    /// Stored byte, ignoring port policy.
    pub fn peek(&self, addr: u32) -> u8 {
        self.mem.get(addr as usize).copied().unwrap_or(0)
    }

    /// Overwrite a stored byte, ignoring port policy. Returns false if out of range.
    pub fn poke(&mut self, addr: u32, value: u8) -> bool {
        match self.mem.get_mut(addr as usize) {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }

    /// Drive one of the port A input switches.
    pub fn set_switch(&mut self, switch: Switch, state: bool) {
        let data = &mut self.mem[PORT_A_DATA as usize];
        if state {
            *data |= switch.mask();
        } else {
            *data &= !switch.mask();
        }
    }

    /// Copy record payloads into memory.
    ///
    /// Each payload starts with a big-endian load address followed by the data bytes. Bytes are
    /// written until one would land past the end of memory; anything written before that stays.
    pub fn load<P: AsRef<[u8]>>(&mut self, payloads: &[P]) -> Result<(), LoadError> {
        for payload in payloads {
            let payload = payload.as_ref();
            let [high, low, data @ ..] = payload else {
                continue;
            };
            let mut cursor = u32::from(u16::from_be_bytes([*high, *low]));
            for &byte in data {
                if !self.poke(cursor, byte) {
                    return Err(LoadError::OutOfBounds { addr: cursor });
                }
                cursor += 1;
            }
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }
}
