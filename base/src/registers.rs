//! Cog register addresses.
//!
//! The top sixteen longs of each cog's memory are special purpose
//! registers.  Most of them are backed by the cog's counters and
//! video generator rather than by the RAM array.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Number of longs in a cog's memory.
pub const COG_MEMORY_LONGS: usize = 0x200;

/// Number of longs a cog loads from hub memory when it starts; the
/// special purpose registers are not loaded.
pub const COG_PROGRAM_LONGS: u32 = 0x1F0;

/// The interpreter keeps its own cog number here.
pub const INTERPRETER_COGID: u32 = 0x1E9;

/// The interpreter keeps the address of its boot frame here.
pub const INTERPRETER_INITCOGID: u32 = 0x1EF;

#[repr(u16)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize)]
pub enum SpecialRegister {
    Par = 0x1F0,
    Cnt = 0x1F1,
    Ina = 0x1F2,
    Inb = 0x1F3,
    Outa = 0x1F4,
    Outb = 0x1F5,
    Dira = 0x1F6,
    Dirb = 0x1F7,
    Ctra = 0x1F8,
    Ctrb = 0x1F9,
    Frqa = 0x1FA,
    Frqb = 0x1FB,
    Phsa = 0x1FC,
    Phsb = 0x1FD,
    Vcfg = 0x1FE,
    Vscl = 0x1FF,
}

impl SpecialRegister {
    pub const ALL: [SpecialRegister; 16] = [
        SpecialRegister::Par,
        SpecialRegister::Cnt,
        SpecialRegister::Ina,
        SpecialRegister::Inb,
        SpecialRegister::Outa,
        SpecialRegister::Outb,
        SpecialRegister::Dira,
        SpecialRegister::Dirb,
        SpecialRegister::Ctra,
        SpecialRegister::Ctrb,
        SpecialRegister::Frqa,
        SpecialRegister::Frqb,
        SpecialRegister::Phsa,
        SpecialRegister::Phsb,
        SpecialRegister::Vcfg,
        SpecialRegister::Vscl,
    ];

    /// Maps a cog address (only the low 9 bits are used) to a
    /// special register, if it is one.
    #[must_use]
    pub fn at(address: u32) -> Option<SpecialRegister> {
        let address = address & 0x1FF;
        address
            .checked_sub(0x1F0)
            .and_then(|offset| SpecialRegister::ALL.get(offset as usize).copied())
    }

    #[must_use]
    pub const fn address(self) -> u32 {
        self as u32
    }

    /// CNT, INA and INB reflect chip state and ignore writes.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            SpecialRegister::Cnt | SpecialRegister::Ina | SpecialRegister::Inb
        )
    }
}

impl Display for SpecialRegister {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpecialRegister::Par => "PAR",
            SpecialRegister::Cnt => "CNT",
            SpecialRegister::Ina => "INA",
            SpecialRegister::Inb => "INB",
            SpecialRegister::Outa => "OUTA",
            SpecialRegister::Outb => "OUTB",
            SpecialRegister::Dira => "DIRA",
            SpecialRegister::Dirb => "DIRB",
            SpecialRegister::Ctra => "CTRA",
            SpecialRegister::Ctrb => "CTRB",
            SpecialRegister::Frqa => "FRQA",
            SpecialRegister::Frqb => "FRQB",
            SpecialRegister::Phsa => "PHSA",
            SpecialRegister::Phsb => "PHSB",
            SpecialRegister::Vcfg => "VCFG",
            SpecialRegister::Vscl => "VSCL",
        })
    }
}

#[test]
fn test_special_register_lookup() {
    for reg in SpecialRegister::ALL {
        assert_eq!(SpecialRegister::at(reg.address()), Some(reg));
    }
    assert_eq!(SpecialRegister::at(0x1EF), None);
    assert_eq!(SpecialRegister::at(0), None);
    // Only the low nine bits take part in the lookup.
    assert_eq!(SpecialRegister::at(0x3F1), Some(SpecialRegister::Cnt));
}
