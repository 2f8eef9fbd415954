//! The header at the start of a program image.
//!
//! All fields are little-endian:
//!
//! | offset | size | field                                        |
//! |--------|------|----------------------------------------------|
//! | 0      | long | clock frequency                              |
//! | 4      | byte | clock mode                                   |
//! | 5      | byte | checksum                                     |
//! | 6      | word | object base                                  |
//! | 8      | word | variable base                                |
//! | 10     | word | end of the image; the boot stack frame       |
//! | 12     | word | initial program counter                      |
//! | 14     | word | initial stack pointer                        |
use serde::Serialize;

use super::clockmode::ClockMode;

/// Size of the image header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Value of the two longs written just below the boot frame.  If
/// the top-level method returns, the interpreter pops these and
/// ends up executing a cog stop.
pub const TERMINATION_TRAP: u32 = 0xFFFF_F9FF;

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct ImageHeader {
    pub clock_frequency: u32,
    pub clock_mode: ClockMode,
    pub checksum: u8,
    pub object_base: u16,
    pub variable_base: u16,
    pub boot_frame: u16,
    pub program_counter: u16,
    pub stack_pointer: u16,
}

impl ImageHeader {
    /// Decodes the header from the start of `image`.  Bytes past the
    /// end of a short image read as zero, just as they do from the
    /// (cleared) hub RAM it is loaded into.
    #[must_use]
    pub fn parse(image: &[u8]) -> ImageHeader {
        let byte = |offset: usize| -> u8 { image.get(offset).copied().unwrap_or(0) };
        let word = |offset: usize| -> u16 { u16::from_le_bytes([byte(offset), byte(offset + 1)]) };
        ImageHeader {
            clock_frequency: u32::from_le_bytes([byte(0), byte(1), byte(2), byte(3)]),
            clock_mode: ClockMode::new(byte(4)),
            checksum: byte(5),
            object_base: word(6),
            variable_base: word(8),
            boot_frame: word(10),
            program_counter: word(12),
            stack_pointer: word(14),
        }
    }
}

#[test]
fn test_parse_header() {
    let image: [u8; 16] = [
        0x00, 0xB4, 0xC4, 0x04, // 80_000_000
        0x6F, // XTAL1 + PLL16X
        0xAA, // checksum
        0x10, 0x00, // object base
        0x38, 0x00, // variable base
        0x40, 0x00, // boot frame
        0x18, 0x00, // program counter
        0x48, 0x00, // stack pointer
    ];
    let header = ImageHeader::parse(&image);
    assert_eq!(header.clock_frequency, 80_000_000);
    assert_eq!(header.clock_mode, ClockMode::new(0x6F));
    assert_eq!(header.checksum, 0xAA);
    assert_eq!(header.object_base, 0x10);
    assert_eq!(header.variable_base, 0x38);
    assert_eq!(header.boot_frame, 0x40);
    assert_eq!(header.program_counter, 0x18);
    assert_eq!(header.stack_pointer, 0x48);
}

#[test]
fn test_parse_short_image() {
    let header = ImageHeader::parse(&[0x01, 0x02]);
    assert_eq!(header.clock_frequency, 0x0201);
    assert_eq!(header.stack_pointer, 0);
}
