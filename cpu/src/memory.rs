//! Hub memory: 32KB of RAM followed by 32KB of ROM.
//!
//! The ROM holds the character font, math tables and the boot code.
//! A ROM image may be supplied by the caller; otherwise the math
//! tables are generated and the font area is left blank.
use conv::*;

/// Total size of the hub address space in bytes.
pub const HUB_MEMORY_SIZE: usize = 0x1_0000;
/// Size of hub RAM in bytes; the largest image which can be loaded.
pub const HUB_RAM_SIZE: usize = 0x8000;

/// Where the base-2 logarithm table starts.
pub const LOG_TABLE_BASE: usize = 0xC000;
/// Where the base-2 antilogarithm table starts.
pub const ANTILOG_TABLE_BASE: usize = 0xD000;
/// Where the quarter-wave sine table starts.
pub const SINE_TABLE_BASE: usize = 0xE000;

const TABLE_ENTRIES: usize = 0x800;

#[derive(Clone)]
pub struct HubMemory {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for HubMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubMemory")
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Default for HubMemory {
    fn default() -> HubMemory {
        HubMemory::new()
    }
}

fn table_word(value: f64) -> u16 {
    value
        .approx_as_by::<u16, RoundToNearest>()
        .unwrap_or(u16::MAX)
}

impl HubMemory {
    /// Creates hub memory with zeroed RAM and a generated ROM.
    #[must_use]
    pub fn new() -> HubMemory {
        let mut memory = HubMemory {
            bytes: vec![0; HUB_MEMORY_SIZE],
        };
        memory.generate_rom_tables();
        memory
    }

    /// Creates hub memory with zeroed RAM and the given ROM image.
    /// Only the first 32KB of `rom` are used; a short image leaves
    /// the rest of the ROM zero.
    #[must_use]
    pub fn with_rom(rom: &[u8]) -> HubMemory {
        let mut bytes = vec![0; HUB_MEMORY_SIZE];
        let len = rom.len().min(HUB_MEMORY_SIZE - HUB_RAM_SIZE);
        bytes[HUB_RAM_SIZE..HUB_RAM_SIZE + len].copy_from_slice(&rom[..len]);
        HubMemory { bytes }
    }

    fn put_table_word(&mut self, addr: usize, value: u16) {
        self.bytes[addr..addr + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn generate_rom_tables(&mut self) {
        let entries = TABLE_ENTRIES as f64;
        for i in 0..TABLE_ENTRIES {
            let x = i as f64 / entries;
            self.put_table_word(LOG_TABLE_BASE + i * 2, table_word((1.0 + x).log2() * 65536.0));
            self.put_table_word(
                ANTILOG_TABLE_BASE + i * 2,
                table_word((x.exp2() - 1.0) * 65536.0),
            );
        }
        // The sine table includes the entry for 90 degrees.
        for i in 0..=TABLE_ENTRIES {
            let angle = i as f64 / entries * std::f64::consts::FRAC_PI_2;
            self.put_table_word(SINE_TABLE_BASE + i * 2, table_word(angle.sin() * 65535.0));
        }
    }

    /// Clears hub RAM (but not ROM).
    pub fn clear_ram(&mut self) {
        self.bytes[..HUB_RAM_SIZE].fill(0);
    }

    /// The contents of hub RAM.
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.bytes[..HUB_RAM_SIZE]
    }

    /// Copies `data` into the start of hub RAM.  Data beyond the end
    /// of RAM is ignored.
    pub fn load_ram(&mut self, data: &[u8]) {
        let len = data.len().min(HUB_RAM_SIZE);
        self.bytes[..len].copy_from_slice(&data[..len]);
    }

    #[must_use]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.bytes[(addr & 0xFFFF) as usize]
    }

    /// Reads the word containing `addr` (the low address bit is
    /// ignored).
    #[must_use]
    pub fn read_word(&self, addr: u32) -> u16 {
        let a = (addr & 0xFFFE) as usize;
        u16::from_le_bytes([self.bytes[a], self.bytes[a + 1]])
    }

    /// Reads the long containing `addr` (the low two address bits
    /// are ignored).
    #[must_use]
    pub fn read_long(&self, addr: u32) -> u32 {
        let a = (addr & 0xFFFC) as usize;
        u32::from_le_bytes([
            self.bytes[a],
            self.bytes[a + 1],
            self.bytes[a + 2],
            self.bytes[a + 3],
        ])
    }

    fn writable(addr: u32) -> Option<usize> {
        // Writes to ROM are dropped.
        if addr & 0x8000 != 0 {
            None
        } else {
            Some((addr & 0x7FFF) as usize)
        }
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        if let Some(a) = HubMemory::writable(addr) {
            self.bytes[a] = value;
        }
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        if let Some(a) = HubMemory::writable(addr & !1) {
            self.bytes[a..a + 2].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn write_long(&mut self, addr: u32, value: u32) {
        if let Some(a) = HubMemory::writable(addr & !3) {
            self.bytes[a..a + 4].copy_from_slice(&value.to_le_bytes());
        }
    }
}
