//! The hub: state shared by all cogs.
//!
//! The hub owns main memory, the locks, the system counter, the
//! ring position and the pin bus.  Cogs are given a mutable borrow
//! of the hub while they step.  Hub operations which create or
//! destroy cogs, or change the clock, can't be carried out while a
//! cog is borrowing the hub, so they are queued as [`HubAction`]s
//! and applied by the caller once the cog has finished its step.
use serde::Serialize;
use tracing::{event, Level};

use base::clockmode::RCFAST_FREQUENCY;
use base::prelude::*;

use super::cog::EngineKind;
use super::event::{PinDriver, PinState};
use super::memory::HubMemory;

/// A change which the hub can't make itself, because it concerns
/// the cogs or clocks.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum HubAction {
    Start {
        cog: usize,
        engine: EngineKind,
        program: u32,
        parameter: u32,
    },
    Stop(usize),
    SetClockMode(ClockMode),
}

/// What a hub operation produced: a result value and flags.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct HubOpResult {
    pub value: u32,
    pub carry: bool,
    pub zero: bool,
}

impl HubOpResult {
    fn new(value: u32, carry: bool) -> HubOpResult {
        HubOpResult {
            value,
            carry,
            zero: value == 0,
        }
    }
}

/// The value returned by LOCKNEW and COGINIT when nothing is free.
pub const NONE_FREE: u32 = 0xFFFF_FFFF;

const ALL_LOCKS: u8 = 0xFF;

#[derive(Debug, Clone)]
pub struct Hub {
    memory: HubMemory,
    locks_available: u8,
    locks_set: u8,
    counter: u32,
    ring: u32,
    clock_mode: ClockMode,
    core_frequency: u32,
    xtal_frequency: u32,
    external: PinDriver,
    out: u64,
    dir: u64,
    input: u64,
    running_cogs: u8,
    actions: Vec<HubAction>,
}

impl Hub {
    #[must_use]
    pub fn new(memory: HubMemory) -> Hub {
        Hub {
            memory,
            locks_available: ALL_LOCKS,
            locks_set: 0,
            counter: 0,
            ring: 0,
            clock_mode: ClockMode::new(0),
            core_frequency: RCFAST_FREQUENCY,
            xtal_frequency: 0,
            external: PinDriver::new(),
            out: 0,
            dir: 0,
            input: 0,
            running_cogs: 0,
            actions: Vec::new(),
        }
    }

    /// Puts the locks, counters and cog bookkeeping back into their
    /// power-on state.  Memory, clock settings and external pin
    /// drive are not affected.
    pub(crate) fn reset(&mut self) {
        self.locks_available = ALL_LOCKS;
        self.locks_set = 0;
        self.counter = 0;
        self.ring = 0;
        self.running_cogs = 0;
        self.actions.clear();
        self.update_pins(0, 0);
    }

    #[must_use]
    pub fn memory(&self) -> &HubMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut HubMemory {
        &mut self.memory
    }

    #[must_use]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.memory.read_byte(addr)
    }

    #[must_use]
    pub fn read_word(&self, addr: u32) -> u16 {
        self.memory.read_word(addr)
    }

    #[must_use]
    pub fn read_long(&self, addr: u32) -> u32 {
        self.memory.read_long(addr)
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.memory.write_byte(addr, value);
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        self.memory.write_word(addr, value);
    }

    pub fn write_long(&mut self, addr: u32, value: u32) {
        self.memory.write_long(addr, value);
    }

    /// The system counter (CNT).
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub(crate) fn increment_counter(&mut self) {
        self.counter = self.counter.wrapping_add(1);
    }

    /// Position of the hub ring, 0 to 15.  When the position is even,
    /// cog `ring >> 1` has access to hub memory.
    #[must_use]
    pub fn ring(&self) -> u32 {
        self.ring
    }

    /// Moves the ring on by one position and returns the cog (if
    /// any) whose turn it now is.
    pub(crate) fn advance_ring(&mut self) -> Option<usize> {
        self.ring = (self.ring + 1) & 0xF;
        if self.ring & 1 == 0 {
            Some((self.ring >> 1) as usize)
        } else {
            None
        }
    }

    #[must_use]
    pub fn clock_mode(&self) -> ClockMode {
        self.clock_mode
    }

    #[must_use]
    pub fn core_frequency(&self) -> u32 {
        self.core_frequency
    }

    #[must_use]
    pub fn xtal_frequency(&self) -> u32 {
        self.xtal_frequency
    }

    pub(crate) fn set_xtal_frequency(&mut self, frequency: u32) {
        self.xtal_frequency = frequency;
    }

    /// Records a new clock mode and returns the core frequency it
    /// produces.
    pub(crate) fn set_clock_mode(&mut self, mode: ClockMode) -> u32 {
        self.clock_mode = mode;
        self.core_frequency = mode.core_frequency(self.xtal_frequency);
        self.core_frequency
    }

    /// Bit `n` is set when lock `n` has not been allocated.
    #[must_use]
    pub fn locks_available(&self) -> u8 {
        self.locks_available
    }

    /// Bit `n` is set when lock `n` is set.
    #[must_use]
    pub fn locks_set(&self) -> u8 {
        self.locks_set
    }

    /// Bit `n` is set when cog `n` is running (or about to start).
    #[must_use]
    pub fn running_cogs(&self) -> u8 {
        self.running_cogs
    }

    pub(crate) fn mark_running(&mut self, cog: usize, running: bool) {
        let bit = 1u8 << (cog & 7);
        if running {
            self.running_cogs |= bit;
        } else {
            self.running_cogs &= !bit;
        }
    }

    pub(crate) fn take_actions(&mut self) -> Vec<HubAction> {
        std::mem::take(&mut self.actions)
    }

    pub(crate) fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    fn queue(&mut self, action: HubAction) {
        self.actions.push(action);
    }

    // Pins.

    /// The chip's inputs: each pin reads what the chip drives onto it
    /// if some cog has it as an output, and what is driven from
    /// outside otherwise.
    #[must_use]
    pub fn in_pins(&self) -> u64 {
        self.input
    }

    /// Port A (pins 0 to 31) of the inputs.
    #[must_use]
    pub fn ina(&self) -> u32 {
        (self.input & 0xFFFF_FFFF) as u32
    }

    /// Port B (pins 32 to 63) of the inputs.
    #[must_use]
    pub fn inb(&self) -> u32 {
        (self.input >> 32) as u32
    }

    /// Pins which some cog drives high.
    #[must_use]
    pub fn out_pins(&self) -> u64 {
        self.out
    }

    /// Pins which some cog has as outputs.
    #[must_use]
    pub fn dir_pins(&self) -> u64 {
        self.dir
    }

    /// Pins which are not driven from outside.
    #[must_use]
    pub fn floating_pins(&self) -> u64 {
        self.external.floating()
    }

    pub fn external_pins(&mut self) -> &mut PinDriver {
        &mut self.external
    }

    /// Replaces the cogs' combined outputs and directions.
    pub(crate) fn update_pins(&mut self, out: u64, dir: u64) {
        self.out = out;
        self.dir = dir;
        self.refresh_input();
    }

    pub(crate) fn refresh_input(&mut self) {
        self.input = (self.out & self.dir) | (self.external.high() & !self.dir);
    }

    /// The state of each pin as seen from outside.
    #[must_use]
    pub fn pin_states(&self) -> [PinState; PIN_COUNT] {
        let mut states = [PinState::Floating; PIN_COUNT];
        let floating = self.external.floating();
        let high = self.external.high();
        for (i, state) in states.iter_mut().enumerate() {
            let bit = 1u64 << i;
            *state = if self.dir & bit != 0 {
                if self.out & bit != 0 {
                    PinState::OutputHi
                } else {
                    PinState::OutputLo
                }
            } else if floating & bit != 0 {
                PinState::Floating
            } else if high & bit != 0 {
                PinState::InputHi
            } else {
                PinState::InputLo
            };
        }
        states
    }

    // Hub operations.

    fn lowest_free_cog(&self) -> Option<usize> {
        (0..COG_COUNT).find(|i| self.running_cogs & (1 << i) == 0)
    }

    fn cog_init(&mut self, arg: u32) -> HubOpResult {
        let request = CogInitRequest::decode(arg);
        let cog = match request.cog {
            CogSelection::AnyFree => match self.lowest_free_cog() {
                Some(cog) => cog,
                None => {
                    event!(Level::DEBUG, "COGINIT found no free cog");
                    return HubOpResult::new(NONE_FREE, true);
                }
            },
            CogSelection::Specific(cog) => {
                if self.running_cogs & (1 << cog) != 0 {
                    self.queue(HubAction::Stop(cog));
                }
                cog
            }
        };
        // Claim the slot now, so that a second COGINIT in the same
        // step picks a different one.
        self.mark_running(cog, true);
        let engine = if request.is_interpreter() {
            EngineKind::Interpreted
        } else {
            EngineKind::Native
        };
        self.queue(HubAction::Start {
            cog,
            engine,
            program: request.program,
            parameter: request.parameter,
        });
        HubOpResult::new(cog as u32, false)
    }

    /// Carries out hub operation `op` on behalf of cog `caller`.
    ///
    /// Exhausting the cogs or locks is not an error: as on the real
    /// chip, it is reported by setting the carry flag and returning
    /// [`NONE_FREE`].
    pub fn execute_hub_operation(&mut self, caller: usize, op: HubOperation, arg: u32) -> HubOpResult {
        let lock = arg & 7;
        let lock_bit = 1u8 << lock;
        let result = match op {
            HubOperation::ClkSet => {
                self.queue(HubAction::SetClockMode(ClockMode::new((arg & 0xFF) as u8)));
                HubOpResult::new(arg, false)
            }
            HubOperation::CogId => HubOpResult::new(caller as u32, false),
            HubOperation::CogInit => self.cog_init(arg),
            HubOperation::CogStop => {
                let cog = (arg & 7) as usize;
                self.mark_running(cog, false);
                self.queue(HubAction::Stop(cog));
                HubOpResult::new(arg, false)
            }
            HubOperation::LockNew => match (0..LOCK_COUNT as u32).find(|i| self.locks_available & (1 << i) != 0) {
                Some(lock) => {
                    self.locks_available &= !(1 << lock);
                    event!(Level::DEBUG, "cog {caller} allocated lock {lock}");
                    HubOpResult::new(lock, false)
                }
                None => HubOpResult::new(NONE_FREE, true),
            },
            HubOperation::LockReturn => {
                self.locks_available |= lock_bit;
                event!(Level::DEBUG, "cog {caller} returned lock {lock}");
                HubOpResult::new(arg, false)
            }
            HubOperation::LockSet => {
                let was_set = self.locks_set & lock_bit != 0;
                self.locks_set |= lock_bit;
                HubOpResult::new(arg, was_set)
            }
            HubOperation::LockClear => {
                let was_set = self.locks_set & lock_bit != 0;
                self.locks_set &= !lock_bit;
                HubOpResult::new(arg, was_set)
            }
        };
        event!(
            Level::TRACE,
            "cog {caller} {op} {arg:#010x} -> {:#010x} C={} Z={}",
            result.value,
            result.carry,
            result.zero
        );
        result
    }
}
