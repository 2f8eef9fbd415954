//! The whole chip: hub, cogs, clocks and the things attached to its
//! pins.
//!
//! [`Propeller::step`] advances the chip by one system clock.  Within
//! a step the clocks are advanced first (which may tick counter PLLs
//! and video generators several times), then every cog runs, then
//! one cog is given its hub slot, and finally the plugins are told
//! that a clock has gone by.
use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::*;

use super::clock::{ClockSource, SystemXtal};
use super::cog::{Cog, CogStatus, EngineKind, FrameBreak};
use super::event::{PinState, Plugin, PluginId, PluginSet};
use super::fault::{BinarySizeError, Fault};
use super::hub::{Hub, HubAction};
use super::memory::{HubMemory, HUB_RAM_SIZE};
use super::pll::PllEdges;

#[cfg(test)]
mod tests;

/// [`Propeller::step_instruction`] gives up after this many system
/// clocks.
pub const STEP_INSTRUCTION_LIMIT: usize = 0x2000;

/// A snapshot of the chip-wide state, for display.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct HubStatus {
    pub counter: u32,
    pub time: f64,
    pub ring: u32,
    pub clock_mode: ClockMode,
    pub clock_mode_name: String,
    pub core_frequency: u32,
    pub xtal_frequency: u32,
    pub locks_available: u8,
    pub locks_set: u8,
    pub running_cogs: u8,
    pub in_pins: u64,
    pub out_pins: u64,
    pub dir_pins: u64,
    pub floating_pins: u64,
}

#[derive(Debug)]
pub struct Propeller {
    hub: Hub,
    cogs: [Option<Cog>; COG_COUNT],
    xtal: SystemXtal,
    time: f64,
    reset_memory: HubMemory,
    plugins: PluginSet,
    frame_break: FrameBreak,
}

impl Default for Propeller {
    fn default() -> Propeller {
        Propeller::new()
    }
}

impl Propeller {
    /// A chip whose ROM holds the generated math tables.  No program
    /// is loaded and no cog is running.
    #[must_use]
    pub fn new() -> Propeller {
        Propeller::with_memory(HubMemory::new())
    }

    /// A chip with the given ROM image (normally 32KB).
    #[must_use]
    pub fn with_rom(rom: &[u8]) -> Propeller {
        Propeller::with_memory(HubMemory::with_rom(rom))
    }

    fn with_memory(memory: HubMemory) -> Propeller {
        let mut chip = Propeller {
            hub: Hub::new(memory.clone()),
            cogs: Default::default(),
            xtal: SystemXtal::new(),
            time: 0.0,
            reset_memory: memory,
            plugins: PluginSet::default(),
            frame_break: FrameBreak::None,
        };
        chip.apply_clock_mode(ClockMode::new(0));
        chip
    }

    /// Loads a program image into hub RAM and resets the chip, which
    /// starts the image's top-level method in cog 0.
    ///
    /// An image which is empty or won't fit in hub RAM is rejected
    /// and the chip is left as it was.
    pub fn initialize(&mut self, image: &[u8]) -> Result<(), BinarySizeError> {
        if image.is_empty() || image.len() > HUB_RAM_SIZE {
            return Err(BinarySizeError { size: image.len() });
        }
        let memory = self.hub.memory_mut();
        memory.clear_ram();
        memory.load_ram(image);

        let header = ImageHeader::parse(image);
        if let Some(xtal) = header.clock_mode.xtal_frequency(header.clock_frequency) {
            self.hub.set_xtal_frequency(xtal);
        }
        self.hub.set_clock_mode(header.clock_mode);

        // If the top-level method returns, it lands on these.
        let trap = u32::from(header.boot_frame).wrapping_sub(8);
        self.hub.write_long(trap, TERMINATION_TRAP);
        self.hub.write_long(trap.wrapping_add(4), TERMINATION_TRAP);

        self.reset_memory = self.hub.memory().clone();
        event!(
            Level::INFO,
            "loaded {}-byte image; clock mode {} at {}Hz",
            image.len(),
            header.clock_mode,
            header.clock_frequency
        );
        self.reset();
        Ok(())
    }

    /// Puts the chip back into the state it was in just after the
    /// image was loaded, and boots cog 0.
    pub fn reset(&mut self) {
        event!(Level::INFO, "resetting chip");
        *self.hub.memory_mut() = self.reset_memory.clone();
        self.hub.reset();
        self.time = 0.0;
        self.cogs = Default::default();
        self.xtal = SystemXtal::new();
        self.plugins.deliver_reset();
        self.notify_if_pins_changed();

        let mode = self.hub.clock_mode().without_reset();
        self.apply_clock_mode(mode);

        let header = ImageHeader::parse(&self.hub.memory().ram()[..16]);
        let boot_frame = u32::from(header.boot_frame);
        self.hub.write_word(boot_frame.wrapping_sub(8), header.object_base);
        self.hub.write_word(boot_frame.wrapping_sub(6), header.variable_base);
        self.hub.write_word(boot_frame.wrapping_sub(4), header.program_counter);
        self.hub.write_word(boot_frame.wrapping_sub(2), header.stack_pointer);
        self.start_cog(0, EngineKind::Interpreted, INTERPRETER_ENTRY, boot_frame);
    }

    /// Changes the clock mode as CLKSET does.  A mode with the reset
    /// bit set resets the chip.
    pub fn set_clock_mode(&mut self, mode: ClockMode) {
        if mode.reset() {
            self.hub.set_clock_mode(mode);
            self.reset();
        } else {
            self.apply_clock_mode(mode);
        }
    }

    fn apply_clock_mode(&mut self, mode: ClockMode) {
        let frequency = self.hub.set_clock_mode(mode);
        for cog in self.cogs.iter_mut().flatten() {
            cog.set_core_frequency(frequency);
        }
        self.xtal.set_frequency(frequency);
        event!(Level::INFO, "clock mode {mode}: core frequency {frequency}Hz");
    }

    fn start_cog(&mut self, id: usize, engine: EngineKind, program: u32, parameter: u32) {
        self.cogs[id] = Some(Cog::new(
            id,
            engine,
            program,
            parameter,
            self.hub.core_frequency(),
        ));
        self.hub.mark_running(id, true);
    }

    fn stop_cog(&mut self, id: usize) {
        for cog in self.cogs.iter_mut().flatten() {
            cog.video_mut().detach_aural(id);
        }
        if self.cogs[id].take().is_some() {
            event!(Level::DEBUG, "stopped cog {id}");
        }
        self.hub.mark_running(id, false);
    }

    /// Carries out whatever the cogs asked the hub to do that the hub
    /// couldn't do itself.
    fn apply_actions(&mut self) {
        if !self.hub.has_actions() {
            return;
        }
        for action in self.hub.take_actions() {
            match action {
                HubAction::Start {
                    cog,
                    engine,
                    program,
                    parameter,
                } => self.start_cog(cog, engine, program, parameter),
                HubAction::Stop(cog) => self.stop_cog(cog),
                HubAction::SetClockMode(mode) if mode.reset() => {
                    // Resetting discards everything else queued.
                    self.set_clock_mode(mode);
                    return;
                }
                HubAction::SetClockMode(mode) => self.set_clock_mode(mode),
            }
        }
    }

    /// Advances the chip by one system clock.
    ///
    /// Returns `Ok(false)` if some cog hit its breakpoint (or a
    /// frame break) during the step.  If any cog faulted, the first
    /// fault is returned; every cog still completes its step.
    pub fn step(&mut self) -> Result<bool, Fault> {
        self.advance_clocks();
        let granted = self.hub.advance_ring();

        let mut running = true;
        let mut first_fault: Option<Fault> = None;
        for id in 0..COG_COUNT {
            if let Some(cog) = self.cogs[id].as_mut() {
                match cog.step(&mut self.hub, self.frame_break) {
                    Ok(still_running) => running &= still_running,
                    Err(fault) => {
                        first_fault.get_or_insert(fault);
                    }
                }
            }
            self.apply_actions();
        }

        if let Some(id) = granted {
            if let Some(cog) = self.cogs[id].as_mut() {
                cog.hub_access(&mut self.hub);
            }
            self.apply_actions();
        }

        self.notify_if_pins_changed();
        self.hub.increment_counter();
        self.plugins
            .deliver_clock(self.time, self.hub.counter(), self.hub.external_pins());
        self.notify_if_pins_changed();

        match first_fault {
            Some(fault) => Err(fault),
            None => Ok(running),
        }
    }

    /// Runs the chip until cog `id` is next about to execute an
    /// instruction (or bytecode), it stops, or a breakpoint is hit.
    pub fn step_instruction(&mut self, id: usize) -> Result<bool, Fault> {
        let span = span!(Level::DEBUG, "step_instruction", cog = id);
        let _enter = span.enter();
        for _ in 0..STEP_INSTRUCTION_LIMIT {
            if !self.step()? {
                return Ok(false);
            }
            match self.cogs.get(id).and_then(Option::as_ref) {
                Some(cog) if !cog.at_instruction_boundary() => (),
                _ => return Ok(true),
            }
        }
        event!(
            Level::DEBUG,
            "cog {id} did not reach an instruction in {STEP_INSTRUCTION_LIMIT} clocks"
        );
        Ok(true)
    }

    /// Advances the system clock and every counter PLL up to the
    /// next system clock edge.  PLL edges which come first are
    /// handled one at a time, in time order.
    fn advance_clocks(&mut self) {
        loop {
            let mut minimum = self.xtal.time_until_clock();
            let mut pll_first = false;
            for cog in self.cogs.iter().flatten() {
                let t = cog.time_until_clock();
                if t < minimum {
                    minimum = t;
                    pll_first = true;
                }
            }

            self.xtal.advance_clock(minimum);
            for id in 0..COG_COUNT {
                let edges = match self.cogs[id].as_mut() {
                    Some(cog) => cog.advance_clock(minimum),
                    None => continue,
                };
                self.dispatch_pll_edges(id, edges);
            }
            self.time += minimum;

            if !pll_first {
                break;
            }
            self.notify_if_pins_changed();
        }
    }

    fn dispatch_pll_edges(&mut self, id: usize, edges: PllEdges) {
        if let Some(level) = edges.a {
            for cog in self.cogs.iter_mut().flatten() {
                if cog.video().aural_source() == Some(id) {
                    cog.video_mut().aural_tick(level);
                }
            }
            let running_cogs = self.hub.running_cogs();
            if let Some(cog) = self.cogs[id].as_mut() {
                if cog.video_mut().color_tick(level) {
                    cog.frame_complete(running_cogs);
                }
            }
        }
        if let Some(level) = edges.b {
            if let Some(cog) = self.cogs[id].as_mut() {
                cog.video_mut().carrier_tick(level);
            }
        }
    }

    // Pins.

    /// Recomputes the pin bus from the cogs' outputs.  Returns true if
    /// anything on it changed, including pins driven from outside.
    fn refresh_pins(&mut self) -> bool {
        let before = (
            self.hub.in_pins(),
            self.hub.out_pins(),
            self.hub.dir_pins(),
        );
        let (out, dir) = self
            .cogs
            .iter()
            .flatten()
            .fold((0, 0), |(out, dir), cog| (out | cog.out(), dir | cog.dir()));
        self.hub.update_pins(out, dir);
        let external = self.hub.external_pins().take_changed();
        let after = (
            self.hub.in_pins(),
            self.hub.out_pins(),
            self.hub.dir_pins(),
        );
        external || before != after
    }

    fn notify_if_pins_changed(&mut self) {
        if self.refresh_pins() {
            let states = self.hub.pin_states();
            self.plugins
                .deliver_pins(self.time, &states, self.hub.external_pins());
            self.hub.refresh_input();
        }
    }

    /// Drives pin `pin` from outside the chip.  Plugins hear about
    /// the change on the next step.
    pub fn drive_pin(&mut self, pin: u32, floating: bool, high: bool) {
        self.hub.external_pins().drive(pin, floating, high);
        self.hub.refresh_input();
    }

    #[must_use]
    pub fn pin_states(&self) -> [PinState; PIN_COUNT] {
        self.hub.pin_states()
    }

    // Plugins.

    pub fn include_plugin(&mut self, plugin: Box<dyn Plugin>) -> PluginId {
        self.plugins.include(plugin)
    }

    pub fn remove_plugin(&mut self, id: PluginId) -> bool {
        self.plugins.remove(id)
    }

    pub fn notify_on_clock(&mut self, id: PluginId) -> bool {
        self.plugins.subscribe_clock(id)
    }

    pub fn notify_on_pins(&mut self, id: PluginId) -> bool {
        self.plugins.subscribe_pins(id)
    }

    // Debugging.

    pub fn set_frame_break(&mut self, frame_break: FrameBreak) {
        self.frame_break = frame_break;
    }

    #[must_use]
    pub fn frame_break(&self) -> FrameBreak {
        self.frame_break
    }

    /// Sets (or clears) the breakpoint of cog `id`.  Returns false if
    /// the cog isn't running.
    pub fn set_breakpoint(&mut self, id: usize, breakpoint: Option<u32>) -> bool {
        match self.cogs.get_mut(id).and_then(Option::as_mut) {
            Some(cog) => {
                cog.set_breakpoint(breakpoint);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn cog(&self, id: usize) -> Option<&Cog> {
        self.cogs.get(id).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn cog_status(&self, id: usize) -> Option<CogStatus> {
        self.cog(id).map(Cog::status)
    }

    /// Reads register `index` of cog `id`, or `None` if the cog isn't
    /// running.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a cog register address (0 to 511).
    #[must_use]
    pub fn read_cog_register(&self, id: usize, index: usize) -> Option<u32> {
        self.cog(id).map(|cog| cog.read_register(index, &self.hub))
    }

    /// Writes register `index` of cog `id`.  Returns false if the cog
    /// isn't running.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a cog register address (0 to 511).
    pub fn write_cog_register(&mut self, id: usize, index: usize, value: u32) -> bool {
        match self.cogs.get_mut(id).and_then(Option::as_mut) {
            Some(cog) => {
                cog.write_register(index, value, &self.hub);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    #[must_use]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.hub.read_byte(addr)
    }

    #[must_use]
    pub fn read_word(&self, addr: u32) -> u16 {
        self.hub.read_word(addr)
    }

    #[must_use]
    pub fn read_long(&self, addr: u32) -> u32 {
        self.hub.read_long(addr)
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.hub.write_byte(addr, value);
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        self.hub.write_word(addr, value);
    }

    pub fn write_long(&mut self, addr: u32, value: u32) {
        self.hub.write_long(addr, value);
    }

    // Status.

    #[must_use]
    pub fn clock_mode(&self) -> ClockMode {
        self.hub.clock_mode()
    }

    #[must_use]
    pub fn core_frequency(&self) -> u32 {
        self.hub.core_frequency()
    }

    #[must_use]
    pub fn xtal_frequency(&self) -> u32 {
        self.hub.xtal_frequency()
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.hub.counter()
    }

    /// Emulated time since reset, in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn ring(&self) -> u32 {
        self.hub.ring()
    }

    #[must_use]
    pub fn ina(&self) -> u32 {
        self.hub.ina()
    }

    #[must_use]
    pub fn inb(&self) -> u32 {
        self.hub.inb()
    }

    #[must_use]
    pub fn status(&self) -> HubStatus {
        let hub = &self.hub;
        HubStatus {
            counter: hub.counter(),
            time: self.time,
            ring: hub.ring(),
            clock_mode: hub.clock_mode(),
            clock_mode_name: hub.clock_mode().to_string(),
            core_frequency: hub.core_frequency(),
            xtal_frequency: hub.xtal_frequency(),
            locks_available: hub.locks_available(),
            locks_set: hub.locks_set(),
            running_cogs: hub.running_cogs(),
            in_pins: hub.in_pins(),
            out_pins: hub.out_pins(),
            dir_pins: hub.dir_pins(),
            floating_pins: hub.floating_pins(),
        }
    }
}

impl Drop for Propeller {
    fn drop(&mut self) {
        self.plugins.close_all();
    }
}
