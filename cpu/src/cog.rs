//! Cogs: the chip's eight processors.
//!
//! All cogs share the same skeleton ([`CogCore`]): 512 longs of
//! register memory (the top 16 of which are the special registers),
//! two counters with their PLLs, a video generator and a run state.
//! What a cog *does* with that skeleton depends on its [`Engine`]:
//! either native instructions ([`native`]) or the bytecode
//! interpreter ([`interpreter`]).
//!
//! A new cog first copies 496 longs from hub memory into its
//! registers (one long per hub access), then boots its engine.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use super::clock::ClockSource;
use super::counter::FreqGenerator;
use super::fault::{Fault, FaultKind};
use super::hub::Hub;
use super::pll::{PllChannel, PllEdges, PllGroup};
use super::video::VideoGenerator;

mod alu;
mod interpreter;
mod math;
mod native;
#[cfg(test)]
mod tests;

use interpreter::Interpreter;
use native::NativeEngine;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum EngineKind {
    /// Executes native instructions from cog memory.
    Native,
    /// Executes bytecode from hub memory.
    Interpreted,
}

impl Display for EngineKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineKind::Native => "native",
            EngineKind::Interpreted => "interpreted",
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum CogRunState {
    /// Copying the program from hub memory.
    LoadProgram,
    /// About to fetch and decode a native instruction.
    Execute,
    /// A native instruction is in progress; the result is written
    /// back when the count runs out.
    WaitCycles,
    /// Waiting before entering the next state.
    WaitPrewait,
    BootInterpreter,
    /// A bytecode is in progress.
    WaitInterpreter,
    /// About to fetch a bytecode.
    ExecInterpreter,
    WaitPinsEqual,
    WaitPinsNotEqual,
    WaitCount,
    WaitVideo,
    HubReadByte,
    HubReadWord,
    HubReadLong,
    HubOperation,
}

impl CogRunState {
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            CogRunState::HubOperation
            | CogRunState::HubReadByte
            | CogRunState::HubReadWord
            | CogRunState::HubReadLong => "Waiting for hub",
            CogRunState::BootInterpreter => "Interpreter Boot",
            CogRunState::ExecInterpreter => "Interpreter Fetch",
            CogRunState::WaitInterpreter => "Interpreter Processing",
            CogRunState::Execute | CogRunState::WaitPrewait | CogRunState::WaitCycles => {
                "Running instruction"
            }
            CogRunState::LoadProgram => "Loading Program",
            CogRunState::WaitCount => "Waiting (CNT)",
            CogRunState::WaitPinsEqual => "Waiting (PEQ)",
            CogRunState::WaitPinsNotEqual => "Waiting (PNE)",
            CogRunState::WaitVideo => "Waiting (video)",
        }
    }
}

impl Display for CogRunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// How the most recent video frame ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize)]
pub enum FrameFlag {
    None,
    /// The cog was waiting in WAITVID and supplied the next frame.
    Hit,
    /// The cog was busy and the generator ran out of data.
    Miss,
}

/// Which video frame outcomes should stop the emulation, as with a
/// breakpoint.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize)]
pub enum FrameBreak {
    None,
    /// Stop at the end of every frame.
    Hit,
    /// Stop only when a frame is missed.
    Miss,
}

impl FrameBreak {
    #[must_use]
    pub fn triggered_by(self, flag: FrameFlag) -> bool {
        match self {
            FrameBreak::None => false,
            FrameBreak::Hit => flag != FrameFlag::None,
            FrameBreak::Miss => flag == FrameFlag::Miss,
        }
    }
}

/// Engine-specific parts of a cog's status.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum EngineStatus {
    Native {
        zero: bool,
        carry: bool,
    },
    Interpreted {
        object_frame: u32,
        variable_frame: u32,
        local_frame: u32,
        stack_frame: u32,
    },
}

/// A snapshot of a cog, for display.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct CogStatus {
    pub id: usize,
    pub engine: EngineKind,
    pub state: CogRunState,
    pub description: &'static str,
    pub pc: u32,
    pub breakpoint: Option<u32>,
    pub hub_accesses: u64,
    pub frames: u64,
    pub frame_flag: FrameFlag,
    pub detail: EngineStatus,
}

/// The state every cog has, whatever it executes.
#[derive(Debug, Clone)]
pub(crate) struct CogCore {
    id: usize,
    memory: [u32; COG_MEMORY_LONGS],
    pc: u32,
    breakpoint: Option<u32>,
    state: CogRunState,
    state_count: u32,
    next_state: CogRunState,
    program_address: u32,
    ctra: FreqGenerator,
    ctrb: FreqGenerator,
    video: VideoGenerator,
    pll: PllGroup,
    frame_flag: FrameFlag,
    hub_accesses: u64,
}

fn reg(r: SpecialRegister) -> usize {
    r.address() as usize
}

impl CogCore {
    fn new(id: usize, program: u32, parameter: u32, core_frequency: u32) -> CogCore {
        let mut core = CogCore {
            id,
            memory: [0; COG_MEMORY_LONGS],
            pc: 0,
            breakpoint: None,
            state: CogRunState::LoadProgram,
            state_count: 0,
            next_state: CogRunState::Execute,
            program_address: program,
            ctra: FreqGenerator::new(PllChannel::A),
            ctrb: FreqGenerator::new(PllChannel::B),
            video: VideoGenerator::new(),
            pll: PllGroup::new(),
            frame_flag: FrameFlag::None,
            hub_accesses: 0,
        };
        core.memory[reg(SpecialRegister::Par)] = parameter;
        core.pll.set_base_frequency(core_frequency);
        core
    }

    /// Reads a register as an instruction sees it: CNT, INA and INB
    /// come from the hub, and the counter and video registers from
    /// the peripherals which own them.
    fn read_register(&self, addr: u32, hub: &Hub) -> u32 {
        match SpecialRegister::at(addr) {
            Some(SpecialRegister::Cnt) => hub.counter(),
            Some(SpecialRegister::Ina) => hub.ina(),
            Some(SpecialRegister::Inb) => hub.inb(),
            Some(SpecialRegister::Ctra) => self.ctra.ctr(),
            Some(SpecialRegister::Ctrb) => self.ctrb.ctr(),
            Some(SpecialRegister::Frqa) => self.ctra.frq(),
            Some(SpecialRegister::Frqb) => self.ctrb.frq(),
            Some(SpecialRegister::Phsa) => self.ctra.phs(),
            Some(SpecialRegister::Phsb) => self.ctrb.phs(),
            Some(SpecialRegister::Vcfg) => self.video.cfg(),
            Some(SpecialRegister::Vscl) => self.video.scl(),
            _ => self.memory[(addr & 0x1FF) as usize],
        }
    }

    /// Writes a register as an instruction does.  Writes to CNT, INA
    /// and INB are dropped.  PAR is writable: the data sheet says it
    /// is read-only, but real chips accept writes and some programs
    /// depend on that.
    fn write_register(&mut self, addr: u32, value: u32, running_cogs: u8) {
        match SpecialRegister::at(addr) {
            Some(r) if r.is_read_only() => (),
            Some(SpecialRegister::Ctra) => self.ctra.set_ctr(value, &mut self.pll),
            Some(SpecialRegister::Ctrb) => self.ctrb.set_ctr(value, &mut self.pll),
            Some(SpecialRegister::Frqa) => self.ctra.set_frq(value, &mut self.pll),
            Some(SpecialRegister::Frqb) => self.ctrb.set_frq(value, &mut self.pll),
            Some(SpecialRegister::Phsa) => self.ctra.set_phs(value),
            Some(SpecialRegister::Phsb) => self.ctrb.set_phs(value),
            Some(SpecialRegister::Vcfg) => self.video.set_cfg(value, running_cogs),
            Some(SpecialRegister::Vscl) => self.video.set_scl(value),
            _ => self.memory[(addr & 0x1FF) as usize] = value,
        }
    }

    fn enter_wait(&mut self, cycles: u32, next: CogRunState) {
        self.state = CogRunState::WaitPrewait;
        self.state_count = cycles;
        self.next_state = next;
    }

    /// Copies the next long of the program into cog memory.  Returns
    /// true once the whole program has been loaded.
    fn load_next_long(&mut self, hub: &Hub) -> bool {
        self.memory[self.state_count as usize] = hub.read_long(self.program_address);
        self.program_address = self.program_address.wrapping_add(4);
        self.state_count += 1;
        if self.state_count == COG_PROGRAM_LONGS {
            self.state_count = 0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
enum Engine {
    Native(NativeEngine),
    Interpreted(Interpreter),
}

#[derive(Debug, Clone)]
pub struct Cog {
    core: CogCore,
    engine: Engine,
}

impl Cog {
    pub(crate) fn new(
        id: usize,
        kind: EngineKind,
        program: u32,
        parameter: u32,
        core_frequency: u32,
    ) -> Cog {
        event!(
            Level::DEBUG,
            "starting cog {id} ({kind}) program={program:#06x} parameter={parameter:#06x}"
        );
        let engine = match kind {
            EngineKind::Native => Engine::Native(NativeEngine::new()),
            EngineKind::Interpreted => Engine::Interpreted(Interpreter::new()),
        };
        Cog {
            core: CogCore::new(id, program, parameter, core_frequency),
            engine,
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.core.id
    }

    #[must_use]
    pub fn kind(&self) -> EngineKind {
        match self.engine {
            Engine::Native(_) => EngineKind::Native,
            Engine::Interpreted(_) => EngineKind::Interpreted,
        }
    }

    #[must_use]
    pub fn state(&self) -> CogRunState {
        self.core.state
    }

    /// The program counter: a cog register address for native cogs,
    /// a hub address for interpreted ones.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.core.pc
    }

    #[must_use]
    pub fn breakpoint(&self) -> Option<u32> {
        self.core.breakpoint
    }

    pub fn set_breakpoint(&mut self, breakpoint: Option<u32>) {
        self.core.breakpoint = breakpoint;
    }

    #[must_use]
    pub fn frame_flag(&self) -> FrameFlag {
        self.core.frame_flag
    }

    /// Number of hub access slots this cog has been offered.
    #[must_use]
    pub fn hub_accesses(&self) -> u64 {
        self.core.hub_accesses
    }

    #[must_use]
    pub fn video(&self) -> &VideoGenerator {
        &self.core.video
    }

    pub(crate) fn video_mut(&mut self) -> &mut VideoGenerator {
        &mut self.core.video
    }

    #[must_use]
    pub fn counter_a(&self) -> &FreqGenerator {
        &self.core.ctra
    }

    #[must_use]
    pub fn counter_b(&self) -> &FreqGenerator {
        &self.core.ctrb
    }

    #[must_use]
    pub fn pll(&self) -> &PllGroup {
        &self.core.pll
    }

    /// True when the cog is between instructions (or bytecodes).
    #[must_use]
    pub fn at_instruction_boundary(&self) -> bool {
        matches!(
            self.core.state,
            CogRunState::Execute | CogRunState::ExecInterpreter
        )
    }

    /// Reads register `index` as an instruction would see it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a cog register address (0 to 511).
    #[must_use]
    pub fn read_register(&self, index: usize, hub: &Hub) -> u32 {
        assert!(
            index < COG_MEMORY_LONGS,
            "cog register index {index:#x} is out of range"
        );
        self.core.read_register(index as u32, hub)
    }

    /// Writes register `index` as an instruction would.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a cog register address (0 to 511).
    pub fn write_register(&mut self, index: usize, value: u32, hub: &Hub) {
        assert!(
            index < COG_MEMORY_LONGS,
            "cog register index {index:#x} is out of range"
        );
        self.core
            .write_register(index as u32, value, hub.running_cogs());
    }

    /// Pins this cog drives high (whether or not they are outputs).
    #[must_use]
    pub fn out(&self) -> u64 {
        let core = &self.core;
        u64::from(core.memory[reg(SpecialRegister::Outa)])
            | (u64::from(core.memory[reg(SpecialRegister::Outb)]) << 32)
            | core.ctra.output(&core.pll)
            | core.ctrb.output(&core.pll)
            | core.video.output()
    }

    /// Pins this cog has set as outputs.
    #[must_use]
    pub fn dir(&self) -> u64 {
        let core = &self.core;
        u64::from(core.memory[reg(SpecialRegister::Dira)])
            | (u64::from(core.memory[reg(SpecialRegister::Dirb)]) << 32)
    }

    pub(crate) fn set_core_frequency(&mut self, frequency: u32) {
        self.core.pll.set_base_frequency(frequency);
    }

    pub(crate) fn time_until_clock(&self) -> f64 {
        self.core.pll.time_until_clock()
    }

    pub(crate) fn advance_clock(&mut self, elapsed: f64) -> PllEdges {
        self.core.pll.advance_clock(elapsed)
    }

    /// Runs the engine for one system clock, then ticks both
    /// counters.  Returns `Ok(false)` when a breakpoint was hit.
    pub(crate) fn step(&mut self, hub: &mut Hub, frame_break: FrameBreak) -> Result<bool, Fault> {
        let outcome = match &mut self.engine {
            Engine::Native(engine) => engine.step(&mut self.core, hub),
            Engine::Interpreted(engine) => engine.step(&mut self.core, hub),
        };
        let input = hub.in_pins();
        self.core.ctra.tick(input);
        self.core.ctrb.tick(input);

        let executed = outcome.map_err(|kind: FaultKind| {
            let fault = Fault {
                cog: self.core.id,
                counter: hub.counter(),
                kind,
            };
            event!(Level::WARN, "{fault}");
            fault
        })?;

        let mut running = !(executed && self.core.breakpoint == Some(self.core.pc));
        if frame_break.triggered_by(self.core.frame_flag) {
            self.core.frame_flag = FrameFlag::None;
            running = false;
        }
        Ok(running)
    }

    /// This cog's turn on the hub ring.
    pub(crate) fn hub_access(&mut self, hub: &mut Hub) {
        self.core.hub_accesses += 1;
        if self.core.state == CogRunState::LoadProgram {
            if self.core.load_next_long(hub) {
                match &mut self.engine {
                    Engine::Native(engine) => engine.boot(&mut self.core),
                    Engine::Interpreted(engine) => engine.boot(&mut self.core, hub),
                }
            }
            return;
        }
        if let Engine::Native(engine) = &mut self.engine {
            engine.hub_access(&mut self.core, hub);
        }
    }

    /// Called when the video generator has shifted out a whole
    /// frame.  If the cog is waiting in WAITVID, the waiting data
    /// starts the next frame at once.
    pub(crate) fn frame_complete(&mut self, running_cogs: u8) {
        let supplied = match &mut self.engine {
            Engine::Native(engine) => engine.supply_video(&mut self.core, running_cogs),
            Engine::Interpreted(engine) => engine.supply_video(&mut self.core),
        };
        self.core.frame_flag = if supplied {
            FrameFlag::Hit
        } else {
            FrameFlag::Miss
        };
    }

    #[must_use]
    pub fn status(&self) -> CogStatus {
        let detail = match &self.engine {
            Engine::Native(engine) => engine.status(),
            Engine::Interpreted(engine) => engine.status(),
        };
        CogStatus {
            id: self.core.id,
            engine: self.kind(),
            state: self.core.state,
            description: self.core.state.description(),
            pc: self.core.pc,
            breakpoint: self.core.breakpoint,
            hub_accesses: self.core.hub_accesses,
            frames: self.core.video.frames(),
            frame_flag: self.core.frame_flag,
            detail,
        }
    }
}
