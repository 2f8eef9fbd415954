//! The native instruction engine.
//!
//! Each instruction takes a fetch/execute step followed by a
//! number of wait states.  Results are computed during the execute
//! step but only written back to the destination register (and the
//! flags) at the end of the wait.  The next instruction is fetched
//! before the write-back, so an instruction which modifies the one
//! directly after it has no effect on it, as on the real chip.
use tracing::{event, Level};

use base::prelude::*;

use super::alu;
use super::{CogCore, CogRunState, EngineStatus};
use crate::fault::FaultKind;
use crate::hub::Hub;

/// Clocks taken by an ALU instruction, including the execute step.
const ALU_CYCLES: u32 = 4;
/// Clocks taken by a DJNZ, TJNZ or TJZ which doesn't branch.
const BRANCH_NOT_TAKEN_CYCLES: u32 = 8;
/// Clocks from the execute step of a hub instruction until it
/// starts waiting for the hub.
const HUB_PREWAIT_CYCLES: u32 = 6;

/// The operands and pending results of the current instruction.
#[derive(Debug, Default, Clone, Copy)]
struct Pending {
    destination: u32,
    d: u32,
    s: u32,
    effects: Effects,
    result: u32,
    carry: bool,
    zero: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct NativeEngine {
    carry: bool,
    zero: bool,
    instruction: Instruction,
    pending: Pending,
}

impl NativeEngine {
    pub(crate) fn new() -> NativeEngine {
        NativeEngine {
            carry: false,
            zero: false,
            instruction: Instruction::default(),
            pending: Pending::default(),
        }
    }

    pub(crate) fn boot(&mut self, core: &mut CogCore) {
        core.state = CogRunState::Execute;
        core.pc = 0;
        self.carry = false;
        self.zero = false;
        self.instruction = Instruction::from(core.memory[0]);
        event!(Level::TRACE, "cog {} booted native code", core.id);
    }

    pub(crate) fn status(&self) -> EngineStatus {
        EngineStatus::Native {
            zero: self.zero,
            carry: self.carry,
        }
    }

    fn fetch(&mut self, core: &CogCore) {
        self.instruction = Instruction::from(core.memory[core.pc as usize]);
    }

    fn write_back(&mut self, core: &mut CogCore, running_cogs: u8) {
        let pending = self.pending;
        if pending.effects.write_result {
            core.write_register(pending.destination, pending.result, running_cogs);
        }
        if pending.effects.write_zero {
            self.zero = pending.zero;
        }
        if pending.effects.write_carry {
            self.carry = pending.carry;
        }
        core.state = CogRunState::Execute;
    }

    fn wait_cycles(&mut self, core: &mut CogCore, cycles: u32) {
        core.state = CogRunState::WaitCycles;
        core.state_count = cycles;
    }

    /// Advances the engine by one system clock.  Returns true if an
    /// instruction was started.
    pub(crate) fn step(&mut self, core: &mut CogCore, hub: &mut Hub) -> Result<bool, FaultKind> {
        match core.state {
            CogRunState::Execute => {
                self.execute(core, hub)?;
                return Ok(true);
            }
            CogRunState::WaitCycles => {
                core.state_count = core.state_count.saturating_sub(1);
                if core.state_count <= 1 {
                    self.write_back(core, hub.running_cogs());
                }
            }
            CogRunState::WaitPrewait => {
                core.state_count = core.state_count.saturating_sub(1);
                if core.state_count <= 1 {
                    core.state = core.next_state;
                }
            }
            CogRunState::WaitPinsEqual | CogRunState::WaitPinsNotEqual => {
                let port = if self.carry { hub.inb() } else { hub.ina() };
                let masked = port & self.pending.s;
                let equal = masked == self.pending.d;
                if equal == (core.state == CogRunState::WaitPinsEqual) {
                    // Z reflects the masked port but is only written with WZ.
                    self.pending.result = masked;
                    self.pending.zero = masked == 0;
                    self.pending.carry = self.carry;
                    self.write_back(core, hub.running_cogs());
                }
            }
            CogRunState::WaitCount => {
                if self.pending.d == hub.counter() {
                    let (target, overflow) = self.pending.d.overflowing_add(self.pending.s);
                    self.pending.result = target;
                    self.pending.carry = overflow;
                    self.pending.zero = target == 0;
                    self.write_back(core, hub.running_cogs());
                }
            }
            CogRunState::WaitVideo => {
                self.supply_video(core, hub.running_cogs());
            }
            // Waiting for the hub, or still loading.
            _ => (),
        }
        Ok(false)
    }

    fn execute(&mut self, core: &mut CogCore, hub: &mut Hub) -> Result<(), FaultKind> {
        let instruction = self.instruction;
        let address = core.pc;
        core.pc = (core.pc + 1) & 0x1FF;

        let destination = instruction.destination();
        let s = if instruction.immediate() {
            instruction.source()
        } else {
            core.read_register(instruction.source(), hub)
        };
        let d = core.read_register(destination, hub);
        self.pending = Pending {
            destination,
            d,
            s,
            effects: instruction.effects(),
            result: d,
            carry: self.carry,
            zero: self.zero,
        };

        if !instruction.condition().holds(self.zero, self.carry) {
            core.enter_wait(ALU_CYCLES, CogRunState::Execute);
            self.fetch(core);
            return Ok(());
        }

        let opcode = instruction.opcode();
        let mut fault = None;
        match opcode {
            Opcode::Mul | Opcode::Muls | Opcode::Enc | Opcode::Ones => {
                self.pending.result = 0;
                self.pending.carry = true;
                self.pending.zero = true;
                self.wait_cycles(core, ALU_CYCLES);
                fault = Some(FaultKind::UndefinedNativeOpcode {
                    opcode: opcode.bits(),
                    pc: address,
                });
            }
            Opcode::RwByte => core.enter_wait(HUB_PREWAIT_CYCLES, CogRunState::HubReadByte),
            Opcode::RwWord => core.enter_wait(HUB_PREWAIT_CYCLES, CogRunState::HubReadWord),
            Opcode::RwLong => core.enter_wait(HUB_PREWAIT_CYCLES, CogRunState::HubReadLong),
            Opcode::HubOp => core.enter_wait(HUB_PREWAIT_CYCLES, CogRunState::HubOperation),
            Opcode::Waitpeq => core.enter_wait(ALU_CYCLES, CogRunState::WaitPinsEqual),
            Opcode::Waitpne => core.enter_wait(ALU_CYCLES, CogRunState::WaitPinsNotEqual),
            Opcode::Waitcnt => core.enter_wait(ALU_CYCLES, CogRunState::WaitCount),
            Opcode::Waitvid => core.enter_wait(ALU_CYCLES, CogRunState::WaitVideo),
            _ => {
                if let Some(outcome) =
                    alu::evaluate(opcode, d, s, self.carry, self.zero, core.pc)
                {
                    self.pending.result = outcome.result;
                    self.pending.carry = outcome.carry;
                    self.pending.zero = outcome.zero;
                    let is_test_branch =
                        matches!(opcode, Opcode::Djnz | Opcode::Tjnz | Opcode::Tjz);
                    let cycles = match outcome.jump {
                        Some(target) => {
                            core.pc = target;
                            ALU_CYCLES
                        }
                        None if is_test_branch => BRANCH_NOT_TAKEN_CYCLES,
                        None => ALU_CYCLES,
                    };
                    self.wait_cycles(core, cycles);
                }
            }
        }
        self.fetch(core);
        match fault {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }

    /// The cog's hub window has come round.
    pub(crate) fn hub_access(&mut self, core: &mut CogCore, hub: &mut Hub) {
        let address = self.pending.s;
        let reading = self.pending.effects.write_result;
        let value = self.pending.d;
        let read = match core.state {
            CogRunState::HubOperation => {
                let result = hub.execute_hub_operation(
                    core.id,
                    HubOperation::from_bits(self.pending.s),
                    self.pending.d,
                );
                self.pending.result = result.value;
                self.pending.carry = result.carry;
                self.pending.zero = result.zero;
                None
            }
            CogRunState::HubReadByte if reading => Some(u32::from(hub.read_byte(address))),
            CogRunState::HubReadWord if reading => Some(u32::from(hub.read_word(address))),
            CogRunState::HubReadLong if reading => Some(hub.read_long(address)),
            CogRunState::HubReadByte => {
                hub.write_byte(address, value as u8);
                None
            }
            CogRunState::HubReadWord => {
                hub.write_word(address, value as u16);
                None
            }
            CogRunState::HubReadLong => {
                hub.write_long(address, value);
                None
            }
            _ => return,
        };
        if let Some(data) = read {
            self.pending.result = data;
            self.pending.zero = data == 0;
        }
        self.write_back(core, hub.running_cogs());
    }

    /// Hands the WAITVID operands to the video generator if the cog
    /// is waiting to supply them.  Returns true if it did.
    pub(crate) fn supply_video(&mut self, core: &mut CogCore, running_cogs: u8) -> bool {
        if core.state != CogRunState::WaitVideo || !core.video.ready() {
            return false;
        }
        core.video.feed(self.pending.d, self.pending.s);
        self.write_back(core, running_cogs);
        true
    }
}
