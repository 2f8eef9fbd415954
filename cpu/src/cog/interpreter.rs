//! The bytecode interpreter.
//!
//! On the real chip, the interpreter is a native program loaded
//! from ROM.  Here it is emulated directly: each bytecode is
//! executed in one step and then the cog idles for a fixed number
//! of clocks.
//!
//! The interpreter keeps four frame pointers into hub memory: the
//! object (code and constants), the variables of the current object
//! instance, the locals of the current method and the top of the
//! expression stack.  The expression stack grows upwards in longs.
//!
//! A method call happens in two stages.  A "frame" bytecode saves
//! the caller's frame pointers on the stack and reserves space for
//! the return value and the return address; the arguments are then
//! evaluated, and finally a "call" bytecode fills in the return
//! address and jumps.  Between the two stages, the interpreter must
//! remember where the return address goes (`pending_calls`).  It
//! also remembers, for each frame, whether the caller wants the
//! return value and whether it traps aborts (`return_masks`).
use tracing::{event, Level};

use base::bytecode::{read_packed_signed, read_packed_unsigned};
use base::prelude::*;

use super::math;
use super::{CogCore, CogRunState, EngineStatus};
use crate::fault::FaultKind;
use crate::hub::{Hub, HubOpResult};
use crate::memory::HUB_MEMORY_SIZE;

/// Clocks from the start of a cog until the first bytecode.
const BOOT_CYCLES: u32 = 48;
/// Clocks taken by every bytecode.
const BYTECODE_CYCLES: u32 = 32;
/// Spin's value for TRUE.
const TRUE: u32 = 0xFFFF_FFFF;
/// Upper bound on the iterations of string and block operations.
/// Hub addresses wrap at this size, so longer operations only go
/// over the same memory again.
const BLOCK_LIMIT: u32 = HUB_MEMORY_SIZE as u32;

fn truth(value: bool) -> u32 {
    if value {
        TRUE
    } else {
        0
    }
}

/// Operands of the wait bytecodes, kept until the wait is over.
#[derive(Debug, Default, Clone, Copy)]
struct WaitOperands {
    port_b: bool,
    mask: u32,
    target: u32,
    colors: u32,
    pixels: u32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Interpreter {
    object_frame: u32,
    variable_frame: u32,
    local_frame: u32,
    stack_frame: u32,
    return_masks: Vec<u32>,
    pending_calls: Vec<u32>,
    /// Set by bytecode 0x15: the next COGINIT starts a Spin method
    /// rather than native code.
    start_interpreter: bool,
    wait: WaitOperands,
}

impl Interpreter {
    pub(crate) fn new() -> Interpreter {
        Interpreter::default()
    }

    /// Sets up the frame pointers from the boot frame whose address
    /// is in PAR.
    pub(crate) fn boot(&mut self, core: &mut CogCore, hub: &mut Hub) {
        core.state = CogRunState::BootInterpreter;
        core.state_count = BOOT_CYCLES;

        let frame = core.memory[SpecialRegister::Par.address() as usize] & 0xFFFF;
        core.memory[INTERPRETER_COGID as usize] = core.id as u32;

        self.object_frame = u32::from(hub.read_word(frame.wrapping_sub(8)));
        self.variable_frame = u32::from(hub.read_word(frame.wrapping_sub(6)));
        core.pc = u32::from(hub.read_word(frame.wrapping_sub(4)));
        self.stack_frame = u32::from(hub.read_word(frame.wrapping_sub(2))).wrapping_sub(4);
        self.local_frame = frame.wrapping_sub(4);
        self.return_masks.clear();
        self.pending_calls.clear();
        self.start_interpreter = false;

        core.memory[INTERPRETER_INITCOGID as usize] = frame.wrapping_sub(4);
        hub.write_long(frame.wrapping_sub(8), TRUE);
        hub.write_long(frame.wrapping_sub(4), 0);
        event!(
            Level::TRACE,
            "cog {} booted interpreter: pc={:#06x} object={:#06x} variables={:#06x} stack={:#06x}",
            core.id,
            core.pc,
            self.object_frame,
            self.variable_frame,
            self.stack_frame
        );
    }

    pub(crate) fn status(&self) -> EngineStatus {
        EngineStatus::Interpreted {
            object_frame: self.object_frame,
            variable_frame: self.variable_frame,
            local_frame: self.local_frame,
            stack_frame: self.stack_frame,
        }
    }

    /// Advances the interpreter by one system clock.  Returns true
    /// if a bytecode was executed.
    pub(crate) fn step(&mut self, core: &mut CogCore, hub: &mut Hub) -> Result<bool, FaultKind> {
        match core.state {
            CogRunState::BootInterpreter | CogRunState::WaitInterpreter => {
                core.state_count = core.state_count.saturating_sub(1);
                if core.state_count == 0 {
                    core.state = CogRunState::ExecInterpreter;
                }
            }
            CogRunState::ExecInterpreter => {
                core.state = CogRunState::WaitInterpreter;
                core.state_count = BYTECODE_CYCLES;
                Machine {
                    frames: self,
                    core,
                    hub,
                }
                .execute()?;
                return Ok(true);
            }
            CogRunState::WaitPinsEqual | CogRunState::WaitPinsNotEqual => {
                let port = if self.wait.port_b { hub.inb() } else { hub.ina() };
                let equal = port & self.wait.mask == self.wait.target;
                if equal == (core.state == CogRunState::WaitPinsEqual) {
                    core.state = CogRunState::ExecInterpreter;
                }
            }
            CogRunState::WaitCount => {
                if self.wait.target == hub.counter() {
                    core.state = CogRunState::ExecInterpreter;
                }
            }
            CogRunState::WaitVideo => {
                self.supply_video(core);
            }
            _ => (),
        }
        Ok(false)
    }

    /// Hands waiting WAITVID operands to the video generator.
    /// Returns true if it did.
    pub(crate) fn supply_video(&mut self, core: &mut CogCore) -> bool {
        if core.state != CogRunState::WaitVideo || !core.video.ready() {
            return false;
        }
        core.video.feed(self.wait.colors, self.wait.pixels);
        core.state = CogRunState::ExecInterpreter;
        true
    }
}

/// The interpreter, its cog and the hub, for the duration of one
/// bytecode.
struct Machine<'a> {
    frames: &'a mut Interpreter,
    core: &'a mut CogCore,
    hub: &'a mut Hub,
}

impl Machine<'_> {
    fn push(&mut self, value: u32) {
        self.hub.write_long(self.frames.stack_frame, value);
        self.frames.stack_frame = self.frames.stack_frame.wrapping_add(4);
    }

    fn pop(&mut self) -> u32 {
        self.frames.stack_frame = self.frames.stack_frame.wrapping_sub(4);
        self.hub.read_long(self.frames.stack_frame)
    }

    fn push_word(&mut self, value: u32) {
        self.hub.write_word(self.frames.stack_frame, value as u16);
        self.frames.stack_frame = self.frames.stack_frame.wrapping_add(2);
    }

    fn pop_word(&mut self) -> u32 {
        self.frames.stack_frame = self.frames.stack_frame.wrapping_sub(2);
        u32::from(self.hub.read_word(self.frames.stack_frame))
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self.hub.read_byte(self.core.pc);
        self.core.pc = self.core.pc.wrapping_add(1);
        byte
    }

    fn branch_offset(&mut self) -> u32 {
        let hub = &*self.hub;
        let pc = &mut self.core.pc;
        read_packed_signed(|| {
            let byte = hub.read_byte(*pc);
            *pc = pc.wrapping_add(1);
            byte
        })
    }

    fn unsigned_offset(&mut self) -> u32 {
        let hub = &*self.hub;
        let pc = &mut self.core.pc;
        read_packed_unsigned(|| {
            let byte = hub.read_byte(*pc);
            *pc = pc.wrapping_add(1);
            byte
        })
    }

    fn jump_relative(&mut self, offset: u32) {
        self.core.pc = self.core.pc.wrapping_add(offset);
    }

    fn jump_in_object(&mut self, offset: u32) {
        self.core.pc = offset.wrapping_add(self.frames.object_frame);
    }

    fn hub_operation(&mut self, op: HubOperation, arg: u32) -> HubOpResult {
        self.hub.execute_hub_operation(self.core.id, op, arg)
    }

    fn read_register(&self, address: u32) -> u32 {
        self.core.read_register(address, &*self.hub)
    }

    fn write_register(&mut self, address: u32, value: u32) {
        let running = self.hub.running_cogs();
        self.core.write_register(address, value, running);
    }

    fn read_sized(&self, size: AccessSize, address: u32) -> u32 {
        match size {
            AccessSize::Byte => u32::from(self.hub.read_byte(address)),
            AccessSize::Word => u32::from(self.hub.read_word(address)),
            AccessSize::Long => self.hub.read_long(address),
        }
    }

    fn write_sized(&mut self, size: AccessSize, address: u32, value: u32) {
        match size {
            AccessSize::Byte => self.hub.write_byte(address, value as u8),
            AccessSize::Word => self.hub.write_word(address, value as u16),
            AccessSize::Long => self.hub.write_long(address, value),
        }
    }

    fn execute(&mut self) -> Result<(), FaultKind> {
        let at = self.core.pc;
        let op = self.next_byte();
        match OpcodeFamily::classify(op) {
            OpcodeFamily::Math(operator) => {
                let value = self.pop();
                let result = self.math(operator, false, value);
                self.push(result);
                Ok(())
            }
            OpcodeFamily::MemoryAccess(access) => self.memory_access(access),
            OpcodeFamily::VariableAccess(access) => self.variable_access(access),
            OpcodeFamily::Special(op) => self.special(op, at),
        }
    }

    /// Applies a math operator.  For a bytecode, `initial` is the
    /// popped right-hand operand and the left-hand one is popped
    /// next; for an assignment it is the variable's value and the
    /// right-hand operand is popped.
    fn math(&mut self, op: MathOperator, in_place: bool, initial: u32) -> u32 {
        if let Some(result) = math::unary(op, initial) {
            return result;
        }
        let (left, right) = if in_place {
            (initial, self.pop())
        } else {
            (self.pop(), initial)
        };
        math::binary(op, left, right)
    }

    fn memory_access(&mut self, access: MemoryAccess) -> Result<(), FaultKind> {
        let mut address = match access.space {
            AddressSpace::Main => self.pop(),
            AddressSpace::Object => self.frames.object_frame.wrapping_add(self.unsigned_offset()),
            AddressSpace::Variable => self
                .frames
                .variable_frame
                .wrapping_add(self.unsigned_offset()),
            AddressSpace::Local => self.frames.local_frame.wrapping_add(self.unsigned_offset()),
        };
        if access.indexed {
            let shift = access.size.shift();
            let popped = self.pop();
            address = if access.space == AddressSpace::Main {
                // The address was pushed before the index.
                popped.wrapping_add(address << shift)
            } else {
                address.wrapping_add(popped << shift)
            };
        }
        match access.kind {
            AccessKind::Push => {
                let value = self.read_sized(access.size, address);
                self.push(value);
            }
            AccessKind::Pop => {
                let value = self.pop();
                self.write_sized(access.size, address, value);
            }
            AccessKind::Effect => {
                let value = self.read_sized(access.size, address);
                let stored = self.effect(value)?;
                self.write_sized(access.size, address, stored);
            }
            AccessKind::Reference => self.push(address),
        }
        Ok(())
    }

    fn variable_access(&mut self, access: VariableAccess) -> Result<(), FaultKind> {
        let base = match access.space {
            AddressSpace::Local => self.frames.local_frame,
            _ => self.frames.variable_frame,
        };
        let address = base.wrapping_add(access.offset);
        match access.kind {
            AccessKind::Push => {
                let value = self.hub.read_long(address);
                self.push(value);
            }
            AccessKind::Pop => {
                let value = self.pop();
                self.hub.write_long(address, value);
            }
            AccessKind::Effect => {
                let value = self.hub.read_long(address);
                let stored = self.effect(value)?;
                self.hub.write_long(address, stored);
            }
            AccessKind::Reference => self.push(address),
        }
        Ok(())
    }

    /// Carries out the in-place effect whose effect byte is next in
    /// the instruction stream, returning the value to store back.
    fn effect(&mut self, original: u32) -> Result<u32, FaultKind> {
        let at = self.core.pc;
        let EffectByte { effect, push } = EffectByte::decode(self.next_byte());
        let (result, stored) = match effect {
            Effect::Assign(op) => {
                let value = self.math(op, true, original);
                (value, value)
            }
            Effect::Copy => {
                let value = self.pop();
                (value, value)
            }
            Effect::RepeatCompare => {
                let end = self.pop() as i32;
                let start = self.pop() as i32;
                let branch = self.branch_offset();
                let mut value = original as i32;
                let again = if end < start {
                    value = value.wrapping_sub(1);
                    value >= end
                } else {
                    value = value.wrapping_add(1);
                    value <= end
                };
                if again {
                    self.jump_relative(branch);
                }
                (value as u32, value as u32)
            }
            Effect::RepeatCompareStep => {
                let mut end = self.pop() as i32;
                let mut start = self.pop() as i32;
                let step = self.pop() as i32;
                let branch = self.branch_offset();
                if end < start {
                    std::mem::swap(&mut start, &mut end);
                }
                let value = (original as i32).wrapping_add(step);
                if (start..=end).contains(&value) {
                    self.jump_relative(branch);
                }
                (value as u32, value as u32)
            }
            Effect::RandomForward => {
                let value = math::random_forward(original);
                (value, value)
            }
            Effect::RandomReverse => {
                let value = math::random_reverse(original);
                (value, value)
            }
            Effect::SignExtendByte => {
                let value = math::sign_extend_byte(original);
                (value, value)
            }
            Effect::SignExtendWord => {
                let value = math::sign_extend_word(original);
                (value, value)
            }
            Effect::PostClear => (original, 0),
            Effect::PostSet => (original, TRUE),
            Effect::PreIncrement(width) => {
                let value = original.wrapping_add(1) & width.mask();
                (value, value)
            }
            Effect::PostIncrement(width) => (original, original.wrapping_add(1) & width.mask()),
            Effect::PreDecrement(width) => {
                let value = original.wrapping_sub(1) & width.mask();
                (value, value)
            }
            Effect::PostDecrement(width) => (original, original.wrapping_sub(1) & width.mask()),
            Effect::Undefined(code) => {
                return Err(FaultKind::UndefinedEffect {
                    effect: code,
                    pc: at,
                })
            }
        };
        if push {
            self.push(result);
        }
        Ok(stored)
    }

    /// Reads, writes or applies an effect to the bits of a cog
    /// register selected by `mask`, whose lowest bit is `lowest`.
    fn register_access(&mut self, mask: u32, lowest: u32) -> Result<(), FaultKind> {
        let at = self.core.pc;
        let byte = self.next_byte();
        let access = RegisterAccess::decode(byte).ok_or(FaultKind::UndefinedRegisterOp {
            op: byte,
            pc: at,
        })?;
        let register = access.register;
        let current = self.read_register(register);
        match access.kind {
            AccessKind::Push => self.push((current & mask) >> lowest),
            AccessKind::Pop => {
                let value = self.pop();
                self.write_register(register, (current & !mask) | ((value << lowest) & mask));
            }
            AccessKind::Effect => {
                let stored = self.effect((current & mask) >> lowest)?;
                self.write_register(register, (current & !mask) | ((stored << lowest) & mask));
            }
            AccessKind::Reference => {
                return Err(FaultKind::UndefinedRegisterOp { op: byte, pc: at });
            }
        }
        Ok(())
    }

    /// Bytecodes 0x00-0x03: save the caller's frame.  Bit 0 set
    /// means the return value is discarded; bit 1 set means the
    /// frame traps aborts.
    fn push_frame(&mut self, kind: u8) {
        self.frames.return_masks.push(u32::from(kind & 3));
        let (object, variables, locals) = (
            self.frames.object_frame,
            self.frames.variable_frame,
            self.frames.local_frame,
        );
        self.push_word(object);
        self.push_word(variables);
        self.push_word(locals);
        self.frames.pending_calls.push(self.frames.stack_frame);
        // The return address is filled in by the call.
        self.push_word(0);
        // The return value.
        self.push(0);
    }

    /// Bytecodes 0x05-0x07: call a method of this object, of a child
    /// object, or of an element of an array of child objects.
    fn call(&mut self, op: u8, at: u32) -> Result<(), FaultKind> {
        if op != 0x05 {
            let mut entry = (u32::from(self.next_byte()) * 4).wrapping_add(self.frames.object_frame);
            if op == 0x07 {
                entry = entry.wrapping_add(self.pop().wrapping_mul(4));
            }
            self.frames.object_frame = self
                .frames
                .object_frame
                .wrapping_add(u32::from(self.hub.read_word(entry)));
            self.frames.variable_frame = self
                .frames
                .variable_frame
                .wrapping_add(u32::from(self.hub.read_word(entry.wrapping_add(2))));
        }
        let method = (u32::from(self.next_byte()) * 4).wrapping_add(self.frames.object_frame);
        let return_pointer = self
            .frames
            .pending_calls
            .pop()
            .ok_or(FaultKind::CallWithoutFrame { pc: at })?;
        self.frames.local_frame = return_pointer.wrapping_add(2);
        self.hub.write_word(return_pointer, self.core.pc as u16);
        self.core.pc = self
            .frames
            .object_frame
            .wrapping_add(u32::from(self.hub.read_word(method)));
        self.frames.stack_frame = self
            .frames
            .stack_frame
            .wrapping_add(u32::from(self.hub.read_word(method.wrapping_add(2))));
        Ok(())
    }

    /// Returns (or aborts) from the current method.  An abort
    /// unwinds frames until it reaches one which traps it.
    /// Returning from the top-level method stops the cog.
    fn return_from_method(&mut self, value: u32, abort: bool) {
        let mut want_value;
        loop {
            self.frames.stack_frame = self.frames.local_frame;
            let Some(mask) = self.frames.return_masks.pop() else {
                event!(Level::DEBUG, "cog {} returned from its top-level method", self.core.id);
                let id = self.core.id as u32;
                self.hub_operation(HubOperation::CogStop, id);
                return;
            };
            let trap = mask & 2 != 0;
            want_value = mask & 1 == 0;
            self.core.pc = self.pop_word();
            self.frames.local_frame = self.pop_word();
            self.frames.variable_frame = self.pop_word();
            self.frames.object_frame = self.pop_word();
            if !abort || trap {
                break;
            }
        }
        if want_value {
            self.push(value);
        }
    }

    /// COGINIT from Spin.  This either starts a Spin method in a new
    /// interpreter (after bytecode 0x15) or native code.
    fn cog_init(&mut self) -> HubOpResult {
        let (code, cog) = if std::mem::take(&mut self.frames.start_interpreter) {
            let stack = self.pop().wrapping_add(11) & !3;
            let packed = self.pop();
            let arguments = (packed >> 8) & 0xFF;
            let method = self.frames.object_frame.wrapping_add((packed & 0xFF) * 4);
            let object = self.frames.object_frame;

            let entry = u32::from(self.hub.read_word(method)).wrapping_add(object);
            let mut argument_address = (arguments * 4).wrapping_add(stack).wrapping_sub(4);
            let method_stack = u32::from(self.hub.read_word(method.wrapping_add(2)))
                .wrapping_add(argument_address)
                .wrapping_add(4);

            // The new cog's boot frame.
            self.hub.write_word(stack.wrapping_sub(8), object as u16);
            self.hub
                .write_word(stack.wrapping_sub(6), self.frames.variable_frame as u16);
            self.hub.write_word(stack.wrapping_sub(4), entry as u16);
            self.hub
                .write_word(stack.wrapping_sub(2), method_stack.wrapping_add(4) as u16);
            for _ in 0..arguments {
                let value = self.pop();
                self.hub.write_long(argument_address, value);
                argument_address = argument_address.wrapping_sub(4);
            }

            let code = (INTERPRETER_ENTRY << 2) | (stack << 16);
            let slot = self.core.memory[INTERPRETER_INITCOGID as usize].wrapping_sub(4);
            let cog = self.hub.read_long(slot);
            self.hub.write_long(slot, TRUE);
            (code, cog)
        } else {
            let parameter = self.pop();
            let entry = self.pop();
            let cog = self.pop();
            (((entry & 0xFFFC) << 2) | ((parameter & 0xFFFC) << 16), cog)
        };
        let selection = if cog < 8 { cog } else { 8 };
        self.hub_operation(HubOperation::CogInit, code | selection)
    }

    fn fill(&mut self, size: AccessSize) {
        let count = self.pop() as i32;
        let value = self.pop();
        let mut destination = self.pop();
        let step = 1 << size.shift();
        for _ in 0..count.clamp(0, BLOCK_LIMIT as i32) {
            self.write_sized(size, destination, value);
            destination = destination.wrapping_add(step);
        }
    }

    fn block_move(&mut self, size: AccessSize) {
        let count = self.pop() as i32;
        let mut source = self.pop();
        let mut destination = self.pop();
        let step = 1 << size.shift();
        for _ in 0..count.clamp(0, BLOCK_LIMIT as i32) {
            let value = self.read_sized(size, source);
            self.write_sized(size, destination, value);
            source = source.wrapping_add(step);
            destination = destination.wrapping_add(step);
        }
    }

    fn string_size(&mut self) -> u32 {
        let mut address = self.pop();
        let mut length = 0;
        while address < BLOCK_LIMIT && self.hub.read_byte(address) != 0 {
            length += 1;
            address += 1;
        }
        length
    }

    fn string_compare(&mut self) -> u32 {
        let mut a = self.pop();
        let mut b = self.pop();
        for _ in 0..BLOCK_LIMIT {
            let (x, y) = (self.hub.read_byte(a), self.hub.read_byte(b));
            if x != y {
                return 0;
            }
            if x == 0 {
                return TRUE;
            }
            a = a.wrapping_add(1);
            b = b.wrapping_add(1);
        }
        TRUE
    }

    fn special_register(&mut self) -> Option<u32> {
        let index = self.pop();
        (index < 16).then(|| SpecialRegister::Par.address() + index)
    }

    fn special(&mut self, op: u8, at: u32) -> Result<(), FaultKind> {
        match op {
            0x00..=0x03 => self.push_frame(op),
            0x04 => {
                let offset = self.branch_offset();
                self.jump_relative(offset);
            }
            0x05..=0x07 => self.call(op, at)?,

            // Loops and conditional jumps.
            0x08 => {
                let value = self.pop() as i32;
                let branch = self.branch_offset();
                if value <= 0 {
                    self.jump_relative(branch);
                } else {
                    self.push(value as u32);
                }
            }
            0x09 => {
                let value = (self.pop() as i32).wrapping_sub(1);
                let branch = self.branch_offset();
                if value > 0 {
                    self.jump_relative(branch);
                    self.push(value as u32);
                }
            }
            0x0A | 0x0B => {
                let value = self.pop();
                let branch = self.branch_offset();
                if (value == 0) == (op == 0x0A) {
                    self.jump_relative(branch);
                }
            }

            // CASE.
            0x0C => {
                self.pop();
                let target = self.pop();
                self.jump_in_object(target);
            }
            0x0D => {
                let candidate = self.pop();
                let value = self.pop();
                let branch = self.branch_offset();
                if candidate == value {
                    self.jump_relative(branch);
                }
                self.push(value);
            }
            0x0E => {
                let mut high = self.pop();
                let mut low = self.pop();
                let value = self.pop();
                let branch = self.branch_offset();
                if low > high {
                    std::mem::swap(&mut low, &mut high);
                }
                if (low..=high).contains(&value) {
                    self.jump_relative(branch);
                }
                self.push(value);
            }

            // LOOKUP and LOOKDOWN.
            0x0F => {
                self.pop();
                self.pop();
                self.pop();
                self.push(TRUE);
            }
            0x10 => {
                let value = self.pop();
                let key = self.pop() as i32;
                let jump = self.pop();
                let base = self.pop() as i32;
                if key == base {
                    self.jump_in_object(jump);
                    self.push(value);
                } else {
                    self.push(base as u32);
                    self.push(jump);
                    self.push(key.wrapping_sub(1) as u32);
                }
            }
            0x11 => {
                let value = self.pop() as i32;
                let key = self.pop() as i32;
                let jump = self.pop();
                let base = self.pop() as i32;
                if key == value {
                    self.jump_in_object(jump);
                    self.push(base as u32);
                } else {
                    self.push(base.wrapping_add(1) as u32);
                    self.push(jump);
                    self.push(key as u32);
                }
            }
            0x12 => {
                let top = self.pop() as i32;
                let bottom = self.pop() as i32;
                let key = self.pop() as i32;
                let jump = self.pop();
                let base = self.pop() as i32;
                let (range, found) = if bottom < top {
                    (
                        top.wrapping_sub(bottom).wrapping_add(1),
                        bottom.wrapping_add(key).wrapping_sub(base),
                    )
                } else {
                    (
                        bottom.wrapping_sub(top).wrapping_add(1),
                        bottom.wrapping_sub(key).wrapping_sub(base),
                    )
                };
                if key < range {
                    self.jump_in_object(jump);
                    self.push(found as u32);
                } else {
                    self.push(base as u32);
                    self.push(jump);
                    self.push(key.wrapping_sub(range) as u32);
                }
            }
            0x13 => {
                let top = self.pop() as i32;
                let bottom = self.pop() as i32;
                let key = self.pop() as i32;
                let jump = self.pop();
                let base = self.pop() as i32;
                let (range, low) = if bottom < top {
                    (top.wrapping_sub(bottom).wrapping_add(1), bottom)
                } else {
                    (bottom.wrapping_sub(top).wrapping_add(1), top)
                };
                let high = bottom.max(top);
                if (low..=high).contains(&key) {
                    self.jump_in_object(jump);
                    self.push(key.wrapping_sub(low).wrapping_add(base) as u32);
                } else {
                    self.push(base.wrapping_add(range) as u32);
                    self.push(jump);
                    self.push(key as u32);
                }
            }

            0x14 | 0x3C => return Err(FaultKind::UndefinedBytecode { opcode: op, pc: at }),
            0x15 => self.frames.start_interpreter = true,
            0x16 => {
                let length = self.string_size();
                self.push(length);
            }
            0x17 => {
                let equal = self.string_compare();
                self.push(equal);
            }
            0x18 => self.fill(AccessSize::Byte),
            0x19 => self.fill(AccessSize::Word),
            0x1A => self.fill(AccessSize::Long),
            0x1C => self.block_move(AccessSize::Byte),
            0x1D => self.block_move(AccessSize::Word),
            0x1E => self.block_move(AccessSize::Long),

            // Waits.
            0x1B | 0x1F => {
                self.frames.wait.port_b = self.pop() != 0;
                self.frames.wait.mask = self.pop();
                self.frames.wait.target = self.pop();
                self.core.state = if op == 0x1B {
                    CogRunState::WaitPinsEqual
                } else {
                    CogRunState::WaitPinsNotEqual
                };
            }
            0x23 => {
                self.frames.wait.target = self.pop();
                self.core.state = CogRunState::WaitCount;
            }
            0x27 => {
                self.frames.wait.pixels = self.pop();
                self.frames.wait.colors = self.pop();
                self.core.state = CogRunState::WaitVideo;
            }

            // Hub operations.
            0x20 => {
                let frequency = self.pop();
                let mode = self.pop() & 0xFF;
                self.hub.write_long(0, frequency);
                self.hub.write_byte(4, mode as u8);
                self.hub_operation(HubOperation::ClkSet, mode);
            }
            0x21 => {
                let cog = self.pop();
                self.hub_operation(HubOperation::CogStop, cog);
            }
            0x22 => {
                let lock = self.pop();
                self.hub_operation(HubOperation::LockReturn, lock);
            }
            0x28 | 0x2C => {
                let result = self.cog_init();
                if op == 0x28 {
                    self.push(result.value);
                }
            }
            0x29 | 0x2D => {
                let result = self.hub_operation(HubOperation::LockNew, 0);
                if op == 0x29 {
                    self.push(result.value);
                }
            }
            0x2A | 0x2B | 0x2E | 0x2F => {
                let lock = self.pop();
                let operation = if op & 1 == 0 {
                    HubOperation::LockSet
                } else {
                    HubOperation::LockClear
                };
                let result = self.hub_operation(operation, lock);
                if op < 0x2C {
                    self.push(truth(result.carry));
                }
            }

            // Special registers.
            0x24 => {
                if let Some(register) = self.special_register() {
                    let value = self.read_register(register);
                    self.push(value);
                }
            }
            0x25 => {
                if let Some(register) = self.special_register() {
                    let value = self.pop();
                    self.write_register(register, value);
                }
            }
            0x26 => {
                if let Some(register) = self.special_register() {
                    let value = self.read_register(register);
                    let stored = self.effect(value)?;
                    self.write_register(register, stored);
                }
            }

            // Return and abort.
            0x30 | 0x32 => {
                let value = self.hub.read_long(self.frames.local_frame);
                self.return_from_method(value, op == 0x30);
            }
            0x31 | 0x33 => {
                let value = self.pop();
                self.return_from_method(value, op == 0x31);
            }

            // Constants.
            0x34..=0x36 => self.push(u32::from(op).wrapping_sub(0x35)),
            0x37 => {
                let byte = self.next_byte();
                self.push(math::packed_literal(byte));
            }
            0x38..=0x3B => {
                let mut value = 0u32;
                for _ in 0..(op - 0x37) {
                    value = (value << 8) | u32::from(self.next_byte());
                }
                self.push(value);
            }

            // Cog register bit fields.
            0x3D => {
                let bit = self.pop() & 31;
                self.register_access(1 << bit, bit)?;
            }
            0x3E => {
                let mut low = (self.pop() as i32).clamp(0, 31) as u32;
                let mut high = (self.pop() as i32).clamp(0, 31) as u32;
                if low > high {
                    std::mem::swap(&mut low, &mut high);
                }
                let mask = (((1u64 << (high - low + 1)) - 1) << low) as u32;
                self.register_access(mask, low)?;
            }
            0x3F => self.register_access(u32::MAX, 0)?,

            _ => return Err(FaultKind::UndefinedBytecode { opcode: op, pc: at }),
        }
        Ok(())
    }
}
