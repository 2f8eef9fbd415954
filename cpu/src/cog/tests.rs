use base::prelude::*;
use test_strategy::proptest;

use super::*;
use crate::hub::{Hub, HubAction};
use crate::memory::HubMemory;

const FREQUENCY: u32 = 12_000_000;

fn new_hub() -> Hub {
    Hub::new(HubMemory::new())
}

fn build(opcode: Opcode, immediate: bool, destination: u32, source: u32) -> u32 {
    Instruction::build(
        opcode,
        Effects::RESULT,
        immediate,
        Condition::Always,
        destination,
        source,
    )
    .bits()
}

/// A native cog which has already loaded `program`.
fn native(program: &[u32]) -> Cog {
    let mut cog = Cog::new(0, EngineKind::Native, 0, 0, FREQUENCY);
    cog.core.memory[..program.len()].copy_from_slice(program);
    match &mut cog.engine {
        Engine::Native(engine) => engine.boot(&mut cog.core),
        Engine::Interpreted(_) => unreachable!(),
    }
    cog
}

fn steps(cog: &mut Cog, hub: &mut Hub, count: usize) {
    for _ in 0..count {
        cog.step(hub, FrameBreak::None).expect("no fault");
    }
}

#[test]
fn test_run_state_descriptions() {
    assert_eq!(CogRunState::HubReadLong.to_string(), "Waiting for hub");
    assert_eq!(CogRunState::WaitCount.to_string(), "Waiting (CNT)");
    assert_eq!(CogRunState::ExecInterpreter.description(), "Interpreter Fetch");
    assert_eq!(CogRunState::WaitPrewait.description(), "Running instruction");
}

#[test]
fn test_frame_break_thresholds() {
    assert!(!FrameBreak::None.triggered_by(FrameFlag::Miss));
    assert!(FrameBreak::Hit.triggered_by(FrameFlag::Hit));
    assert!(FrameBreak::Hit.triggered_by(FrameFlag::Miss));
    assert!(!FrameBreak::Miss.triggered_by(FrameFlag::Hit));
    assert!(FrameBreak::Miss.triggered_by(FrameFlag::Miss));
    assert!(!FrameBreak::Hit.triggered_by(FrameFlag::None));
}

#[test]
fn test_register_intercepts() {
    let mut hub = new_hub();
    hub.increment_counter();
    let mut cog = native(&[]);
    let cnt = SpecialRegister::Cnt.address() as usize;
    cog.write_register(cnt, 1234, &hub);
    assert_eq!(cog.read_register(cnt, &hub), 1);

    let par = SpecialRegister::Par.address() as usize;
    cog.write_register(par, 0x40, &hub);
    assert_eq!(cog.read_register(par, &hub), 0x40);

    let frqa = SpecialRegister::Frqa.address() as usize;
    cog.write_register(frqa, 0x1000, &hub);
    assert_eq!(cog.read_register(frqa, &hub), 0x1000);
    assert_eq!(cog.counter_a().frq(), 0x1000);

    cog.write_register(SpecialRegister::Outa.address() as usize, 0x5, &hub);
    cog.write_register(SpecialRegister::Dirb.address() as usize, 0x1, &hub);
    assert_eq!(cog.out() & 0xFFFF_FFFF, 0x5);
    assert_eq!(cog.dir(), 1 << 32);
}

const COUNTER_AND_VIDEO_REGISTERS: [SpecialRegister; 8] = [
    SpecialRegister::Ctra,
    SpecialRegister::Ctrb,
    SpecialRegister::Frqa,
    SpecialRegister::Frqb,
    SpecialRegister::Phsa,
    SpecialRegister::Phsb,
    SpecialRegister::Vcfg,
    SpecialRegister::Vscl,
];

#[proptest]
fn test_counter_and_video_registers_read_back(#[strategy(0usize..8)] which: usize, value: u32) {
    let hub = new_hub();
    let mut cog = native(&[]);
    let register = COUNTER_AND_VIDEO_REGISTERS[which].address() as usize;
    cog.write_register(register, value, &hub);
    assert_eq!(cog.read_register(register, &hub), value);
}

#[test]
#[should_panic]
fn test_register_index_out_of_range() {
    let hub = new_hub();
    let cog = native(&[]);
    let _ = cog.read_register(COG_MEMORY_LONGS, &hub);
}

#[test]
fn test_alu_instruction_takes_four_clocks() {
    let mut hub = new_hub();
    let mut cog = native(&[build(Opcode::Mov, true, 0x10, 5)]);
    steps(&mut cog, &mut hub, 3);
    assert_eq!(cog.core.memory[0x10], 0);
    assert_eq!(cog.state(), CogRunState::WaitCycles);
    steps(&mut cog, &mut hub, 1);
    assert_eq!(cog.core.memory[0x10], 5);
    assert_eq!(cog.state(), CogRunState::Execute);
    assert_eq!(cog.pc(), 1);
}

#[test]
fn test_condition_not_met_skips_write() {
    let mut hub = new_hub();
    let word = Instruction::build(
        Opcode::Mov,
        Effects::RESULT,
        true,
        Condition::C,
        0x10,
        5,
    );
    let mut cog = native(&[word.bits()]);
    steps(&mut cog, &mut hub, 4);
    assert_eq!(cog.core.memory[0x10], 0);
    assert_eq!(cog.state(), CogRunState::Execute);
    assert_eq!(cog.pc(), 1);
}

#[test]
fn test_djnz_timing() {
    let mut hub = new_hub();
    let mut cog = native(&[build(Opcode::Djnz, true, 0x10, 0)]);
    cog.core.memory[0x10] = 2;
    // Taken: back to 0 in four clocks.
    steps(&mut cog, &mut hub, 4);
    assert_eq!(cog.core.memory[0x10], 1);
    assert_eq!(cog.pc(), 0);
    assert_eq!(cog.state(), CogRunState::Execute);
    // Not taken: falls through in eight.
    steps(&mut cog, &mut hub, 7);
    assert_eq!(cog.state(), CogRunState::WaitCycles);
    steps(&mut cog, &mut hub, 1);
    assert_eq!(cog.core.memory[0x10], 0);
    assert_eq!(cog.pc(), 1);
    assert_eq!(cog.state(), CogRunState::Execute);
}

#[test]
fn test_reserved_opcode_faults() {
    let mut hub = new_hub();
    let mut cog = native(&[build(Opcode::Mul, true, 0x10, 5)]);
    cog.core.memory[0x10] = 99;
    let fault = cog.step(&mut hub, FrameBreak::None).expect_err("should fault");
    assert_eq!(fault.cog, 0);
    assert_eq!(
        fault.kind,
        FaultKind::UndefinedNativeOpcode {
            opcode: Opcode::Mul.bits(),
            pc: 0
        }
    );
    // The instruction still completes, writing zero.
    steps(&mut cog, &mut hub, 3);
    assert_eq!(cog.core.memory[0x10], 0);
}

#[test]
fn test_rdlong_waits_for_hub() {
    let mut hub = new_hub();
    hub.write_long(0x20, 0xDEAD_BEEF);
    let mut cog = native(&[build(Opcode::RwLong, true, 0x10, 0x20)]);
    steps(&mut cog, &mut hub, 6);
    assert_eq!(cog.state(), CogRunState::HubReadLong);
    // Nothing happens until the hub window comes round.
    steps(&mut cog, &mut hub, 10);
    assert_eq!(cog.core.memory[0x10], 0);
    cog.hub_access(&mut hub);
    assert_eq!(cog.core.memory[0x10], 0xDEAD_BEEF);
    assert_eq!(cog.state(), CogRunState::Execute);
    assert_eq!(cog.hub_accesses(), 1);
}

#[test]
fn test_wrlong_writes_hub() {
    let mut hub = new_hub();
    let write = Instruction::build(
        Opcode::RwLong,
        Effects::NONE,
        true,
        Condition::Always,
        0x10,
        0x40,
    );
    let mut cog = native(&[write.bits()]);
    cog.core.memory[0x10] = 0x1234_5678;
    steps(&mut cog, &mut hub, 6);
    cog.hub_access(&mut hub);
    assert_eq!(hub.read_long(0x40), 0x1234_5678);
}

#[test]
fn test_waitcnt() {
    let mut hub = new_hub();
    let mut cog = native(&[build(Opcode::Waitcnt, true, 0x10, 100)]);
    cog.core.memory[0x10] = 10;
    steps(&mut cog, &mut hub, 4);
    assert_eq!(cog.state(), CogRunState::WaitCount);
    while hub.counter() < 10 {
        cog.step(&mut hub, FrameBreak::None).expect("no fault");
        assert_eq!(cog.state(), CogRunState::WaitCount);
        hub.increment_counter();
    }
    steps(&mut cog, &mut hub, 1);
    assert_eq!(cog.core.memory[0x10], 110);
    assert_eq!(cog.state(), CogRunState::Execute);
}

#[test]
fn test_waitpeq_writes_zero_only_with_wz() {
    for (effects, expected) in [(Effects::NONE, false), (Effects::NONE.with_zero(), true)] {
        let mut hub = new_hub();
        let word = Instruction::build(
            Opcode::Waitpeq,
            effects,
            false,
            Condition::Always,
            0x10,
            0x11,
        );
        let mut cog = native(&[word.bits()]);
        // Wait for pin 3 to be low, which it already is.
        cog.core.memory[0x11] = 1 << 3;
        steps(&mut cog, &mut hub, 8);
        match cog.status().detail {
            EngineStatus::Native { zero, .. } => assert_eq!(zero, expected),
            EngineStatus::Interpreted { .. } => unreachable!(),
        }
    }
}

#[test]
fn test_breakpoint_stops_after_instruction() {
    let mut hub = new_hub();
    let mut cog = native(&[build(Opcode::Mov, true, 0x10, 5)]);
    cog.set_breakpoint(Some(1));
    assert_eq!(cog.step(&mut hub, FrameBreak::None), Ok(false));
    assert_eq!(cog.step(&mut hub, FrameBreak::None), Ok(true));
}

#[test]
fn test_frame_flags() {
    let mut hub = new_hub();
    let mut cog = native(&[build(Opcode::Mov, true, 0x10, 5)]);
    // Not waiting in WAITVID.
    cog.frame_complete(hub.running_cogs());
    assert_eq!(cog.frame_flag(), FrameFlag::Miss);
    assert_eq!(cog.step(&mut hub, FrameBreak::Miss), Ok(false));
    assert_eq!(cog.frame_flag(), FrameFlag::None);

    let mut cog = native(&[build(Opcode::Waitvid, true, 0x10, 0)]);
    steps(&mut cog, &mut hub, 3);
    assert_eq!(cog.state(), CogRunState::WaitPrewait);
    cog.core.state = CogRunState::WaitVideo;
    cog.frame_complete(hub.running_cogs());
    assert_eq!(cog.frame_flag(), FrameFlag::Hit);
    assert_eq!(cog.state(), CogRunState::Execute);
}

// Bytecode tests.  The boot frame is at 0x100 and describes an
// object at 0x200, variables at 0x300, code at 0x400 and a stack
// starting at 0x500.

const FRAME: u32 = 0x100;
const OBJECT: u32 = 0x200;
const VARIABLES: u32 = 0x300;
const CODE: u32 = 0x400;
const STACK: u32 = 0x500;
/// Free hub memory for test data.
const DATA: u32 = 0x600;

fn load(hub: &mut Hub, address: u32, bytes: &[u8]) {
    for (i, byte) in bytes.iter().enumerate() {
        hub.write_byte(address + i as u32, *byte);
    }
}

fn interpreted(hub: &mut Hub, code: &[u8]) -> Cog {
    hub.write_word(FRAME - 8, OBJECT as u16);
    hub.write_word(FRAME - 6, VARIABLES as u16);
    hub.write_word(FRAME - 4, CODE as u16);
    hub.write_word(FRAME - 2, (STACK + 4) as u16);
    load(hub, CODE, code);
    let mut cog = Cog::new(0, EngineKind::Interpreted, INTERPRETER_ENTRY, FRAME, FREQUENCY);
    match &mut cog.engine {
        Engine::Interpreted(engine) => engine.boot(&mut cog.core, hub),
        Engine::Native(_) => unreachable!(),
    }
    cog
}

/// Steps the cog until it has executed `count` bytecodes.
fn run_bytecodes(cog: &mut Cog, hub: &mut Hub, count: usize) -> Result<(), Fault> {
    let mut executed = 0;
    for _ in 0..10_000 {
        if executed == count {
            return Ok(());
        }
        if cog.at_instruction_boundary() {
            executed += 1;
        }
        cog.step(hub, FrameBreak::None)?;
    }
    panic!("only {executed} of {count} bytecodes ran");
}

fn stack_frame(cog: &Cog) -> u32 {
    match cog.status().detail {
        EngineStatus::Interpreted { stack_frame, .. } => stack_frame,
        EngineStatus::Native { .. } => unreachable!(),
    }
}

#[test]
fn test_interpreter_boot() {
    let mut hub = new_hub();
    let cog = interpreted(&mut hub, &[]);
    assert_eq!(cog.state(), CogRunState::BootInterpreter);
    assert_eq!(cog.pc(), CODE);
    assert_eq!(stack_frame(&cog), STACK);
    assert_eq!(cog.core.memory[INTERPRETER_COGID as usize], 0);
    assert_eq!(cog.core.memory[INTERPRETER_INITCOGID as usize], FRAME - 4);
    assert_eq!(hub.read_long(FRAME - 8), 0xFFFF_FFFF);
    assert_eq!(hub.read_long(FRAME - 4), 0);
}

#[test]
fn test_push_and_add() {
    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &[0x38, 5, 0x38, 3, 0xEC]);
    run_bytecodes(&mut cog, &mut hub, 3).expect("no fault");
    assert_eq!(stack_frame(&cog), STACK + 4);
    assert_eq!(hub.read_long(STACK), 8);
}

#[test]
fn test_logical_not_of_zero() {
    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &[0x35, 0xFF]);
    run_bytecodes(&mut cog, &mut hub, 2).expect("no fault");
    assert_eq!(hub.read_long(STACK), 0xFFFF_FFFF);
}

#[test]
fn test_subtract_operand_order() {
    let mut hub = new_hub();
    // 10 - 3
    let mut cog = interpreted(&mut hub, &[0x38, 10, 0x38, 3, 0xED]);
    run_bytecodes(&mut cog, &mut hub, 3).expect("no fault");
    assert_eq!(hub.read_long(STACK), 7);
}

#[test]
fn test_call_and_return() {
    let mut hub = new_hub();
    // Method 1 starts at OBJECT + 0x40 and has no extra locals.
    hub.write_word(OBJECT + 4, 0x40);
    hub.write_word(OBJECT + 6, 0);
    // result := 7; return
    load(&mut hub, OBJECT + 0x40, &[0x38, 7, 0x61, 0x32]);
    let mut cog = interpreted(&mut hub, &[0x00, 0x05, 0x01]);
    run_bytecodes(&mut cog, &mut hub, 5).expect("no fault");
    assert_eq!(cog.pc(), CODE + 3);
    assert_eq!(stack_frame(&cog), STACK + 4);
    assert_eq!(hub.read_long(STACK), 7);
}

#[test]
fn test_return_from_top_level_stops_cog() {
    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &[0x32]);
    run_bytecodes(&mut cog, &mut hub, 1).expect("no fault");
    assert_eq!(hub.take_actions(), vec![HubAction::Stop(0)]);
}

#[test]
fn test_undefined_bytecode_faults() {
    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &[0x14]);
    let fault = run_bytecodes(&mut cog, &mut hub, 1).expect_err("should fault");
    assert_eq!(
        fault.kind,
        FaultKind::UndefinedBytecode {
            opcode: 0x14,
            pc: CODE
        }
    );
}

#[test]
fn test_call_without_frame_faults() {
    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &[0x05, 0x00]);
    let fault = run_bytecodes(&mut cog, &mut hub, 1).expect_err("should fault");
    assert_eq!(fault.kind, FaultKind::CallWithoutFrame { pc: CODE });
}

#[test]
fn test_register_bit_field_write() {
    let mut hub = new_hub();
    // OUTA[3] := 1: push 1, push 3, register op "pop into OUTA".
    let outa = (SpecialRegister::Outa.address() - 0x1E0) as u8;
    let mut cog = interpreted(&mut hub, &[0x36, 0x38, 3, 0x3D, 0xA0 | outa]);
    run_bytecodes(&mut cog, &mut hub, 3).expect("no fault");
    assert_eq!(
        cog.read_register(SpecialRegister::Outa.address() as usize, &hub),
        1 << 3
    );
}

#[test]
fn test_lock_bytecodes() {
    let mut hub = new_hub();
    // LOCKNEW, then LOCKSET on the lock it returned, twice.
    let mut cog = interpreted(&mut hub, &[0x29, 0x35, 0x2A, 0x35, 0x2A]);
    run_bytecodes(&mut cog, &mut hub, 5).expect("no fault");
    assert_eq!(hub.read_long(STACK), 0);
    // First LOCKSET: previously clear.  Second: already set.
    assert_eq!(hub.read_long(STACK + 4), 0);
    assert_eq!(hub.read_long(STACK + 8), 0xFFFF_FFFF);
}

fn variable(hub: &Hub, n: u32) -> u32 {
    hub.read_long(VARIABLES + 4 * n)
}

/// The `n`th long pushed onto the expression stack.
fn stacked(hub: &Hub, n: u32) -> u32 {
    hub.read_long(STACK + 4 * n)
}

#[test]
fn test_increment_and_decrement_effects() {
    let mut hub = new_hub();
    let mut cog = interpreted(
        &mut hub,
        &[
            0x38, 7, 0x41, // v0 := 7
            0x42, 0xAE, // push v0++
            0x42, 0xA6, // push ++v0
            0x42, 0xBE, // push v0--
            0x38, 0xFF, 0x45, // v1 := 255
            0x46, 0xA2, // push ++v1, as a byte
            0x46, 0xB4, // push --v1, as a word
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 9).expect("no fault");
    assert_eq!(stacked(&hub, 0), 7);
    assert_eq!(stacked(&hub, 1), 9);
    assert_eq!(stacked(&hub, 2), 9);
    assert_eq!(stacked(&hub, 3), 0);
    assert_eq!(stacked(&hub, 4), 0xFFFF);
    assert_eq!(stack_frame(&cog), STACK + 20);
    assert_eq!(variable(&hub, 0), 8);
    assert_eq!(variable(&hub, 1), 0xFFFF);
}

#[test]
fn test_post_clear_post_set_and_sign_extend_effects() {
    let mut hub = new_hub();
    let mut cog = interpreted(
        &mut hub,
        &[
            0x38, 8, 0x41, // v0 := 8
            0x42, 0x98, // push v0~
            0x42, 0x9C, // push v0~~
            0x38, 0x80, 0x45, // v1 := $80
            0x46, 0x90, // push ~v1
            0x39, 0x80, 0x00, 0x49, // v2 := $8000
            0x4A, 0x94, // push ~~v2
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 10).expect("no fault");
    assert_eq!(stacked(&hub, 0), 8);
    assert_eq!(stacked(&hub, 1), 0);
    assert_eq!(stacked(&hub, 2), 0xFFFF_FF80);
    assert_eq!(stacked(&hub, 3), 0xFFFF_8000);
    assert_eq!(variable(&hub, 0), 0xFFFF_FFFF);
    assert_eq!(variable(&hub, 1), 0xFFFF_FF80);
    assert_eq!(variable(&hub, 2), 0xFFFF_8000);
}

#[test]
fn test_random_effects() {
    let mut hub = new_hub();
    // push ?v0, then push v0?
    let mut cog = interpreted(&mut hub, &[0x42, 0x88, 0x42, 0x8C]);
    run_bytecodes(&mut cog, &mut hub, 2).expect("no fault");
    assert_eq!(stacked(&hub, 0), super::math::random_forward(1));
    assert_eq!(stacked(&hub, 1), 1);
    assert_eq!(variable(&hub, 0), 1);
}

#[test]
fn test_compound_assignment() {
    let mut hub = new_hub();
    let mut cog = interpreted(
        &mut hub,
        &[
            0x38, 10, 0x41, // v0 := 10
            0x38, 3, 0x42, 0x4D, // v0 -= 3
            0x38, 4, 0x42, 0xD4, // push (v0 *= 4)
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 6).expect("no fault");
    assert_eq!(variable(&hub, 0), 28);
    assert_eq!(stacked(&hub, 0), 28);
    assert_eq!(stack_frame(&cog), STACK + 4);
}

#[test]
fn test_repeat_from_to() {
    let mut hub = new_hub();
    // REPEAT v0 FROM 1 TO 3: v1++
    let mut cog = interpreted(
        &mut hub,
        &[
            0x36, 0x41, // v0 := 1
            0x46, 0x2E, // v1++
            0x36, 0x38, 3, // from 1 to 3
            0x42, 0x02, 0x78, // step v0, back 8 bytes while in range
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 2 + 3 * 4).expect("no fault");
    assert_eq!(variable(&hub, 1), 3);
    assert_eq!(variable(&hub, 0), 4);
    assert_eq!(cog.pc(), CODE + 10);
    assert_eq!(stack_frame(&cog), STACK);
}

#[test]
fn test_repeat_from_to_step() {
    let mut hub = new_hub();
    // REPEAT v0 FROM 1 TO 6 STEP 2: v1++
    let mut cog = interpreted(
        &mut hub,
        &[
            0x36, 0x41, // v0 := 1
            0x46, 0x2E, // v1++
            0x38, 2, // step 2
            0x36, 0x38, 6, // from 1 to 6
            0x42, 0x06, 0x76, // step v0, back 10 bytes while in range
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 2 + 3 * 5).expect("no fault");
    assert_eq!(variable(&hub, 1), 3);
    assert_eq!(variable(&hub, 0), 7);
    assert_eq!(cog.pc(), CODE + 12);
    assert_eq!(stack_frame(&cog), STACK);
}

#[test]
fn test_lookup_and_lookdown() {
    // Both search a list of 10, 20, 30 with base 1, leaving the
    // answer on the stack and jumping to CODE + 16.
    let list = |key: u8, op: u8| {
        vec![
            0x36, // base 1
            0x39, 0x02, 0x10, // jump to CODE + 16
            0x38, key, // key
            0x38, 10, op, 0x38, 20, op, 0x38, 30, op, 0x0F,
        ]
    };

    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &list(2, 0x10));
    run_bytecodes(&mut cog, &mut hub, 7).expect("no fault");
    assert_eq!(cog.pc(), CODE + 16);
    assert_eq!(stacked(&hub, 0), 20);
    assert_eq!(stack_frame(&cog), STACK + 4);

    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &list(20, 0x11));
    run_bytecodes(&mut cog, &mut hub, 7).expect("no fault");
    assert_eq!(cog.pc(), CODE + 16);
    assert_eq!(stacked(&hub, 0), 2);
    assert_eq!(stack_frame(&cog), STACK + 4);
}

#[test]
fn test_lookup_and_lookdown_ranges() {
    // Both search the ranges 5..9 and 20..22 with base 1 and jump
    // to CODE + 20 once found.
    let ranges = |key: u8, op: u8| {
        vec![
            0x36, // base 1
            0x39, 0x02, 0x14, // jump to CODE + 20
            0x38, key, // key
            0x38, 5, 0x38, 9, op, 0x38, 20, 0x38, 22, op, 0x0F,
        ]
    };

    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &ranges(7, 0x12));
    run_bytecodes(&mut cog, &mut hub, 9).expect("no fault");
    assert_eq!(cog.pc(), CODE + 20);
    assert_eq!(stacked(&hub, 0), 21);
    assert_eq!(stack_frame(&cog), STACK + 4);

    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &ranges(21, 0x13));
    run_bytecodes(&mut cog, &mut hub, 9).expect("no fault");
    assert_eq!(cog.pc(), CODE + 20);
    assert_eq!(stacked(&hub, 0), 7);
    assert_eq!(stack_frame(&cog), STACK + 4);
}

#[test]
fn test_case_range() {
    // Returns where execution went and what was left on the stack.
    let case = |value: u8, low: u8, high: u8| {
        let mut hub = new_hub();
        let mut cog = interpreted(
            &mut hub,
            &[0x38, value, 0x38, low, 0x38, high, 0x0E, 0x04, 0x38, 1],
        );
        run_bytecodes(&mut cog, &mut hub, 4).expect("no fault");
        assert_eq!(stack_frame(&cog), STACK + 4);
        (cog.pc() - CODE, stacked(&hub, 0))
    };
    assert_eq!(case(7, 5, 9), (12, 7));
    assert_eq!(case(9, 5, 9), (12, 9));
    // Reversed bounds describe the same range.
    assert_eq!(case(7, 9, 5), (12, 7));
    assert_eq!(case(3, 5, 9), (8, 3));
}

#[test]
fn test_indexed_memory_access() {
    let mut hub = new_hub();
    hub.write_byte(DATA + 3, 0xAB);
    hub.write_word(OBJECT + 0x14, 0xBEEF);
    let mut cog = interpreted(
        &mut hub,
        &[
            0x39, 0x06, 0x00, 0x38, 3, 0x90, // push BYTE[DATA][3]
            0x38, 2, 0xB4, 0x10, // push the object's word $10 + 2 * 2
            0x39, 0x12, 0x34, 0x36, 0xD9, 0x04, // variable long 4 + 4 * 1 := $1234
            0x38, 2, 0xDF, 0x00, // push the address of local long 2
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 10).expect("no fault");
    assert_eq!(stacked(&hub, 0), 0xAB);
    assert_eq!(stacked(&hub, 1), 0xBEEF);
    assert_eq!(variable(&hub, 2), 0x1234);
    assert_eq!(stacked(&hub, 2), FRAME - 4 + 8);
    assert_eq!(stack_frame(&cog), STACK + 12);
}

/// Calls method 1 from a frame which traps aborts; method 1 calls
/// method 2 from one which doesn't, and method 2 runs `body`.
fn nested_abort(body: &[u8], count: usize) -> (Cog, Hub) {
    let mut hub = new_hub();
    hub.write_word(OBJECT + 4, 0x40);
    hub.write_word(OBJECT + 8, 0x50);
    load(&mut hub, OBJECT + 0x40, &[0x00, 0x05, 0x02]);
    load(&mut hub, OBJECT + 0x50, body);
    let mut cog = interpreted(&mut hub, &[0x02, 0x05, 0x01]);
    run_bytecodes(&mut cog, &mut hub, count).expect("no fault");
    (cog, hub)
}

#[test]
fn test_abort_unwinds_to_trapping_frame() {
    // ABORT 42
    let (cog, hub) = nested_abort(&[0x38, 42, 0x31], 6);
    assert_eq!(cog.pc(), CODE + 3);
    assert_eq!(stacked(&hub, 0), 42);
    assert_eq!(stack_frame(&cog), STACK + 4);

    // result := 43; ABORT
    let (cog, hub) = nested_abort(&[0x38, 43, 0x61, 0x30], 7);
    assert_eq!(cog.pc(), CODE + 3);
    assert_eq!(stacked(&hub, 0), 43);
    assert_eq!(stack_frame(&cog), STACK + 4);
    match cog.status().detail {
        EngineStatus::Interpreted { local_frame, .. } => assert_eq!(local_frame, FRAME - 4),
        EngineStatus::Native { .. } => unreachable!(),
    }
}

#[test]
fn test_untrapped_abort_stops_cog() {
    let mut hub = new_hub();
    hub.write_word(OBJECT + 4, 0x40);
    load(&mut hub, OBJECT + 0x40, &[0x38, 1, 0x31]);
    let mut cog = interpreted(&mut hub, &[0x00, 0x05, 0x01]);
    run_bytecodes(&mut cog, &mut hub, 4).expect("no fault");
    assert_eq!(hub.take_actions(), vec![HubAction::Stop(0)]);
}

#[test]
fn test_spin_coginit() {
    let mut hub = new_hub();
    // Method 1 starts at OBJECT + 0x40 and has 8 bytes of locals.
    hub.write_word(OBJECT + 4, 0x40);
    hub.write_word(OBJECT + 6, 8);
    let mut cog = interpreted(
        &mut hub,
        &[
            0x38, 11, 0x38, 22, // arguments
            0x39, 0x02, 0x01, // two arguments, method 1
            0x15, // start the interpreter
            0x39, 0x07, 0x00, // stack space
            0x28, // COGINIT, pushing the cog number
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 6).expect("no fault");

    // The stack address is rounded up to a long past the boot frame.
    let frame = 0x708;
    assert_eq!(
        hub.take_actions(),
        vec![HubAction::Start {
            cog: 0,
            engine: EngineKind::Interpreted,
            program: INTERPRETER_ENTRY,
            parameter: frame,
        }]
    );
    assert_eq!(hub.read_word(frame - 8), OBJECT as u16);
    assert_eq!(hub.read_word(frame - 6), VARIABLES as u16);
    assert_eq!(hub.read_word(frame - 4), (OBJECT + 0x40) as u16);
    assert_eq!(hub.read_word(frame - 2), (frame + 8 + 8 + 4) as u16);
    assert_eq!(hub.read_long(frame), 11);
    assert_eq!(hub.read_long(frame + 4), 22);
    assert_eq!(stacked(&hub, 0), 0);
    assert_eq!(stack_frame(&cog), STACK + 4);
}

#[test]
fn test_interpreter_waitcnt() {
    let mut hub = new_hub();
    let mut cog = interpreted(&mut hub, &[0x38, 5, 0x23, 0x38, 9]);
    run_bytecodes(&mut cog, &mut hub, 2).expect("no fault");
    assert_eq!(cog.state(), CogRunState::WaitCount);
    while hub.counter() < 5 {
        cog.step(&mut hub, FrameBreak::None).expect("no fault");
        assert_eq!(cog.state(), CogRunState::WaitCount);
        hub.increment_counter();
    }
    steps(&mut cog, &mut hub, 1);
    assert_eq!(cog.state(), CogRunState::ExecInterpreter);
    run_bytecodes(&mut cog, &mut hub, 1).expect("no fault");
    assert_eq!(stacked(&hub, 0), 9);
}

#[test]
fn test_interpreter_waitpeq() {
    let mut hub = new_hub();
    // WAITPEQ(|<3, |<3, 0)
    let mut cog = interpreted(&mut hub, &[0x38, 8, 0x38, 8, 0x35, 0x1B]);
    run_bytecodes(&mut cog, &mut hub, 4).expect("no fault");
    assert_eq!(cog.state(), CogRunState::WaitPinsEqual);
    steps(&mut cog, &mut hub, 10);
    assert_eq!(cog.state(), CogRunState::WaitPinsEqual);
    hub.external_pins().drive(3, false, true);
    hub.refresh_input();
    steps(&mut cog, &mut hub, 1);
    assert_eq!(cog.state(), CogRunState::ExecInterpreter);
}

#[test]
fn test_string_bytecodes() {
    let mut hub = new_hub();
    load(&mut hub, DATA, b"abc\0");
    load(&mut hub, DATA + 0x10, b"abc\0");
    load(&mut hub, DATA + 0x20, b"abd\0");
    let mut cog = interpreted(
        &mut hub,
        &[
            0x39, 0x06, 0x00, 0x16, // STRSIZE(DATA)
            0x39, 0x06, 0x00, 0x39, 0x06, 0x10, 0x17, // STRCOMP(DATA, DATA + $10)
            0x39, 0x06, 0x00, 0x39, 0x06, 0x20, 0x17, // STRCOMP(DATA, DATA + $20)
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 8).expect("no fault");
    assert_eq!(stacked(&hub, 0), 3);
    assert_eq!(stacked(&hub, 1), 0xFFFF_FFFF);
    assert_eq!(stacked(&hub, 2), 0);
}

#[test]
fn test_fill_and_move_bytecodes() {
    let mut hub = new_hub();
    load(&mut hub, DATA, b"abcdef\0");
    let mut cog = interpreted(
        &mut hub,
        &[
            0x39, 0x06, 0x40, 0x38, 0x5A, 0x38, 4, 0x18, // BYTEFILL(DATA + $40, $5A, 4)
            0x39, 0x06, 0x60, 0x3B, 1, 2, 3, 4, 0x38, 2, 0x1A, // LONGFILL(DATA + $60, $01020304, 2)
            0x39, 0x06, 0x80, 0x39, 0x06, 0x00, 0x38, 3, 0x1C, // BYTEMOVE(DATA + $80, DATA, 3)
            0x39, 0x06, 0xA0, 0x39, 0x06, 0x00, 0x38, 2, 0x1D, // WORDMOVE(DATA + $A0, DATA, 2)
        ],
    );
    run_bytecodes(&mut cog, &mut hub, 16).expect("no fault");
    assert_eq!(stack_frame(&cog), STACK);
    for i in 0..4 {
        assert_eq!(hub.read_byte(DATA + 0x40 + i), 0x5A);
    }
    assert_eq!(hub.read_byte(DATA + 0x44), 0);
    assert_eq!(hub.read_long(DATA + 0x60), 0x0102_0304);
    assert_eq!(hub.read_long(DATA + 0x64), 0x0102_0304);
    assert_eq!(hub.read_long(DATA + 0x68), 0);
    assert_eq!(hub.read_byte(DATA + 0x82), b'c');
    assert_eq!(hub.read_byte(DATA + 0x83), 0);
    assert_eq!(hub.read_byte(DATA + 0xA3), b'd');
    assert_eq!(hub.read_byte(DATA + 0xA4), 0);
}
