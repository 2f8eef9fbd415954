use std::cell::RefCell;
use std::rc::Rc;

use test_strategy::proptest;

use super::*;
use crate::cog::CogRunState;
use crate::event::PinDriver;
use crate::fault::FaultKind;

/// A minimal image: a 16-byte header whose boot frame sits at 0x50.
fn small_image() -> Vec<u8> {
    let mut image = vec![0u8; 0x50];
    image[4] = 0x00; // RCFAST
    image[6..8].copy_from_slice(&0x0010u16.to_le_bytes());
    image[8..10].copy_from_slice(&0x0040u16.to_le_bytes());
    image[10..12].copy_from_slice(&0x0050u16.to_le_bytes());
    image[12..14].copy_from_slice(&0x0018u16.to_le_bytes());
    image[14..16].copy_from_slice(&0x0058u16.to_le_bytes());
    image
}

fn assert_only_cog_zero_booting(chip: &Propeller) {
    let cog = chip.cog(0).expect("cog 0 should be running");
    assert_eq!(cog.kind(), EngineKind::Interpreted);
    assert_eq!(cog.state(), CogRunState::LoadProgram);
    for id in 1..COG_COUNT {
        assert!(chip.cog(id).is_none(), "cog {id} should not be running");
    }
    assert_eq!(chip.hub().running_cogs(), 1);
}

#[proptest]
fn test_initialize_then_reset_boots_only_cog_zero(
    #[strategy(1usize..=HUB_RAM_SIZE)] len: usize,
    fill: u8,
) {
    let mut chip = Propeller::new();
    let image = vec![fill; len];
    chip.initialize(&image).expect("image fits in RAM");
    assert_only_cog_zero_booting(&chip);
    chip.reset();
    assert_only_cog_zero_booting(&chip);
}

#[test]
fn test_rejected_image_leaves_chip_alone() {
    let mut chip = Propeller::new();
    chip.write_long(0x100, 0xDEAD_BEEF);
    assert_eq!(chip.initialize(&[]), Err(BinarySizeError { size: 0 }));
    let too_big = vec![0u8; HUB_RAM_SIZE + 1];
    assert_eq!(
        chip.initialize(&too_big),
        Err(BinarySizeError {
            size: HUB_RAM_SIZE + 1
        })
    );
    assert_eq!(chip.read_long(0x100), 0xDEAD_BEEF);
    assert!(chip.cog(0).is_none());
}

#[test]
fn test_reset_builds_boot_frame() {
    let mut chip = Propeller::new();
    chip.initialize(&small_image()).expect("valid image");
    assert_eq!(chip.read_word(0x48), 0x0010);
    assert_eq!(chip.read_word(0x4A), 0x0040);
    assert_eq!(chip.read_word(0x4C), 0x0018);
    assert_eq!(chip.read_word(0x4E), 0x0058);
    assert_eq!(
        chip.read_cog_register(0, SpecialRegister::Par.address() as usize),
        Some(0x50)
    );
    assert_eq!(chip.core_frequency(), 12_000_000);
}

#[test]
fn test_initialize_derives_crystal_frequency() {
    let mut image = small_image();
    image[0..4].copy_from_slice(&80_000_000u32.to_le_bytes());
    image[4] = 0x6F; // XTAL1 + PLL16X
    let mut chip = Propeller::new();
    chip.initialize(&image).expect("valid image");
    assert_eq!(chip.xtal_frequency(), 5_000_000);
    assert_eq!(chip.core_frequency(), 80_000_000);
    assert_eq!(chip.status().clock_mode_name, "PLL+XTAL1+PLL16X");
}

#[test]
fn test_reset_restores_loaded_memory() {
    let mut chip = Propeller::new();
    chip.initialize(&small_image()).expect("valid image");
    chip.write_long(0x20, 0x1234_5678);
    for _ in 0..10 {
        chip.step().expect("no fault");
    }
    chip.reset();
    assert_eq!(chip.read_long(0x20), 0);
    assert_eq!(chip.counter(), 0);
    assert_eq!(chip.time(), 0.0);
}

#[test]
fn test_each_cog_gets_one_hub_slot_in_sixteen_clocks() {
    let mut chip = Propeller::new();
    for id in 0..COG_COUNT {
        chip.start_cog(id, EngineKind::Native, 0x1000, 0);
    }
    for _ in 0..16 {
        chip.step().expect("no fault");
    }
    for id in 0..COG_COUNT {
        let cog = chip.cog(id).expect("cog is running");
        assert_eq!(cog.hub_accesses(), 1, "cog {id}");
    }
}

#[test]
fn test_counter_and_time_advance_each_step() {
    let mut chip = Propeller::new();
    for _ in 0..12 {
        chip.step().expect("no fault");
    }
    assert_eq!(chip.counter(), 12);
    // RCFAST is 12MHz.
    assert!((chip.time() - 1e-6).abs() < 1e-12);
}

#[test]
fn test_hub_actions_start_and_stop_cogs() {
    let mut chip = Propeller::new();
    let request = CogInitRequest {
        parameter: 0x40,
        program: INTERPRETER_ENTRY,
        cog: CogSelection::AnyFree,
    };
    let result = chip
        .hub
        .execute_hub_operation(0, HubOperation::CogInit, request.encode());
    assert_eq!((result.value, result.carry), (0, false));
    chip.apply_actions();
    let cog = chip.cog(0).expect("cog 0 started");
    assert_eq!(cog.kind(), EngineKind::Interpreted);

    chip.hub.execute_hub_operation(0, HubOperation::CogStop, 0);
    chip.apply_actions();
    assert!(chip.cog(0).is_none());
    assert_eq!(chip.hub().running_cogs(), 0);
}

#[test]
fn test_clkset_with_reset_bit_resets_chip() {
    let mut chip = Propeller::new();
    chip.initialize(&small_image()).expect("valid image");
    chip.start_cog(3, EngineKind::Native, 0x1000, 0);
    chip.hub
        .execute_hub_operation(3, HubOperation::ClkSet, 0x80 | 0x01);
    chip.apply_actions();
    assert_only_cog_zero_booting(&chip);
    assert_eq!(chip.clock_mode(), ClockMode::new(0x01));
    assert_eq!(chip.core_frequency(), 20_000);
}

#[test]
fn test_clkset_without_reset_changes_frequency() {
    let mut chip = Propeller::new();
    chip.hub.execute_hub_operation(0, HubOperation::ClkSet, 0x01);
    chip.apply_actions();
    assert_eq!(chip.core_frequency(), 20_000);
    assert!(chip.cog(0).is_none());
}

#[test]
fn test_step_instruction_runs_to_next_instruction() {
    let mut chip = Propeller::new();
    // All-zero cog memory decodes as instructions which never run.
    chip.start_cog(0, EngineKind::Native, 0x1000, 0);
    assert!(chip.step_instruction(0).expect("no fault"));
    let cog = chip.cog(0).expect("cog is running");
    assert_eq!(cog.state(), CogRunState::Execute);
    assert_eq!(cog.pc(), 0);

    assert!(chip.step_instruction(0).expect("no fault"));
    assert_eq!(chip.cog(0).map(Cog::pc), Some(1));
}

#[test]
fn test_breakpoint_stops_stepping() {
    let mut chip = Propeller::new();
    chip.start_cog(0, EngineKind::Native, 0x1000, 0);
    chip.step_instruction(0).expect("no fault");
    assert!(chip.set_breakpoint(0, Some(1)));
    assert!(!chip.set_breakpoint(5, Some(1)));
    assert!(!chip.step_instruction(0).expect("no fault"));
    assert_eq!(chip.cog(0).map(Cog::pc), Some(1));
}

#[test]
fn test_undefined_opcode_is_reported_as_fault() {
    let mut chip = Propeller::new();
    let mul = Instruction::build(
        Opcode::Mul,
        Effects::NONE,
        false,
        Condition::Always,
        0,
        0,
    );
    chip.write_long(0x1000, mul.bits());
    chip.start_cog(2, EngineKind::Native, 0x1000, 0);
    let fault = (0..0x4000)
        .find_map(|_| chip.step().err())
        .expect("the cog should fault");
    assert_eq!(fault.cog, 2);
    assert_eq!(
        fault.kind,
        FaultKind::UndefinedNativeOpcode {
            opcode: Opcode::Mul.bits(),
            pc: 0
        }
    );
    // The chip carries on.
    assert!(chip.step().is_ok());
}

#[derive(Clone, Default)]
struct Recorder {
    log: Rc<RefCell<Vec<String>>>,
}

impl Plugin for Recorder {
    fn on_clock(&mut self, _time: f64, counter: u32, _pins: &mut PinDriver) {
        self.log.borrow_mut().push(format!("clock {counter}"));
    }

    fn on_pin_change(&mut self, _time: f64, pins: &[PinState; PIN_COUNT], _drive: &mut PinDriver) {
        self.log.borrow_mut().push(format!("pin 5 is {}", pins[5]));
    }

    fn on_reset(&mut self) {
        self.log.borrow_mut().push("reset".to_string());
    }

    fn on_close(&mut self) {
        self.log.borrow_mut().push("close".to_string());
    }
}

#[test]
fn test_plugins_hear_pins_clocks_and_resets() {
    let recorder = Recorder::default();
    let log = Rc::clone(&recorder.log);
    let mut chip = Propeller::new();
    let id = chip.include_plugin(Box::new(recorder));
    assert!(chip.notify_on_pins(id));

    chip.drive_pin(5, false, true);
    assert_eq!(chip.ina() & (1 << 5), 1 << 5);
    chip.step().expect("no fault");
    assert_eq!(log.borrow().as_slice(), ["pin 5 is h"]);

    assert!(chip.notify_on_clock(id));
    chip.step().expect("no fault");
    chip.step().expect("no fault");
    chip.reset();
    assert!(chip.remove_plugin(id));
    assert!(!chip.remove_plugin(id));
    assert_eq!(
        log.borrow().as_slice(),
        ["pin 5 is h", "clock 2", "clock 3", "reset", "close"]
    );
}

#[test]
fn test_plugins_may_drive_pins() {
    struct Echo;
    impl Plugin for Echo {
        fn on_clock(&mut self, _time: f64, counter: u32, pins: &mut PinDriver) {
            pins.drive(7, false, counter % 2 == 1);
        }
    }
    let mut chip = Propeller::new();
    let id = chip.include_plugin(Box::new(Echo));
    chip.notify_on_clock(id);
    chip.step().expect("no fault");
    assert_eq!(chip.pin_states()[7], PinState::InputHi);
    chip.step().expect("no fault");
    assert_eq!(chip.pin_states()[7], PinState::InputLo);
}
