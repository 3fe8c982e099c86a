use super::*;
use crate::config::DEPLOYMENT_MAGIC;
use crate::frame::{FramePayload, encode, validate};

const TIMEOUT: u32 = 10;

fn frame(armed: bool, ids: &[u16]) -> ValidatedFrame {
    let mut p = FramePayload::new();
    p.armed = armed;
    for &id in ids {
        p.pyro_bits.set(id as i32, true);
    }
    validate(&encode(&p, DEPLOYMENT_MAGIC), DEPLOYMENT_MAGIC).unwrap()
}

fn node(id: u16) -> Option<NodeId> {
    NodeId::new(id)
}

#[test]
fn test_initial_state_is_safe() {
    let sm = ArmingMachine::new(TIMEOUT);
    assert_eq!(sm.state(), ArmState::Disarmed);
    assert_eq!(sm.levels(), OutputLevels::SAFE);
}

#[test]
fn test_armed_and_addressed_fires() {
    let mut sm = ArmingMachine::new(TIMEOUT);
    let levels = sm.on_frame(&frame(true, &[5]), node(5));
    assert_eq!(sm.state(), ArmState::Armed);
    assert!(levels.detonate);
    assert!(levels.arm_indicator);
}

#[test]
fn test_disarmed_frame_never_fires() {
    let mut sm = ArmingMachine::new(TIMEOUT);
    sm.on_frame(&frame(true, &[5]), node(5));
    let levels = sm.on_frame(&frame(false, &[5]), node(5));
    assert_eq!(sm.state(), ArmState::Disarmed);
    assert_eq!(levels, OutputLevels::SAFE);
}

#[test]
fn test_armed_but_not_addressed() {
    let mut sm = ArmingMachine::new(TIMEOUT);
    let levels = sm.on_frame(&frame(true, &[4, 6]), node(5));
    assert_eq!(sm.state(), ArmState::Armed);
    assert!(!levels.detonate);
}

#[test]
fn test_unassigned_node_never_fires() {
    let all: [u16; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
    let mut sm = ArmingMachine::new(TIMEOUT);
    let levels = sm.on_frame(&frame(true, &all), None);
    assert!(levels.arm_indicator);
    assert!(!levels.detonate);
}

#[test]
fn test_detonate_is_level_triggered() {
    let mut sm = ArmingMachine::new(TIMEOUT);
    assert!(sm.on_frame(&frame(true, &[5]), node(5)).detonate);
    assert!(!sm.on_frame(&frame(true, &[]), node(5)).detonate);
    assert!(sm.on_frame(&frame(true, &[5]), node(5)).detonate);
}

#[test]
fn test_silence_timeout_forces_safe() {
    let mut sm = ArmingMachine::new(TIMEOUT);
    sm.on_frame(&frame(true, &[5]), node(5));

    for _ in 0..TIMEOUT {
        assert_eq!(sm.on_tick(), TickOutcome::Alive);
        assert!(sm.levels().detonate);
    }
    assert_eq!(sm.on_tick(), TickOutcome::Tripped);
    assert_eq!(sm.state(), ArmState::Disarmed);
    assert_eq!(sm.levels(), OutputLevels::SAFE);

    for _ in 0..100 {
        assert_eq!(sm.on_tick(), TickOutcome::Silent);
    }
    assert_eq!(sm.silent_ticks(), TIMEOUT + 1);
}

#[test]
fn test_frame_resets_silence_counter() {
    let mut sm = ArmingMachine::new(TIMEOUT);
    sm.on_frame(&frame(true, &[]), node(1));
    for _ in 0..TIMEOUT {
        sm.on_tick();
    }
    sm.on_frame(&frame(true, &[]), node(1));
    assert_eq!(sm.silent_ticks(), 0);
    assert_eq!(sm.on_tick(), TickOutcome::Alive);
    assert_eq!(sm.state(), ArmState::Armed);
}

#[test]
fn test_controller_starts_safe() {
    let ctl = ArmingController::new(RecordingOutputs::default(), TIMEOUT);
    assert_eq!(ctl.outputs().writes.len(), 2);
    assert_eq!(ctl.outputs().level(OutputPin::Detonate), Some(false));
    assert_eq!(ctl.outputs().level(OutputPin::ArmIndicator), Some(false));
}

#[test]
fn test_identical_frames_cause_no_extra_writes() {
    let mut ctl = ArmingController::new(RecordingOutputs::default(), TIMEOUT);
    let f = frame(true, &[5]);
    ctl.on_frame(&f, node(5));
    let after_first = ctl.outputs().writes.len();
    assert_eq!(after_first, 4);

    for _ in 0..20 {
        assert_eq!(ctl.on_frame(&f, node(5)), ctl.levels());
    }
    assert_eq!(ctl.outputs().writes.len(), after_first);
    assert_eq!(ctl.state(), ArmState::Armed);
    assert_eq!(ctl.outputs().level(OutputPin::Detonate), Some(true));
}

#[test]
fn test_controller_write_order() {
    let mut ctl = ArmingController::new(RecordingOutputs::default(), TIMEOUT);
    ctl.on_frame(&frame(true, &[5]), node(5));
    assert_eq!(
        &ctl.outputs().writes[2..],
        &[(OutputPin::ArmIndicator, true), (OutputPin::Detonate, true)]
    );

    ctl.on_frame(&frame(false, &[5]), node(5));
    assert_eq!(
        &ctl.outputs().writes[4..],
        &[(OutputPin::Detonate, false), (OutputPin::ArmIndicator, false)]
    );
}

#[test]
fn test_controller_timeout_drives_pins_low() {
    let mut ctl = ArmingController::new(RecordingOutputs::default(), TIMEOUT);
    ctl.on_frame(&frame(true, &[5]), node(5));
    for _ in 0..=TIMEOUT {
        ctl.on_tick();
    }
    assert_eq!(ctl.levels(), OutputLevels::SAFE);
    assert_eq!(ctl.outputs().level(OutputPin::Detonate), Some(false));
    assert_eq!(ctl.outputs().level(OutputPin::ArmIndicator), Some(false));

    let writes = ctl.outputs().writes.len();
    for _ in 0..50 {
        ctl.on_tick();
    }
    assert_eq!(ctl.outputs().writes.len(), writes);
}
