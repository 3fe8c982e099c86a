//! Fail-safe arm/detonate state machine.
//!
//! A receiver is armed only while validated frames keep saying so, and its
//! detonate output is high only while armed and addressed. Losing the link for
//! longer than the silence timeout forces both outputs low.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::frame::ValidatedFrame;
use crate::node_id::NodeId;
use crate::{info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmState {
    #[default]
    Disarmed,
    Armed,
}

/// Levels the two physical outputs should be driven to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputLevels {
    pub arm_indicator: bool,
    pub detonate: bool,
}

impl OutputLevels {
    pub const SAFE: Self = Self {
        arm_indicator: false,
        detonate: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// Still inside the silence window.
    Alive,
    /// Timed out earlier and already safe.
    Silent,
    /// This tick crossed the timeout and forced the node safe.
    Tripped,
}

pub struct ArmingMachine {
    state: ArmState,
    detonate: bool,
    silent_ticks: u32,
    timeout_ticks: u32,
}

impl ArmingMachine {
    pub const fn new(timeout_ticks: u32) -> Self {
        Self {
            state: ArmState::Disarmed,
            detonate: false,
            silent_ticks: 0,
            timeout_ticks,
        }
    }

    pub fn state(&self) -> ArmState {
        self.state
    }

    pub fn silent_ticks(&self) -> u32 {
        self.silent_ticks
    }

    pub fn levels(&self) -> OutputLevels {
        OutputLevels {
            arm_indicator: self.state == ArmState::Armed,
            detonate: self.detonate,
        }
    }

    /// Applies one validated frame. The arm flag is taken first, so a
    /// disarming frame can never fire regardless of its bitmap.
    pub fn on_frame(&mut self, frame: &ValidatedFrame, own_id: Option<NodeId>) -> OutputLevels {
        self.state = if frame.armed() {
            ArmState::Armed
        } else {
            ArmState::Disarmed
        };
        self.silent_ticks = 0;
        self.detonate = self.state == ArmState::Armed && frame.pyro_bits().addresses(own_id);
        self.levels()
    }

    pub fn on_tick(&mut self) -> TickOutcome {
        if self.silent_ticks > self.timeout_ticks {
            return TickOutcome::Silent;
        }
        self.silent_ticks = self.silent_ticks.saturating_add(1);
        if self.silent_ticks > self.timeout_ticks {
            self.state = ArmState::Disarmed;
            self.detonate = false;
            TickOutcome::Tripped
        } else {
            TickOutcome::Alive
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputPin {
    ArmIndicator,
    Detonate,
}

/// The physical outputs a receiver drives.
pub trait DigitalOutputs {
    fn set_level(&mut self, pin: OutputPin, high: bool);
}

/// Couples the machine to its outputs and only touches a pin when its level
/// actually changes.
pub struct ArmingController<O: DigitalOutputs> {
    machine: ArmingMachine,
    outputs: O,
    driven: OutputLevels,
}

/// How the firmware shares the controller between the dispatcher and the
/// watchdog.
pub type SharedArming<O> = Mutex<CriticalSectionRawMutex, RefCell<ArmingController<O>>>;

impl<O: DigitalOutputs> ArmingController<O> {
    /// Drives both outputs to their safe level before anything else happens.
    pub fn new(mut outputs: O, timeout_ticks: u32) -> Self {
        outputs.set_level(OutputPin::Detonate, false);
        outputs.set_level(OutputPin::ArmIndicator, false);
        Self {
            machine: ArmingMachine::new(timeout_ticks),
            outputs,
            driven: OutputLevels::SAFE,
        }
    }

    pub fn state(&self) -> ArmState {
        self.machine.state()
    }

    pub fn silent_ticks(&self) -> u32 {
        self.machine.silent_ticks()
    }

    pub fn levels(&self) -> OutputLevels {
        self.driven
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn on_frame(&mut self, frame: &ValidatedFrame, own_id: Option<NodeId>) -> OutputLevels {
        let before = self.machine.state();
        let levels = self.machine.on_frame(frame, own_id);
        if levels.detonate != self.driven.detonate {
            if levels.detonate {
                warn!("Detonate HIGH");
            } else {
                info!("Detonate LOW");
            }
        }
        if self.machine.state() != before {
            info!("Arm state {:?} -> {:?}", before, self.machine.state());
        }
        self.drive(levels);
        levels
    }

    pub fn on_tick(&mut self) -> TickOutcome {
        let outcome = self.machine.on_tick();
        if outcome == TickOutcome::Tripped {
            warn!(
                "No valid frame for {} ticks, forcing safe",
                self.machine.silent_ticks()
            );
            self.drive(self.machine.levels());
        }
        outcome
    }

    // Lowering: detonate goes first. Raising: the indicator goes first.
    fn drive(&mut self, target: OutputLevels) {
        if !target.detonate && self.driven.detonate {
            self.outputs.set_level(OutputPin::Detonate, false);
        }
        if target.arm_indicator != self.driven.arm_indicator {
            self.outputs
                .set_level(OutputPin::ArmIndicator, target.arm_indicator);
        }
        if target.detonate && !self.driven.detonate {
            self.outputs.set_level(OutputPin::Detonate, true);
        }
        self.driven = target;
    }
}

/// Outputs that remember every write, for host tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingOutputs {
    pub writes: heapless::Vec<(OutputPin, bool), 64>,
}

#[cfg(test)]
impl RecordingOutputs {
    pub fn level(&self, pin: OutputPin) -> Option<bool> {
        self.writes
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, level)| *level)
    }
}

#[cfg(test)]
impl DigitalOutputs for RecordingOutputs {
    fn set_level(&mut self, pin: OutputPin, high: bool) {
        let _ = self.writes.push((pin, high));
    }
}

#[cfg(test)]
mod tests;
