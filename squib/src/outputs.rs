use embassy_rp::gpio::{Level, Output};
use squib_core::{DigitalOutputs, OutputPin};

use crate::OutputResources;

/// The arm LED and the detonate driver. Both are active high and start low.
pub struct GpioOutputs {
    detonate: Output<'static>,
    arm_led: Output<'static>,
}

impl GpioOutputs {
    pub fn new(r: OutputResources) -> Self {
        Self {
            detonate: Output::new(r.detonate, Level::Low),
            arm_led: Output::new(r.arm_led, Level::Low),
        }
    }
}

impl DigitalOutputs for GpioOutputs {
    fn set_level(&mut self, pin: OutputPin, high: bool) {
        let out = match pin {
            OutputPin::Detonate => &mut self.detonate,
            OutputPin::ArmIndicator => &mut self.arm_led,
        };
        out.set_level(Level::from(high));
    }
}
