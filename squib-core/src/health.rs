//! Link health counters kept by the dispatcher and reported periodically.

use crate::arming::ArmState;
use crate::events::SendStatus;
use crate::frame::ValidationError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkHealth {
    pub frames_accepted: u32,
    pub too_short: u32,
    pub crc_mismatch: u32,
    pub magic_mismatch: u32,
    pub sent_ok: u32,
    pub sent_failed: u32,
}

impl LinkHealth {
    pub const fn new() -> Self {
        Self {
            frames_accepted: 0,
            too_short: 0,
            crc_mismatch: 0,
            magic_mismatch: 0,
            sent_ok: 0,
            sent_failed: 0,
        }
    }

    pub fn record_accepted(&mut self) {
        self.frames_accepted = self.frames_accepted.wrapping_add(1);
    }

    pub fn record_rejection(&mut self, err: ValidationError) {
        let counter = match err {
            ValidationError::TooShort => &mut self.too_short,
            ValidationError::CrcMismatch => &mut self.crc_mismatch,
            ValidationError::MagicMismatch => &mut self.magic_mismatch,
        };
        *counter = counter.wrapping_add(1);
    }

    pub fn record_send(&mut self, status: SendStatus) {
        let counter = match status {
            SendStatus::Success => &mut self.sent_ok,
            SendStatus::Failed => &mut self.sent_failed,
        };
        *counter = counter.wrapping_add(1);
    }

    pub fn rejected(&self) -> u32 {
        self.too_short
            .wrapping_add(self.crc_mismatch)
            .wrapping_add(self.magic_mismatch)
    }
}

/// One line of the periodic health report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HealthReport {
    pub link: LinkHealth,
    pub events_dropped: u32,
    pub queue_len: usize,
    pub arm_state: ArmState,
    pub silent_ticks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_counted_per_kind() {
        let mut h = LinkHealth::new();
        h.record_rejection(ValidationError::CrcMismatch);
        h.record_rejection(ValidationError::CrcMismatch);
        h.record_rejection(ValidationError::MagicMismatch);
        h.record_accepted();
        assert_eq!(h.crc_mismatch, 2);
        assert_eq!(h.magic_mismatch, 1);
        assert_eq!(h.too_short, 0);
        assert_eq!(h.rejected(), 3);
        assert_eq!(h.frames_accepted, 1);
    }

    #[test]
    fn test_sends_are_counted() {
        let mut h = LinkHealth::new();
        h.record_send(SendStatus::Success);
        h.record_send(SendStatus::Failed);
        h.record_send(SendStatus::Success);
        assert_eq!((h.sent_ok, h.sent_failed), (2, 1));
    }
}
