//! Sequence-number pressure monitor.
//!
//! Watches sequence use across all elements and latches one event per
//! threshold: the low crossing asks network management to start an IV
//! update, the high crossing asks it to finish one. A sequence reset
//! (IV transition or recovery) re-arms both.

use meshcore_common::Seq;

/// Default threshold for requesting an IV update.
pub const LOW_SEQ_THRESHOLD: u32 = 0x70_0000;

/// Default threshold for forcing the return to normal operation.
pub const HIGH_SEQ_THRESHOLD: u32 = 0xC0_0000;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThresholdCrossing {
    Low,
    High,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceMonitor {
    low: u32,
    high: u32,
    low_reported: bool,
    high_reported: bool,
}

impl Default for SequenceMonitor {
    fn default() -> Self {
        Self::with_thresholds(LOW_SEQ_THRESHOLD, HIGH_SEQ_THRESHOLD)
    }
}

impl SequenceMonitor {
    pub fn with_thresholds(low: u32, high: u32) -> Self {
        Self {
            low,
            high,
            low_reported: false,
            high_reported: false,
        }
    }

    /// Feed one observed sequence value; returns the crossing to
    /// report, at most once per arming.
    pub fn observe(&mut self, seq: Seq) -> Option<ThresholdCrossing> {
        if !self.high_reported && seq.value() >= self.high {
            self.high_reported = true;
            self.low_reported = true;
            return Some(ThresholdCrossing::High);
        }
        if !self.low_reported && seq.value() >= self.low {
            self.low_reported = true;
            return Some(ThresholdCrossing::Low);
        }
        None
    }

    /// Re-arm after the sequence numbers were reset.
    pub fn rearm(&mut self) {
        self.low_reported = false;
        self.high_reported = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_and_high_fire_once_each() {
        let mut monitor = SequenceMonitor::default();

        assert_eq!(monitor.observe(Seq::new(0x6F_FFFF)), None);
        assert_eq!(
            monitor.observe(Seq::new(0x70_0000)),
            Some(ThresholdCrossing::Low)
        );
        assert_eq!(monitor.observe(Seq::new(0x70_0001)), None);
        assert_eq!(
            monitor.observe(Seq::new(0xC0_0000)),
            Some(ThresholdCrossing::High)
        );
        assert_eq!(monitor.observe(Seq::new(0xC0_0001)), None);
    }

    #[test]
    fn jump_straight_past_high_reports_high_only() {
        let mut monitor = SequenceMonitor::default();
        assert_eq!(
            monitor.observe(Seq::new(0xD0_0000)),
            Some(ThresholdCrossing::High)
        );
        assert_eq!(monitor.observe(Seq::new(0xD0_0001)), None);
    }

    #[test]
    fn rearm_after_reset() {
        let mut monitor = SequenceMonitor::default();
        monitor.observe(Seq::new(0x70_0000));
        monitor.rearm();
        assert_eq!(
            monitor.observe(Seq::new(0x70_0000)),
            Some(ThresholdCrossing::Low)
        );
    }
}
