//! Per-element attention timers and sequence-number state.
//!
//! Sequence counters live in RAM; only the next NVM threshold (the
//! smallest multiple of [`SEQ_NVM_INCREMENT`](crate::SEQ_NVM_INCREMENT)
//! strictly above the counter) is persisted, so a restart resumes from
//! a safe overestimate.

use crate::error::ConfigError;
use crate::{ELEMENT_COUNT, SEQ_NVM_INCREMENT};
use heapless::Vec;
use meshcore_common::{Seq, SEQ_MAX};

/// What the host must do with the 1 Hz attention timer after a
/// mutation.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttentionAction {
    Started,
    Stopped,
}

/// Outcome of one 1 Hz attention tick.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttentionTick {
    /// Countdown reached zero; attention turns off.
    Expired,
    /// Still counting; restart the 1 second timer.
    Rearm,
    /// Timer fired for an element whose attention is already off.
    Idle,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElementStore<const E: usize = ELEMENT_COUNT> {
    attention: Vec<u8, E>,
    seq: Vec<Seq, E>,
    pub(crate) seq_thresholds: Vec<u32, E>,
}

impl<const E: usize> ElementStore<E> {
    pub fn new(element_count: u8) -> Result<Self, ConfigError> {
        if element_count == 0 || element_count as usize > E {
            return Err(ConfigError::InvalidConfig);
        }
        let mut attention = Vec::new();
        attention.resize(element_count as usize, 0).ok();
        let mut seq = Vec::new();
        seq.resize(element_count as usize, Seq::default()).ok();
        let mut seq_thresholds = Vec::new();
        seq_thresholds.resize(element_count as usize, 0).ok();
        Ok(Self {
            attention,
            seq,
            seq_thresholds,
        })
    }

    pub fn element_count(&self) -> u8 {
        self.attention.len() as u8
    }

    fn check_element(&self, element_index: u8) -> Result<usize, ConfigError> {
        if (element_index as usize) < self.attention.len() {
            Ok(element_index as usize)
        } else {
            Err(ConfigError::InvalidParams)
        }
    }

    pub fn attention(&self, element_index: u8) -> u8 {
        self.check_element(element_index)
            .map(|i| self.attention[i])
            .unwrap_or(0)
    }

    pub fn set_attention(
        &mut self,
        element_index: u8,
        seconds: u8,
    ) -> Result<AttentionAction, ConfigError> {
        let i = self.check_element(element_index)?;
        self.attention[i] = seconds;
        if seconds == 0 {
            Ok(AttentionAction::Stopped)
        } else {
            Ok(AttentionAction::Started)
        }
    }

    pub fn tick_attention(&mut self, element_index: u8) -> AttentionTick {
        let Ok(i) = self.check_element(element_index) else {
            return AttentionTick::Idle;
        };
        if self.attention[i] == 0 {
            return AttentionTick::Idle;
        }
        self.attention[i] -= 1;
        if self.attention[i] == 0 {
            AttentionTick::Expired
        } else {
            AttentionTick::Rearm
        }
    }

    pub fn seq(&self, element_index: u8) -> Result<Seq, ConfigError> {
        self.check_element(element_index).map(|i| self.seq[i])
    }

    /// Set the sequence counter. Returns the new NVM threshold when it
    /// moved and must be persisted.
    pub fn set_seq(&mut self, element_index: u8, seq: Seq) -> Result<Option<u32>, ConfigError> {
        let i = self.check_element(element_index)?;
        if seq.value() > SEQ_MAX {
            return Err(ConfigError::InvalidParams);
        }
        self.seq[i] = seq;

        let threshold = next_threshold(seq.value());
        if self.seq_thresholds[i] != threshold {
            self.seq_thresholds[i] = threshold;
            Ok(Some(threshold))
        } else {
            Ok(None)
        }
    }

    pub fn seq_threshold(&self, element_index: u8) -> u32 {
        self.check_element(element_index)
            .map(|i| self.seq_thresholds[i])
            .unwrap_or(0)
    }

    /// Zero every counter and threshold (IV transition).
    pub fn reset_sequences(&mut self) {
        for seq in self.seq.iter_mut() {
            *seq = Seq::default();
        }
        for threshold in self.seq_thresholds.iter_mut() {
            *threshold = 0;
        }
    }

    /// Adopt persisted thresholds after a restart; counters resume
    /// from the threshold, overestimating anything lost in the crash.
    pub fn restore_thresholds(&mut self, thresholds: &[u32]) {
        for (i, threshold) in thresholds
            .iter()
            .take(self.seq_thresholds.len())
            .enumerate()
        {
            self.seq_thresholds[i] = *threshold;
            self.seq[i] = Seq::new(*threshold);
        }
    }
}

/// Smallest multiple of the NVM increment strictly greater than `seq`.
fn next_threshold(seq: u32) -> u32 {
    (seq / SEQ_NVM_INCREMENT + 1) * SEQ_NVM_INCREMENT
}
