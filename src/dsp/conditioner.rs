//! Raw microphone words to a bias-free, gain-adjusted i16 waveform.

use super::fixed::Fixed;
use super::history::SampleHistory;
use crate::audio::{RawBlock, MAX_CHUNK_SIZE};
use crate::error::EngineError;

const SAMPLE_LIMIT: i32 = i16::MAX as i32;

/// Conditioning knobs, refreshed from config between cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionerSettings {
    pub input_shift: u32,
    pub dc_offset: i32,
    pub sensitivity: Fixed,
}

/// Per-cycle measurements taken while conditioning.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConditionStats {
    /// Largest |sample| after gain and clipping.
    pub max_abs: i32,
    /// RMS before AGC gain, as a fraction of full scale.
    pub pre_gain_rms: f32,
    /// Mean of the shifted words before DC removal.
    pub raw_mean: f32,
    pub filled: usize,
    pub underrun: bool,
}

pub struct Conditioner {
    history: SampleHistory,
    waveform: [i16; MAX_CHUNK_SIZE],
    waveform_fixed: [Fixed; MAX_CHUNK_SIZE],
    len: usize,
}

impl Conditioner {
    pub fn new(history_capacity: usize) -> Result<Self, EngineError> {
        Ok(Self {
            history: SampleHistory::new(history_capacity)?,
            waveform: [0; MAX_CHUNK_SIZE],
            waveform_fixed: [Fixed::ZERO; MAX_CHUNK_SIZE],
            len: 0,
        })
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    /// Conditioned samples of the last cycle.
    #[cfg(test)]
    pub(crate) fn waveform(&self) -> &[i16] {
        &self.waveform[..self.len]
    }

    /// The last cycle's samples mapped onto [-1, 1].
    pub fn waveform_fixed(&self) -> &[Fixed] {
        &self.waveform_fixed[..self.len]
    }

    pub fn reset(&mut self) {
        self.history.reset();
        self.waveform = [0; MAX_CHUNK_SIZE];
        self.waveform_fixed = [Fixed::ZERO; MAX_CHUNK_SIZE];
        self.len = 0;
    }

    /// Condition one block and push it into the history.
    ///
    /// Positions the source did not fill are zeros, so the history always
    /// advances by exactly `block.requested()` samples.
    pub fn process(&mut self, block: &RawBlock, settings: &ConditionerSettings, gain: Fixed) -> ConditionStats {
        let requested = block.requested();
        let samples = block.samples();

        let mut raw_sum: i64 = 0;
        let mut sum_sq: i64 = 0;
        let mut max_abs: i32 = 0;

        for (i, out) in self.waveform[..requested].iter_mut().enumerate() {
            let Some(&word) = samples.get(i) else {
                *out = 0;
                continue;
            };
            let shifted = word >> settings.input_shift;
            raw_sum += shifted as i64;

            let centered = shifted.saturating_sub(settings.dc_offset);
            let sensed = settings.sensitivity.scale(centered).clamp(-SAMPLE_LIMIT, SAMPLE_LIMIT);
            sum_sq += sensed as i64 * sensed as i64;

            let value = gain.scale(sensed).clamp(-SAMPLE_LIMIT, SAMPLE_LIMIT);
            max_abs = max_abs.max(value.abs());
            *out = value as i16;
        }

        for (fixed, &s) in self.waveform_fixed[..requested].iter_mut().zip(&self.waveform[..requested]) {
            *fixed = Fixed::RECIP_32768.saturating_mul(Fixed::from_int(s as i32));
        }
        self.len = requested;
        self.history.push_chunk(&self.waveform[..requested]);

        let filled = samples.len();
        let (raw_mean, pre_gain_rms) = if filled > 0 {
            let mean_sq = sum_sq as f64 / filled as f64;
            (
                (raw_sum as f64 / filled as f64) as f32,
                (mean_sq.sqrt() / 32_768.0) as f32,
            )
        } else {
            (0.0, 0.0)
        };

        ConditionStats {
            max_abs,
            pre_gain_rms,
            raw_mean,
            filled,
            underrun: filled < requested,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.history.is_consistent()
    }

    #[cfg(test)]
    pub(crate) fn history_mut(&mut self) -> &mut SampleHistory {
        &mut self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::history::HISTORY_CAPACITY;

    fn unity() -> ConditionerSettings {
        ConditionerSettings {
            input_shift: 14,
            dc_offset: 0,
            sensitivity: Fixed::ONE,
        }
    }

    #[test]
    fn removes_dc_and_applies_gain() {
        let mut cond = Conditioner::new(HISTORY_CAPACITY).unwrap();
        let settings = ConditionerSettings { dc_offset: -100, ..unity() };
        let words: Vec<i32> = [-100, 900, -1100, -100].iter().map(|v| v << 14).collect();
        let block = RawBlock::from_samples(4, &words);

        let stats = cond.process(&block, &settings, Fixed::from_int(2));
        assert_eq!(cond.waveform(), &[0, 2000, -2000, 0]);
        assert_eq!(stats.max_abs, 2000);
        assert_eq!(stats.raw_mean, -100.0);
        assert!((stats.pre_gain_rms - (500_000f32).sqrt() / 32_768.0).abs() < 1e-6);
        assert_eq!(cond.history().latest(4), &[0, 2000, -2000, 0]);
    }

    #[test]
    fn clips_to_i16_range() {
        let mut cond = Conditioner::new(HISTORY_CAPACITY).unwrap();
        let block = RawBlock::from_samples(2, &[i32::MAX, i32::MIN]);
        let stats = cond.process(&block, &unity(), Fixed::from_int(8));
        assert_eq!(cond.waveform(), &[32_767, -32_767]);
        assert_eq!(stats.max_abs, 32_767);
    }

    #[test]
    fn short_block_is_zero_filled_and_history_advances() {
        let mut cond = Conditioner::new(HISTORY_CAPACITY).unwrap();
        let words = vec![1000 << 14; 100];
        let block = RawBlock::from_samples(128, &words);
        let stats = cond.process(&block, &unity(), Fixed::ONE);

        assert!(stats.underrun);
        assert_eq!(stats.filled, 100);
        assert_eq!(cond.waveform().len(), 128);
        assert!(cond.waveform()[100..].iter().all(|&s| s == 0));
        assert_eq!(cond.history().latest(28), &[0; 28]);
        assert_eq!(cond.history().latest(29)[0], 1000);
        assert_eq!(stats.raw_mean, 1000.0);
    }

    #[test]
    fn fixed_waveform_is_unit_scaled() {
        let mut cond = Conditioner::new(HISTORY_CAPACITY).unwrap();
        let block = RawBlock::from_samples(2, &[16_384 << 14, -(8_192 << 14)]);
        cond.process(&block, &unity(), Fixed::ONE);
        let fixed = cond.waveform_fixed();
        assert_eq!(fixed[0], Fixed::from_f32(0.5));
        assert_eq!(fixed[1], Fixed::from_f32(-0.25));
    }
}
