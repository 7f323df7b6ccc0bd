use super::fixed::Fixed;

const MAX_FLOOR: f32 = 0.99;

const PEAK_ATTACK: f32 = 0.4;
const PEAK_DECAY: f32 = 0.02;
const PEAK_SMOOTHING: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VuState {
    pub level: f32,
    pub last: f32,
    pub average: f32,
    /// RMS before floor removal and gating; what calibration learns from.
    pub raw_level: f32,
}

/// RMS loudness of the conditioned waveform.
#[derive(Debug, Clone, Default)]
pub struct VuEstimator {
    state: VuState,
}

/// RMS of Q16.16 samples, computed on the raw bits.
pub fn fixed_rms(samples: &[Fixed]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: i64 = samples
        .iter()
        .map(|s| {
            let b = s.to_bits() as i64;
            b * b
        })
        .sum();
    let mean_sq = sum_sq as f64 / samples.len() as f64;
    (mean_sq.sqrt() / Fixed::ONE.to_bits() as f64) as f32
}

impl VuEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &VuState {
        &self.state
    }

    pub fn level(&self) -> f32 {
        self.state.level
    }

    pub fn reset(&mut self) {
        self.state = VuState::default();
    }

    /// `floor` is only removed once calibrated; a calibrating estimator
    /// reports the plain RMS.
    pub fn update(&mut self, waveform: &[Fixed], gated: bool, calibrating: bool, floor: f32) -> f32 {
        let st = &mut self.state;
        st.last = st.level;

        let rms = fixed_rms(waveform);
        st.raw_level = rms;
        let mut level = if gated { 0.0 } else { rms };

        if !calibrating {
            let floor = floor.clamp(0.0, MAX_FLOOR);
            level = (level - floor).max(0.0) / (1.0 - floor);
        }

        st.level = level;
        st.average = (level + st.last) / 2.0;
        level
    }
}

/// Peak amplitude above the minimum signal level, relative to its own
/// slow-decaying follower.
#[derive(Debug, Clone, Default)]
pub struct WaveformPeak {
    follower: f32,
    scaled: f32,
}

impl WaveformPeak {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scaled(&self) -> f32 {
        self.scaled
    }

    pub fn update(&mut self, max_abs: i32, min_level: f32) -> f32 {
        let value = max_abs as f32 - min_level;
        if value > self.follower {
            self.follower += (value - self.follower) * PEAK_ATTACK;
        } else if value < self.follower {
            self.follower -= (self.follower - value) * PEAK_DECAY;
            if self.follower < min_level {
                self.follower = min_level;
            }
        }

        let raw = if self.follower > 0.0 {
            (value / self.follower).max(0.0)
        } else {
            0.0
        };
        self.scaled += (raw - self.scaled) * PEAK_SMOOTHING;
        self.scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(amplitude: f32, n: usize) -> Vec<Fixed> {
        (0..n)
            .map(|i| Fixed::from_f32(if i % 2 == 0 { amplitude } else { -amplitude }))
            .collect()
    }

    #[test]
    fn rms_of_square_wave_is_its_amplitude() {
        assert_relative_eq!(fixed_rms(&square(0.5, 128)), 0.5, epsilon = 1e-5);
        assert_eq!(fixed_rms(&[]), 0.0);
    }

    #[test]
    fn floor_is_removed_and_rescaled() {
        let mut vu = VuEstimator::new();
        let level = vu.update(&square(0.5, 128), false, false, 0.25);
        assert_relative_eq!(level, (0.5 - 0.25) / 0.75, epsilon = 1e-5);

        let quiet = vu.update(&square(0.1, 128), false, false, 0.25);
        assert_eq!(quiet, 0.0);
        assert_relative_eq!(vu.state().average, level / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn gate_zeroes_level_but_keeps_raw() {
        let mut vu = VuEstimator::new();
        assert_eq!(vu.update(&square(0.3, 64), true, false, 0.0), 0.0);
        assert_relative_eq!(vu.state().raw_level, 0.3, epsilon = 1e-5);
    }

    #[test]
    fn calibrating_skips_floor_removal() {
        let mut vu = VuEstimator::new();
        let level = vu.update(&square(0.2, 64), false, true, 0.9);
        assert_relative_eq!(level, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn peak_follower_scales_to_unity_on_steady_input() {
        let mut peak = WaveformPeak::new();
        for _ in 0..200 {
            peak.update(10_750, 750.0);
        }
        assert_relative_eq!(peak.scaled(), 1.0, epsilon = 1e-3);
        for _ in 0..5 {
            peak.update(0, 750.0);
        }
        assert!(peak.scaled() < 0.1);
    }
}
