use super::bins::{NUM_FREQS, NUM_ZONES};

/// Per-bin magnitudes at every stage of the pipeline, overwritten each cycle.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Unnormalized Goertzel magnitudes.
    pub raw: [f32; NUM_FREQS],
    /// `raw` scaled by each bin's window normalization.
    pub normalized: [f32; NUM_FREQS],
    /// Noise-removed (and optionally A-weighted) magnitudes.
    pub denoised: [f32; NUM_FREQS],
    /// `denoised` relative to its zone follower, in [0, 1].
    pub relative: [f32; NUM_FREQS],
    pub followers: [f32; NUM_FREQS],
    /// Low-passed output handed to renderers.
    pub final_: [f32; NUM_FREQS],
    pub zone_max: [f32; NUM_ZONES],
    pub zone_followers: [f32; NUM_ZONES],
}

impl Default for Spectrogram {
    fn default() -> Self {
        Self {
            raw: [0.0; NUM_FREQS],
            normalized: [0.0; NUM_FREQS],
            denoised: [0.0; NUM_FREQS],
            relative: [0.0; NUM_FREQS],
            followers: [0.0; NUM_FREQS],
            final_: [0.0; NUM_FREQS],
            zone_max: [0.0; NUM_ZONES],
            zone_followers: [1.0; NUM_ZONES],
        }
    }
}

impl Spectrogram {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_finite(&self) -> bool {
        [
            &self.raw[..],
            &self.normalized[..],
            &self.denoised[..],
            &self.relative[..],
            &self.followers[..],
            &self.final_[..],
            &self.zone_max[..],
            &self.zone_followers[..],
        ]
        .iter()
        .all(|stage| stage.iter().all(|v| v.is_finite()))
    }

    /// Index and value of the loudest normalized bin, if any bin is non-zero.
    pub fn peak_bin(&self) -> Option<(usize, f32)> {
        self.normalized
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, v)| v > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Bins whose denoised magnitude exceeds `threshold`.
    pub fn active_bins(&self, threshold: f32) -> usize {
        self.denoised.iter().filter(|&&v| v > threshold).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_ignores_silence() {
        let mut spec = Spectrogram::default();
        assert_eq!(spec.peak_bin(), None);
        spec.normalized[10] = 3.0;
        spec.normalized[40] = 5.0;
        assert_eq!(spec.peak_bin(), Some((40, 5.0)));
    }

    #[test]
    fn detects_non_finite_values() {
        let mut spec = Spectrogram::default();
        assert!(spec.is_finite());
        spec.followers[7] = f32::NAN;
        assert!(!spec.is_finite());
        spec.reset();
        assert!(spec.is_finite());
    }
}
