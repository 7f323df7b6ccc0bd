//! Pitch-class folding and onset strength over the smoothed spectrum.

use super::bins::NUM_FREQS;

pub const NUM_PITCH_CLASSES: usize = 12;

/// Cycles of spectral flux kept for the novelty curve.
pub const SPECTRAL_HISTORY_LENGTH: usize = 5;

#[derive(Debug, Clone)]
pub struct Chromagram {
    notes: [f32; NUM_PITCH_CLASSES],
    previous: [f32; NUM_FREQS],
    novelty_curve: [f32; SPECTRAL_HISTORY_LENGTH],
    cursor: usize,
}

impl Default for Chromagram {
    fn default() -> Self {
        Self {
            notes: [0.0; NUM_PITCH_CLASSES],
            previous: [0.0; NUM_FREQS],
            novelty_curve: [0.0; SPECTRAL_HISTORY_LENGTH],
            cursor: 0,
        }
    }
}

impl Chromagram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strength per pitch class; index 0 is A.
    pub fn notes(&self) -> &[f32; NUM_PITCH_CLASSES] {
        &self.notes
    }

    /// Most recent spectral flux.
    pub fn novelty(&self) -> f32 {
        let newest = (self.cursor + SPECTRAL_HISTORY_LENGTH - 1) % SPECTRAL_HISTORY_LENGTH;
        self.novelty_curve[newest]
    }

    /// Flux history, oldest first.
    pub fn novelty_curve(&self) -> [f32; SPECTRAL_HISTORY_LENGTH] {
        std::array::from_fn(|i| self.novelty_curve[(self.cursor + i) % SPECTRAL_HISTORY_LENGTH])
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold the first `range` bins into pitch classes (max per class, then
    /// normalized so the strongest class is 1.0) and record the flux.
    pub fn update(&mut self, spectrum: &[f32; NUM_FREQS], range: usize, note_offset: u8) {
        let range = range.min(NUM_FREQS);
        self.notes = [0.0; NUM_PITCH_CLASSES];
        for (i, &value) in spectrum[..range].iter().enumerate() {
            let class = (i + note_offset as usize) % NUM_PITCH_CLASSES;
            if value > self.notes[class] {
                self.notes[class] = value;
            }
        }
        let max = self.notes.iter().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            self.notes.iter_mut().for_each(|n| *n /= max);
        }

        // Only rising bins count toward onset strength.
        let flux: f32 = spectrum
            .iter()
            .zip(self.previous.iter())
            .map(|(&now, &before)| (now - before).max(0.0))
            .sum();
        self.previous = *spectrum;
        self.novelty_curve[self.cursor] = flux / NUM_FREQS as f32;
        self.cursor = (self.cursor + 1) % SPECTRAL_HISTORY_LENGTH;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octaves_fold_into_one_class() {
        let mut chroma = Chromagram::new();
        let mut spectrum = [0.0; NUM_FREQS];
        spectrum[0] = 0.4;
        spectrum[12] = 0.8;
        spectrum[19] = 0.2;
        chroma.update(&spectrum, 84, 0);
        assert_eq!(chroma.notes()[0], 1.0);
        assert_eq!(chroma.notes()[7], 0.25);
        assert_eq!(chroma.notes()[1], 0.0);
    }

    #[test]
    fn range_and_offset_are_respected() {
        let mut chroma = Chromagram::new();
        let mut spectrum = [0.0; NUM_FREQS];
        spectrum[90] = 1.0;
        spectrum[2] = 0.5;
        chroma.update(&spectrum, 84, 3);
        assert_eq!(chroma.notes()[5], 1.0);
        assert_eq!(chroma.notes().iter().filter(|&&n| n > 0.0).count(), 1);
    }

    #[test]
    fn flux_only_counts_rises() {
        let mut chroma = Chromagram::new();
        let loud = [1.0; NUM_FREQS];
        chroma.update(&loud, 84, 0);
        assert_eq!(chroma.novelty(), 1.0);
        chroma.update(&[0.0; NUM_FREQS], 84, 0);
        assert_eq!(chroma.novelty(), 0.0);

        let curve = chroma.novelty_curve();
        assert_eq!(&curve[SPECTRAL_HISTORY_LENGTH - 2..], &[1.0, 0.0]);
    }
}
