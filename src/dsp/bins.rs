//! Per-note bin descriptors for the Goertzel bank.
//!
//! Bin `i` sits on the equal-tempered note `i + note_offset` semitones above
//! A1 (55 Hz). Each bin's analysis window is sized from the spacing to its
//! neighbors, so bass bins get long windows (fine resolution) and treble bins
//! short ones.

/// Number of analysis bins (eight octaves of semitones).
pub const NUM_FREQS: usize = 96;

/// Bins are split evenly into this many zones for relative normalization.
pub const NUM_ZONES: usize = 2;

pub const MAX_NOTE_OFFSET: u8 = 24;

const BASE_NOTE_HZ: f32 = 55.0;

/// Bins above this index are upper-spectrum bins and use a capped window.
const UPPER_SPECTRUM_START: usize = 48;

/// Window cap for upper-spectrum bins; bounds the worst-case per-bin cost.
pub const OPTIMIZED_WINDOW_CAP: usize = 256;

/// Fractional bits of `coeff_q14`.
pub const COEFF_FRAC_BITS: u32 = 14;

/// A-weighting curve: (Hz, dB).
const A_WEIGHT_TABLE: [(f32, f32); 13] = [
    (10.0, -70.4),
    (20.0, -50.5),
    (40.0, -34.6),
    (80.0, -22.5),
    (160.0, -13.4),
    (315.0, -6.6),
    (630.0, -1.9),
    (1000.0, 0.0),
    (1250.0, 0.6),
    (2500.0, 1.3),
    (5000.0, 0.5),
    (10000.0, -2.5),
    (20000.0, -9.3),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBinSpec {
    pub target_freq: f32,
    /// Window derived from neighbor spacing, capped at the history capacity.
    pub window_len: usize,
    /// Window actually analyzed; `window_len` capped for upper-spectrum bins.
    pub window_len_optimized: usize,
    /// `2 * cos(2*pi*f/fs)`.
    pub coeff: f32,
    /// `coeff` in Q2.14.
    pub coeff_q14: i32,
    /// `2 / window_len_optimized`, or 0 for an empty window.
    pub norm_factor: f32,
    /// Linear A-weighting ratio, clamped to 1.0.
    pub a_weighting: f32,
    pub zone: u8,
    /// The target aliases at this sample rate; the bank reports zero for it.
    pub above_nyquist: bool,
}

impl FrequencyBinSpec {
    pub fn is_valid(&self, history_capacity: usize) -> bool {
        self.window_len > 0
            && self.window_len <= history_capacity
            && self.window_len_optimized > 0
            && self.window_len_optimized <= self.window_len
    }
}

/// All bin descriptors for one (sample rate, note offset) pair.
#[derive(Debug, Clone)]
pub struct BinTable {
    bins: [FrequencyBinSpec; NUM_FREQS],
    sample_rate: u32,
    note_offset: u8,
}

pub fn note_frequency(semitones_above_a1: usize) -> f32 {
    BASE_NOTE_HZ * 2f32.powf(semitones_above_a1 as f32 / 12.0)
}

impl BinTable {
    pub fn build(sample_rate: u32, note_offset: u8, history_capacity: usize) -> Self {
        let offset = note_offset.min(MAX_NOTE_OFFSET) as usize;
        let fs = sample_rate as f32;
        let nyquist = fs / 2.0;

        let empty = FrequencyBinSpec {
            target_freq: 0.0,
            window_len: 0,
            window_len_optimized: 0,
            coeff: 0.0,
            coeff_q14: 0,
            norm_factor: 0.0,
            a_weighting: 0.0,
            zone: 0,
            above_nyquist: false,
        };
        let mut bins = [empty; NUM_FREQS];

        for (i, bin) in bins.iter_mut().enumerate() {
            let target = note_frequency(i + offset);
            // Edge bins only have one real neighbor; a missing one counts as zero distance.
            let left = if i == 0 { target } else { note_frequency(i + offset - 1) };
            let right = if i == NUM_FREQS - 1 { target } else { note_frequency(i + offset + 1) };
            let max_distance = (target - left).abs().max((right - target).abs());

            let window_len = if max_distance > 0.0 {
                ((fs / (max_distance * 2.0)) as usize).min(history_capacity)
            } else {
                0
            };
            let window_len_optimized = if i > UPPER_SPECTRUM_START {
                window_len.min(OPTIMIZED_WINDOW_CAP)
            } else {
                window_len
            };

            let omega = std::f32::consts::TAU * target / fs;
            let coeff = 2.0 * omega.cos();

            *bin = FrequencyBinSpec {
                target_freq: target,
                window_len,
                window_len_optimized,
                coeff,
                coeff_q14: (coeff * (1 << COEFF_FRAC_BITS) as f32).round() as i32,
                norm_factor: normalization_factor(window_len_optimized),
                a_weighting: a_weighting_ratio(target),
                zone: ((i * NUM_ZONES) / NUM_FREQS) as u8,
                above_nyquist: target >= nyquist,
            };
        }

        log::debug!(
            "Bin table: {}Hz, note offset {}, {:.1}-{:.1}Hz, {} bins above Nyquist",
            sample_rate,
            offset,
            bins[0].target_freq,
            bins[NUM_FREQS - 1].target_freq,
            bins.iter().filter(|b| b.above_nyquist).count()
        );

        Self {
            bins,
            sample_rate,
            note_offset: offset as u8,
        }
    }

    pub fn bins(&self) -> &[FrequencyBinSpec; NUM_FREQS] {
        &self.bins
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn note_offset(&self) -> u8 {
        self.note_offset
    }

    /// Index of the bin whose target is closest to `freq`.
    pub fn nearest_bin(&self, freq: f32) -> usize {
        self.bins
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.target_freq - freq)
                    .abs()
                    .total_cmp(&(b.target_freq - freq).abs())
            })
            .map_or(0, |(i, _)| i)
    }

    pub fn valid_count(&self, history_capacity: usize) -> usize {
        self.bins.iter().filter(|b| b.is_valid(history_capacity)).count()
    }
}

fn normalization_factor(window_len: usize) -> f32 {
    if window_len > 0 {
        2.0 / window_len as f32
    } else {
        0.0
    }
}

fn a_weighting_ratio(freq: f32) -> f32 {
    let last = A_WEIGHT_TABLE.len() - 1;
    let high = A_WEIGHT_TABLE
        .iter()
        .position(|&(f, _)| f > freq)
        .unwrap_or(last)
        .max(1);
    let (low_f, low_db) = A_WEIGHT_TABLE[high - 1];
    let (high_f, high_db) = A_WEIGHT_TABLE[high];
    let position = ((freq - low_f) / (high_f - low_f)).clamp(0.0, 1.0);
    let low_ratio = 10f32.powf(low_db / 10.0);
    let high_ratio = 10f32.powf(high_db / 10.0);
    (low_ratio * (1.0 - position) + high_ratio * position).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SUPPORTED_SAMPLE_RATES;
    use crate::dsp::history::HISTORY_CAPACITY;
    use approx::assert_relative_eq;

    #[test]
    fn every_window_is_valid_for_supported_rates() {
        for &rate in SUPPORTED_SAMPLE_RATES {
            for offset in [0, 12, MAX_NOTE_OFFSET] {
                let table = BinTable::build(rate, offset, HISTORY_CAPACITY);
                assert_eq!(table.valid_count(HISTORY_CAPACITY), NUM_FREQS, "rate {}", rate);
                for bin in table.bins() {
                    assert!(bin.window_len > 0 && bin.window_len <= HISTORY_CAPACITY);
                    assert!(bin.norm_factor > 0.0);
                }
            }
        }
    }

    #[test]
    fn bass_windows_are_longer_than_treble() {
        let table = BinTable::build(16_000, 0, HISTORY_CAPACITY);
        let bins = table.bins();
        assert!(bins[0].window_len > bins[40].window_len);
        assert!(bins[40].window_len > bins[90].window_len);
        assert!(bins
            .iter()
            .skip(UPPER_SPECTRUM_START + 1)
            .all(|b| b.window_len_optimized <= OPTIMIZED_WINDOW_CAP));
    }

    #[test]
    fn high_rates_hit_the_capacity_and_treble_caps() {
        let table = BinTable::build(48_000, 0, HISTORY_CAPACITY);
        assert_eq!(table.bins()[0].window_len, HISTORY_CAPACITY);
        assert_eq!(table.bins()[49].window_len_optimized, OPTIMIZED_WINDOW_CAP);
        assert!(table.bins()[49].window_len > OPTIMIZED_WINDOW_CAP);
    }

    #[test]
    fn targets_follow_the_note_table() {
        let table = BinTable::build(16_000, 0, HISTORY_CAPACITY);
        assert_relative_eq!(table.bins()[0].target_freq, 55.0, epsilon = 1e-3);
        assert_relative_eq!(table.bins()[36].target_freq, 440.0, epsilon = 1e-2);
        assert_relative_eq!(table.bins()[84].target_freq, 7040.0, epsilon = 0.1);
        assert_eq!(table.nearest_bin(1760.0), 60);

        let shifted = BinTable::build(16_000, 12, HISTORY_CAPACITY);
        assert_relative_eq!(shifted.bins()[0].target_freq, 110.0, epsilon = 1e-3);
    }

    #[test]
    fn coefficient_matches_float_form_and_marks_aliasing_bins() {
        let table = BinTable::build(16_000, 0, HISTORY_CAPACITY);
        for bin in table.bins() {
            let from_q14 = bin.coeff_q14 as f32 / (1 << COEFF_FRAC_BITS) as f32;
            assert!((from_q14 - bin.coeff).abs() < 1e-3);
            assert_eq!(bin.above_nyquist, bin.target_freq >= 8_000.0);
        }
        assert!(table.bins()[86].target_freq < 8_000.0 && !table.bins()[86].above_nyquist);
        assert!(table.bins()[87].above_nyquist);
    }

    #[test]
    fn zones_split_the_bins_evenly() {
        let table = BinTable::build(16_000, 0, HISTORY_CAPACITY);
        assert_eq!(table.bins()[0].zone, 0);
        assert_eq!(table.bins()[NUM_FREQS / 2 - 1].zone, 0);
        assert_eq!(table.bins()[NUM_FREQS / 2].zone, 1);
        assert_eq!(table.bins()[NUM_FREQS - 1].zone, 1);
    }

    #[test]
    fn a_weighting_peaks_in_the_presence_band() {
        assert_relative_eq!(a_weighting_ratio(1000.0), 1.0, epsilon = 1e-6);
        assert_eq!(a_weighting_ratio(2500.0), 1.0);
        assert!(a_weighting_ratio(55.0) < 0.01);
        assert!(a_weighting_ratio(55.0) < a_weighting_ratio(440.0));
        assert!(a_weighting_ratio(30_000.0) > 0.0);
    }
}
