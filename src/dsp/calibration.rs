//! Ambient noise calibration.
//!
//! A session runs for a fixed number of cycles against a quiet room. It
//! learns a per-bin noise profile, a minimum signal level, a VU floor and the
//! microphone DC offset. Nothing is applied until the last cycle, so an
//! aborted session leaves the previous calibration in place.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::bins::NUM_FREQS;
use crate::config::EngineConfig;
use crate::error::ProfileError;

pub const CALIBRATION_ITERATIONS: u32 = 256;

/// Cycles that contribute to the profile and min level, skipping the
/// settling period at the start and the tail.
const PROFILE_WINDOW: RangeInclusive<u32> = 64..=192;

const MIN_LEVEL_HEADROOM: f32 = 1.10;
const VU_FLOOR_HEADROOM: f32 = 1.5;
const VU_FLOOR_CAP: f32 = 0.99;

/// Size of a serialized profile: one little-endian `f32` per bin.
pub const PROFILE_BYTES: usize = NUM_FREQS * 4;

/// Per-bin ambient noise magnitudes, subtracted from the spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseProfile {
    baseline: [f32; NUM_FREQS],
    complete: bool,
}

impl Default for NoiseProfile {
    /// An all-zero profile. It counts as complete, so removal is a no-op
    /// until a real calibration replaces it.
    fn default() -> Self {
        Self {
            baseline: [0.0; NUM_FREQS],
            complete: true,
        }
    }
}

impl NoiseProfile {
    pub fn from_baseline(baseline: [f32; NUM_FREQS]) -> Self {
        Self {
            baseline,
            complete: true,
        }
    }

    pub fn baseline(&self) -> &[f32; NUM_FREQS] {
        &self.baseline
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Flat little-endian IEEE-754 `f32`s in bin order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let words = self.baseline.map(|v| v.to_bits().to_le());
        bytemuck::cast_slice(&words[..]).to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProfileError> {
        if bytes.len() != PROFILE_BYTES {
            return Err(ProfileError::Length {
                expected: PROFILE_BYTES,
                found: bytes.len(),
            });
        }
        let mut baseline = [0.0f32; NUM_FREQS];
        for (bin, (slot, chunk)) in baseline.iter_mut().zip(bytes.chunks_exact(4)).enumerate() {
            let value = f32::from_bits(u32::from_le(bytemuck::pod_read_unaligned(chunk)));
            if !value.is_finite() || value < 0.0 {
                return Err(ProfileError::InvalidBin { bin });
            }
            *slot = value;
        }
        Ok(Self::from_baseline(baseline))
    }
}

/// Everything a finished session learned, committed in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub profile: NoiseProfile,
    pub sweet_spot_min_level: f32,
    pub vu_level_floor: f32,
    pub dc_offset: i32,
}

impl CalibrationResult {
    pub fn levels(&self) -> CalibratedLevels {
        CalibratedLevels {
            sweet_spot_min_level: self.sweet_spot_min_level,
            vu_level_floor: self.vu_level_floor,
            dc_offset: self.dc_offset,
        }
    }
}

/// The config values a calibration owns. They stay in force over later
/// config changes until the next calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedLevels {
    pub sweet_spot_min_level: f32,
    pub vu_level_floor: f32,
    pub dc_offset: i32,
}

impl CalibratedLevels {
    pub fn apply(&self, config: &mut EngineConfig) {
        config.levels.sweet_spot_min_level = self.sweet_spot_min_level;
        config.levels.vu_level_floor = self.vu_level_floor;
        config.audio.dc_offset = self.dc_offset;
    }
}

/// Per-cycle measurements fed to a running session.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationSample<'a> {
    pub normalized: &'a [f32; NUM_FREQS],
    pub max_abs: i32,
    pub raw_mean: f32,
    pub vu: f32,
}

/// Working copy of a calibration in progress.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    iteration: u32,
    profile: [f32; NUM_FREQS],
    min_level: f32,
    vu_floor: f32,
    dc_sum: f64,
}

impl CalibrationSession {
    /// Levels only ever ratchet up from the given base values.
    pub fn new(base_min_level: f32, base_vu_floor: f32) -> Self {
        Self {
            iteration: 0,
            profile: [0.0; NUM_FREQS],
            min_level: base_min_level,
            vu_floor: base_vu_floor,
            dc_sum: 0.0,
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn progress(&self) -> f32 {
        self.iteration as f32 / CALIBRATION_ITERATIONS as f32
    }

    /// Feed one cycle. Returns the result on the final cycle.
    pub fn observe(&mut self, sample: CalibrationSample<'_>) -> Option<CalibrationResult> {
        self.dc_sum += sample.raw_mean as f64;

        if PROFILE_WINDOW.contains(&self.iteration) {
            for (slot, &mag) in self.profile.iter_mut().zip(sample.normalized.iter()) {
                if mag > *slot {
                    *slot = mag;
                }
            }
            let level = sample.max_abs as f32 * MIN_LEVEL_HEADROOM;
            if level > self.min_level {
                self.min_level = level;
            }
        }

        let floor = sample.vu * VU_FLOOR_HEADROOM;
        if floor > self.vu_floor {
            self.vu_floor = floor;
        }

        self.iteration += 1;
        if self.iteration < CALIBRATION_ITERATIONS {
            return None;
        }

        Some(CalibrationResult {
            profile: NoiseProfile::from_baseline(self.profile),
            sweet_spot_min_level: self.min_level,
            vu_level_floor: self.vu_floor.min(VU_FLOOR_CAP),
            dc_offset: (self.dc_sum / CALIBRATION_ITERATIONS as f64).round() as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(session: &mut CalibrationSession, spectrum: &[f32; NUM_FREQS], max_abs: i32) -> Option<CalibrationResult> {
        session.observe(CalibrationSample {
            normalized: spectrum,
            max_abs,
            raw_mean: -14_000.0,
            vu: 0.02,
        })
    }

    #[test]
    fn completes_after_fixed_iterations() {
        let mut session = CalibrationSession::new(750.0, 0.0);
        let quiet = [1.0; NUM_FREQS];
        for _ in 0..CALIBRATION_ITERATIONS - 1 {
            assert!(run(&mut session, &quiet, 100).is_none());
        }
        let result = run(&mut session, &quiet, 100).unwrap();
        assert_eq!(result.profile.baseline(), &[1.0; NUM_FREQS]);
        assert!(result.profile.is_complete());
        assert_eq!(result.dc_offset, -14_000);
        assert!((result.vu_level_floor - 0.03).abs() < 1e-6);
        assert_eq!(result.sweet_spot_min_level, 750.0);
    }

    #[test]
    fn only_the_middle_window_shapes_the_profile() {
        let mut session = CalibrationSession::new(750.0, 0.0);
        let mut loud = [0.0; NUM_FREQS];
        loud[5] = 50.0;
        let quiet = [2.0; NUM_FREQS];

        let mut result = None;
        for i in 0..CALIBRATION_ITERATIONS {
            let outside = !PROFILE_WINDOW.contains(&i);
            result = if outside {
                run(&mut session, &loud, 5_000)
            } else {
                run(&mut session, &quiet, 1_000)
            };
        }
        let result = result.unwrap();
        assert_eq!(result.profile.baseline()[5], 2.0);
        assert!((result.sweet_spot_min_level - 1_100.0).abs() < 1e-3);
    }

    #[test]
    fn vu_floor_is_capped() {
        let mut session = CalibrationSession::new(0.0, 0.0);
        let quiet = [0.0; NUM_FREQS];
        let mut result = None;
        for _ in 0..CALIBRATION_ITERATIONS {
            result = session.observe(CalibrationSample {
                normalized: &quiet,
                max_abs: 0,
                raw_mean: 0.0,
                vu: 0.9,
            });
        }
        assert_eq!(result.unwrap().vu_level_floor, VU_FLOOR_CAP);
    }

    #[test]
    fn profile_bytes_round_trip() {
        let mut baseline = [0.0; NUM_FREQS];
        baseline.iter_mut().enumerate().for_each(|(i, v)| *v = i as f32 * 0.5);
        let profile = NoiseProfile::from_baseline(baseline);
        let bytes = profile.to_bytes();
        assert_eq!(bytes.len(), PROFILE_BYTES);
        assert_eq!(&bytes[4..8], &0.5f32.to_le_bytes());
        assert_eq!(NoiseProfile::from_bytes(&bytes).unwrap(), profile);
    }

    #[test]
    fn rejects_bad_profiles() {
        assert!(matches!(
            NoiseProfile::from_bytes(&[0u8; 10]),
            Err(ProfileError::Length { expected: PROFILE_BYTES, found: 10 })
        ));
        let mut bytes = NoiseProfile::default().to_bytes();
        bytes[12..16].copy_from_slice(&f32::NAN.to_le_bytes());
        assert!(matches!(
            NoiseProfile::from_bytes(&bytes),
            Err(ProfileError::InvalidBin { bin: 3 })
        ));
    }
}
