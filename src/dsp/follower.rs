//! Smoothing stages between the Goertzel bank and the renderer.

use super::bins::{BinTable, NUM_ZONES};
use super::calibration::NoiseProfile;
use super::spectrogram::Spectrogram;

/// Noise profile over-subtraction.
const NOISE_MARGIN: f32 = 1.5;

const ZONE_ATTACK: f32 = 0.05;
const ZONE_DECAY: f32 = 0.0025;
/// Zone followers never drop below one sample unit.
const ZONE_FLOOR: f32 = 1.0;

const BIN_ATTACK: f32 = 0.5;
const BIN_DECAY_BASE: f32 = 0.0025;
const BIN_DECAY_MOOD: f32 = 0.025;

/// Map the mood knob onto the exponential-average weight used by the bin
/// decay. Low mood is snappy (weight near 1), high mood is calm (0).
pub fn smoothing_exp_average(mood: f32) -> f32 {
    let mut bottom = (mood - 0.5) * 2.0;
    if bottom > 0.0 {
        bottom = 0.0;
    }
    bottom *= -1.0;
    bottom = 1.0 - bottom;
    bottom = bottom * 0.9 + 0.1;
    1.0 - bottom
}

/// One-pole low-pass coefficient for cutoff `cutoff_hz` sampled at `rate_hz`.
pub fn low_pass_alpha(cutoff_hz: f32, rate_hz: f32) -> f32 {
    let rc = 1.0 / (std::f32::consts::TAU * cutoff_hz);
    let dt = 1.0 / rate_hz;
    dt / (rc + dt)
}

/// Per-cycle inputs to the follower.
#[derive(Debug, Clone, Copy)]
pub struct FollowerInput<'a> {
    /// Subtracted when present; `None` while calibrating.
    pub profile: Option<&'a NoiseProfile>,
    pub a_weighting: bool,
}

#[derive(Debug, Clone)]
pub struct SpectralFollower {
    bin_decay: f32,
    low_pass_alpha: f32,
}

impl SpectralFollower {
    pub fn new(mood: f32, cycle_rate: f32) -> Self {
        let mut follower = Self {
            bin_decay: 0.0,
            low_pass_alpha: 0.0,
        };
        follower.configure(mood, cycle_rate);
        follower
    }

    pub fn configure(&mut self, mood: f32, cycle_rate: f32) {
        self.bin_decay = BIN_DECAY_BASE + BIN_DECAY_MOOD * smoothing_exp_average(mood);
        self.low_pass_alpha = low_pass_alpha(1.0 + 10.0 * mood, cycle_rate);
    }

    pub fn bin_decay(&self) -> f32 {
        self.bin_decay
    }

    /// Run all stages over `spec.normalized`, leaving `spec.final_` ready.
    pub fn process(&self, spec: &mut Spectrogram, table: &BinTable, input: FollowerInput<'_>) {
        let bins = table.bins();

        for (i, out) in spec.denoised.iter_mut().enumerate() {
            let mut value = spec.normalized[i];
            if let Some(profile) = input.profile.filter(|p| p.is_complete()) {
                value = (value - profile.baseline()[i] * NOISE_MARGIN).max(0.0);
            }
            if input.a_weighting {
                value *= bins[i].a_weighting;
            }
            *out = value;
        }

        spec.zone_max = [0.0; NUM_ZONES];
        for (bin, &value) in bins.iter().zip(spec.denoised.iter()) {
            let zone = bin.zone as usize;
            if value > spec.zone_max[zone] {
                spec.zone_max[zone] = value;
            }
        }
        for (follower, &max) in spec.zone_followers.iter_mut().zip(spec.zone_max.iter()) {
            if max > *follower {
                *follower += (max - *follower) * ZONE_ATTACK;
            } else {
                *follower -= (*follower - max) * ZONE_DECAY;
            }
            if *follower < ZONE_FLOOR {
                *follower = ZONE_FLOOR;
            }
        }

        for (i, bin) in bins.iter().enumerate() {
            let zone_level = spec.zone_followers[bin.zone as usize];
            let relative = (spec.denoised[i] / zone_level).min(1.0);
            spec.relative[i] = relative;

            let follower = &mut spec.followers[i];
            if relative > *follower {
                *follower += (relative - *follower) * BIN_ATTACK;
            } else {
                *follower -= (*follower - relative) * self.bin_decay;
            }

            spec.final_[i] += (*follower - spec.final_[i]) * self.low_pass_alpha;
        }
    }
}
