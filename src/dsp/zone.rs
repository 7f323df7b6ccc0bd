//! Loudness zones ("sweet spot") with dwell-time hysteresis and a
//! self-adjusting silence floor.

use serde::Serialize;

use super::fixed::Fixed;

const LEVEL_SMOOTHING: f32 = 0.2;
pub const MIN_STATE_DURATION_MS: u64 = 1_500;
const TRACKER_RESET_DEADBAND: f32 = 50.0;

const FLOOR_INITIAL: i32 = 100;
/// Saturates to `Fixed::MAX`, which is already above `FLOOR_MAX_RAW`.
const FLOOR_RESET: i32 = 65_535;
const FLOOR_MIN_RAW: f32 = 10.0;
const FLOOR_MAX_RAW: f32 = 30_000.0;
/// Relates the raw amplitude tracker to the silence threshold.
const FLOOR_SCALING: f32 = 0.01;
const FLOOR_MIN_SCALED: f32 = 0.5;
const FLOOR_MAX_SCALED: f32 = 100.0;
const FLOOR_RECOVERY: i32 = 50;

pub const EXTENDED_SILENCE_MS: u64 = 10_000;
const LOUD_BREAK_FACTOR: f32 = 1.2;
const DIMMING_SMOOTHING: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i8)]
pub enum LoudnessZone {
    Silent = -1,
    Normal = 0,
    Loud = 1,
}

impl LoudnessZone {
    pub fn as_i8(self) -> i8 {
        self as i8
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneInput {
    /// Peak |sample| of the cycle.
    pub max_abs: i32,
    pub t_now_ms: u64,
    pub min_level: f32,
    pub max_level: f32,
    pub standby_dimming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneTransition {
    pub from: LoudnessZone,
    pub to: LoudnessZone,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessZoneState {
    pub zone: LoudnessZone,
    pub smoothed_level: f32,
    pub floor_tracker: Fixed,
    pub last_transition_ms: u64,
    pub silence_since_ms: u64,
    /// Silent long enough to dim the display.
    pub extended_silence: bool,
    pub silent_scale: f32,
    pub transitions: u64,
}

impl Default for LoudnessZoneState {
    fn default() -> Self {
        Self {
            zone: LoudnessZone::Normal,
            smoothed_level: 0.0,
            floor_tracker: Fixed::from_int(FLOOR_INITIAL),
            last_transition_ms: 0,
            silence_since_ms: 0,
            extended_silence: false,
            silent_scale: 1.0,
            transitions: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZoneMachine {
    state: LoudnessZoneState,
}

impl ZoneMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LoudnessZoneState {
        &self.state
    }

    pub fn zone(&self) -> LoudnessZone {
        self.state.zone
    }

    pub fn silent_scale(&self) -> f32 {
        self.state.silent_scale
    }

    /// Level below which a cycle counts as silent, derived from the tracker.
    pub fn silence_threshold(&self) -> f32 {
        let raw = self.state.floor_tracker.to_f32().clamp(FLOOR_MIN_RAW, FLOOR_MAX_RAW);
        (raw * FLOOR_SCALING).clamp(FLOOR_MIN_SCALED, FLOOR_MAX_SCALED)
    }

    fn smooth(&mut self, max_abs: i32) {
        let st = &mut self.state;
        st.smoothed_level = max_abs as f32 * LEVEL_SMOOTHING + st.smoothed_level * (1.0 - LEVEL_SMOOTHING);
    }

    /// Calibration cycle: keep smoothing the level but force the display on.
    pub fn hold(&mut self, max_abs: i32) {
        self.smooth(max_abs);
        self.state.silent_scale = 1.0;
    }

    /// Start over after a calibration changed the levels.
    pub fn reset(&mut self, t_now_ms: u64) {
        let transitions = self.state.transitions;
        self.state = LoudnessZoneState {
            last_transition_ms: t_now_ms,
            silence_since_ms: t_now_ms,
            transitions,
            ..LoudnessZoneState::default()
        };
    }

    pub fn update(&mut self, input: &ZoneInput) -> Option<ZoneTransition> {
        self.smooth(input.max_abs);
        let threshold = self.silence_threshold();
        let raw_level = input.max_abs as f32;
        let t_now = input.t_now_ms;
        let st = &mut self.state;

        let candidate = if st.smoothed_level <= threshold {
            LoudnessZone::Silent
        } else if st.smoothed_level >= input.max_level {
            LoudnessZone::Loud
        } else {
            LoudnessZone::Normal
        };

        let mut transition = None;
        if candidate != st.zone && t_now.saturating_sub(st.last_transition_ms) > MIN_STATE_DURATION_MS {
            let previous = st.zone;
            st.zone = candidate;
            st.last_transition_ms = t_now;
            st.transitions += 1;

            if candidate == LoudnessZone::Silent {
                st.silence_since_ms = t_now;
                // Only a clear drop below the threshold re-arms the tracker.
                if threshold - raw_level > TRACKER_RESET_DEADBAND {
                    st.floor_tracker = Fixed::from_int(FLOOR_RESET);
                }
            }
            log::debug!("Zone {:?} -> {:?} at {}ms", previous, candidate, t_now);
            transition = Some(ZoneTransition {
                from: previous,
                to: candidate,
                at_ms: t_now,
            });
        }

        if st.zone == LoudnessZone::Silent {
            let current = Fixed::from_f32(raw_level);
            if current < st.floor_tracker {
                st.floor_tracker = current;
            } else {
                st.floor_tracker = st
                    .floor_tracker
                    .saturating_add(Fixed::from_int(FLOOR_RECOVERY))
                    .min(Fixed::from_int(FLOOR_RESET));
            }
        }

        if raw_level > input.min_level * LOUD_BREAK_FACTOR {
            st.extended_silence = false;
            st.silence_since_ms = t_now;
        } else if st.zone == LoudnessZone::Silent {
            if t_now.saturating_sub(st.silence_since_ms) >= EXTENDED_SILENCE_MS && !st.extended_silence {
                st.extended_silence = true;
                log::debug!("Extended silence at {}ms", t_now);
            }
        } else {
            st.extended_silence = false;
        }

        st.silent_scale = if input.standby_dimming {
            let target = if st.extended_silence { 0.0 } else { 1.0 };
            target * (1.0 - DIMMING_SMOOTHING) + st.silent_scale * DIMMING_SMOOTHING
        } else {
            1.0
        };

        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(max_abs: i32, t_now_ms: u64) -> ZoneInput {
        ZoneInput {
            max_abs,
            t_now_ms,
            min_level: 750.0,
            max_level: 30_000.0,
            standby_dimming: true,
        }
    }

    /// One cycle every 8 ms, like the default 128-sample chunk at 16 kHz.
    fn drive(zm: &mut ZoneMachine, level: i32, from_ms: u64, to_ms: u64) -> Vec<ZoneTransition> {
        (from_ms..to_ms)
            .step_by(8)
            .filter_map(|t| zm.update(&input(level, t)))
            .collect()
    }

    #[test]
    fn threshold_follows_the_tracker_clamps() {
        let zm = ZoneMachine::new();
        assert!((zm.silence_threshold() - 1.0).abs() < 1e-6);

        let mut zm = ZoneMachine::new();
        zm.state.floor_tracker = Fixed::from_int(FLOOR_RESET);
        assert_eq!(zm.silence_threshold(), FLOOR_MAX_SCALED);
        zm.state.floor_tracker = Fixed::ZERO;
        assert_eq!(zm.silence_threshold(), FLOOR_MIN_SCALED);
    }

    #[test]
    fn transitions_wait_for_the_dwell_time() {
        let mut zm = ZoneMachine::new();
        let early = drive(&mut zm, 0, 0, 1_500);
        assert!(early.is_empty());
        assert_eq!(zm.zone(), LoudnessZone::Normal);

        let t = drive(&mut zm, 0, 1_504, 1_600);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].to, LoudnessZone::Silent);
        assert!(t[0].at_ms > MIN_STATE_DURATION_MS);
    }

    #[test]
    fn no_two_transitions_within_dwell_time() {
        let mut zm = ZoneMachine::new();
        let mut transitions = Vec::new();
        for (i, t) in (0..20_000u64).step_by(8).enumerate() {
            // Flip between silence and loudness every ~200 ms.
            let level = if (i / 25) % 2 == 0 { 0 } else { 32_000 };
            transitions.extend(zm.update(&input(level, t)));
        }
        assert!(transitions.len() > 2);
        for pair in transitions.windows(2) {
            assert!(pair[1].at_ms - pair[0].at_ms > MIN_STATE_DURATION_MS);
        }
    }

    #[test]
    fn loud_input_reaches_loud_zone() {
        let mut zm = ZoneMachine::new();
        drive(&mut zm, 32_000, 0, 2_000);
        assert_eq!(zm.zone(), LoudnessZone::Loud);
        drive(&mut zm, 5_000, 2_000, 4_000);
        assert_eq!(zm.zone(), LoudnessZone::Normal);
    }

    #[test]
    fn extended_silence_dims_and_sound_restores() {
        let mut zm = ZoneMachine::new();
        drive(&mut zm, 0, 0, 13_000);
        assert_eq!(zm.zone(), LoudnessZone::Silent);
        assert!(zm.state().extended_silence);
        assert!(zm.silent_scale() < 0.05);

        drive(&mut zm, 2_000, 13_000, 13_400);
        assert!(!zm.state().extended_silence);
        assert!(zm.silent_scale() > 0.9);
    }

    #[test]
    fn tracker_ratchets_down_and_recovers_in_silence() {
        let mut zm = ZoneMachine::new();
        drive(&mut zm, 0, 0, 1_600);
        assert_eq!(zm.zone(), LoudnessZone::Silent);

        zm.state.floor_tracker = Fixed::from_int(FLOOR_INITIAL);
        let t = 1_600;
        zm.update(&input(30, t));
        assert_eq!(zm.state().floor_tracker, Fixed::from_int(30));
        zm.update(&input(30, t + 8));
        assert_eq!(zm.state().floor_tracker, Fixed::from_int(30 + FLOOR_RECOVERY));
        zm.update(&input(40, t + 16));
        assert_eq!(zm.state().floor_tracker, Fixed::from_int(40));
    }

    #[test]
    fn hold_forces_display_on_and_reset_restarts() {
        let mut zm = ZoneMachine::new();
        drive(&mut zm, 0, 0, 13_000);
        zm.hold(0);
        assert_eq!(zm.silent_scale(), 1.0);

        zm.reset(13_000);
        assert_eq!(zm.zone(), LoudnessZone::Normal);
        assert_eq!(zm.state().floor_tracker, Fixed::from_int(FLOOR_INITIAL));
        assert!(zm.update(&input(0, 14_000)).is_none());
        assert_eq!(zm.state().transitions, 1);
    }

    #[test]
    fn dimming_disabled_keeps_full_scale() {
        let mut zm = ZoneMachine::new();
        for t in (0..13_000u64).step_by(8) {
            zm.update(&ZoneInput {
                standby_dimming: false,
                ..input(0, t)
            });
        }
        assert!(zm.state().extended_silence);
        assert_eq!(zm.silent_scale(), 1.0);
    }
}
