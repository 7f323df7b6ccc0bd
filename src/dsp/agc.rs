//! Automatic gain control with a debounced silence gate.

use super::fixed::Fixed;
use crate::config::AgcConfig;

const RMS_ALPHA: f32 = 0.01;
const INITIAL_ROLLING_RMS: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcState {
    pub rolling_rms: f32,
    pub gain: f32,
    pub enabled: bool,
    pub silence_gate: bool,
    pub debounce: u8,
}

#[derive(Debug, Clone)]
pub struct AgcController {
    config: AgcConfig,
    state: AgcState,
}

impl AgcController {
    pub fn new(config: &AgcConfig) -> Self {
        Self {
            config: config.clone(),
            state: AgcState {
                rolling_rms: INITIAL_ROLLING_RMS,
                gain: 1.0,
                enabled: config.enabled,
                silence_gate: false,
                debounce: 0,
            },
        }
    }

    /// Adopt new limits without resetting the rolling estimate.
    pub fn configure(&mut self, config: &AgcConfig) {
        self.config = config.clone();
        self.state.enabled = config.enabled;
        if !config.enabled {
            self.state.gain = 1.0;
            self.state.silence_gate = false;
            self.state.debounce = 0;
        } else {
            self.state.gain = self.state.gain.clamp(config.min_gain, config.max_gain);
        }
    }

    pub fn state(&self) -> &AgcState {
        &self.state
    }

    pub fn gain(&self) -> f32 {
        self.state.gain
    }

    pub fn gain_fixed(&self) -> Fixed {
        Fixed::from_f32(self.state.gain)
    }

    pub fn is_silent(&self) -> bool {
        self.state.silence_gate
    }

    /// Feed the pre-gain RMS of one cycle (fraction of full scale).
    pub fn update(&mut self, pre_gain_rms: f32) {
        if !self.config.enabled {
            return;
        }
        let rms = if pre_gain_rms.is_finite() { pre_gain_rms.max(0.0) } else { 0.0 };
        let cfg = &self.config;
        let st = &mut self.state;

        st.rolling_rms = st.rolling_rms * (1.0 - RMS_ALPHA) + rms * RMS_ALPHA;

        // A zero rolling RMS gives an infinite target, which the clamp handles.
        let desired = (cfg.target_rms / st.rolling_rms).clamp(cfg.min_gain, cfg.max_gain);
        if desired > st.gain {
            st.gain += (desired - st.gain).min(cfg.max_slew);
        } else {
            st.gain -= (st.gain - desired).min(cfg.max_slew);
        }

        let quiet = rms < cfg.silence_threshold;
        if quiet != st.silence_gate {
            st.debounce = st.debounce.saturating_add(1);
            if st.debounce >= cfg.silence_debounce {
                st.silence_gate = quiet;
                st.debounce = 0;
                log::debug!("AGC silence gate {}", if quiet { "closed" } else { "opened" });
            }
        } else {
            st.debounce = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agc() -> AgcController {
        AgcController::new(&AgcConfig::default())
    }

    #[test]
    fn gain_stays_clamped_and_slew_limited() {
        let mut agc = agc();
        let mut last = agc.gain();
        for i in 0..2_000 {
            let rms = if (i / 300) % 2 == 0 { 0.0 } else { 0.9 };
            agc.update(rms);
            let gain = agc.gain();
            assert!((0.5..=8.0).contains(&gain), "gain {}", gain);
            assert!((gain - last).abs() <= 0.05 + 1e-6);
            last = gain;
        }
    }

    #[test]
    fn quiet_input_drives_gain_to_the_ceiling() {
        let mut agc = agc();
        for _ in 0..1_000 {
            agc.update(0.001);
        }
        assert!((agc.gain() - 8.0).abs() < 1e-4);
    }

    #[test]
    fn silence_gate_is_debounced_both_ways() {
        let mut agc = agc();
        for _ in 0..9 {
            agc.update(0.0);
            assert!(!agc.is_silent());
        }
        agc.update(0.5);
        agc.update(0.0);
        assert!(!agc.is_silent(), "a loud cycle resets the count");

        for _ in 0..9 {
            agc.update(0.0);
        }
        assert!(agc.is_silent());

        for _ in 0..9 {
            agc.update(0.5);
            assert!(agc.is_silent());
        }
        agc.update(0.5);
        assert!(!agc.is_silent());
    }

    #[test]
    fn disabled_agc_pins_unity_gain() {
        let mut agc = agc();
        for _ in 0..50 {
            agc.update(0.0);
        }
        assert!(agc.is_silent());

        let cfg = AgcConfig {
            enabled: false,
            ..AgcConfig::default()
        };
        agc.configure(&cfg);
        for _ in 0..50 {
            agc.update(0.0);
        }
        assert_eq!(agc.gain(), 1.0);
        assert!(!agc.is_silent());
        assert_eq!(agc.gain_fixed(), Fixed::ONE);
    }
}
