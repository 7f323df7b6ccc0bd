use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::audio::MAX_CHUNK_SIZE;
use crate::dsp::bins::{MAX_NOTE_OFFSET, NUM_FREQS};

/// Sample rates the bin table and timing constants are tuned for.
pub const SUPPORTED_SAMPLE_RATES: &[u32] = &[12_800, 16_000, 20_000, 24_000, 32_000, 44_100, 48_000];

/// Chunk sizes the acquisition loop accepts.
pub const SUPPORTED_CHUNK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

/// File-level configuration: engine sections plus host-only output settings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Read-only snapshot of everything the engine consumes.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub levels: LevelsConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub agc: AgcConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_samples_per_chunk")]
    pub samples_per_chunk: usize,
    /// Right shift taking 32-bit microphone words into the working range.
    #[serde(default = "default_input_shift")]
    pub input_shift: u32,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    #[serde(default = "default_dc_offset")]
    pub dc_offset: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelsConfig {
    #[serde(default = "default_sweet_spot_min_level")]
    pub sweet_spot_min_level: f32,
    #[serde(default = "default_sweet_spot_max_level")]
    pub sweet_spot_max_level: f32,
    #[serde(default = "default_vu_level_floor")]
    pub vu_level_floor: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// Semitones above A1 (55 Hz) for bin 0.
    #[serde(default)]
    pub note_offset: u8,
    /// Bins folded into the chromagram, counted from bin 0.
    #[serde(default = "default_chromagram_range")]
    pub chromagram_range: usize,
    /// 0.0 = snappy, 1.0 = calm.
    #[serde(default = "default_mood")]
    pub mood: f32,
    #[serde(default)]
    pub a_weighting: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_target_rms")]
    pub target_rms: f32,
    #[serde(default = "default_min_gain")]
    pub min_gain: f32,
    #[serde(default = "default_max_gain")]
    pub max_gain: f32,
    /// Largest gain change per cycle.
    #[serde(default = "default_max_slew")]
    pub max_slew: f32,
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    #[serde(default = "default_silence_debounce")]
    pub silence_debounce: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub standby_dimming: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub frames: Option<PathBuf>,
    #[serde(default)]
    pub profile: Option<PathBuf>,
    #[serde(default = "default_render_fps")]
    pub render_fps: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            samples_per_chunk: default_samples_per_chunk(),
            input_shift: default_input_shift(),
            sensitivity: default_sensitivity(),
            dc_offset: default_dc_offset(),
        }
    }
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            sweet_spot_min_level: default_sweet_spot_min_level(),
            sweet_spot_max_level: default_sweet_spot_max_level(),
            vu_level_floor: default_vu_level_floor(),
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            note_offset: 0,
            chromagram_range: default_chromagram_range(),
            mood: default_mood(),
            a_weighting: false,
        }
    }
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_rms: default_target_rms(),
            min_gain: default_min_gain(),
            max_gain: default_max_gain(),
            max_slew: default_max_slew(),
            silence_threshold: default_silence_threshold(),
            silence_debounce: default_silence_debounce(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { standby_dimming: true }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frames: None,
            profile: None,
            render_fps: default_render_fps(),
        }
    }
}

fn default_sample_rate() -> u32 { 16_000 }
fn default_samples_per_chunk() -> usize { 128 }
fn default_input_shift() -> u32 { 14 }
fn default_sensitivity() -> f32 { 0.4 }
fn default_dc_offset() -> i32 { -14_800 }
fn default_sweet_spot_min_level() -> f32 { 750.0 }
fn default_sweet_spot_max_level() -> f32 { 30_000.0 }
fn default_vu_level_floor() -> f32 { 0.0 }
fn default_chromagram_range() -> usize { 84 }
fn default_mood() -> f32 { 0.05 }
fn default_true() -> bool { true }
fn default_target_rms() -> f32 { 0.20 }
fn default_min_gain() -> f32 { 0.5 }
fn default_max_gain() -> f32 { 8.0 }
fn default_max_slew() -> f32 { 0.05 }
fn default_silence_threshold() -> f32 { 0.01 }
fn default_silence_debounce() -> u8 { 10 }
fn default_render_fps() -> u32 { 60 }

/// A field that failed range validation and was replaced by its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFault {
    pub field: &'static str,
    pub rejected: String,
    pub replacement: String,
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {} is out of range, using {}",
            self.field, self.rejected, self.replacement
        )
    }
}

fn check<T, F>(faults: &mut Vec<ConfigFault>, field: &'static str, value: &mut T, ok: F, fallback: T)
where
    T: fmt::Debug,
    F: FnOnce(&T) -> bool,
{
    if !ok(value) {
        faults.push(ConfigFault {
            field,
            rejected: format!("{:?}", value),
            replacement: format!("{:?}", fallback),
        });
        *value = fallback;
    }
}

impl EngineConfig {
    /// Replace out-of-range fields with their defaults and report them.
    ///
    /// Only range is checked. A value inside its range is kept even when it
    /// looks odd, e.g. a min level above the max level.
    pub fn validate(&mut self) -> Vec<ConfigFault> {
        let mut faults = Vec::new();
        let f = &mut faults;

        let a = &mut self.audio;
        check(f, "audio.sample_rate", &mut a.sample_rate,
            |v| SUPPORTED_SAMPLE_RATES.contains(v), default_sample_rate());
        check(f, "audio.samples_per_chunk", &mut a.samples_per_chunk,
            |v| SUPPORTED_CHUNK_SIZES.contains(v) && *v <= MAX_CHUNK_SIZE, default_samples_per_chunk());
        check(f, "audio.input_shift", &mut a.input_shift, |v| *v <= 24, default_input_shift());
        check(f, "audio.sensitivity", &mut a.sensitivity,
            |v| v.is_finite() && *v > 0.0 && *v <= 64.0, default_sensitivity());
        check(f, "audio.dc_offset", &mut a.dc_offset,
            |v| (-(1 << 20)..=(1 << 20)).contains(v), default_dc_offset());

        let l = &mut self.levels;
        check(f, "levels.sweet_spot_min_level", &mut l.sweet_spot_min_level,
            |v| v.is_finite() && (0.0..=32_767.0).contains(v), default_sweet_spot_min_level());
        check(f, "levels.sweet_spot_max_level", &mut l.sweet_spot_max_level,
            |v| v.is_finite() && *v > 0.0 && *v <= 32_767.0, default_sweet_spot_max_level());
        check(f, "levels.vu_level_floor", &mut l.vu_level_floor,
            |v| v.is_finite() && (0.0..=0.99).contains(v), default_vu_level_floor());

        let s = &mut self.spectrum;
        check(f, "spectrum.note_offset", &mut s.note_offset, |v| *v <= MAX_NOTE_OFFSET, 0);
        check(f, "spectrum.chromagram_range", &mut s.chromagram_range,
            |v| (1..=NUM_FREQS).contains(v), default_chromagram_range());
        check(f, "spectrum.mood", &mut s.mood,
            |v| v.is_finite() && (0.0..=1.0).contains(v), default_mood());

        let g = &mut self.agc;
        check(f, "agc.target_rms", &mut g.target_rms,
            |v| v.is_finite() && *v > 0.0 && *v <= 1.0, default_target_rms());
        check(f, "agc.min_gain", &mut g.min_gain,
            |v| v.is_finite() && *v > 0.0 && *v <= 1.0, default_min_gain());
        check(f, "agc.max_gain", &mut g.max_gain,
            |v| v.is_finite() && *v >= 1.0 && *v <= 64.0, default_max_gain());
        check(f, "agc.max_slew", &mut g.max_slew,
            |v| v.is_finite() && *v > 0.0 && *v <= 1.0, default_max_slew());
        check(f, "agc.silence_threshold", &mut g.silence_threshold,
            |v| v.is_finite() && (0.0..1.0).contains(v), default_silence_threshold());
        check(f, "agc.silence_debounce", &mut g.silence_debounce, |v| *v >= 1, default_silence_debounce());

        for fault in &faults {
            log::warn!("Config: {}", fault);
        }
        faults
    }

    /// Cycles per second implied by the sample rate and chunk size.
    pub fn nominal_cycle_rate(&self) -> f32 {
        self.audio.sample_rate as f32 / self.audio.samples_per_chunk.max(1) as f32
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Failed to parse {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path first, then `./tonebank.toml`, then the per-user config dirs.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("tonebank.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("tonebank").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("tonebank").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = EngineConfig::default();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.nominal_cycle_rate(), 125.0);
    }

    #[test]
    fn unsupported_sample_rate_falls_back() {
        let mut cfg = EngineConfig::default();
        cfg.audio.sample_rate = 11_025;
        cfg.audio.samples_per_chunk = 100;
        let faults = cfg.validate();
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].field, "audio.sample_rate");
        assert_eq!(cfg.audio.sample_rate, 16_000);
        assert_eq!(cfg.audio.samples_per_chunk, 128);
    }

    #[test]
    fn unusual_but_valid_user_values_are_kept() {
        let mut cfg = EngineConfig::default();
        cfg.audio.sensitivity = 0.01;
        cfg.audio.sample_rate = 12_800;
        cfg.levels.sweet_spot_min_level = 31_000.0;
        cfg.levels.sweet_spot_max_level = 100.0;
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.audio.sensitivity, 0.01);
        assert_eq!(cfg.audio.sample_rate, 12_800);
        assert_eq!(cfg.levels.sweet_spot_min_level, 31_000.0);
    }

    #[test]
    fn non_finite_values_are_replaced() {
        let mut cfg = EngineConfig::default();
        cfg.audio.sensitivity = f32::NAN;
        cfg.levels.vu_level_floor = 1.5;
        let faults = cfg.validate();
        assert_eq!(faults.len(), 2);
        assert_eq!(cfg.audio.sensitivity, 0.4);
        assert_eq!(cfg.levels.vu_level_floor, 0.0);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [audio]
            sample_rate = 32000

            [agc]
            enabled = false

            [output]
            render_fps = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.audio.sample_rate, 32_000);
        assert_eq!(cfg.engine.audio.samples_per_chunk, 128);
        assert!(!cfg.engine.agc.enabled);
        assert_eq!(cfg.engine.agc.max_gain, 8.0);
        assert_eq!(cfg.output.render_fps, 30);
    }
}
