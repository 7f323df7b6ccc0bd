//! Real-time audio-to-spectrum analysis engine.
//!
//! Raw microphone blocks go in one end; a stabilized per-note magnitude
//! spectrum, a VU level and a loudness zone come out the other. The hot path
//! (conditioning and the Goertzel bank) is integer/fixed-point; smoothing
//! stages are plain `f32`.

pub mod audio;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod persist;
pub mod sink;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{CalibrationError, EngineError, ProfileError};
