pub mod agc;
pub mod bins;
pub mod calibration;
pub mod chroma;
pub mod conditioner;
pub mod fixed;
pub mod follower;
pub mod goertzel;
pub mod history;
pub mod spectrogram;
pub mod vu;
pub mod zone;

pub use bins::{BinTable, FrequencyBinSpec, NUM_FREQS, NUM_ZONES};
pub use calibration::{NoiseProfile, CALIBRATION_ITERATIONS};
pub use fixed::Fixed;
pub use spectrogram::Spectrogram;
pub use zone::LoudnessZone;
