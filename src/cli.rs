use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tonebank", about = "Real-time Goertzel spectrum engine over audio files or test tones")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Play a sine tone at this frequency (Hz) instead of a file
    #[arg(long, conflicts_with = "input")]
    pub tone: Option<f32>,

    /// Tone amplitude relative to full scale (0.0-1.0)
    #[arg(long, default_value_t = 0.25)]
    pub amplitude: f32,

    /// Tone length in seconds
    #[arg(long, default_value_t = 5.0)]
    pub duration: f32,

    /// Learn a noise profile from the first seconds of input
    #[arg(long)]
    pub calibrate: bool,

    /// Noise profile file (read at start, written after calibration)
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Write snapshots as JSON lines to this file
    #[arg(short, long)]
    pub frames: Option<PathBuf>,

    /// Snapshot sampling rate for --frames
    #[arg(long, default_value_t = 60)]
    pub render_fps: u32,

    /// Print the diagnostics report as JSON when done
    #[arg(long)]
    pub stats: bool,

    /// Pace playback at the input's sample rate instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Config file (default: ./tonebank.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override audio.sample_rate (tone mode only; files use their own rate)
    #[arg(long, default_value_t = 16_000)]
    pub sample_rate: u32,

    /// Override spectrum.mood (0.0 = snappy, 1.0 = calm)
    #[arg(long)]
    pub mood: Option<f32>,

    /// Disable automatic gain control
    #[arg(long)]
    pub no_agc: bool,
}
