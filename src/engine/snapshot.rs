//! Lock-free hand-off of per-cycle results to renderer threads.

use serde::{Serialize, Serializer};
use triple_buffer::TripleBuffer;

use crate::dsp::chroma::NUM_PITCH_CLASSES;
use crate::dsp::{LoudnessZone, NUM_FREQS};

fn serialize_bins<S: Serializer>(values: &[f32; NUM_FREQS], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter())
}

/// Everything a renderer needs from one cycle. Fixed-size, so publishing
/// never allocates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub cycle: u64,
    pub t_ms: u64,
    /// Smoothed per-bin loudness in [0, 1].
    #[serde(serialize_with = "serialize_bins")]
    pub spectrum: [f32; NUM_FREQS],
    /// Window-normalized Goertzel magnitudes.
    #[serde(serialize_with = "serialize_bins")]
    pub magnitudes: [f32; NUM_FREQS],
    pub chromagram: [f32; NUM_PITCH_CLASSES],
    pub novelty: f32,
    pub vu: f32,
    pub vu_average: f32,
    pub waveform_peak: f32,
    pub zone: LoudnessZone,
    pub silent_scale: f32,
    pub extended_silence: bool,
    pub agc_gain: f32,
    pub silence_gate: bool,
    pub calibrating: bool,
    pub calibration_progress: f32,
    pub peak_bin: Option<usize>,
    pub peak_hz: f32,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            cycle: 0,
            t_ms: 0,
            spectrum: [0.0; NUM_FREQS],
            magnitudes: [0.0; NUM_FREQS],
            chromagram: [0.0; NUM_PITCH_CLASSES],
            novelty: 0.0,
            vu: 0.0,
            vu_average: 0.0,
            waveform_peak: 0.0,
            zone: LoudnessZone::Normal,
            silent_scale: 1.0,
            extended_silence: false,
            agc_gain: 1.0,
            silence_gate: false,
            calibrating: false,
            calibration_progress: 0.0,
            peak_bin: None,
            peak_hz: 0.0,
        }
    }
}

/// Writer half, owned by the engine.
pub struct SnapshotPublisher {
    input: triple_buffer::Input<Snapshot>,
}

/// Reader half. Always observes one complete snapshot.
pub struct SnapshotReader {
    output: triple_buffer::Output<Snapshot>,
}

pub fn snapshot_channel() -> (SnapshotPublisher, SnapshotReader) {
    let (input, output) = TripleBuffer::new(&Snapshot::default()).split();
    (SnapshotPublisher { input }, SnapshotReader { output })
}

impl SnapshotPublisher {
    pub fn publish(&mut self, snapshot: Snapshot) {
        self.input.write(snapshot);
    }
}

impl SnapshotReader {
    /// Latest published snapshot.
    pub fn read(&mut self) -> &Snapshot {
        self.output.read()
    }

    /// True if something was published since the last `read`.
    pub fn has_update(&self) -> bool {
        self.output.updated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_sees_latest_whole_snapshot() {
        let (mut publisher, mut reader) = snapshot_channel();
        assert!(!reader.has_update());
        assert_eq!(reader.read().cycle, 0);

        for cycle in 1..=3 {
            publisher.publish(Snapshot {
                cycle,
                spectrum: [cycle as f32; NUM_FREQS],
                ..Snapshot::default()
            });
        }
        assert!(reader.has_update());
        let snap = reader.read();
        assert_eq!(snap.cycle, 3);
        assert!(snap.spectrum.iter().all(|&v| v == 3.0));
        assert!(!reader.has_update());
    }

    #[test]
    fn serializes_full_bin_arrays() {
        let json = serde_json::to_value(Snapshot::default()).unwrap();
        assert_eq!(json["spectrum"].as_array().unwrap().len(), NUM_FREQS);
        assert_eq!(json["zone"], "Normal");
        assert!(json["peak_bin"].is_null());
    }
}
