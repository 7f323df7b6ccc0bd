use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

/// Largest chunk the engine will ever request in one cycle.
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Default bound on a single source read. A chunk is ~8 ms of audio at the
/// default rate, so this only elapses on a real hardware underrun.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// One acquisition cycle worth of raw microphone words.
///
/// Capacity is fixed; `filled` may be less than `requested` after a short read.
pub struct RawBlock {
    samples: [i32; MAX_CHUNK_SIZE],
    requested: usize,
    filled: usize,
}

impl RawBlock {
    pub fn new(requested: usize) -> Self {
        Self {
            samples: [0; MAX_CHUNK_SIZE],
            requested: requested.min(MAX_CHUNK_SIZE),
            filled: 0,
        }
    }

    pub fn from_samples(requested: usize, data: &[i32]) -> Self {
        let mut block = Self::new(requested);
        let n = data.len().min(block.requested);
        block.samples[..n].copy_from_slice(&data[..n]);
        block.filled = n;
        block
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    /// The samples the source actually delivered.
    pub fn samples(&self) -> &[i32] {
        &self.samples[..self.filled]
    }

    /// Fill from `source`, honoring its timeout. Returns the number of samples read.
    pub fn fill_from(&mut self, source: &mut dyn SampleSource, timeout: Duration) -> usize {
        let requested = self.requested;
        let n = source.read(&mut self.samples[..requested], timeout).min(requested);
        self.samples[n..requested].iter_mut().for_each(|s| *s = 0);
        self.filled = n;
        n
    }

    pub fn set_requested(&mut self, requested: usize) {
        self.requested = requested.min(MAX_CHUNK_SIZE);
        self.filled = self.filled.min(self.requested);
    }
}

/// Microphone/bus abstraction.
///
/// `read` fills at most `buf.len()` samples and returns how many it wrote. It
/// must return within roughly `timeout`, with whatever it has, rather than
/// block on an underrun.
pub trait SampleSource {
    fn read(&mut self, buf: &mut [i32], timeout: Duration) -> usize;

    /// True once a finite source (a file) has nothing more to deliver.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Left-justify a float sample in a 32-bit word, the way an I2S MEMS mic
/// delivers it.
pub fn f32_to_i2s_word(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
}

/// Continuous sine generator emitting I2S-style words.
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    phase: f64,
}

impl ToneSource {
    /// `amplitude` is relative to full scale (0.0-1.0).
    pub fn new(frequency: f32, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            frequency,
            amplitude,
            sample_rate,
            phase: 0.0,
        }
    }
}

impl SampleSource for ToneSource {
    fn read(&mut self, buf: &mut [i32], _timeout: Duration) -> usize {
        let step = std::f64::consts::TAU * self.frequency as f64 / self.sample_rate as f64;
        for s in buf.iter_mut() {
            *s = f32_to_i2s_word(self.amplitude * self.phase.sin() as f32);
            self.phase = (self.phase + step) % std::f64::consts::TAU;
        }
        buf.len()
    }
}

/// Emits zeros, e.g. a muted microphone.
#[derive(Default)]
pub struct SilenceSource;

impl SampleSource for SilenceSource {
    fn read(&mut self, buf: &mut [i32], _timeout: Duration) -> usize {
        buf.fill(0);
        buf.len()
    }
}

/// Plays back a pre-decoded buffer of words, then reports exhaustion.
pub struct BufferSource {
    words: Vec<i32>,
    pos: usize,
}

impl BufferSource {
    pub fn new(words: Vec<i32>) -> Self {
        Self { words, pos: 0 }
    }

    pub fn from_f32(samples: &[f32]) -> Self {
        Self::new(samples.iter().copied().map(f32_to_i2s_word).collect())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl SampleSource for BufferSource {
    fn read(&mut self, buf: &mut [i32], _timeout: Duration) -> usize {
        let n = buf.len().min(self.words.len() - self.pos);
        buf[..n].copy_from_slice(&self.words[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.words.len()
    }
}

/// Receives blocks produced on another thread (a DMA callback, a paced
/// player). Partial blocks are carried over to the next read.
pub struct ChannelSource {
    rx: Receiver<Vec<i32>>,
    pending: Vec<i32>,
    pending_pos: usize,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<i32>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            pending_pos: 0,
            disconnected: false,
        }
    }

    fn drain_pending(&mut self, buf: &mut [i32]) -> usize {
        let available = self.pending.len() - self.pending_pos;
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        n
    }
}

impl SampleSource for ChannelSource {
    fn read(&mut self, buf: &mut [i32], timeout: Duration) -> usize {
        let mut filled = self.drain_pending(buf);
        while filled < buf.len() && !self.disconnected {
            match self.rx.recv_timeout(timeout) {
                Ok(block) => {
                    self.pending = block;
                    self.pending_pos = 0;
                    filled += self.drain_pending(&mut buf[filled..]);
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => self.disconnected = true,
            }
        }
        filled
    }

    fn is_exhausted(&self) -> bool {
        self.disconnected && self.pending_pos >= self.pending.len()
    }
}
