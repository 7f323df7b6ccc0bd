use crate::error::EngineError;

/// Samples of conditioned audio kept for the Goertzel bank.
pub const HISTORY_CAPACITY: usize = 4096;

/// Fixed-capacity ring of the most recent conditioned samples.
///
/// Storage is mirrored: every sample is written at `cursor` and at
/// `cursor + capacity`, so the newest `n` samples are always one contiguous
/// slice. The two halves must stay identical; `is_consistent` checks that.
pub struct SampleHistory {
    buf: Box<[i16]>,
    capacity: usize,
    cursor: usize,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        let len = capacity * 2;
        let mut buf: Vec<i16> = Vec::new();
        buf.try_reserve_exact(len).map_err(|source| EngineError::Allocation {
            what: "sample history",
            bytes: len * std::mem::size_of::<i16>(),
            source,
        })?;
        buf.resize(len, 0);
        Ok(Self {
            buf: buf.into_boxed_slice(),
            capacity,
            cursor: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a chunk, discarding the oldest `chunk.len()` samples.
    pub fn push_chunk(&mut self, chunk: &[i16]) {
        // Only the newest `capacity` samples of an oversized chunk survive anyway.
        let skip = chunk.len().saturating_sub(self.capacity);
        for &sample in &chunk[skip..] {
            self.buf[self.cursor] = sample;
            self.buf[self.cursor + self.capacity] = sample;
            self.cursor += 1;
            if self.cursor == self.capacity {
                self.cursor = 0;
            }
        }
    }

    /// The newest `n` samples, oldest first. `n` is clamped to the capacity.
    pub fn latest(&self, n: usize) -> &[i16] {
        let n = n.min(self.capacity);
        let end = self.cursor + self.capacity;
        &self.buf[end - n..end]
    }

    pub fn is_consistent(&self) -> bool {
        let (primary, mirror) = self.buf.split_at(self.capacity);
        primary == mirror
    }

    pub fn reset(&mut self) {
        self.buf.iter_mut().for_each(|s| *s = 0);
        self.cursor = 0;
    }

    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&mut self, index: usize, value: i16) {
        self.buf[index] = value;
    }
}
