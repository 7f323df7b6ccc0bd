//! JSON-lines frame output.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes one JSON object per line.
pub struct FrameSink<W: Write> {
    writer: W,
    frames: u64,
}

impl FrameSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create frame output: {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FrameSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    pub fn write_frame<T: Serialize>(&mut self, frame: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, frame).context("Failed to serialize frame")?;
        self.writer.write_all(b"\n").context("Failed to write frame")?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush().context("Failed to flush frame output")?;
        Ok(self.writer)
    }
}
