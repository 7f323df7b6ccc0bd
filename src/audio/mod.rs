pub mod decode;
pub mod source;

pub use source::{RawBlock, SampleSource, DEFAULT_READ_TIMEOUT, MAX_CHUNK_SIZE};
