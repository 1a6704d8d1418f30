//! Typed audio chunk passed from the ingestion sources to the detection loop.

/// One frame of audio exactly as it arrived, plus the site it came from.
///
/// The bytes are usually a complete WAV file; the format descriptor lives in
/// its header and is read by the normalizer on the detection thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub bytes: Vec<u8>,
    /// Logical source, surfaced on any detection this chunk triggers.
    pub site_id: String,
}

impl AudioChunk {
    pub fn new(bytes: Vec<u8>, site_id: impl Into<String>) -> Self {
        Self {
            bytes,
            site_id: site_id.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
