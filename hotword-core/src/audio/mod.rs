//! Audio format handling.
//!
//! Frames reach the engine as WAV blobs (message bus, most UDP senders) or as
//! bare PCM. Everything is converted to the single format the decoder was
//! built for before it touches the stream buffer.

pub mod normalize;
pub mod resample;

pub use normalize::{pcm_to_wav, AudioNormalizer};

use serde::{Deserialize, Serialize};

/// Sample layout of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    /// Samples per second per channel (Hz).
    pub sample_rate: u32,
    /// Bytes per sample: 1 (unsigned), 2, 3 or 4 (signed little-endian).
    pub sample_width: u16,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, sample_width: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            sample_width,
            channels,
        }
    }

    /// Bytes occupied by one sample across all channels.
    pub fn frame_size(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    /// Bytes per second of audio in this format.
    pub fn byte_rate(&self) -> usize {
        self.frame_size() * self.sample_rate as usize
    }
}

impl Default for AudioFormat {
    /// 16 kHz, 16-bit, mono.
    fn default() -> Self {
        Self::new(16_000, 2, 1)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz/{}-bit/{}ch",
            self.sample_rate,
            self.sample_width * 8,
            self.channels
        )
    }
}
