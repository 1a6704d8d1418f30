//! Audio ingestion sources outside the control plane.
//!
//! Message-bus frames are enqueued by the control plane itself; this module
//! holds the sources that run on their own threads.

pub mod udp;

pub use udp::{UdpEndpoint, UdpListener};

/// Bytes allowed on top of `udp_chunk_size` for a WAV header.
pub const WAV_HEADER_BYTES: usize = 44;
