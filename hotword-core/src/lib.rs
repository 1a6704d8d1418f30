//! # hotword-core
//!
//! Always-listening keyphrase spotting engine.
//!
//! ## Architecture
//!
//! ```text
//! bus frame ─► ControlPlane ──(gate open?)──┐
//!                                           ├─► AudioQueue (unbounded, MPSC)
//! UDP packet ─► UdpListener ─(gate open?)───┘          │
//!                                             detection thread
//!                                   normalize → StreamBuffer → windows
//!                                                      │
//!                                           KeywordDecoder::process_raw
//!                                                      │ hypothesis
//!                                      mpsc::UnboundedSender<Detection>
//!                                                      │
//!                              ControlPlane ─► EventSink::publish(HotwordEvent)
//! ```
//!
//! The decoder, stream buffer and utterance state live on the detection
//! thread only. The control plane owns the gate and talks to the detection
//! thread through the audio queue alone.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod ipc;

// Convenience re-exports for downstream crates
pub use audio::AudioFormat;
pub use decoder::{DecoderLoader, DecoderSettings, EnergyDecoderLoader, Hypothesis, KeywordDecoder};
pub use engine::{ControlPlane, EngineConfig, EngineThreads, HotwordEngine};
pub use error::{HotwordError, Result};
pub use ingest::UdpEndpoint;
pub use ipc::{ControlMessage, EngineStatus, EventSink, HotwordEvent, HotwordToggle, ToggleReason};
