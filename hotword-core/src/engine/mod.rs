//! `HotwordEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! HotwordEngine::new()
//!     └─► warm_up()      → decoder loaded on the caller's thread, status = Loading → Idle
//!         └─► start()    → queue + gate created, detection and UDP threads spawned,
//!                          status = Listening; returns (ControlPlane, EngineThreads)
//!             └─► ControlPlane::run() until the bus closes
//! ```
//!
//! `start()` may be called once. Skipping `warm_up()` is allowed; the
//! detection thread then loads the decoder when the first chunk arrives.
//!
//! ## Threading
//!
//! One detection thread and one thread per UDP endpoint, all plain OS
//! threads because decoding and `recv_from` block. The control plane is a
//! future for the caller to drive on a single-threaded runtime.

pub mod control;
pub mod gate;
pub mod pipeline;

pub use control::ControlPlane;
pub use gate::WakeGate;
pub use pipeline::{Detection, DiagnosticsSnapshot, UtteranceState};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{
    audio::{normalize::SUPPORTED_WIDTHS, AudioFormat},
    buffering::audio_queue,
    decoder::{load_decoder, DecoderLoader, KeywordDecoder},
    error::{HotwordError, Result},
    ingest::{UdpEndpoint, UdpListener, WAV_HEADER_BYTES},
    ipc::EngineStatus,
};

/// Default keyphrase threshold: accept almost any keyphrase match.
pub const DEFAULT_KEYPHRASE_THRESHOLD: f64 = 1e-40;

/// Configuration for `HotwordEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Phrase to spot. Every word needs a pronunciation.
    pub keyphrase: String,
    /// Detection threshold passed to the decoder. Default: 1e-40.
    pub keyphrase_threshold: f64,
    /// Acoustic model directory.
    pub acoustic_model: PathBuf,
    /// Pronunciation dictionaries, searched in order.
    pub dictionary_paths: Vec<PathBuf>,
    /// Adaptation matrix; ignored unless the file exists.
    pub mllr_matrix: Option<PathBuf>,
    /// Routing id for detections. `None` uses the keyphrase.
    pub wakeword_id: Option<String>,
    /// Bus sites to serve. Empty accepts every site.
    pub site_ids: Vec<String>,
    /// Initial gate state. Default: true.
    pub enabled: bool,
    /// Format the decoder expects. Default: 16 kHz, 16-bit, mono.
    pub format: AudioFormat,
    /// Bytes per decoder window. Default: 960.
    pub chunk_size: usize,
    pub udp_audio: Vec<UdpEndpoint>,
    /// Expected UDP payload size; the datagram limit adds a WAV header.
    /// Default: 2048.
    pub udp_chunk_size: usize,
    /// Let the decoder log its own diagnostics.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keyphrase: String::new(),
            keyphrase_threshold: DEFAULT_KEYPHRASE_THRESHOLD,
            acoustic_model: PathBuf::new(),
            dictionary_paths: Vec::new(),
            mllr_matrix: None,
            wakeword_id: None,
            site_ids: Vec::new(),
            enabled: true,
            format: AudioFormat::default(),
            chunk_size: 960,
            udp_audio: Vec::new(),
            udp_chunk_size: 2048,
            debug: false,
        }
    }
}

impl EngineConfig {
    /// # Errors
    /// `Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.keyphrase.trim().is_empty() {
            return Err(HotwordError::Config("keyphrase is required".into()));
        }
        if self.keyphrase_threshold.is_nan() || self.keyphrase_threshold < 0.0 {
            return Err(HotwordError::Config(format!(
                "keyphrase threshold must be a non-negative number, got {}",
                self.keyphrase_threshold
            )));
        }
        let AudioFormat {
            sample_rate,
            sample_width,
            channels,
        } = self.format;
        if sample_rate == 0 || sample_width == 0 || channels == 0 {
            return Err(HotwordError::Config(format!("invalid audio format {}", self.format)));
        }
        if !SUPPORTED_WIDTHS.contains(&sample_width) {
            return Err(HotwordError::Config(format!(
                "sample width must be 1 to 4 bytes, got {sample_width}"
            )));
        }
        if self.chunk_size == 0 || self.chunk_size % self.format.frame_size() != 0 {
            return Err(HotwordError::Config(format!(
                "chunk size {} must be a positive multiple of the {}-byte frame",
                self.chunk_size,
                self.format.frame_size()
            )));
        }
        if self.udp_chunk_size == 0 {
            return Err(HotwordError::Config("UDP chunk size must be positive".into()));
        }
        Ok(())
    }

    /// Explicit wake word id, else the keyphrase.
    pub fn wakeword_id(&self) -> &str {
        match self.wakeword_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.keyphrase,
        }
    }

    /// Largest UDP datagram accepted.
    pub fn max_datagram(&self) -> usize {
        self.udp_chunk_size + WAV_HEADER_BYTES
    }
}

/// Handles of the threads spawned by `start()`.
pub struct EngineThreads {
    pub detection: JoinHandle<()>,
    pub listeners: Vec<JoinHandle<()>>,
    /// Bound address of every listener that started, in endpoint order.
    pub listener_addrs: Vec<SocketAddr>,
}

/// The top-level engine handle.
///
/// `HotwordEngine` is `Send + Sync`; all fields use interior mutability.
pub struct HotwordEngine {
    config: EngineConfig,
    loader: Arc<dyn DecoderLoader>,
    /// Decoder produced by `warm_up`, handed to the detection thread.
    decoder: Mutex<Option<Box<dyn KeywordDecoder>>>,
    running: AtomicBool,
    status: Arc<Mutex<EngineStatus>>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl HotwordEngine {
    /// Create an engine. Nothing is loaded or spawned yet.
    ///
    /// # Errors
    /// `Config` if `config` fails validation.
    pub fn new(config: EngineConfig, loader: Arc<dyn DecoderLoader>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            loader,
            decoder: Mutex::new(None),
            running: AtomicBool::new(false),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the decoder load procedure now so configuration errors surface
    /// at startup.
    pub fn warm_up(&self) -> Result<()> {
        *self.status.lock() = EngineStatus::Loading;
        info!(keyphrase = %self.config.keyphrase, "loading decoder");
        match load_decoder(&self.config, self.loader.as_ref()) {
            Ok(decoder) => {
                *self.decoder.lock() = Some(decoder);
                *self.status.lock() = EngineStatus::Idle;
                info!("decoder ready");
                Ok(())
            }
            Err(e) => {
                *self.status.lock() = EngineStatus::Error;
                Err(e)
            }
        }
    }

    /// Spawn the detection thread and UDP listeners.
    ///
    /// A UDP endpoint that cannot be bound is logged and skipped; the other
    /// sources keep running.
    ///
    /// # Errors
    /// - `AlreadyRunning` on a second call.
    /// - `Io` if the detection thread cannot be spawned.
    pub fn start(&self) -> Result<(ControlPlane, EngineThreads)> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotwordError::AlreadyRunning);
        }

        self.diagnostics.reset();
        let (sender, receiver) = audio_queue();
        let gate = WakeGate::new(self.config.enabled);
        let first_audio = Arc::new(AtomicBool::new(true));
        let (detection_tx, detection_rx) = mpsc::unbounded_channel();

        let ctx = pipeline::DetectionContext {
            config: self.config.clone(),
            decoder: self.decoder.lock().take(),
            loader: Arc::clone(&self.loader),
            receiver,
            enabled: gate.enabled_flag(),
            first_audio: Arc::clone(&first_audio),
            detections: detection_tx,
            status: Arc::clone(&self.status),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        *self.status.lock() = EngineStatus::Listening;
        let detection = match thread::Builder::new()
            .name("hotword-detect".into())
            .spawn(move || pipeline::run(ctx))
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "failed to spawn detection thread");
                *self.status.lock() = EngineStatus::Error;
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let mut listeners = Vec::with_capacity(self.config.udp_audio.len());
        let mut listener_addrs = Vec::with_capacity(self.config.udp_audio.len());
        for endpoint in &self.config.udp_audio {
            let listener = match UdpListener::bind(endpoint) {
                Ok(listener) => listener,
                Err(e) => {
                    warn!(site_id = %endpoint.site_id, error = %e, "UDP listener not started");
                    continue;
                }
            };
            let addr = listener.local_addr();
            match listener.spawn(sender.clone(), gate.enabled_flag(), self.config.max_datagram()) {
                Ok(handle) => {
                    listeners.push(handle);
                    listener_addrs.push(addr);
                }
                Err(e) => warn!(addr = %addr, error = %e, "failed to spawn UDP listener"),
            }
        }

        info!(
            keyphrase = %self.config.keyphrase,
            wakeword_id = %self.config.wakeword_id(),
            udp_listeners = listeners.len(),
            "engine started"
        );

        let plane = ControlPlane::new(self.config.clone(), gate, first_audio, sender, detection_rx);
        Ok((
            plane,
            EngineThreads {
                detection,
                listeners,
                listener_addrs,
            },
        ))
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Snapshot of detection counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::EnergyDecoderLoader;

    fn valid() -> EngineConfig {
        EngineConfig {
            keyphrase: "hey computer".into(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn defaults_match_hermes_conventions() {
        let config = EngineConfig::default();
        assert_eq!(config.keyphrase_threshold, 1e-40);
        assert_eq!(config.format, AudioFormat::new(16_000, 2, 1));
        assert_eq!(config.chunk_size, 960);
        assert_eq!(config.max_datagram(), 2048 + 44);
        assert!(config.enabled);
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(valid().validate().is_ok());

        let cases = [
            EngineConfig {
                keyphrase: "  ".into(),
                ..valid()
            },
            EngineConfig {
                chunk_size: 0,
                ..valid()
            },
            EngineConfig {
                chunk_size: 961,
                ..valid()
            },
            EngineConfig {
                keyphrase_threshold: f64::NAN,
                ..valid()
            },
            EngineConfig {
                keyphrase_threshold: -1.0,
                ..valid()
            },
            EngineConfig {
                format: AudioFormat::new(16_000, 0, 1),
                ..valid()
            },
            EngineConfig {
                format: AudioFormat::new(16_000, 8, 1),
                chunk_size: 960 * 8,
                ..valid()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(HotwordError::Config(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn wakeword_id_falls_back_to_keyphrase() {
        let mut config = valid();
        assert_eq!(config.wakeword_id(), "hey computer");
        config.wakeword_id = Some(String::new());
        assert_eq!(config.wakeword_id(), "hey computer");
        config.wakeword_id = Some("computer".into());
        assert_eq!(config.wakeword_id(), "computer");
    }

    #[test]
    fn warm_up_failure_sets_error_status() {
        let engine = HotwordEngine::new(
            EngineConfig {
                acoustic_model: PathBuf::from("/nonexistent/hmm"),
                ..valid()
            },
            Arc::new(EnergyDecoderLoader::default()),
        )
        .unwrap();

        assert_eq!(engine.status(), EngineStatus::Idle);
        assert!(matches!(
            engine.warm_up(),
            Err(HotwordError::AcousticModelNotFound { .. })
        ));
        assert_eq!(engine.status(), EngineStatus::Error);
    }

    #[test]
    fn second_start_is_rejected() {
        let engine = HotwordEngine::new(valid(), Arc::new(EnergyDecoderLoader::default())).unwrap();
        let (plane, threads) = engine.start().unwrap();
        assert_eq!(engine.status(), EngineStatus::Listening);
        assert!(matches!(engine.start(), Err(HotwordError::AlreadyRunning)));

        drop(plane);
        threads.detection.join().expect("detection thread panicked");
        assert_eq!(engine.status(), EngineStatus::Stopped);
    }

    #[test]
    fn unbindable_endpoint_is_skipped() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let engine = HotwordEngine::new(
            EngineConfig {
                udp_audio: vec![
                    UdpEndpoint::new("127.0.0.1", port, "kitchen"),
                    UdpEndpoint::new("127.0.0.1", 0, "bedroom"),
                ],
                ..valid()
            },
            Arc::new(EnergyDecoderLoader::default()),
        )
        .unwrap();

        let (_plane, threads) = engine.start().unwrap();
        assert_eq!(threads.listeners.len(), 1);
        assert_eq!(threads.listener_addrs.len(), 1);
        assert_ne!(threads.listener_addrs[0].port(), port);
    }
}
