//! Blocking detection loop.
//!
//! ## Per queue item
//!
//! ```text
//! EndUtterance ─► end ACTIVE utterance, clear StreamBuffer
//! Shutdown     ─► stop, status = Stopped
//! Audio        ─► drop if gate closed
//!              ─► one-shot "receiving audio" signal
//!              ─► lazy decoder load (fatal on failure)
//!              ─► normalize (drop chunk on FormatError)
//!              ─► append to StreamBuffer
//!              ─► while a full window is buffered:
//!                    IDLE → start utterance → ACTIVE
//!                    feed window, query hypothesis
//!                    on hit: end utterance, clear buffer, send Detection, stop
//! ```
//!
//! Runs on a dedicated OS thread. The decoder, buffer and utterance state
//! never leave it; results cross back to the control plane over an
//! unbounded tokio channel.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::AudioNormalizer,
    buffering::{chunk::AudioChunk, stream::StreamBuffer, AudioReceiver, QueueItem},
    decoder::{load_decoder, DecoderLoader, KeywordDecoder},
    engine::EngineConfig,
    error::Result,
    ipc::EngineStatus,
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub chunks_in: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub windows_decoded: AtomicUsize,
    pub utterances_started: AtomicUsize,
    pub detections: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_in.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.windows_decoded.store(0, Ordering::Relaxed);
        self.utterances_started.store(0, Ordering::Relaxed);
        self.detections.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            windows_decoded: self.windows_decoded.load(Ordering::Relaxed),
            utterances_started: self.utterances_started.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub chunks_in: usize,
    pub chunks_dropped: usize,
    pub windows_decoded: usize,
    pub utterances_started: usize,
    pub detections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceState {
    Idle,
    Active,
}

/// A positive hypothesis, attributed to the site whose chunk completed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub wakeword_id: String,
    pub site_id: String,
}

/// Decoder plus the stream state that feeds it.
pub struct Detector {
    decoder: Box<dyn KeywordDecoder>,
    buffer: StreamBuffer,
    state: UtteranceState,
    normalizer: AudioNormalizer,
    wakeword_id: String,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl Detector {
    pub fn new(
        decoder: Box<dyn KeywordDecoder>,
        config: &EngineConfig,
        diagnostics: Arc<PipelineDiagnostics>,
    ) -> Self {
        Self {
            decoder,
            buffer: StreamBuffer::new(config.chunk_size),
            state: UtteranceState::Idle,
            normalizer: AudioNormalizer::new(config.format),
            wakeword_id: config.wakeword_id().to_string(),
            diagnostics,
        }
    }

    /// Buffer one chunk and decode every full window it completes.
    ///
    /// Malformed chunks are logged and dropped. At most one detection is
    /// returned; on a hit the rest of the buffer is discarded so the tail of
    /// the same utterance cannot fire again.
    ///
    /// # Errors
    /// Decoder failures, which the loop treats as fatal.
    pub fn process_chunk(&mut self, chunk: &AudioChunk) -> Result<Option<Detection>> {
        let pcm = match self.normalizer.normalize(&chunk.bytes) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!(site_id = %chunk.site_id, bytes = chunk.len(), error = %e, "dropping audio chunk");
                PipelineDiagnostics::bump(&self.diagnostics.chunks_dropped);
                return Ok(None);
            }
        };
        self.buffer.append(&pcm);

        while let Some(window) = self.buffer.next_window() {
            if self.state == UtteranceState::Idle {
                self.decoder.start_utterance()?;
                self.state = UtteranceState::Active;
                PipelineDiagnostics::bump(&self.diagnostics.utterances_started);
            }

            self.decoder.process_raw(&window)?;
            PipelineDiagnostics::bump(&self.diagnostics.windows_decoded);

            if let Some(hyp) = self.decoder.hypothesis() {
                self.decoder.end_utterance()?;
                self.state = UtteranceState::Idle;
                self.buffer.clear();
                PipelineDiagnostics::bump(&self.diagnostics.detections);

                info!(
                    wakeword_id = %self.wakeword_id,
                    site_id = %chunk.site_id,
                    text = %hyp.text,
                    score = hyp.score,
                    "keyphrase detected"
                );
                return Ok(Some(Detection {
                    wakeword_id: self.wakeword_id.clone(),
                    site_id: chunk.site_id.clone(),
                }));
            }
        }
        Ok(None)
    }

    /// Gate closed: drop any active utterance and everything buffered.
    pub fn end_utterance(&mut self) -> Result<()> {
        if self.state == UtteranceState::Active {
            self.decoder.end_utterance()?;
            self.state = UtteranceState::Idle;
            debug!("utterance ended by disable");
        }
        self.buffer.clear();
        Ok(())
    }

    pub fn state(&self) -> UtteranceState {
        self.state
    }

    /// Bytes waiting for a full window.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Everything the detection thread owns or shares, moved in as one value.
pub struct DetectionContext {
    pub config: EngineConfig,
    /// Decoder from `warm_up`, if it ran.
    pub decoder: Option<Box<dyn KeywordDecoder>>,
    pub loader: Arc<dyn DecoderLoader>,
    pub receiver: AudioReceiver,
    pub enabled: Arc<AtomicBool>,
    /// Set when the gate reopens; cleared by the first chunk after it.
    pub first_audio: Arc<AtomicBool>,
    pub detections: mpsc::UnboundedSender<Detection>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run until a `Shutdown` marker, until every queue producer is gone, or
/// until a fatal error occurs.
pub fn run(mut ctx: DetectionContext) {
    info!(chunk_size = ctx.config.chunk_size, format = %ctx.config.format, "detection loop started");

    let mut detector = ctx
        .decoder
        .take()
        .map(|decoder| Detector::new(decoder, &ctx.config, Arc::clone(&ctx.diagnostics)));

    while let Some(item) = ctx.receiver.pop() {
        let chunk = match item {
            QueueItem::EndUtterance => {
                if let Some(detector) = detector.as_mut() {
                    if let Err(e) = detector.end_utterance() {
                        fail(&ctx, "failed to end utterance", &e);
                        return;
                    }
                }
                continue;
            }
            QueueItem::Shutdown => {
                debug!("shutdown requested");
                break;
            }
            QueueItem::Audio(chunk) => chunk,
        };

        PipelineDiagnostics::bump(&ctx.diagnostics.chunks_in);
        if !ctx.enabled.load(Ordering::Acquire) {
            PipelineDiagnostics::bump(&ctx.diagnostics.chunks_dropped);
            continue;
        }

        if ctx.first_audio.swap(false, Ordering::AcqRel) {
            debug!(site_id = %chunk.site_id, "receiving audio");
        }

        if detector.is_none() {
            *ctx.status.lock() = EngineStatus::Loading;
            match load_decoder(&ctx.config, ctx.loader.as_ref()) {
                Ok(decoder) => {
                    detector = Some(Detector::new(decoder, &ctx.config, Arc::clone(&ctx.diagnostics)));
                    *ctx.status.lock() = EngineStatus::Listening;
                }
                Err(e) => {
                    fail(&ctx, "failed to load decoder", &e);
                    return;
                }
            }
        }
        let Some(active) = detector.as_mut() else {
            continue;
        };

        match active.process_chunk(&chunk) {
            Ok(Some(detection)) => {
                if ctx.detections.send(detection).is_err() {
                    warn!("control plane gone, detection not published");
                }
            }
            Ok(None) => {}
            Err(e) => {
                fail(&ctx, "decoder failed", &e);
                return;
            }
        }
    }

    *ctx.status.lock() = EngineStatus::Stopped;
    info!("detection loop stopped");
}

fn fail(ctx: &DetectionContext, what: &str, err: &crate::error::HotwordError) {
    error!(error = %err, "{what}; detection loop exiting");
    *ctx.status.lock() = EngineStatus::Error;
}
