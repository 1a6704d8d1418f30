//! Control-plane dispatcher.
//!
//! Single-threaded owner of the [`WakeGate`]. It reacts to bus messages and
//! publishes detections handed over by the detection thread. It never waits
//! on decoding: audio goes into the queue and the loop moves on.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{gate::WakeGate, pipeline::Detection, EngineConfig};
use crate::{
    buffering::{chunk::AudioChunk, AudioSender, QueueItem},
    error::Result,
    ipc::{ControlMessage, EventSink, HotwordDetected, HotwordErrorReport, HotwordEvent},
};

const MODEL_TYPE: &str = "personal";

pub struct ControlPlane {
    config: EngineConfig,
    gate: WakeGate,
    first_audio: Arc<AtomicBool>,
    sender: AudioSender,
    detections: mpsc::UnboundedReceiver<Detection>,
}

impl ControlPlane {
    pub fn new(
        config: EngineConfig,
        gate: WakeGate,
        first_audio: Arc<AtomicBool>,
        sender: AudioSender,
        detections: mpsc::UnboundedReceiver<Detection>,
    ) -> Self {
        Self {
            config,
            gate,
            first_audio,
            sender,
            detections,
        }
    }

    pub fn gate(&self) -> &WakeGate {
        &self.gate
    }

    /// Apply one inbound message.
    ///
    /// # Errors
    /// `QueueDisconnected` if the detection loop has exited.
    pub fn handle_message(&mut self, message: ControlMessage) -> Result<()> {
        if !self.accepts_site(message.site_id()) {
            debug!(site_id = %message.site_id(), "ignoring message for unhandled site");
            return Ok(());
        }

        match message {
            ControlMessage::ToggleOn(toggle) => {
                if self.gate.enable(&toggle.reason) {
                    self.first_audio.store(true, Ordering::Release);
                    debug!(reason = %toggle.reason.as_str(), "enabled");
                } else {
                    debug!(reasons = ?self.gate.reasons().collect::<Vec<_>>(), "still disabled");
                }
            }
            ControlMessage::ToggleOff(toggle) => {
                self.gate.disable(toggle.reason);
                self.sender.push(QueueItem::EndUtterance)?;
                debug!("disabled");
            }
            ControlMessage::AudioFrame { site_id, wav_bytes } => {
                if self.gate.is_enabled() {
                    self.sender.push_audio(AudioChunk::new(wav_bytes, site_id))?;
                }
            }
        }
        Ok(())
    }

    /// Publish a detection. A failed publish is reported as an error event.
    pub fn publish_detection<S: EventSink + ?Sized>(&self, detection: Detection, sink: &mut S) {
        let event = HotwordEvent::Detected {
            wakeword_id: detection.wakeword_id,
            message: HotwordDetected {
                site_id: detection.site_id.clone(),
                model_id: self.config.keyphrase.clone(),
                model_version: String::new(),
                model_type: MODEL_TYPE.to_string(),
                current_sensitivity: self.config.keyphrase_threshold,
            },
        };

        let Err(e) = sink.publish(&event) else {
            return;
        };
        error!(error = %e, topic = %event.topic(), "failed to publish detection");

        let report = HotwordEvent::Error(HotwordErrorReport {
            error: e.to_string(),
            context: self.config.keyphrase.clone(),
            site_id: detection.site_id,
        });
        if let Err(e) = sink.publish(&report) {
            error!(error = %e, "failed to publish hotword error");
        }
    }

    /// Serve until `inbound` closes, then wait for the detection thread to
    /// drain its queue and publish any detection it still produces.
    ///
    /// # Errors
    /// `QueueDisconnected` once the detection loop has died; nothing this
    /// plane does can be detected any more.
    pub async fn run<S: EventSink + ?Sized>(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<ControlMessage>,
        sink: &mut S,
    ) -> Result<()> {
        info!(keyphrase = %self.config.keyphrase, "control plane running");

        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    self.handle_message(message)?;
                }
                Some(detection) = self.detections.recv() => {
                    self.publish_detection(detection, sink);
                }
            }
        }

        // Let the detection thread finish the audio already queued, then
        // publish whatever it found before returning.
        if self.sender.push(QueueItem::Shutdown).is_err() {
            debug!("detection loop already stopped");
        }
        while let Some(detection) = self.detections.recv().await {
            self.publish_detection(detection, sink);
        }
        info!("control channel closed");
        Ok(())
    }

    fn accepts_site(&self, site_id: &str) -> bool {
        self.config.site_ids.is_empty() || self.config.site_ids.iter().any(|s| s == site_id)
    }
}
