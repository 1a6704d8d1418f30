//! JSON-lines bus adapter.
//!
//! Inbound, one message per stdin line:
//!
//! ```text
//! {"topic": "hermes/hotword/toggleOff", "payload": {"siteId": "default", "reason": "ttsSay"}}
//! {"topic": "hermes/audioServer/kitchen/audioFrame", "wav": "<base64 WAV bytes>"}
//! ```
//!
//! Outbound, one event per stdout line: `{"topic": ..., "payload": {...}}`.

use std::io::Write;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hotword_core::{ControlMessage, EventSink, HotwordError, HotwordEvent};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct InboundLine {
    topic: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(default)]
    wav: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutboundLine {
    topic: String,
    payload: serde_json::Value,
}

/// Decode one inbound line. `Ok(None)` for topics the service ignores.
pub fn decode_line(line: &str) -> Result<Option<ControlMessage>> {
    let inbound: InboundLine = serde_json::from_str(line)?;
    let payload = match (inbound.wav, inbound.payload) {
        (Some(wav), _) => BASE64.decode(wav.trim())?,
        (None, Some(value)) => serde_json::to_vec(&value)?,
        (None, None) => b"{}".to_vec(),
    };
    Ok(ControlMessage::from_topic(&inbound.topic, &payload)?)
}

/// Forward decoded lines to the control plane until input ends.
pub async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<ControlMessage>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("bus input closed");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to read bus input");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match decode_line(&line) {
            Ok(Some(message)) => {
                if tx.send(message).is_err() {
                    return;
                }
            }
            Ok(None) => debug!("ignoring message on unrelated topic"),
            Err(e) => warn!(error = %e, "skipping malformed bus line"),
        }
    }
}

/// Writes each event as one JSON line.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn publish(&mut self, event: &HotwordEvent) -> hotword_core::Result<()> {
        let line = OutboundLine {
            topic: event.topic(),
            payload: event.payload()?,
        };
        let json = serde_json::to_string(&line)?;
        writeln!(self.out, "{json}")
            .and_then(|()| self.out.flush())
            .map_err(|e| HotwordError::Publish(e.to_string()))
    }
}
