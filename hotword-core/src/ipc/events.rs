//! Inbound control messages and outbound hotword events.
//!
//! ## Topics
//!
//! | Message | Topic |
//! |---------|-------|
//! | `ControlMessage::AudioFrame` | `"hermes/audioServer/<siteId>/audioFrame"` |
//! | `ControlMessage::ToggleOn` | `"hermes/hotword/toggleOn"` |
//! | `ControlMessage::ToggleOff` | `"hermes/hotword/toggleOff"` |
//! | `HotwordEvent::Detected` | `"hermes/hotword/<wakewordId>/detected"` |
//! | `HotwordEvent::Error` | `"hermes/error/hotword"` |

use serde::{Deserialize, Serialize};

use super::topics;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Everything the control plane reacts to from the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// One WAV (or raw PCM) frame from an audio server.
    AudioFrame { site_id: String, wav_bytes: Vec<u8> },
    ToggleOn(HotwordToggle),
    ToggleOff(HotwordToggle),
}

impl ControlMessage {
    /// Decode a bus message. `Ok(None)` for topics this service ignores.
    ///
    /// # Errors
    /// `Json` if a toggle payload is not a valid toggle object.
    pub fn from_topic(topic: &str, payload: &[u8]) -> Result<Option<Self>> {
        if let Some(site_id) = topics::audio_frame_site(topic) {
            return Ok(Some(Self::AudioFrame {
                site_id: site_id.to_string(),
                wav_bytes: payload.to_vec(),
            }));
        }

        let message = match topic {
            topics::TOGGLE_ON => Self::ToggleOn(serde_json::from_slice(payload)?),
            topics::TOGGLE_OFF => Self::ToggleOff(serde_json::from_slice(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn site_id(&self) -> &str {
        match self {
            Self::AudioFrame { site_id, .. } => site_id,
            Self::ToggleOn(toggle) | Self::ToggleOff(toggle) => &toggle.site_id,
        }
    }
}

/// Payload of `toggleOn` / `toggleOff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotwordToggle {
    #[serde(default = "default_site_id")]
    pub site_id: String,
    #[serde(default)]
    pub reason: ToggleReason,
}

impl HotwordToggle {
    pub fn new(site_id: impl Into<String>, reason: ToggleReason) -> Self {
        Self {
            site_id: site_id.into(),
            reason,
        }
    }
}

fn default_site_id() -> String {
    "default".to_string()
}

/// Why the hotword service is being paused or resumed.
///
/// Serialized as its bare string token. `Unknown` (the empty token) is the
/// override: enabling with it clears every outstanding reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToggleReason {
    #[default]
    Unknown,
    DialogueSession,
    PlayAudio,
    TtsSay,
    Other(String),
}

impl ToggleReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "",
            Self::DialogueSession => "dialogueSession",
            Self::PlayAudio => "playAudio",
            Self::TtsSay => "ttsSay",
            Self::Other(token) => token,
        }
    }
}

impl From<String> for ToggleReason {
    fn from(token: String) -> Self {
        match token.as_str() {
            "" => Self::Unknown,
            "dialogueSession" => Self::DialogueSession,
            "playAudio" => Self::PlayAudio,
            "ttsSay" => Self::TtsSay,
            _ => Self::Other(token),
        }
    }
}

impl From<ToggleReason> for String {
    fn from(reason: ToggleReason) -> Self {
        reason.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Events the control plane publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum HotwordEvent {
    Detected {
        wakeword_id: String,
        message: HotwordDetected,
    },
    Error(HotwordErrorReport),
}

impl HotwordEvent {
    pub fn topic(&self) -> String {
        match self {
            Self::Detected { wakeword_id, .. } => topics::detected(wakeword_id),
            Self::Error(_) => topics::ERROR.to_string(),
        }
    }

    /// JSON body of the event (without the topic).
    pub fn payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::Detected { message, .. } => serde_json::to_value(message)?,
            Self::Error(report) => serde_json::to_value(report)?,
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotwordDetected {
    pub site_id: String,
    /// Keyphrase that was spotted.
    pub model_id: String,
    pub model_version: String,
    pub model_type: String,
    /// Keyphrase threshold in effect.
    pub current_sensitivity: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotwordErrorReport {
    pub error: String,
    pub context: String,
    pub site_id: String,
}

// ---------------------------------------------------------------------------
// Engine status
// ---------------------------------------------------------------------------

/// Current state of the hotword engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Decoder being loaded.
    Loading,
    /// Detection thread waiting for or decoding audio.
    Listening,
    /// Every audio producer is gone; the detection thread exited cleanly.
    Stopped,
    /// Fatal detection failure; restart required.
    Error,
}
