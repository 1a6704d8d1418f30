//! Message-bus vocabulary: topics, inbound control messages, outbound events.
//!
//! The transport itself stays outside the core. Whatever carries messages
//! (MQTT, stdin/stdout lines, an in-process channel) decodes them with
//! [`ControlMessage::from_topic`] and receives events through [`EventSink`].

pub mod events;

pub use events::{
    ControlMessage, EngineStatus, HotwordDetected, HotwordErrorReport, HotwordEvent, HotwordToggle,
    ToggleReason,
};

use crate::error::Result;

/// Outbound side of the bus, owned by the control plane.
pub trait EventSink {
    fn publish(&mut self, event: &HotwordEvent) -> Result<()>;
}

/// Hermes topic names.
pub mod topics {
    pub const TOGGLE_ON: &str = "hermes/hotword/toggleOn";
    pub const TOGGLE_OFF: &str = "hermes/hotword/toggleOff";
    pub const ERROR: &str = "hermes/error/hotword";

    const AUDIO_FRAME_PREFIX: &str = "hermes/audioServer/";
    const AUDIO_FRAME_SUFFIX: &str = "/audioFrame";

    pub fn audio_frame(site_id: &str) -> String {
        format!("{AUDIO_FRAME_PREFIX}{site_id}{AUDIO_FRAME_SUFFIX}")
    }

    /// Site id of an audio frame topic.
    pub fn audio_frame_site(topic: &str) -> Option<&str> {
        topic
            .strip_prefix(AUDIO_FRAME_PREFIX)?
            .strip_suffix(AUDIO_FRAME_SUFFIX)
            .filter(|site| !site.is_empty() && !site.contains('/'))
    }

    pub fn detected(wakeword_id: &str) -> String {
        format!("hermes/hotword/{wakeword_id}/detected")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn audio_frame_topics_round_trip() {
            let topic = audio_frame("living-room");
            assert_eq!(topic, "hermes/audioServer/living-room/audioFrame");
            assert_eq!(audio_frame_site(&topic), Some("living-room"));
        }

        #[test]
        fn nested_or_empty_sites_are_rejected() {
            assert_eq!(audio_frame_site("hermes/audioServer//audioFrame"), None);
            assert_eq!(audio_frame_site("hermes/audioServer/a/b/audioFrame"), None);
        }
    }
}
