//! `EnergyKeywordDecoder`: reference decoder that spots "loudness", not words.
//!
//! It fires once `trigger_windows` consecutive windows inside one utterance
//! reach an RMS of `rms_threshold`. No acoustic model is read. It lets the
//! whole pipeline (buffering, gating, event publication) run end-to-end
//! without a real engine, and gives tests a deterministic trigger.

use tracing::{debug, info};

use super::{DecoderLoader, DecoderSettings, Hypothesis, KeywordDecoder};
use crate::error::{HotwordError, Result};

pub struct EnergyKeywordDecoder {
    keyphrase: String,
    rms_threshold: f32,
    trigger_windows: u32,
    /// Consecutive loud windows in the current utterance.
    streak: u32,
    active: bool,
    hypothesis: Option<Hypothesis>,
    log_output: bool,
}

impl EnergyKeywordDecoder {
    /// # Parameters
    /// - `rms_threshold`: window RMS in [0.0, 1.0] that counts as "loud".
    /// - `trigger_windows`: loud windows in a row before a hypothesis.
    pub fn new(keyphrase: &str, rms_threshold: f32, trigger_windows: u32) -> Self {
        Self {
            keyphrase: keyphrase.to_string(),
            rms_threshold,
            trigger_windows: trigger_windows.max(1),
            streak: 0,
            active: false,
            hypothesis: None,
            log_output: false,
        }
    }

    /// RMS of little-endian i16 samples, scaled to [0.0, 1.0].
    fn rms(window: &[u8]) -> f32 {
        let count = window.len() / 2;
        if count == 0 {
            return 0.0;
        }
        let sum_sq: f32 = window
            .chunks_exact(2)
            .map(|b| {
                let s = i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32;
                s * s
            })
            .sum();
        (sum_sq / count as f32).sqrt()
    }
}

impl KeywordDecoder for EnergyKeywordDecoder {
    fn start_utterance(&mut self) -> Result<()> {
        if self.active {
            return Err(HotwordError::Decoder("utterance already started".into()));
        }
        self.active = true;
        self.streak = 0;
        self.hypothesis = None;
        Ok(())
    }

    fn process_raw(&mut self, window: &[u8]) -> Result<()> {
        if !self.active {
            return Err(HotwordError::Decoder("no utterance in progress".into()));
        }

        let rms = Self::rms(window);
        if rms >= self.rms_threshold {
            self.streak += 1;
        } else {
            self.streak = 0;
        }

        if self.log_output {
            debug!(rms, streak = self.streak, "energy decoder window");
        }

        if self.hypothesis.is_none() && self.streak >= self.trigger_windows {
            self.hypothesis = Some(Hypothesis {
                text: self.keyphrase.clone(),
                score: (rms * 1000.0) as i32,
            });
        }
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        self.hypothesis.clone()
    }

    fn end_utterance(&mut self) -> Result<()> {
        self.active = false;
        self.streak = 0;
        self.hypothesis = None;
        Ok(())
    }
}

/// Loader for [`EnergyKeywordDecoder`].
#[derive(Debug, Clone)]
pub struct EnergyDecoderLoader {
    pub rms_threshold: f32,
    pub trigger_windows: u32,
}

impl Default for EnergyDecoderLoader {
    fn default() -> Self {
        Self {
            rms_threshold: 0.25,
            trigger_windows: 3,
        }
    }
}

impl DecoderLoader for EnergyDecoderLoader {
    fn load(&self, settings: &DecoderSettings) -> Result<Box<dyn KeywordDecoder>> {
        if settings.format.sample_width != 2 {
            return Err(HotwordError::Config(format!(
                "energy decoder needs 16-bit audio, got {}",
                settings.format
            )));
        }
        info!(
            keyphrase = %settings.keyphrase,
            rms_threshold = self.rms_threshold,
            trigger_windows = self.trigger_windows,
            "using energy reference decoder"
        );
        let mut decoder =
            EnergyKeywordDecoder::new(&settings.keyphrase, self.rms_threshold, self.trigger_windows);
        decoder.log_output = settings.log_output;
        Ok(Box::new(decoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(level: i16, samples: usize) -> Vec<u8> {
        std::iter::repeat(level.to_le_bytes())
            .take(samples)
            .flatten()
            .collect()
    }

    #[test]
    fn silence_never_triggers() {
        let mut decoder = EnergyKeywordDecoder::new("hey computer", 0.25, 2);
        decoder.start_utterance().unwrap();
        for _ in 0..100 {
            decoder.process_raw(&window(0, 480)).unwrap();
            assert!(decoder.hypothesis().is_none());
        }
    }

    #[test]
    fn consecutive_loud_windows_trigger() {
        let mut decoder = EnergyKeywordDecoder::new("hey computer", 0.25, 3);
        decoder.start_utterance().unwrap();

        decoder.process_raw(&window(20_000, 480)).unwrap();
        decoder.process_raw(&window(20_000, 480)).unwrap();
        decoder.process_raw(&window(0, 480)).unwrap();
        decoder.process_raw(&window(20_000, 480)).unwrap();
        decoder.process_raw(&window(20_000, 480)).unwrap();
        assert!(decoder.hypothesis().is_none(), "streak was broken");

        decoder.process_raw(&window(-20_000, 480)).unwrap();
        let hyp = decoder.hypothesis().expect("three loud windows");
        assert_eq!(hyp.text, "hey computer");
        assert!(hyp.score > 0);
    }

    #[test]
    fn end_utterance_clears_hypothesis() {
        let mut decoder = EnergyKeywordDecoder::new("x", 0.1, 1);
        decoder.start_utterance().unwrap();
        decoder.process_raw(&window(10_000, 10)).unwrap();
        assert!(decoder.hypothesis().is_some());

        decoder.end_utterance().unwrap();
        assert!(decoder.hypothesis().is_none());
        assert!(decoder.process_raw(&window(10_000, 10)).is_err());
    }

    #[test]
    fn double_start_is_rejected() {
        let mut decoder = EnergyKeywordDecoder::new("x", 0.1, 1);
        decoder.start_utterance().unwrap();
        assert!(decoder.start_utterance().is_err());
    }
}
