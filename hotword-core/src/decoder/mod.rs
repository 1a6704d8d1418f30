//! Keyphrase decoder abstraction.
//!
//! The detection loop drives any spotting engine through two small traits:
//!
//! - [`DecoderLoader`] turns prepared [`DecoderSettings`] into a live decoder.
//!   Loading is the only place configuration errors can surface.
//! - [`KeywordDecoder`] is the per-utterance state machine:
//!   `start_utterance` → `process_raw`* → `hypothesis` → `end_utterance`.
//!
//! `&mut self` on the state-machine methods reflects that decoders carry
//! search state between windows. A decoder instance is owned by the detection
//! thread for its whole life and is never shared.

pub mod dictionary;
pub mod stub;

pub use dictionary::{merge_dictionaries, PronunciationDictionary};
pub use stub::{EnergyDecoderLoader, EnergyKeywordDecoder};

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::audio::AudioFormat;
use crate::engine::EngineConfig;
use crate::error::{HotwordError, Result};

/// Positive detection for the current utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Text the decoder believes it heard (the keyphrase for a spotter).
    pub text: String,
    /// Engine-specific score; larger is more confident.
    pub score: i32,
}

/// Contract for keyphrase spotting engines.
pub trait KeywordDecoder: Send + 'static {
    /// Begin a new utterance. Called before the first window after IDLE.
    fn start_utterance(&mut self) -> Result<()>;

    /// Feed one window of raw PCM in the configured format.
    fn process_raw(&mut self, window: &[u8]) -> Result<()>;

    /// Current hypothesis for the active utterance, if any.
    fn hypothesis(&self) -> Option<Hypothesis>;

    /// Close the active utterance and discard its search state.
    fn end_utterance(&mut self) -> Result<()>;
}

/// Builds decoders from prepared settings.
pub trait DecoderLoader: Send + Sync + 'static {
    fn load(&self, settings: &DecoderSettings) -> Result<Box<dyn KeywordDecoder>>;
}

impl<F> DecoderLoader for F
where
    F: Fn(&DecoderSettings) -> Result<Box<dyn KeywordDecoder>> + Send + Sync + 'static,
{
    fn load(&self, settings: &DecoderSettings) -> Result<Box<dyn KeywordDecoder>> {
        self(settings)
    }
}

/// Everything an engine needs to spot one keyphrase.
#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub acoustic_model: PathBuf,
    /// Pronunciations for exactly the keyphrase words.
    pub dictionary: PronunciationDictionary,
    pub keyphrase: String,
    pub keyphrase_threshold: f64,
    /// Speaker/channel adaptation matrix; only set when the file exists.
    pub mllr_matrix: Option<PathBuf>,
    pub format: AudioFormat,
    /// Let the engine write its own diagnostics.
    pub log_output: bool,
}

impl DecoderSettings {
    /// Run the load procedure's file checks and dictionary merge.
    ///
    /// # Errors
    /// - `AcousticModelNotFound` if the model directory is missing.
    /// - `MissingPronunciations` if any keyphrase word has no entry in any
    ///   dictionary.
    pub fn prepare(config: &EngineConfig) -> Result<Self> {
        if !config.acoustic_model.is_dir() {
            return Err(HotwordError::AcousticModelNotFound {
                path: config.acoustic_model.clone(),
            });
        }

        let dictionary = merge_dictionaries(&config.keyphrase, &config.dictionary_paths)?;

        let mllr_matrix = match &config.mllr_matrix {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(path) => {
                warn!(path = %path.display(), "MLLR matrix not found, ignoring");
                None
            }
            None => None,
        };

        Ok(Self {
            acoustic_model: config.acoustic_model.clone(),
            dictionary,
            keyphrase: config.keyphrase.clone(),
            keyphrase_threshold: config.keyphrase_threshold,
            mllr_matrix,
            format: config.format,
            log_output: config.debug,
        })
    }
}

/// Prepare settings from `config` and hand them to `loader`.
pub fn load_decoder(
    config: &EngineConfig,
    loader: &dyn DecoderLoader,
) -> Result<Box<dyn KeywordDecoder>> {
    debug!(
        acoustic_model = %config.acoustic_model.display(),
        dictionaries = ?config.dictionary_paths,
        keyphrase = %config.keyphrase,
        "loading decoder"
    );
    let settings = DecoderSettings::prepare(config)?;
    loader.load(&settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config_in(dir: &std::path::Path) -> EngineConfig {
        let model = dir.join("hmm");
        fs::create_dir_all(&model).unwrap();
        let dict = dir.join("base.dict");
        fs::write(&dict, "okay OW K EY\nrhasspy R AE S P IY\n").unwrap();

        EngineConfig {
            keyphrase: "okay rhasspy".into(),
            acoustic_model: model,
            dictionary_paths: vec![dict],
            ..EngineConfig::default()
        }
    }

    #[test]
    fn prepare_merges_dictionary_and_copies_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let settings = DecoderSettings::prepare(&config).unwrap();
        assert_eq!(settings.keyphrase, "okay rhasspy");
        assert_eq!(settings.dictionary.len(), 2);
        assert_eq!(settings.keyphrase_threshold, 1e-40);
        assert!(settings.mllr_matrix.is_none());
        assert!(!settings.log_output);
    }

    #[test]
    fn prepare_rejects_missing_acoustic_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.acoustic_model = dir.path().join("nope");

        let err = DecoderSettings::prepare(&config).unwrap_err();
        assert!(matches!(err, HotwordError::AcousticModelNotFound { .. }));
    }

    #[test]
    fn mllr_matrix_is_kept_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());

        config.mllr_matrix = Some(dir.path().join("missing.mllr"));
        assert!(DecoderSettings::prepare(&config).unwrap().mllr_matrix.is_none());

        let mllr = dir.path().join("tuned.mllr");
        fs::write(&mllr, "1\n").unwrap();
        config.mllr_matrix = Some(mllr.clone());
        assert_eq!(
            DecoderSettings::prepare(&config).unwrap().mllr_matrix,
            Some(mllr)
        );
    }

    #[test]
    fn closures_act_as_loaders() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let loader = |settings: &DecoderSettings| -> Result<Box<dyn KeywordDecoder>> {
            Ok(Box::new(EnergyKeywordDecoder::new(&settings.keyphrase, 0.5, 1)))
        };
        let decoder = load_decoder(&config, &loader).unwrap();
        assert!(decoder.hypothesis().is_none());
    }
}
