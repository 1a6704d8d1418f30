//! Service settings (optional JSON file, overridden by command-line flags).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hotword_core::{
    engine::DEFAULT_KEYPHRASE_THRESHOLD, AudioFormat, EnergyDecoderLoader, EngineConfig,
    UdpEndpoint,
};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ServiceSettings {
    pub keyphrase: String,
    pub keyphrase_threshold: f64,
    pub acoustic_model: PathBuf,
    pub dictionaries: Vec<PathBuf>,
    pub mllr_matrix: Option<PathBuf>,
    pub wakeword_id: Option<String>,
    pub site_ids: Vec<String>,
    pub enabled: bool,
    pub sample_rate: u32,
    pub sample_width: u16,
    pub channels: u16,
    pub chunk_size: usize,
    pub udp_audio: Vec<UdpEndpoint>,
    pub udp_chunk_size: usize,
    /// Tuning for the bundled energy decoder.
    pub energy_decoder: EnergyDecoderSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EnergyDecoderSettings {
    pub rms_threshold: f32,
    pub trigger_windows: u32,
}

impl Default for EnergyDecoderSettings {
    fn default() -> Self {
        let loader = EnergyDecoderLoader::default();
        Self {
            rms_threshold: loader.rms_threshold,
            trigger_windows: loader.trigger_windows,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            keyphrase: engine.keyphrase,
            keyphrase_threshold: engine.keyphrase_threshold,
            acoustic_model: engine.acoustic_model,
            dictionaries: engine.dictionary_paths,
            mllr_matrix: engine.mllr_matrix,
            wakeword_id: engine.wakeword_id,
            site_ids: engine.site_ids,
            enabled: engine.enabled,
            sample_rate: engine.format.sample_rate,
            sample_width: engine.format.sample_width,
            channels: engine.format.channels,
            chunk_size: engine.chunk_size,
            udp_audio: engine.udp_audio,
            udp_chunk_size: engine.udp_chunk_size,
            energy_decoder: EnergyDecoderSettings::default(),
        }
    }
}

impl ServiceSettings {
    /// Layer command-line values over the file values.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<()> {
        if let Some(keyphrase) = &cli.keyphrase {
            self.keyphrase = keyphrase.clone();
        }
        if let Some(threshold) = cli.keyphrase_threshold {
            self.keyphrase_threshold = threshold;
        }
        if let Some(path) = &cli.acoustic_model {
            self.acoustic_model = path.clone();
        }
        if !cli.dictionaries.is_empty() {
            self.dictionaries = cli.dictionaries.clone();
        }
        if let Some(path) = &cli.mllr_matrix {
            self.mllr_matrix = Some(path.clone());
        }
        if let Some(id) = &cli.wakeword_id {
            self.wakeword_id = Some(id.clone());
        }
        if !cli.site_ids.is_empty() {
            self.site_ids = cli.site_ids.clone();
        }
        if let Some(rate) = cli.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(width) = cli.sample_width {
            self.sample_width = width;
        }
        if let Some(channels) = cli.channels {
            self.channels = channels;
        }
        if let Some(size) = cli.chunk_size {
            self.chunk_size = size;
        }
        if let Some(size) = cli.udp_chunk_size {
            self.udp_chunk_size = size;
        }
        let endpoints = cli.udp_endpoints()?;
        if !endpoints.is_empty() {
            self.udp_audio = endpoints;
        }
        Ok(())
    }

    pub fn normalize(&mut self) {
        self.keyphrase = self.keyphrase.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.keyphrase_threshold.is_nan() || self.keyphrase_threshold < 0.0 {
            self.keyphrase_threshold = DEFAULT_KEYPHRASE_THRESHOLD;
        }
        self.wakeword_id = self
            .wakeword_id
            .as_ref()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self.site_ids = normalize_site_ids(&self.site_ids);
        for endpoint in &mut self.udp_audio {
            endpoint.host = endpoint.host.trim().to_string();
            endpoint.site_id = endpoint.site_id.trim().to_string();
        }
        self.energy_decoder.rms_threshold = self.energy_decoder.rms_threshold.clamp(0.0, 1.0);
        self.energy_decoder.trigger_windows = self.energy_decoder.trigger_windows.max(1);
    }

    pub fn engine_config(&self, debug: bool) -> EngineConfig {
        EngineConfig {
            keyphrase: self.keyphrase.clone(),
            keyphrase_threshold: self.keyphrase_threshold,
            acoustic_model: self.acoustic_model.clone(),
            dictionary_paths: self.dictionaries.clone(),
            mllr_matrix: self.mllr_matrix.clone(),
            wakeword_id: self.wakeword_id.clone(),
            site_ids: self.site_ids.clone(),
            enabled: self.enabled,
            format: AudioFormat::new(self.sample_rate, self.sample_width, self.channels),
            chunk_size: self.chunk_size,
            udp_audio: self.udp_audio.clone(),
            udp_chunk_size: self.udp_chunk_size,
            debug,
        }
    }

    pub fn energy_loader(&self) -> EnergyDecoderLoader {
        EnergyDecoderLoader {
            rms_threshold: self.energy_decoder.rms_threshold,
            trigger_windows: self.energy_decoder.trigger_windows,
        }
    }
}

fn normalize_site_ids(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for site in raw {
        let site = site.trim();
        if site.is_empty() || out.iter().any(|s| s == site) {
            continue;
        }
        out.push(site.to_string());
    }
    out
}

/// `$XDG_CONFIG_HOME/hotword/settings.json`, else `~/.config/hotword/settings.json`.
pub fn default_settings_path() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        })
        .join("hotword")
        .join("settings.json")
}

/// Read and parse a settings file.
pub fn load_settings(path: &Path) -> Result<ServiceSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid settings {}", path.display()))
}

/// Settings from an explicit path, else the default path if it exists, else
/// defaults.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<ServiceSettings> {
    match explicit {
        Some(path) => load_settings(path),
        None => {
            let path = default_settings_path();
            if path.is_file() {
                load_settings(&path)
            } else {
                Ok(ServiceSettings::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"keyphrase":"okay rhasspy","udpAudio":[{"host":"0.0.0.0","port":12202,"siteId":"kitchen"}]}"#,
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.keyphrase, "okay rhasspy");
        assert_eq!(settings.udp_audio, vec![UdpEndpoint::new("0.0.0.0", 12202, "kitchen")]);
        assert_eq!(settings.chunk_size, 960);
        assert_eq!(settings.keyphrase_threshold, 1e-40);
        assert!(settings.enabled);
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(&path).is_err());
        assert!(resolve_settings(Some(&dir.path().join("absent.json"))).is_err());
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut settings = ServiceSettings {
            keyphrase: "from file".into(),
            dictionaries: vec![PathBuf::from("file.dict")],
            chunk_size: 2048,
            ..ServiceSettings::default()
        };
        let cli = Cli {
            keyphrase: Some("from cli".into()),
            chunk_size: Some(480),
            udp_audio: vec!["127.0.0.1".into(), "12202".into(), "porch".into()],
            ..Cli::default()
        };

        settings.apply_cli(&cli).unwrap();
        assert_eq!(settings.keyphrase, "from cli");
        assert_eq!(settings.dictionaries, vec![PathBuf::from("file.dict")]);
        assert_eq!(settings.chunk_size, 480);
        assert_eq!(settings.udp_audio[0].site_id, "porch");
    }

    #[test]
    fn normalize_cleans_ids_and_threshold() {
        let mut settings = ServiceSettings {
            keyphrase: "  hey   computer ".into(),
            keyphrase_threshold: -3.0,
            wakeword_id: Some("   ".into()),
            site_ids: vec![" kitchen".into(), "".into(), "kitchen".into(), "bedroom".into()],
            ..ServiceSettings::default()
        };
        settings.normalize();

        assert_eq!(settings.keyphrase, "hey computer");
        assert_eq!(settings.keyphrase_threshold, DEFAULT_KEYPHRASE_THRESHOLD);
        assert_eq!(settings.wakeword_id, None);
        assert_eq!(settings.site_ids, vec!["kitchen".to_string(), "bedroom".to_string()]);
    }

    #[test]
    fn engine_config_carries_format_and_debug() {
        let settings = ServiceSettings {
            keyphrase: "hey computer".into(),
            sample_rate: 8_000,
            ..ServiceSettings::default()
        };
        let config = settings.engine_config(true);
        assert_eq!(config.format, AudioFormat::new(8_000, 2, 1));
        assert!(config.debug);
        assert!(config.validate().is_ok());
    }
}
