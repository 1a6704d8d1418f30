//! Command-line flags. Every flag overrides the matching settings-file value.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use hotword_core::UdpEndpoint;

/// Keyphrase spotting service for Hermes audio frames
#[derive(Parser, Debug, Default)]
#[command(name = "hotword", version)]
pub struct Cli {
    /// Acoustic model directory
    #[arg(long, value_name = "DIR")]
    pub acoustic_model: Option<PathBuf>,

    /// Pronunciation dictionary (repeatable, searched in order)
    #[arg(long = "dictionary", value_name = "PATH")]
    pub dictionaries: Vec<PathBuf>,

    /// Keyphrase to listen for
    #[arg(long)]
    pub keyphrase: Option<String>,

    /// Keyphrase detection threshold (default: 1e-40)
    #[arg(long, value_name = "THRESHOLD")]
    pub keyphrase_threshold: Option<f64>,

    /// Tuned MLLR matrix file
    #[arg(long, value_name = "PATH")]
    pub mllr_matrix: Option<PathBuf>,

    /// Wake word id reported with detections (default: keyphrase)
    #[arg(long)]
    pub wakeword_id: Option<String>,

    /// Host, port and site id for raw UDP audio (repeatable)
    #[arg(
        long,
        num_args = 3,
        value_names = ["HOST", "PORT", "SITE_ID"],
        action = ArgAction::Append
    )]
    pub udp_audio: Vec<String>,

    /// Site id to serve (repeatable, default: all)
    #[arg(long = "site-id", value_name = "SITE_ID")]
    pub site_ids: Vec<String>,

    /// Sample rate the decoder expects
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Sample width in bytes the decoder expects
    #[arg(long, value_name = "BYTES")]
    pub sample_width: Option<u16>,

    /// Channel count the decoder expects
    #[arg(long)]
    pub channels: Option<u16>,

    /// Bytes per decoder window
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Expected UDP payload size in bytes
    #[arg(long, value_name = "BYTES")]
    pub udp_chunk_size: Option<usize>,

    /// Debug logging, including decoder diagnostics
    #[arg(long)]
    pub debug: bool,

    /// JSON settings file
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

impl Cli {
    /// `--udp-audio` triples as endpoints.
    pub fn udp_endpoints(&self) -> Result<Vec<UdpEndpoint>> {
        self.udp_audio
            .chunks_exact(3)
            .map(|triple| Ok(UdpEndpoint::parse(&triple[0], &triple[1], &triple[2])?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_flags_accumulate() {
        let cli = Cli::try_parse_from([
            "hotword",
            "--keyphrase",
            "okay rhasspy",
            "--dictionary",
            "custom.txt",
            "--dictionary",
            "base.dict",
            "--udp-audio",
            "0.0.0.0",
            "12202",
            "kitchen",
            "--udp-audio",
            "0.0.0.0",
            "12203",
            "bedroom",
            "--site-id",
            "kitchen",
            "--debug",
        ])
        .unwrap();

        assert_eq!(cli.keyphrase.as_deref(), Some("okay rhasspy"));
        assert_eq!(
            cli.dictionaries,
            vec![PathBuf::from("custom.txt"), PathBuf::from("base.dict")]
        );
        assert_eq!(
            cli.udp_endpoints().unwrap(),
            vec![
                UdpEndpoint::new("0.0.0.0", 12202, "kitchen"),
                UdpEndpoint::new("0.0.0.0", 12203, "bedroom"),
            ]
        );
        assert_eq!(cli.site_ids, vec!["kitchen".to_string()]);
        assert!(cli.debug);
    }

    #[test]
    fn udp_audio_needs_three_values() {
        assert!(Cli::try_parse_from(["hotword", "--udp-audio", "0.0.0.0", "12202"]).is_err());
    }

    #[test]
    fn bad_udp_port_is_reported() {
        let cli =
            Cli::try_parse_from(["hotword", "--udp-audio", "0.0.0.0", "port", "kitchen"]).unwrap();
        assert!(cli.udp_endpoints().is_err());
    }
}
