//! Conversion of incoming frames to the decoder's required format.
//!
//! ```text
//! bytes ─► RIFF? ──no──► returned as-is (raw PCM, assumed already correct)
//!            │
//!           yes ─► header parsed (hound)
//!                    ├─ same format ─► sample data, header stripped
//!                    └─ otherwise ───► decode → mono → resample → fan out → encode
//! ```

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::resample::{RateConverter, RESAMPLE_BLOCK};
use super::AudioFormat;
use crate::error::{HotwordError, Result};

const RIFF_MAGIC: &[u8] = b"RIFF";

/// Stateful normalizer owned by the detection thread.
///
/// The resampler survives between frames so that partial blocks carry over;
/// it is rebuilt only when a frame arrives at a different source rate.
pub struct AudioNormalizer {
    target: AudioFormat,
    converter: Option<RateConverter>,
}

impl AudioNormalizer {
    pub fn new(target: AudioFormat) -> Self {
        Self {
            target,
            converter: None,
        }
    }

    /// Convert one incoming frame to the target format.
    ///
    /// # Errors
    /// `HotwordError::Format` when the WAV container is truncated, uses a
    /// sample layout that cannot be decoded, or the target width is not 1-4.
    pub fn normalize(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        if !bytes.starts_with(RIFF_MAGIC) {
            return Ok(bytes.to_vec());
        }

        let mut reader = WavReader::new(Cursor::new(bytes)).map_err(format_error)?;
        let spec = reader.spec();
        let source = source_format(&spec)?;

        if source == self.target && spec.sample_format == SampleFormat::Int {
            let samples = reader
                .samples::<i32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(format_error)?;
            let mut out = Vec::with_capacity(samples.len() * self.target.sample_width as usize);
            for sample in samples {
                push_sample(&mut out, sample, self.target.sample_width)?;
            }
            return Ok(out);
        }

        check_width(self.target.sample_width)?;
        let mono = decode_mono(&mut reader, &spec)?;
        let resampled = self.resample(source.sample_rate, &mono)?;
        encode(&resampled, self.target)
    }

    fn resample(&mut self, source_rate: u32, mono: &[f32]) -> Result<Vec<f32>> {
        if source_rate == self.target.sample_rate {
            return Ok(mono.to_vec());
        }

        let stale = self
            .converter
            .as_ref()
            .map_or(true, |c| c.source_rate() != source_rate);
        if stale {
            tracing::debug!(
                from = source_rate,
                to = self.target.sample_rate,
                "incoming audio needs resampling"
            );
            self.converter = Some(RateConverter::new(
                source_rate,
                self.target.sample_rate,
                RESAMPLE_BLOCK,
            )?);
        }

        Ok(self
            .converter
            .as_mut()
            .map(|c| c.process(mono))
            .unwrap_or_default())
    }
}

/// Wrap raw little-endian PCM in a WAV container.
///
/// Used by tests and by senders that need to hand the engine a framed chunk.
pub fn pcm_to_wav(pcm: &[u8], format: AudioFormat) -> Result<Vec<u8>> {
    check_width(format.sample_width)?;
    let width = format.sample_width as usize;

    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.sample_width * 8,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(format_error)?;
        for raw in pcm.chunks_exact(width) {
            writer
                .write_sample(read_sample(raw))
                .map_err(format_error)?;
        }
        writer.finalize().map_err(format_error)?;
    }
    Ok(cursor.into_inner())
}

/// Widths the PCM encoder can write: 8, 16, 24 and 32 bits.
pub const SUPPORTED_WIDTHS: std::ops::RangeInclusive<u16> = 1..=4;

fn check_width(width: u16) -> Result<()> {
    if SUPPORTED_WIDTHS.contains(&width) {
        Ok(())
    } else {
        Err(HotwordError::Format(format!("unsupported sample width {width}")))
    }
}

fn format_error(e: hound::Error) -> HotwordError {
    HotwordError::Format(e.to_string())
}

fn source_format(spec: &WavSpec) -> Result<AudioFormat> {
    if spec.bits_per_sample == 0 || spec.bits_per_sample % 8 != 0 || spec.bits_per_sample > 32 {
        return Err(HotwordError::Format(format!(
            "unsupported bits per sample: {}",
            spec.bits_per_sample
        )));
    }
    if spec.channels == 0 {
        return Err(HotwordError::Format("zero channels".into()));
    }
    Ok(AudioFormat::new(
        spec.sample_rate,
        spec.bits_per_sample / 8,
        spec.channels,
    ))
}

/// Decode every sample to f32 in [-1.0, 1.0] and average channels.
fn decode_mono(reader: &mut WavReader<Cursor<&[u8]>>, spec: &WavSpec) -> Result<Vec<f32>> {
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(format_error)?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(format_error)?
        }
    };

    let channels = spec.channels as usize;
    if channels == 1 {
        return Ok(interleaved);
    }
    Ok(interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect())
}

/// Fan mono samples out to `format.channels` and encode at `format.sample_width`.
fn encode(mono: &[f32], format: AudioFormat) -> Result<Vec<u8>> {
    check_width(format.sample_width)?;
    let bits = u32::from(format.sample_width) * 8;
    let max = ((1i64 << (bits - 1)) - 1) as f32;
    let mut out = Vec::with_capacity(mono.len() * format.frame_size());
    for &sample in mono {
        let value = (sample.clamp(-1.0, 1.0) * max).round() as i32;
        for _ in 0..format.channels {
            push_sample(&mut out, value, format.sample_width)?;
        }
    }
    Ok(out)
}

/// Append one signed sample as little-endian bytes. 8-bit PCM is unsigned.
fn push_sample(out: &mut Vec<u8>, value: i32, width: u16) -> Result<()> {
    match width {
        1 => out.push((value + 128).clamp(0, 255) as u8),
        2 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        3 => out.extend_from_slice(&value.to_le_bytes()[..3]),
        4 => out.extend_from_slice(&value.to_le_bytes()),
        other => {
            return Err(HotwordError::Format(format!(
                "unsupported sample width {other}"
            )))
        }
    }
    Ok(())
}

/// Inverse of [`push_sample`].
fn read_sample(raw: &[u8]) -> i32 {
    match raw.len() {
        1 => raw[0] as i32 - 128,
        2 => i16::from_le_bytes([raw[0], raw[1]]) as i32,
        3 => i32::from_le_bytes([0, raw[0], raw[1], raw[2]]) >> 8,
        _ => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn float_wav(samples: &[f32], rate: u32, channels: u16) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn raw_pcm_is_returned_unchanged() {
        let mut normalizer = AudioNormalizer::new(AudioFormat::default());
        let raw = pcm16(&[1, -2, 300, -400]);
        assert_eq!(normalizer.normalize(&raw).unwrap(), raw);
    }

    #[test]
    fn matching_wav_strips_header_only() {
        let format = AudioFormat::default();
        let pcm = pcm16(&[0, 1000, -1000, i16::MAX, i16::MIN]);
        let wav = pcm_to_wav(&pcm, format).unwrap();
        assert_eq!(wav.len(), pcm.len() + 44);

        let mut normalizer = AudioNormalizer::new(format);
        assert_eq!(normalizer.normalize(&wav).unwrap(), pcm);
    }

    #[test]
    fn eight_bit_round_trips_through_wav() {
        let format = AudioFormat::new(16_000, 1, 1);
        let pcm = vec![0u8, 64, 128, 200, 255];
        let wav = pcm_to_wav(&pcm, format).unwrap();

        let mut normalizer = AudioNormalizer::new(format);
        assert_eq!(normalizer.normalize(&wav).unwrap(), pcm);
    }

    #[test]
    fn stereo_is_downmixed_to_mono() {
        let stereo = AudioFormat::new(16_000, 2, 2);
        // left/right pairs average to 1000 and 0
        let pcm = pcm16(&[2000, 0, 500, -500]);
        let wav = pcm_to_wav(&pcm, stereo).unwrap();

        let mut normalizer = AudioNormalizer::new(AudioFormat::default());
        let out = normalizer.normalize(&wav).unwrap();
        assert_eq!(out.len(), 4);
        let first = i16::from_le_bytes([out[0], out[1]]);
        let second = i16::from_le_bytes([out[2], out[3]]);
        assert!((first as i32 - 1000).abs() <= 1, "got {first}");
        assert_eq!(second, 0);
    }

    #[test]
    fn float_input_is_encoded_as_16_bit() {
        let wav = float_wav(&[0.5, -0.5, 0.0], 16_000, 1);
        let mut normalizer = AudioNormalizer::new(AudioFormat::default());
        let out = normalizer.normalize(&wav).unwrap();
        assert_eq!(out.len(), 6);
        let first = i16::from_le_bytes([out[0], out[1]]);
        assert!((first as i32 - 16_384).abs() <= 1, "got {first}");
    }

    #[test]
    fn higher_rate_is_resampled_across_frames() {
        let source = AudioFormat::new(48_000, 2, 1);
        let mut normalizer = AudioNormalizer::new(AudioFormat::default());

        let mut produced = 0;
        for _ in 0..10 {
            // 10 ms at 48 kHz
            let wav = pcm_to_wav(&pcm16(&[0; 480]), source).unwrap();
            produced += normalizer.normalize(&wav).unwrap().len();
        }
        // 100 ms at 16 kHz, 16-bit = 3200 bytes
        assert!(
            (produced as isize - 3200).unsigned_abs() <= 64,
            "produced {produced} bytes"
        );
    }

    #[test]
    fn truncated_header_is_a_format_error() {
        let wav = pcm_to_wav(&pcm16(&[1, 2, 3]), AudioFormat::default()).unwrap();
        let mut normalizer = AudioNormalizer::new(AudioFormat::default());
        let err = normalizer.normalize(&wav[..20]).unwrap_err();
        assert!(matches!(err, HotwordError::Format(_)), "{err}");
    }

    #[test]
    fn truncated_data_is_a_format_error() {
        let wav = pcm_to_wav(&pcm16(&[1; 64]), AudioFormat::default()).unwrap();
        let mut normalizer = AudioNormalizer::new(AudioFormat::default());
        assert!(normalizer.normalize(&wav[..wav.len() - 33]).is_err());
    }

    #[test]
    fn wide_target_is_a_format_error_not_a_panic() {
        let stereo = pcm_to_wav(&pcm16(&[100, -100, 200, -200]), AudioFormat::new(16_000, 2, 2))
            .unwrap();
        let mut normalizer = AudioNormalizer::new(AudioFormat::new(16_000, 8, 1));
        let err = normalizer.normalize(&stereo).unwrap_err();
        assert!(matches!(err, HotwordError::Format(_)), "{err}");

        let mut out = Vec::new();
        assert!(push_sample(&mut out, 1, 5).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn pcm_to_wav_rejects_unknown_width() {
        let format = AudioFormat::new(16_000, 5, 1);
        assert!(pcm_to_wav(&[0; 10], format).is_err());
    }
}
