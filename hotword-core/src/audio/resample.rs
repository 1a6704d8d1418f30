//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Satellites stream frames at whatever rate their microphone runs at
//! (commonly 44.1 or 48 kHz) while the decoder accepts exactly one rate.
//! `RateConverter` bridges that gap on the detection thread.
//!
//! The converter is stateful: rubato consumes fixed-size input blocks, so
//! samples that do not fill a block are held until the next frame arrives.
//! Audio is therefore never lost across frame boundaries, only delayed.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, warn};

use crate::error::{HotwordError, Result};

/// Input block size handed to rubato per call.
pub const RESAMPLE_BLOCK: usize = 480;

/// Converts mono f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    source_rate: u32,
    /// `None` when no conversion is needed.
    inner: Option<Converter>,
}

struct Converter {
    resampler: FastFixedIn<f32>,
    block: usize,
    /// Samples still short of a full block.
    pending: Vec<f32>,
    /// Scratch output, one channel of `output_frames_max` frames.
    scratch: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `HotwordError::Format` if rubato rejects the rate pair.
    pub fn new(source_rate: u32, target_rate: u32, block: usize) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                source_rate,
                inner: None,
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            f64::from(target_rate) / f64::from(source_rate),
            1.0,
            PolynomialDegree::Cubic,
            block,
            1,
        )
        .map_err(|e| HotwordError::Format(format!("resampler init: {e}")))?;
        let scratch = vec![vec![0f32; resampler.output_frames_max()]];
        debug!(source_rate, target_rate, block, "resampler created");

        Ok(Self {
            source_rate,
            inner: Some(Converter {
                resampler,
                block,
                pending: Vec::with_capacity(block * 2),
                scratch,
            }),
        })
    }

    /// Resample `samples`. Output may be empty while a block is filling.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(conv) = self.inner.as_mut() else {
            return samples.to_vec();
        };
        conv.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        let mut consumed = 0;
        while conv.pending.len() - consumed >= conv.block {
            let block = &conv.pending[consumed..consumed + conv.block];
            match conv
                .resampler
                .process_into_buffer(&[block], &mut conv.scratch, None)
            {
                Ok((_, frames)) => out.extend_from_slice(&conv.scratch[0][..frames]),
                Err(e) => warn!(source_rate = self.source_rate, error = %e, "resampler block dropped"),
            }
            consumed += conv.block;
        }
        conv.pending.drain(..consumed);
        out
    }

    /// Rate this converter was built for.
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }
}
