use crate::buffer::{AudioBuffer, PcmBuffer};
use crate::error::{FilterDesignError, PreconditionError};
use crate::remez;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

/// Peak absolute value the loudest sample is scaled to.
pub const PEAK_CEILING: i16 = 10_000;

const ANTI_ALIAS_TAPS: usize = 64;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("anti-alias design failed: {0}")]
    Design(#[from] FilterDesignError),
}

/// Decimate down to an audio rate in the 44.1-48 kHz band.
///
/// The factor is floor(Fs / target), so the landed rate is Fs / factor and
/// only approximates the nominal target; that error is accepted, not
/// corrected. An anti-alias low-pass designed against the post-decimation
/// Nyquist runs before samples are discarded.
pub fn resample(input: &PcmBuffer, target_rate: f64) -> Result<PcmBuffer, ResampleError> {
    if input.is_empty() {
        return Err(PreconditionError::TooFewSamples {
            stage: "audio resampler",
            wanted: 1,
            got: 0,
        }
        .into());
    }
    let rate = input.sample_rate();
    if target_rate <= 0.0 || (rate / target_rate) as usize == 0 {
        return Err(PreconditionError::TargetAboveRate {
            target: target_rate,
            rate,
        }
        .into());
    }

    let factor = (rate / target_rate) as usize;
    if factor == 1 {
        return Ok(input.clone());
    }

    let new_nyquist = rate / factor as f64 / 2.0;
    let taps = remez::design(&remez::FilterSpec {
        taps: ANTI_ALIAS_TAPS,
        edges: vec![0.0, 0.8 * new_nyquist, new_nyquist, rate / 2.0],
        gains: vec![1.0, 0.0],
        sample_rate: rate,
    })?;

    let filtered = filter_real(input.samples(), &taps);
    let kept: Vec<f32> = filtered.iter().step_by(factor).copied().collect();

    Ok(PcmBuffer::new(kept, rate / factor as f64)?)
}

/// Scale the peak to `ceiling` and truncate toward zero into i16.
///
/// Truncation, not rounding: the byte-exact output of this encoder is relied
/// on downstream. A silent buffer is passed through as zeros instead of
/// scaling by infinity.
pub fn quantize(input: &PcmBuffer, ceiling: i16) -> AudioBuffer {
    let peak = input
        .samples()
        .iter()
        .fold(0.0f32, |m, v| m.max(v.abs()));

    let samples = if peak == 0.0 {
        vec![0i16; input.len()]
    } else {
        input
            .samples()
            .iter()
            .map(|&v| (v as f64 / peak as f64 * ceiling as f64) as i16)
            .collect()
    };

    AudioBuffer {
        samples,
        sample_rate: input.sample_rate(),
    }
}

/// Raw interleaved little-endian mono i16, no header. Players are expected
/// to know the rate out of band.
pub fn write_raw(samples: &[i16], path: impl AsRef<Path>) -> io::Result<()> {
    let mut out = BufWriter::new(fs::File::create(path)?);
    for v in samples {
        out.write_all(&v.to_le_bytes())?;
    }
    out.flush()
}

// same shape as the complex channel filter: causal, zero history
fn filter_real(samples: &[f32], taps: &[f64]) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len());
    for n in 0..samples.len() {
        let mut acc = 0.0f64;
        for (k, &tap) in taps.iter().enumerate().take(n + 1) {
            acc += tap * samples[n - k] as f64;
        }
        out.push(acc as f32);
    }
    out
}

#[test]
fn resample_lands_on_exact_quotient() {
    // 171.4 kHz style rate into the 44.1 kHz band: factor 3
    let rate = 1_200_000.0 / 7.0;
    let input = PcmBuffer::new(vec![0.25f32; 3 * 500], rate).unwrap();

    let out = resample(&input, 44_100.0).unwrap();
    assert_eq!(out.len(), 500);
    assert_eq!(out.sample_rate(), rate / 3.0);
}

#[test]
fn resample_rejects_target_above_rate() {
    let input = PcmBuffer::new(vec![0.0f32; 64], 30_000.0).unwrap();
    let err = resample(&input, 44_100.0).unwrap_err();
    assert!(matches!(
        err,
        ResampleError::Precondition(PreconditionError::TargetAboveRate { .. })
    ));
}

#[test]
fn quantize_hits_the_ceiling_exactly() {
    let input = PcmBuffer::new(vec![0.1, -0.7, 0.35], 44_100.0).unwrap();
    let out = quantize(&input, PEAK_CEILING);
    assert_eq!(
        out.samples.iter().map(|v| v.abs()).max(),
        Some(PEAK_CEILING)
    );
}

#[test]
fn quantize_truncates_instead_of_rounding() {
    // peak 1.0 makes the scale exactly 10000; 0.00018 maps to 1.8
    let input = PcmBuffer::new(vec![1.0, 0.00018, -0.00018], 44_100.0).unwrap();
    let out = quantize(&input, PEAK_CEILING);
    assert_eq!(out.samples, vec![10_000, 1, -1]);
}

#[test]
fn quantize_leaves_silence_alone() {
    let input = PcmBuffer::new(vec![0.0f32; 16], 44_100.0).unwrap();
    let out = quantize(&input, PEAK_CEILING);
    assert!(out.samples.iter().all(|&v| v == 0));
}
