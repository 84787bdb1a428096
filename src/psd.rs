use crate::error::PreconditionError;
use num_complex::Complex32;
use rustfft::FftPlanner;
use std::f64::consts::TAU;

/// An averaged periodogram: per-bin power density and the bin frequencies in
/// Hz relative to the capture centre, ascending from -Fs/2.
pub struct Spectrum {
    pub power: Vec<f64>,
    pub freqs: Vec<f64>,
}

/// Welch estimate over non-overlapping Hann-windowed segments of `nfft`
/// samples. The ragged tail shorter than a segment is dropped.
pub fn welch(
    samples: &[Complex32],
    nfft: usize,
    sample_rate: f64,
) -> Result<Spectrum, PreconditionError> {
    if sample_rate <= 0.0 {
        return Err(PreconditionError::NonPositiveRate(sample_rate));
    }
    if nfft < 2 || samples.len() < nfft {
        return Err(PreconditionError::TooFewSamples {
            stage: "psd",
            wanted: nfft.max(2),
            got: samples.len(),
        });
    }

    let window: Vec<f64> = (0..nfft)
        .map(|i| 0.5 - 0.5 * (TAU * i as f64 / (nfft - 1) as f64).cos())
        .collect();
    let window_power: f64 = window.iter().map(|w| w * w).sum();

    let fft = FftPlanner::new().plan_fft_forward(nfft);
    let mut accum = vec![0.0f64; nfft];
    let mut segments = 0usize;

    for chunk in samples.chunks_exact(nfft) {
        let mut buf: Vec<Complex32> = chunk
            .iter()
            .zip(&window)
            .map(|(&s, &w)| s * w as f32)
            .collect();
        fft.process(&mut buf);
        for (acc, v) in accum.iter_mut().zip(&buf) {
            *acc += v.norm_sqr() as f64;
        }
        segments += 1;
    }

    let scale = 1.0 / (segments as f64 * sample_rate * window_power);
    let half = nfft / 2;

    // rotate so bins run from -Fs/2 up to +Fs/2
    let power: Vec<f64> = (0..nfft)
        .map(|i| accum[(i + half) % nfft] * scale)
        .collect();
    let freqs: Vec<f64> = (0..nfft)
        .map(|i| (i as f64 - half as f64) * sample_rate / nfft as f64)
        .collect();

    Ok(Spectrum { power, freqs })
}

#[test]
fn tone_peaks_in_the_right_bin() {
    let rate = 256_000.0;
    let nfft = 256;
    let freq = 32_000.0;
    let samples: Vec<Complex32> = (0..4 * nfft)
        .map(|n| {
            let phase = TAU * freq / rate * n as f64;
            Complex32::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect();

    let spectrum = welch(&samples, nfft, rate).unwrap();
    let peak = spectrum
        .power
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| f64::total_cmp(a, b))
        .map(|(i, _)| i)
        .unwrap();

    assert!(
        (spectrum.freqs[peak] - freq).abs() <= rate / nfft as f64,
        "peak at {} Hz, tone at {freq} Hz",
        spectrum.freqs[peak]
    );
}

#[test]
fn bins_are_centred_and_ascending() {
    let samples = vec![Complex32::new(1.0, 0.0); 64];
    let spectrum = welch(&samples, 64, 64_000.0).unwrap();

    assert_eq!(spectrum.freqs[0], -32_000.0);
    assert_eq!(spectrum.freqs[32], 0.0);
    assert!(spectrum.freqs.windows(2).all(|w| w[0] < w[1]));

    // DC input concentrates in the centre bin
    let peak = spectrum
        .power
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| f64::total_cmp(a, b))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(peak, 32);
}

#[test]
fn rejects_short_input() {
    let samples = vec![Complex32::new(1.0, 0.0); 16];
    assert!(matches!(
        welch(&samples, 64, 64_000.0),
        Err(PreconditionError::TooFewSamples { .. })
    ));
}
