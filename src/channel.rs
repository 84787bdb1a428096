use crate::buffer::IqBuffer;
use crate::error::PreconditionError;
use num_complex::Complex32;

/// Causal direct-form FIR convolution, y[n] = sum_k h[k] x[n-k].
///
/// Only past and current samples contribute; history before the first sample
/// is zero, so the output has the same length as the input. Accumulation is
/// done in f64 against the f64 design coefficients.
pub fn filter(input: &IqBuffer, taps: &[f64]) -> IqBuffer {
    let samples = input.samples();
    let mut out = Vec::with_capacity(samples.len());

    for n in 0..samples.len() {
        let mut re = 0.0f64;
        let mut im = 0.0f64;
        for (k, &tap) in taps.iter().enumerate().take(n + 1) {
            let x = samples[n - k];
            re += tap * x.re as f64;
            im += tap * x.im as f64;
        }
        out.push(Complex32::new(re as f32, im as f32));
    }

    IqBuffer::new(out, input.sample_rate()).expect("rate unchanged")
}

/// Low-pass then keep every Dth sample, D = floor(Fs / bandwidth).
///
/// The filter has to run first: decimating alone would fold everything above
/// the new Nyquist back onto the channel. The output rate is the exact
/// quotient Fs / D, which need not be an integer.
pub fn extract(
    input: &IqBuffer,
    taps: &[f64],
    bandwidth: f64,
) -> Result<IqBuffer, PreconditionError> {
    if input.is_empty() {
        return Err(PreconditionError::TooFewSamples {
            stage: "channel filter",
            wanted: 1,
            got: 0,
        });
    }
    let factor = decimation_factor(input.sample_rate(), bandwidth)?;

    let filtered = filter(input, taps);
    let kept: Vec<Complex32> = filtered.samples().iter().step_by(factor).copied().collect();

    IqBuffer::new(kept, input.sample_rate() / factor as f64)
}

/// floor(rate / bandwidth), rejecting bandwidths the rate cannot represent
pub fn decimation_factor(rate: f64, bandwidth: f64) -> Result<usize, PreconditionError> {
    let nyquist = rate / 2.0;
    if bandwidth <= 0.0 || bandwidth >= nyquist {
        return Err(PreconditionError::BandwidthAboveNyquist { bandwidth, nyquist });
    }
    Ok((rate / bandwidth) as usize)
}

#[cfg(test)]
use crate::remez;

#[test]
fn impulse_reproduces_taps() {
    let mut samples = vec![Complex32::new(0.0, 0.0); 8];
    samples[0] = Complex32::new(1.0, 0.0);
    let input = IqBuffer::new(samples, 48_000.0).unwrap();

    let taps = [0.5, 0.25, -0.125];
    let out = filter(&input, &taps);

    assert_eq!(out.len(), 8);
    assert!((out.samples()[0].re - 0.5).abs() < 1e-6);
    assert!((out.samples()[1].re - 0.25).abs() < 1e-6);
    assert!((out.samples()[2].re + 0.125).abs() < 1e-6);
    assert!(out.samples()[3].norm() < 1e-6);
}

#[test]
fn extract_decimates_length_and_rate() {
    let rate = 1_200_000.0;
    let bandwidth = 200_000.0;
    // 6000 is a multiple of the factor, so length comes out exact
    let input = IqBuffer::new(vec![Complex32::new(1.0, 0.0); 6000], rate).unwrap();
    let taps = remez::lowpass(64, bandwidth, rate).unwrap();

    let out = extract(&input, &taps, bandwidth).unwrap();
    assert_eq!(out.len(), 1000);
    assert_eq!(out.sample_rate(), rate / 6.0);
}

#[test]
fn extract_rejects_bandwidth_at_nyquist() {
    let input = IqBuffer::new(vec![Complex32::new(1.0, 0.0); 64], 1_200_000.0).unwrap();
    let err = extract(&input, &[1.0], 600_000.0).unwrap_err();
    assert!(matches!(
        err,
        PreconditionError::BandwidthAboveNyquist { .. }
    ));

    // wider than the whole rate would floor the factor to zero
    assert!(decimation_factor(1_200_000.0, 1_500_000.0).is_err());
}

#[test]
fn extract_rejects_empty_input() {
    let input = IqBuffer::new(vec![], 1_200_000.0).unwrap();
    assert!(extract(&input, &[1.0], 200_000.0).is_err());
}
