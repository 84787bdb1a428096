use crate::buffer::{IqBuffer, PcmBuffer};
use crate::error::PreconditionError;
use itertools::Itertools;

/// Polar discriminator: y[n] = arg(x[n+1] * conj(x[n])).
///
/// The angle of the product of consecutive samples recovers the phase
/// derivative (instantaneous frequency) without dividing by a magnitude that
/// can collapse to zero in a fade. Output is one sample shorter than the
/// input.
pub fn discriminate(input: &IqBuffer) -> Result<PcmBuffer, PreconditionError> {
    if input.len() < 2 {
        return Err(PreconditionError::TooFewSamples {
            stage: "discriminator",
            wanted: 2,
            got: input.len(),
        });
    }

    let angles = input
        .samples()
        .iter()
        .tuple_windows()
        .map(|(prev, next)| (next * prev.conj()).arg())
        .collect();

    PcmBuffer::new(angles, input.sample_rate())
}

#[cfg(test)]
use num_complex::Complex32;
#[cfg(test)]
use std::f64::consts::TAU;

#[test]
fn constant_tone_yields_constant_frequency() {
    let rate = 48_000.0;
    let freq = 1_000.0;
    let samples: Vec<Complex32> = (0..512)
        .map(|n| {
            let phase = TAU * freq / rate * n as f64;
            Complex32::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect();
    let input = IqBuffer::new(samples, rate).unwrap();

    let out = discriminate(&input).unwrap();
    assert_eq!(out.len(), 511);
    assert_eq!(out.sample_rate(), rate);

    let expected = (TAU * freq / rate) as f32;
    for &v in out.samples() {
        assert!((v - expected).abs() < 1e-4, "{v} != {expected}");
    }
}

#[test]
fn rejects_degenerate_input() {
    let empty = IqBuffer::new(vec![], 48_000.0).unwrap();
    assert!(matches!(
        discriminate(&empty),
        Err(PreconditionError::TooFewSamples { got: 0, .. })
    ));

    let single = IqBuffer::new(vec![Complex32::new(1.0, 0.0)], 48_000.0).unwrap();
    assert!(matches!(
        discriminate(&single),
        Err(PreconditionError::TooFewSamples { got: 1, .. })
    ));
}
