use crate::buffer::IqBuffer;
use num_complex::Complex32;
use std::f64::consts::TAU;

/// Shift the spectrum of `input` down by `offset` Hz.
///
/// Each sample n is multiplied by exp(-j 2π offset/Fs n), so a channel that
/// was captured at +offset from the tuned centre lands on 0 Hz. The phase is
/// rebuilt from the index in f64 rather than accumulated, so long captures do
/// not drift.
pub fn shift(input: &IqBuffer, offset: f64) -> IqBuffer {
    let rate = input.sample_rate();
    let step = -TAU * offset / rate;

    let shifted = input
        .samples()
        .iter()
        .enumerate()
        .map(|(n, &sample)| {
            let phase = step * n as f64;
            sample * Complex32::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect();

    IqBuffer::new(shifted, rate).expect("rate unchanged")
}

#[cfg(test)]
fn tone(freq: f64, rate: f64, len: usize) -> IqBuffer {
    let samples = (0..len)
        .map(|n| {
            let phase = TAU * freq / rate * n as f64;
            Complex32::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect();
    IqBuffer::new(samples, rate).unwrap()
}

#[test]
fn shift_round_trips() {
    let original = tone(12_000.0, 1_200_000.0, 512);
    let there = shift(&original, 250_000.0);
    let back = shift(&there, -250_000.0);

    assert_eq!(back.len(), original.len());
    assert_eq!(back.sample_rate(), original.sample_rate());
    for (a, b) in original.samples().iter().zip(back.samples()) {
        assert!((a - b).norm() < 1e-4, "{a} != {b}");
    }
}

#[test]
fn shift_moves_tone_to_dc() {
    // a tone at +offset should come out constant-phase
    let rate = 1_200_000.0;
    let offset = 250_000.0;
    let mixed = shift(&tone(offset, rate, 256), offset);

    for pair in mixed.samples().windows(2) {
        let diff = (pair[1] * pair[0].conj()).arg();
        assert!(diff.abs() < 1e-3, "residual rotation {diff}");
    }
}
