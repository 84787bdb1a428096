use crate::buffer::PcmBuffer;

/// The broadcast FM de-emphasis time constant used in the Americas.
pub const STANDARD_TAU: f64 = 75e-6;

/// Undo the transmitter's high-frequency pre-emphasis.
///
/// Single-pole IIR: with x = exp(-1/(Fs tau)),
/// out[n] = (1 - x) in[n] + x out[n-1]. Each output depends on the previous
/// one, so this stage is a plain serial loop.
pub fn deemphasize(input: &PcmBuffer, tau: f64) -> PcmBuffer {
    let d = input.sample_rate() * tau;
    let x = (-1.0 / d).exp();
    let b0 = 1.0 - x;

    let mut out = Vec::with_capacity(input.len());
    let mut prev = 0.0f64;
    for &v in input.samples() {
        prev = b0 * v as f64 + x * prev;
        out.push(prev as f32);
    }

    PcmBuffer::new(out, input.sample_rate()).expect("rate unchanged")
}

#[test]
fn impulse_decays_at_the_design_ratio() {
    let rate = 200_000.0;
    let mut samples = vec![0.0f32; 64];
    samples[0] = 1.0;
    let input = PcmBuffer::new(samples, rate).unwrap();

    let out = deemphasize(&input, STANDARD_TAU);
    let expected_ratio = (-1.0 / (rate * STANDARD_TAU)).exp() as f32;

    assert!((out.samples()[0] - (1.0 - expected_ratio)).abs() < 1e-6);
    for pair in out.samples().windows(2) {
        let ratio = pair[1] / pair[0];
        assert!(
            (ratio - expected_ratio).abs() < 1e-4,
            "{ratio} != {expected_ratio}"
        );
        assert!(pair[1] < pair[0], "tail must decay monotonically");
    }
}

#[test]
fn dc_passes_through() {
    let input = PcmBuffer::new(vec![0.5f32; 4096], 200_000.0).unwrap();
    let out = deemphasize(&input, STANDARD_TAU);
    let settled = *out.samples().last().unwrap();
    assert!((settled - 0.5).abs() < 1e-3, "settled at {settled}");
}
