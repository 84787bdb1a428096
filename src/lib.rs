pub mod audio;
pub mod buffer;
pub mod bulk;
pub mod channel;
pub mod deemphasis;
pub mod diagnostics;
pub mod discriminator;
pub mod error;
pub mod mixer;
pub mod pipeline;
pub mod psd;
pub mod remez;
pub mod scanner;
pub mod source;

use crate::error::AcquisitionError;
use num_complex::Complex32;
use std::fs;
use std::path::Path;

/// Interleaved unsigned IQ bytes, as RTL dongles and cu8 capture files store
/// them, into unit-range complex samples.
pub fn cu8_to_complex(bytes: &[u8]) -> Vec<Complex32> {
    bytes
        .chunks_exact(2)
        .map(|pair| Complex32::new(u8_to_f32(pair[0]), u8_to_f32(pair[1])))
        .collect()
}

fn u8_to_f32(v: u8) -> f32 {
    (v as f32 - 128.0) / 128.0
}

/// Slurp a whole cu8 capture into memory.
pub fn read_capture(path: impl AsRef<Path>) -> Result<Vec<Complex32>, AcquisitionError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| AcquisitionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cu8_to_complex(&bytes))
}

#[test]
fn cu8_pairs_map_to_unit_range() {
    let samples = cu8_to_complex(&[128, 128, 255, 0, 64, 192]);
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0], Complex32::new(0.0, 0.0));
    assert!((samples[1].re - 0.9921875).abs() < 1e-6);
    assert_eq!(samples[1].im, -1.0);
    assert_eq!(samples[2], Complex32::new(-0.5, 0.5));
}
