use crate::error::PreconditionError;
use num_complex::Complex32;

/// A block of complex baseband samples tagged with the rate it was taken at.
///
/// Rates are carried as exact real quotients; decimating by an integer factor
/// does not round the result back to a nominal figure. Stages never mutate a
/// buffer in place, they produce a new one with its own rate.
#[derive(Debug, Clone)]
pub struct IqBuffer {
    samples: Vec<Complex32>,
    sample_rate: f64,
}

impl IqBuffer {
    pub fn new(samples: Vec<Complex32>, sample_rate: f64) -> Result<Self, PreconditionError> {
        if sample_rate <= 0.0 {
            return Err(PreconditionError::NonPositiveRate(sample_rate));
        }
        Ok(IqBuffer {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[Complex32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }
}

/// A real-valued signal block, produced once the discriminator has collapsed
/// the complex channel down to instantaneous frequency.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: f64,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: f64) -> Result<Self, PreconditionError> {
        if sample_rate <= 0.0 {
            return Err(PreconditionError::NonPositiveRate(sample_rate));
        }
        Ok(PcmBuffer {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Quantized mono audio, ready for the raw PCM sink.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: f64,
}

#[test]
fn rejects_zero_rate() {
    assert!(IqBuffer::new(vec![], 0.0).is_err());
    assert!(PcmBuffer::new(vec![], -48000.0).is_err());
}

#[test]
fn carries_exact_rate() {
    let buf = IqBuffer::new(vec![Complex32::new(0.0, 0.0); 4], 1_200_000.0 / 7.0).unwrap();
    assert_eq!(buf.sample_rate(), 1_200_000.0 / 7.0);
    assert_eq!(buf.len(), 4);
}
