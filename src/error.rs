use std::path::PathBuf;
use thiserror::Error;

/// Fatal faults from the capture hardware or its adapter.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to open device: {0}")]
    Open(String),

    #[error("failed to configure device: {0}")]
    Configure(String),

    #[error("device read failed: {0}")]
    Read(String),

    #[error("short read: wanted {wanted} samples, device produced {got}")]
    ShortRead { wanted: usize, got: usize },

    #[error("source used after release")]
    Released,

    #[error("failed to read capture file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The equiripple designer could not produce coefficients for the request.
///
/// These are one-shot, parameter-driven failures; callers fix the
/// specification rather than retrying.
#[derive(Debug, Error)]
pub enum FilterDesignError {
    #[error("band edges must be an even count of ascending frequencies in [0, {nyquist} Hz]")]
    InvalidBands { nyquist: f64 },

    #[error("one desired gain of 0 or 1 per band required: {bands} bands, {gains} gains")]
    GainMismatch { bands: usize, gains: usize },

    #[error("{taps} taps cannot carry {bands} bands")]
    TooFewTaps { taps: usize, bands: usize },

    #[error("exchange did not converge after {iterations} iterations")]
    NoConvergence { iterations: usize },
}

/// A stage was handed input it cannot meaningfully process.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("{stage} requires at least {wanted} samples, got {got}")]
    TooFewSamples {
        stage: &'static str,
        wanted: usize,
        got: usize,
    },

    #[error("sample rate must be positive, got {0}")]
    NonPositiveRate(f64),

    #[error("bandwidth {bandwidth} Hz must be below Nyquist ({nyquist} Hz)")]
    BandwidthAboveNyquist { bandwidth: f64, nyquist: f64 },

    #[error("target rate {target} Hz exceeds the input rate {rate} Hz")]
    TargetAboveRate { target: f64, rate: f64 },
}
