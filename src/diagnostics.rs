use crate::psd;
use num_complex::Complex32;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;

/// What the consumer should draw from a checkpoint buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectralKind {
    Spectrogram,
    Constellation,
    Psd,
}

/// A borrowed view of a checkpoint buffer; complex before the discriminator,
/// real after it.
#[derive(Clone, Copy)]
pub enum SignalView<'a> {
    Complex(&'a [Complex32]),
    Real(&'a [f32]),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write artifact: {0}")]
    Io(#[from] io::Error),

    #[error("buffer unusable for rendering: {0}")]
    Degenerate(String),
}

/// Receives intermediate buffers at pipeline checkpoints. Rendering is
/// non-critical: callers report failures and keep going.
pub trait DiagnosticsSink {
    fn render(
        &mut self,
        view: SignalView,
        sample_rate: f64,
        kind: SpectralKind,
        title: &str,
        path: &str,
    ) -> Result<(), RenderError>;
}

/// Discards every checkpoint.
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn render(
        &mut self,
        _view: SignalView,
        _sample_rate: f64,
        _kind: SpectralKind,
        _title: &str,
        _path: &str,
    ) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Dumps checkpoints as little-endian f32 artifacts for external plotting:
/// interleaved re/im for complex views, bare values for real views, and
/// (freq, power) pairs for the PSD kind.
pub struct DumpSink {
    dir: PathBuf,
    psd_nfft: usize,
}

impl DumpSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DumpSink {
            dir: dir.into(),
            psd_nfft: 1024,
        }
    }
}

impl DiagnosticsSink for DumpSink {
    fn render(
        &mut self,
        view: SignalView,
        sample_rate: f64,
        kind: SpectralKind,
        _title: &str,
        path: &str,
    ) -> Result<(), RenderError> {
        let mut out = BufWriter::new(fs::File::create(self.dir.join(path))?);

        match (kind, view) {
            (SpectralKind::Psd, SignalView::Real(samples)) => {
                let complex: Vec<Complex32> =
                    samples.iter().map(|&v| Complex32::new(v, 0.0)).collect();
                let spectrum = psd::welch(&complex, self.psd_nfft.min(complex.len()), sample_rate)
                    .map_err(|e| RenderError::Degenerate(e.to_string()))?;
                for (f, p) in spectrum.freqs.iter().zip(&spectrum.power) {
                    out.write_all(&(*f as f32).to_le_bytes())?;
                    out.write_all(&(*p as f32).to_le_bytes())?;
                }
            }
            (SpectralKind::Psd, SignalView::Complex(samples)) => {
                let spectrum = psd::welch(samples, self.psd_nfft.min(samples.len()), sample_rate)
                    .map_err(|e| RenderError::Degenerate(e.to_string()))?;
                for (f, p) in spectrum.freqs.iter().zip(&spectrum.power) {
                    out.write_all(&(*f as f32).to_le_bytes())?;
                    out.write_all(&(*p as f32).to_le_bytes())?;
                }
            }
            (_, SignalView::Complex(samples)) => {
                for v in samples {
                    out.write_all(&v.re.to_le_bytes())?;
                    out.write_all(&v.im.to_le_bytes())?;
                }
            }
            (_, SignalView::Real(samples)) => {
                for v in samples {
                    out.write_all(&v.to_le_bytes())?;
                }
            }
        }

        out.flush()?;
        Ok(())
    }
}

#[test]
fn dump_writes_complex_checkpoints() {
    let dir = std::env::temp_dir().join("wbfm-diag-test");
    fs::create_dir_all(&dir).unwrap();
    let mut sink = DumpSink::new(&dir);

    let samples = [Complex32::new(1.0, -1.0), Complex32::new(0.5, 0.25)];
    sink.render(
        SignalView::Complex(&samples),
        48_000.0,
        SpectralKind::Spectrogram,
        "mixed",
        "mixed.cf32",
    )
    .unwrap();

    let bytes = fs::read(dir.join("mixed.cf32")).unwrap();
    assert_eq!(bytes.len(), 2 * 2 * 4);
    assert_eq!(f32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1.0);
    assert_eq!(f32::from_le_bytes(bytes[4..8].try_into().unwrap()), -1.0);
}

#[test]
fn dump_reports_degenerate_psd_input() {
    let dir = std::env::temp_dir().join("wbfm-diag-test");
    fs::create_dir_all(&dir).unwrap();
    let mut sink = DumpSink::new(&dir);

    let err = sink
        .render(
            SignalView::Real(&[1.0]),
            48_000.0,
            SpectralKind::Psd,
            "discriminated",
            "discriminated.f32",
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::Degenerate(_)));
}
