use crate::cu8_to_complex;
use crate::error::AcquisitionError;
use log::error;
use num_complex::Complex32;
use rtlsdr_rs::error::RtlsdrError;
use rtlsdr_rs::{DEFAULT_BUF_LENGTH, RtlSdr, TunerGain};
use std::fs;
use std::io::{BufReader, Read};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gain {
    Auto,
    /// tuner gain in dB
    Manual(f32),
}

#[derive(Debug, Clone, Copy)]
pub struct SourceConfig {
    pub sample_rate: f64,
    pub center_freq: f64,
    pub gain: Gain,
}

/// The acquisition contract: a configurable device producing fixed-length
/// complex capture blocks. `release` must be idempotent; reads after release
/// fail rather than reopening.
pub trait SampleSource {
    fn configure(&mut self, config: &SourceConfig) -> Result<(), AcquisitionError>;
    fn read(&mut self, count: usize) -> Result<Vec<Complex32>, AcquisitionError>;
    fn release(&mut self) -> Result<(), AcquisitionError>;
}

/// Guarantees release on every exit path: call `close` to surface release
/// errors on the happy path, and `Drop` covers early returns and panics.
pub struct ScopedSource<S: SampleSource> {
    inner: Option<S>,
}

impl<S: SampleSource> ScopedSource<S> {
    pub fn new(inner: S) -> Self {
        ScopedSource { inner: Some(inner) }
    }

    pub fn close(mut self) -> Result<(), AcquisitionError> {
        if let Some(mut source) = self.inner.take() {
            source.release()?;
        }
        Ok(())
    }
}

impl<S: SampleSource> Deref for ScopedSource<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref().expect("source is open")
    }
}

impl<S: SampleSource> DerefMut for ScopedSource<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut().expect("source is open")
    }
}

impl<S: SampleSource> Drop for ScopedSource<S> {
    fn drop(&mut self) {
        if let Some(ref mut source) = self.inner {
            if let Err(e) = source.release() {
                error!("failed to release sample source: {e}");
            }
        }
    }
}

/// RTL-SDR dongle behind the acquisition contract.
pub struct RtlSource {
    sdr: Option<RtlSdr>,
}

impl RtlSource {
    pub fn open(index: usize) -> Result<Self, AcquisitionError> {
        let sdr = RtlSdr::open_with_index(index).map_err(|e| AcquisitionError::Open(describe(e)))?;
        Ok(RtlSource { sdr: Some(sdr) })
    }

    fn device(&mut self) -> Result<&mut RtlSdr, AcquisitionError> {
        self.sdr.as_mut().ok_or(AcquisitionError::Released)
    }

    /// Pull raw interleaved u8 IQ straight off the device, for capture-to-file
    /// paths that want the wire format untouched.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize, AcquisitionError> {
        self.device()?
            .read_sync(buf)
            .map_err(|e| AcquisitionError::Read(describe(e)))
    }
}

impl SampleSource for RtlSource {
    fn configure(&mut self, config: &SourceConfig) -> Result<(), AcquisitionError> {
        let gain = match config.gain {
            Gain::Auto => TunerGain::Auto,
            // the tuner wants tenths of a dB
            Gain::Manual(db) => TunerGain::Manual((db * 10.0) as i32),
        };
        let sample_rate = config.sample_rate as u32;
        let center_freq = config.center_freq as u32;

        let sdr = self.device()?;
        let configured = (|| {
            sdr.set_tuner_gain(gain)?;
            sdr.set_bias_tee(false)?;
            // the endpoint has to be reset before the first read
            sdr.reset_buffer()?;
            sdr.set_center_freq(center_freq)?;
            sdr.set_sample_rate(sample_rate)
        })();
        configured.map_err(|e| AcquisitionError::Configure(describe(e)))
    }

    fn read(&mut self, count: usize) -> Result<Vec<Complex32>, AcquisitionError> {
        let wanted = count * 2;
        let mut bytes = Vec::with_capacity(wanted + DEFAULT_BUF_LENGTH);
        let mut buf: Box<[u8; DEFAULT_BUF_LENGTH]> = Box::new([0; DEFAULT_BUF_LENGTH]);

        while bytes.len() < wanted {
            let len = self.read_raw(&mut *buf)?;
            if len == 0 {
                return Err(AcquisitionError::ShortRead {
                    wanted: count,
                    got: bytes.len() / 2,
                });
            }
            bytes.extend_from_slice(&buf[..len]);
        }

        bytes.truncate(wanted);
        Ok(cu8_to_complex(&bytes))
    }

    fn release(&mut self) -> Result<(), AcquisitionError> {
        if let Some(mut sdr) = self.sdr.take() {
            sdr.close()
                .map_err(|e| AcquisitionError::Read(describe(e)))?;
        }
        Ok(())
    }
}

/// A cu8 capture file behind the same contract, for offline runs and tests.
/// Tuning requests are accepted and ignored; the file is whatever it is.
pub struct FileSource {
    path: PathBuf,
    reader: Option<BufReader<fs::File>>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AcquisitionError> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path).map_err(|source| AcquisitionError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(FileSource {
            path,
            reader: Some(BufReader::new(file)),
        })
    }
}

impl SampleSource for FileSource {
    fn configure(&mut self, _config: &SourceConfig) -> Result<(), AcquisitionError> {
        Ok(())
    }

    fn read(&mut self, count: usize) -> Result<Vec<Complex32>, AcquisitionError> {
        let reader = self.reader.as_mut().ok_or(AcquisitionError::Released)?;
        let mut bytes = vec![0u8; count * 2];
        let mut filled = 0;

        while filled < bytes.len() {
            let n = reader
                .read(&mut bytes[filled..])
                .map_err(|source| AcquisitionError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            if n == 0 {
                return Err(AcquisitionError::ShortRead {
                    wanted: count,
                    got: filled / 2,
                });
            }
            filled += n;
        }

        Ok(cu8_to_complex(&bytes))
    }

    fn release(&mut self) -> Result<(), AcquisitionError> {
        self.reader = None;
        Ok(())
    }
}

fn describe(err: RtlsdrError) -> String {
    match err {
        RtlsdrError::Usb(e) => format!("usb: {e}"),
        RtlsdrError::RtlsdrErr(e) => format!("{e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingSource {
        releases: Rc<Cell<usize>>,
        fail_read: bool,
    }

    impl SampleSource for CountingSource {
        fn configure(&mut self, _config: &SourceConfig) -> Result<(), AcquisitionError> {
            Ok(())
        }

        fn read(&mut self, count: usize) -> Result<Vec<Complex32>, AcquisitionError> {
            if self.fail_read {
                return Err(AcquisitionError::Read("synthetic fault".into()));
            }
            Ok(vec![Complex32::new(0.0, 0.0); count])
        }

        fn release(&mut self) -> Result<(), AcquisitionError> {
            self.releases.set(self.releases.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn scoped_source_releases_once_on_success() {
        let releases = Rc::new(Cell::new(0));
        let mut source = ScopedSource::new(CountingSource {
            releases: releases.clone(),
            fail_read: false,
        });
        source.read(4).unwrap();
        source.close().unwrap();
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn scoped_source_releases_once_on_failure_path() {
        let releases = Rc::new(Cell::new(0));
        {
            let mut source = ScopedSource::new(CountingSource {
                releases: releases.clone(),
                fail_read: true,
            });
            assert!(source.read(4).is_err());
            // error path: the scope ends without close()
        }
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn file_source_reads_and_refuses_after_release() {
        let dir = std::env::temp_dir().join("wbfm-source-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("capture.cu8");
        fs::write(&path, [128u8, 128, 255, 0, 0, 255]).unwrap();

        let mut source = FileSource::open(&path).unwrap();
        let samples = source.read(2).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0].re - 0.0).abs() < 1e-3);

        assert!(matches!(
            source.read(2),
            Err(AcquisitionError::ShortRead { got: 1, .. })
        ));

        source.release().unwrap();
        source.release().unwrap();
        assert!(matches!(source.read(1), Err(AcquisitionError::Released)));
    }
}
