use crate::error::AcquisitionError;
use crate::psd::{self, Spectrum};
use crate::source::{Gain, SampleSource, SourceConfig};
use log::{info, warn};
use thiserror::Error;

/// Sweep setup for hunting active stations across a band.
pub struct ScanConfig {
    pub start_hz: f64,
    pub stop_hz: f64,
    pub step_hz: f64,
    pub sample_rate: f64,
    pub samples_per_step: usize,
    pub nfft: usize,
    /// power density a bin must exceed to count as occupied
    pub threshold: f64,
    /// bins a run must span before it is reported
    pub min_run_width: usize,
    /// station centres (MHz, one decimal) that are allowed to transmit
    pub allowed_mhz: Vec<f64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            start_hz: 88e6,
            stop_hz: 108e6,
            step_hz: 0.1e6,
            sample_rate: 2.4e6,
            samples_per_step: 256 * 1024,
            nfft: 1024,
            threshold: 1e-7,
            min_run_width: 10,
            allowed_mhz: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// detected station centres, MHz rounded to one decimal
    pub detected: Vec<f64>,
    /// detections missing from the allow-list
    pub unauthorized: Vec<f64>,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("scan range or step is degenerate")]
    BadRange,
}

/// Run-tracking over threshold-classified bins. One state per possibility
/// instead of scattered counters: either we are between stations, or inside
/// a run that started at some bin.
enum RunState {
    Idle,
    InRun { start: usize },
}

impl RunState {
    fn step(
        &mut self,
        bin: usize,
        above: bool,
        spectrum: &Spectrum,
        center_hz: f64,
        min_width: usize,
        out: &mut Vec<f64>,
    ) {
        match (&*self, above) {
            (RunState::Idle, true) => *self = RunState::InRun { start: bin },
            (RunState::InRun { .. }, true) => {}
            (RunState::Idle, false) => {}
            (RunState::InRun { start }, false) => {
                if bin - start > min_width {
                    let lo = spectrum.freqs[*start];
                    let hi = spectrum.freqs[bin];
                    let mhz = (center_hz + (lo + hi) / 2.0) / 1e6;
                    out.push((mhz * 10.0).round() / 10.0);
                }
                *self = RunState::Idle;
            }
        }
    }
}

/// Flag contiguous bins above `threshold` that are wide enough to be a
/// broadcast, returning centre frequencies in MHz at one decimal.
pub fn detect_bands(
    spectrum: &Spectrum,
    center_hz: f64,
    threshold: f64,
    min_run_width: usize,
) -> Vec<f64> {
    let mut found = Vec::new();
    let mut state = RunState::Idle;

    for (bin, &power) in spectrum.power.iter().enumerate() {
        state.step(
            bin,
            power > threshold,
            spectrum,
            center_hz,
            min_run_width,
            &mut found,
        );
    }
    // a run still open at the band edge ends there
    let last = spectrum.power.len().saturating_sub(1);
    state.step(last, false, spectrum, center_hz, min_run_width, &mut found);

    found
}

/// Step a source across the configured range, detect occupied channels per
/// step, and cross-reference the allow-list.
pub fn scan(source: &mut dyn SampleSource, config: &ScanConfig) -> Result<ScanReport, ScanError> {
    if config.step_hz <= 0.0 || config.stop_hz <= config.start_hz {
        return Err(ScanError::BadRange);
    }

    let allowed: Vec<i64> = config.allowed_mhz.iter().map(|&m| key(m)).collect();
    let mut report = ScanReport::default();

    let mut center = config.start_hz;
    while center < config.stop_hz {
        source.configure(&SourceConfig {
            sample_rate: config.sample_rate,
            center_freq: center,
            gain: Gain::Auto,
        })?;
        let samples = source.read(config.samples_per_step)?;

        match psd::welch(&samples, config.nfft, config.sample_rate) {
            Ok(spectrum) => {
                for mhz in detect_bands(&spectrum, center, config.threshold, config.min_run_width)
                {
                    if report.detected.iter().any(|&d| key(d) == key(mhz)) {
                        continue;
                    }
                    info!("active station at {mhz} MHz");
                    report.detected.push(mhz);
                    if !allowed.contains(&key(mhz)) {
                        report.unauthorized.push(mhz);
                    }
                }
            }
            Err(e) => warn!("skipping {center} Hz: {e}"),
        }

        center += config.step_hz;
    }

    Ok(report)
}

// one-decimal MHz as an exact comparison key
fn key(mhz: f64) -> i64 {
    (mhz * 10.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum_from(power: Vec<f64>, bin_hz: f64) -> Spectrum {
        let half = power.len() as f64 / 2.0;
        let freqs = (0..power.len())
            .map(|i| (i as f64 - half) * bin_hz)
            .collect();
        Spectrum { power, freqs }
    }

    #[test]
    fn wide_run_is_detected_at_its_midpoint() {
        let mut power = vec![0.0; 64];
        for p in &mut power[20..36] {
            *p = 1.0;
        }
        let spectrum = spectrum_from(power, 10_000.0);

        let found = detect_bands(&spectrum, 100_000_000.0, 0.5, 4);
        assert_eq!(found.len(), 1);
        // bins 20..=36 straddle the centre offset of -40 kHz
        assert_eq!(found[0], 100.0);
    }

    #[test]
    fn narrow_spikes_are_ignored() {
        let mut power = vec![0.0; 64];
        power[10] = 5.0;
        power[11] = 5.0;
        let spectrum = spectrum_from(power, 10_000.0);

        assert!(detect_bands(&spectrum, 100_000_000.0, 0.5, 4).is_empty());
    }

    #[test]
    fn run_reaching_the_band_edge_is_flushed() {
        let mut power = vec![0.0; 64];
        for p in &mut power[50..] {
            *p = 1.0;
        }
        let spectrum = spectrum_from(power, 10_000.0);

        let found = detect_bands(&spectrum, 100_000_000.0, 0.5, 4);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn two_separated_runs_become_two_detections() {
        let mut power = vec![0.0; 128];
        for p in &mut power[10..30] {
            *p = 1.0;
        }
        for p in &mut power[80..100] {
            *p = 1.0;
        }
        let spectrum = spectrum_from(power, 10_000.0);

        assert_eq!(detect_bands(&spectrum, 100_000_000.0, 0.5, 4).len(), 2);
    }

    #[test]
    fn allow_list_splits_detections() {
        struct ToneSource;

        impl SampleSource for ToneSource {
            fn configure(&mut self, _config: &SourceConfig) -> Result<(), AcquisitionError> {
                Ok(())
            }

            fn read(
                &mut self,
                count: usize,
            ) -> Result<Vec<num_complex::Complex32>, AcquisitionError> {
                // loud wideband-ish content: a strong tone rides every read
                Ok((0..count)
                    .map(|n| {
                        let phase = 0.3 * n as f64;
                        num_complex::Complex32::new(phase.cos() as f32, phase.sin() as f32)
                    })
                    .collect())
            }

            fn release(&mut self) -> Result<(), AcquisitionError> {
                Ok(())
            }
        }

        let config = ScanConfig {
            start_hz: 100e6,
            stop_hz: 100.2e6,
            step_hz: 0.1e6,
            samples_per_step: 4096,
            nfft: 256,
            threshold: 1e-9,
            min_run_width: 2,
            allowed_mhz: vec![],
            ..ScanConfig::default()
        };

        let report = scan(&mut ToneSource, &config).unwrap();
        assert_eq!(report.detected, report.unauthorized);
        assert!(!report.detected.is_empty());
    }

    #[test]
    fn degenerate_range_is_rejected() {
        struct NeverSource;
        impl SampleSource for NeverSource {
            fn configure(&mut self, _c: &SourceConfig) -> Result<(), AcquisitionError> {
                unreachable!()
            }
            fn read(
                &mut self,
                _count: usize,
            ) -> Result<Vec<num_complex::Complex32>, AcquisitionError> {
                unreachable!()
            }
            fn release(&mut self) -> Result<(), AcquisitionError> {
                Ok(())
            }
        }

        let config = ScanConfig {
            start_hz: 108e6,
            stop_hz: 88e6,
            ..ScanConfig::default()
        };
        assert!(matches!(
            scan(&mut NeverSource, &config),
            Err(ScanError::BadRange)
        ));
    }
}
