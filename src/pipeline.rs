use crate::audio;
use crate::buffer::{AudioBuffer, IqBuffer};
use crate::channel;
use crate::deemphasis;
use crate::diagnostics::{DiagnosticsSink, SignalView, SpectralKind};
use crate::discriminator;
use crate::mixer;
use crate::remez;
use anyhow::{Context, Result};
use log::{info, warn};

/// How a capture was taken. The station is tuned at an offset so the
/// channel sits clear of the local-oscillator spike at the capture centre.
#[derive(Debug, Clone, Copy)]
pub struct CaptureParams {
    pub station: f64,
    pub offset: f64,
    pub sample_rate: f64,
    pub length: usize,
}

impl CaptureParams {
    pub fn for_station(station: f64) -> Self {
        CaptureParams {
            station,
            offset: 250_000.0,
            sample_rate: 1_200_000.0,
            length: 1 << 20,
        }
    }

    /// where the receiver actually points
    pub fn center(&self) -> f64 {
        self.station - self.offset
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// a broadcast FM channel is 200 kHz wide
    pub channel_bandwidth: f64,
    pub channel_taps: usize,
    pub audio_rate: f64,
    pub tau: f64,
    pub ceiling: i16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            channel_bandwidth: 200_000.0,
            channel_taps: 64,
            audio_rate: 44_100.0,
            tau: deemphasis::STANDARD_TAU,
            ceiling: audio::PEAK_CEILING,
        }
    }
}

/// The whole batch pipeline: mix the offset away, isolate and decimate the
/// channel, discriminate, de-emphasize, and land on quantized mono audio.
///
/// Stages run strictly in order and each materializes its full output before
/// the next starts. Checkpoints along the way go to `sink`; a sink failure is
/// reported and ignored, everything else aborts with the failing stage named.
pub fn demodulate(
    capture: &IqBuffer,
    offset: f64,
    config: &PipelineConfig,
    sink: &mut dyn DiagnosticsSink,
) -> Result<AudioBuffer> {
    info!(
        "demodulating {} samples at {} S/s",
        capture.len(),
        capture.sample_rate()
    );
    observe(
        sink,
        SignalView::Complex(capture.samples()),
        capture.sample_rate(),
        SpectralKind::Spectrogram,
        "raw capture",
        "raw.cf32",
    );

    let mixed = mixer::shift(capture, offset);
    observe(
        sink,
        SignalView::Complex(mixed.samples()),
        mixed.sample_rate(),
        SpectralKind::Spectrogram,
        "mixed to baseband",
        "mixed.cf32",
    );

    let taps = remez::lowpass(
        config.channel_taps,
        config.channel_bandwidth,
        mixed.sample_rate(),
    )
    .context("channel filter design")?;
    let narrowed = channel::extract(&mixed, &taps, config.channel_bandwidth)
        .context("channel filter and decimator")?;
    info!("channel decimated to {} S/s", narrowed.sample_rate());
    observe(
        sink,
        SignalView::Complex(narrowed.samples()),
        narrowed.sample_rate(),
        SpectralKind::Spectrogram,
        "decimated channel",
        "channel.cf32",
    );
    observe(
        sink,
        SignalView::Complex(narrowed.samples()),
        narrowed.sample_rate(),
        SpectralKind::Constellation,
        "channel constellation",
        "constellation.cf32",
    );

    let discriminated = discriminator::discriminate(&narrowed).context("discriminator")?;
    observe(
        sink,
        SignalView::Real(discriminated.samples()),
        discriminated.sample_rate(),
        SpectralKind::Psd,
        "discriminated",
        "discriminated.f32",
    );

    let flattened = deemphasis::deemphasize(&discriminated, config.tau);

    let resampled = audio::resample(&flattened, config.audio_rate).context("audio resampler")?;
    info!("audio at {} S/s", resampled.sample_rate());

    Ok(audio::quantize(&resampled, config.ceiling))
}

fn observe(
    sink: &mut dyn DiagnosticsSink,
    view: SignalView,
    sample_rate: f64,
    kind: SpectralKind,
    title: &str,
    path: &str,
) {
    if let Err(e) = sink.render(view, sample_rate, kind, title, path) {
        warn!("diagnostics render failed for {title}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;
    use crate::error::FilterDesignError;
    use num_complex::Complex32;
    use std::f64::consts::TAU;

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
    fn centred_tone_demodulates_to_near_silence() {
        let rate = 1_200_000.0;
        let offset = 250_000.0;
        let capture = tone(offset, rate, 6000);
        let config = PipelineConfig::default();

        // stage by stage, checking the signal is flat before quantization
        let mixed = mixer::shift(&capture, offset);
        let taps =
            remez::lowpass(config.channel_taps, config.channel_bandwidth, rate).unwrap();
        let narrowed = channel::extract(&mixed, &taps, config.channel_bandwidth).unwrap();
        assert_eq!(narrowed.sample_rate(), 200_000.0);

        let discriminated = discriminator::discriminate(&narrowed).unwrap();
        assert_eq!(discriminated.len(), 999);

        let flattened = deemphasis::deemphasize(&discriminated, config.tau);
        let resampled = audio::resample(&flattened, config.audio_rate).unwrap();

        // a tone at the exact channel centre carries no frequency deviation;
        // skip the region where the channel filter is still filling in and
        // the de-emphasis pole is settling
        for &v in &resampled.samples()[60..] {
            assert!(v.abs() < 1e-3, "audio not flat: {v}");
        }
    }

    #[test]
    fn end_to_end_length_and_bytes() {
        let rate = 1_200_000.0;
        let offset = 250_000.0;
        let capture = tone(offset, rate, 6000);

        let audio = demodulate(&capture, offset, &PipelineConfig::default(), &mut NullSink)
            .unwrap();

        // 6000 / 6 = 1000 channel samples, minus one in the discriminator,
        // then ceil(999 / 4) at the audio stage
        assert_eq!(audio.samples.len(), 250);
        assert_eq!(audio.sample_rate, 50_000.0);

        let dir = std::env::temp_dir().join("wbfm-pipeline-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.raw");
        audio::write_raw(&audio.samples, &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 250 * 2);
    }

    #[test]
    fn failing_stage_is_named() {
        let capture = tone(250_000.0, 1_200_000.0, 6000);
        let config = PipelineConfig {
            channel_taps: 2,
            ..PipelineConfig::default()
        };

        let err = demodulate(&capture, 250_000.0, &config, &mut NullSink).unwrap_err();
        assert!(err.to_string().contains("channel filter design"));
        assert!(err.downcast_ref::<FilterDesignError>().is_some());
    }
}
