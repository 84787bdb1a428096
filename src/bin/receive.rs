use anyhow::{Context, Result, anyhow};
use log::info;
use std::env;
use wbfm::audio;
use wbfm::buffer::IqBuffer;
use wbfm::diagnostics::DumpSink;
use wbfm::pipeline::{self, CaptureParams, PipelineConfig};
use wbfm::source::{Gain, RtlSource, SampleSource, ScopedSource, SourceConfig};

// RTL Device Index
const RTL_INDEX: usize = 0;

fn main() -> Result<()> {
    stderrlog::new().verbosity(log::Level::Info).init()?;

    let usage = "usage: station_hz [output.raw]";
    let station = env::args().nth(1).ok_or(anyhow!(usage))?.parse::<f64>()?;
    let params = CaptureParams::for_station(station);

    let mut source =
        ScopedSource::new(RtlSource::open(RTL_INDEX).context("failed to open device")?);
    source.configure(&SourceConfig {
        sample_rate: params.sample_rate,
        center_freq: params.center(),
        gain: Gain::Auto,
    })?;
    info!(
        "tuned to {} Hz (station {} Hz at offset {} Hz), sampling at {} S/s",
        params.center(),
        params.station,
        params.offset,
        params.sample_rate
    );

    let samples = source.read(params.length)?;
    source.close()?;
    info!("captured {} samples", samples.len());

    let capture = IqBuffer::new(samples, params.sample_rate)?;
    let mut sink = DumpSink::new(".");
    let audio = pipeline::demodulate(&capture, params.offset, &PipelineConfig::default(), &mut sink)?;

    let output = env::args()
        .nth(2)
        .unwrap_or_else(|| format!("wbfm-mono.sr{}.raw", audio.sample_rate as usize));
    audio::write_raw(&audio.samples, &output)?;
    info!("wrote {} samples to {output}", audio.samples.len());

    Ok(())
}
