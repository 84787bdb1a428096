use anyhow::{Result, anyhow, ensure};
use log::info;
use std::env;
use wbfm::audio;
use wbfm::buffer::IqBuffer;
use wbfm::diagnostics::DumpSink;
use wbfm::pipeline::{self, PipelineConfig};
use wbfm::read_capture;

fn main() -> Result<()> {
    stderrlog::new().verbosity(log::Level::Info).init()?;

    let usage = "usage: input.cu8 samplerate offset_hz [output.raw]";
    let input = env::args().nth(1).ok_or(anyhow!(usage))?;
    let sample_rate = env::args().nth(2).ok_or(anyhow!(usage))?.parse::<f64>()?;
    let offset = env::args().nth(3).ok_or(anyhow!(usage))?.parse::<f64>()?;
    ensure!(
        offset.abs() <= sample_rate / 2.,
        "offset must be less than half the sample rate"
    );

    let samples = read_capture(&input)?;
    let capture = IqBuffer::new(samples, sample_rate)?;

    let mut sink = DumpSink::new(".");
    let audio = pipeline::demodulate(&capture, offset, &PipelineConfig::default(), &mut sink)?;

    let output = env::args()
        .nth(4)
        .unwrap_or_else(|| format!("out.sr{}.raw", audio.sample_rate as usize));
    audio::write_raw(&audio.samples, &output)?;
    info!("wrote {} samples to {output}", audio.samples.len());

    Ok(())
}
