use anyhow::{Context, Result, anyhow, bail};
use log::info;
use rtlsdr_rs::DEFAULT_BUF_LENGTH;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{env, fs, io};
use wbfm::source::{Gain, RtlSource, SampleSource, ScopedSource, SourceConfig};

// RTL Device Index
const RTL_INDEX: usize = 0;

fn main() -> Result<()> {
    stderrlog::new().verbosity(log::Level::Info).init()?;

    // Shutdown flag that is set true when ctrl-c signal caught
    static SHUTDOWN: AtomicBool = AtomicBool::new(false);
    ctrlc::set_handler(|| {
        SHUTDOWN.swap(true, Ordering::Relaxed);
    })?;

    let usage = "usage: output.cu8 center_hz samplerate seconds";
    let output = env::args().nth(1).ok_or(anyhow!(usage))?;
    let center = env::args().nth(2).ok_or(anyhow!(usage))?.parse::<f64>()?;
    let sample_rate = env::args().nth(3).ok_or(anyhow!(usage))?.parse::<f64>()?;
    let seconds = env::args().nth(4).ok_or(anyhow!(usage))?.parse::<f64>()?;

    let total_bytes = (seconds * sample_rate) as usize * 2;

    let mut source =
        ScopedSource::new(RtlSource::open(RTL_INDEX).context("failed to open device")?);
    source.configure(&SourceConfig {
        sample_rate,
        center_freq: center,
        gain: Gain::Auto,
    })?;
    info!("tuned to {center} Hz, sampling at {sample_rate} S/s for {seconds}s");

    let mut out = io::BufWriter::new(fs::File::create(&output)?);
    let mut buf: Box<[u8; DEFAULT_BUF_LENGTH]> = Box::new([0; DEFAULT_BUF_LENGTH]);
    let mut written = 0usize;

    while written < total_bytes {
        if SHUTDOWN.load(Ordering::Relaxed) {
            bail!("interrupted after {written} bytes");
        }
        let len = source.read_raw(&mut *buf)?;
        let take = len.min(total_bytes - written);
        out.write_all(&buf[..take])?;
        written += take;
    }

    out.flush()?;
    source.close()?;
    info!("wrote {written} bytes to {output}");

    Ok(())
}
