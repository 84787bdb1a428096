use anyhow::{Context, Result};
use std::{env, fs};
use wbfm::scanner::{self, ScanConfig};
use wbfm::source::{RtlSource, ScopedSource};

// RTL Device Index
const RTL_INDEX: usize = 0;

fn main() -> Result<()> {
    stderrlog::new().verbosity(log::Level::Info).init()?;

    // optional allow-list: one station centre per line, MHz
    let allowed_mhz = match env::args().nth(1) {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read allow-list {path}"))?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<f64>().with_context(|| format!("bad frequency {l:?}")))
            .collect::<Result<Vec<f64>>>()?,
        None => Vec::new(),
    };

    let config = ScanConfig {
        allowed_mhz,
        ..ScanConfig::default()
    };

    let mut source =
        ScopedSource::new(RtlSource::open(RTL_INDEX).context("failed to open device")?);
    let report = scanner::scan(&mut *source, &config)?;
    source.close()?;

    println!("detected ({}):", report.detected.len());
    for mhz in &report.detected {
        println!("  {mhz:.1} MHz");
    }
    println!("unauthorized ({}):", report.unauthorized.len());
    for mhz in &report.unauthorized {
        println!("  {mhz:.1} MHz");
    }

    Ok(())
}
