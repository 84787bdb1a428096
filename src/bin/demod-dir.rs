use anyhow::{Context, Result};
use std::path::PathBuf;
use wbfm::audio;
use wbfm::bulk::{Config, bulk_process};
use wbfm::pipeline::PipelineConfig;

#[derive(facet::Facet)]
struct Args {
    #[facet(positional)]
    input_dir: PathBuf,
}

fn main() -> Result<()> {
    stderrlog::new().verbosity(log::Level::Info).init()?;

    let args: Args = facet_args::from_std_args().context("usage: demod-dir input_dir")?;

    let config = Config {
        sample_rate: 1_200_000.0,
        offset: 250_000.0,
        pipeline: PipelineConfig::default(),
    };

    bulk_process(
        |file_name, audio| {
            let name = format!("{file_name}.sr{}.raw", audio.sample_rate as usize);
            audio::write_raw(&audio.samples, &name)?;
            println!("wrote {} samples to {name}", audio.samples.len());
            Ok(())
        },
        &args.input_dir,
        &config,
    )?;

    Ok(())
}
