use crate::buffer::{AudioBuffer, IqBuffer};
use crate::diagnostics::NullSink;
use crate::pipeline::{self, PipelineConfig};
use crate::read_capture;
use anyhow::Result;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

pub struct Config {
    /// rate the captures were taken at
    pub sample_rate: f64,
    /// where the station sits relative to the capture centre (Hz)
    pub offset: f64,
    pub pipeline: PipelineConfig,
}

/// Demodulate every cu8 capture in a directory, in parallel, handing each
/// result to `func` along with the file it came from.
pub fn bulk_process<T: Send>(
    func: impl Sync + Send + Fn(&str, &AudioBuffer) -> Result<T>,
    input_dir: impl AsRef<Path>,
    config: &Config,
) -> Result<Vec<T>> {
    let mut files = Vec::new();
    for f in fs::read_dir(input_dir)? {
        let f = f?;
        if !f.file_type()?.is_file() {
            continue;
        }
        let path = f.path();
        if path.extension() != Some("cu8".as_ref()) {
            continue;
        }
        files.push(f.path());
    }

    files
        .into_par_iter()
        .map(|f| -> Result<T> {
            let file_name = f
                .file_name()
                .expect("dir entries have names")
                .display()
                .to_string();

            let samples = read_capture(&f)?;
            let capture = IqBuffer::new(samples, config.sample_rate)?;
            let audio =
                pipeline::demodulate(&capture, config.offset, &config.pipeline, &mut NullSink)?;
            func(&file_name, &audio)
        })
        .collect()
}
