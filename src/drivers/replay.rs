// src/drivers/replay.rs
use std::path::Path;
use crate::config::Settings;
use crate::drivers::csv_file::CsvSource;
use crate::drivers::edf::EdfSource;
use crate::drivers::{SampleSource, StreamError};
/// Opens a recording for offline replay, picking the reader from the extension.
pub fn open_recording(
    path: impl AsRef<Path>,
    settings: &Settings,
) -> Result<Box<dyn SampleSource>, StreamError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "edf" | "bdf" => Ok(Box::new(EdfSource::open(path)?)),
        "csv" | "txt" => Ok(Box::new(CsvSource::open(
            path,
            settings.sample_rate,
            settings.scale,
            &settings.unit,
        )?)),
        other => Err(StreamError::config(format!(
            "unsupported recording format '.{other}' for {} (expected .edf, .bdf or .csv)",
            path.display()
        ))),
    }
}
