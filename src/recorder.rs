// src/recorder.rs
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use crate::drivers::buffer::ring_buffer;
use crate::drivers::{ChannelConfig, Sample, SampleSource, StreamError, Window};
/// Writes raw samples as CSV in the same layout the replay reader accepts:
/// `timestamp,<label>...`.
pub struct Recorder {
    path: PathBuf,
    writer: csv::Writer<File>,
    channels: usize,
    samples: u64,
}
impl Recorder {
    pub fn create(path: impl AsRef<Path>, config: &ChannelConfig) -> Result<Self, StreamError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&path)?;
        let mut header = vec!["timestamp"];
        header.extend(config.labels().iter().map(String::as_str));
        writer.write_record(&header)?;
        log::info!("recording started: {}", path.display());
        Ok(Self {
            path,
            writer,
            channels: config.channel_count(),
            samples: 0,
        })
    }
    /// `training_data_<label>_<unix-seconds>.csv` inside `dir`, for labelled sessions.
    pub fn labeled(
        dir: impl AsRef<Path>,
        label: &str,
        config: &ChannelConfig,
    ) -> Result<Self, StreamError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let filename = format!("training_data_{label}_{secs}.csv");
        Self::create(dir.as_ref().join(filename), config)
    }
    pub fn write_sample(&mut self, sample: &Sample) -> Result<(), StreamError> {
        if sample.num_channels() != self.channels {
            return Err(StreamError::ChannelMismatch {
                expected: self.channels,
                actual: sample.num_channels(),
            });
        }
        let mut record = Vec::with_capacity(self.channels + 1);
        record.push(format!("{:.6}", sample.timestamp()));
        record.extend(sample.values().iter().map(f32::to_string));
        self.writer.write_record(&record)?;
        self.samples += 1;
        Ok(())
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn samples(&self) -> u64 {
        self.samples
    }
    /// Flushes and closes the file, returning its path.
    pub fn finish(mut self) -> Result<PathBuf, StreamError> {
        self.writer.flush()?;
        log::info!(
            "recording saved: {} ({} samples)",
            self.path.display(),
            self.samples
        );
        Ok(self.path)
    }
}
/// Captures a fixed-length epoch from `source` into memory. Returns fewer
/// samples when the stream ends early.
pub fn record_epoch<S: SampleSource + ?Sized>(
    source: &mut S,
    seconds: f32,
) -> Result<Window, StreamError> {
    let config = Arc::new(source.channel_config().clone());
    let wanted = config.samples_for(seconds);
    let (mut writer, reader) = ring_buffer(config, wanted)?;
    let mut taken = 0;
    while taken < wanted {
        match source.next_sample()? {
            Some(sample) => {
                writer.push(&sample)?;
                taken += 1;
            }
            None => break,
        }
    }
    if taken < wanted {
        log::warn!("epoch cut short: {taken} of {wanted} samples");
    }
    Ok(reader.latest_seconds(seconds))
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::csv_file::CsvSource;
    use crate::drivers::dummy::DummySource;
    use crate::drivers::source::ManualSource;
    #[test]
    fn recording_replays_to_identical_samples() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig::numbered(2, 250.0).unwrap();
        let mut source = DummySource::new(config.clone(), 3).unwrap().with_limit(50);
        let originals: Vec<Sample> = source.samples().collect::<Result<_, _>>().unwrap();
        let mut recorder = Recorder::labeled(dir.path(), "rest", &config).unwrap();
        for sample in &originals {
            recorder.write_sample(sample).unwrap();
        }
        assert_eq!(recorder.samples(), 50);
        let path = recorder.finish().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("training_data_rest_") && name.ends_with(".csv"));
        let mut replay = CsvSource::open(&path, 250.0, 1.0, "uV").unwrap();
        assert_eq!(replay.channel_config().labels(), config.labels());
        let replayed: Vec<Sample> = replay.samples().collect::<Result<_, _>>().unwrap();
        assert_eq!(replayed.len(), originals.len());
        for (a, b) in originals.iter().zip(&replayed) {
            assert_eq!(a.values(), b.values());
            assert!((a.timestamp() - b.timestamp()).abs() < 1e-6);
        }
    }
    #[test]
    fn epoch_has_requested_length() {
        let config = ChannelConfig::numbered(1, 100.0).unwrap();
        let mut source = ManualSource::from_rows(config, (0..500).map(|i| vec![i as f32]));
        let epoch = record_epoch(&mut source, 2.0).unwrap();
        assert_eq!(epoch.len(), 200);
        assert_eq!(epoch.channel(0)[199], 199.0);
        let config = ChannelConfig::numbered(1, 100.0).unwrap();
        let mut short = ManualSource::from_rows(config, (0..30).map(|i| vec![i as f32]));
        assert_eq!(record_epoch(&mut short, 1.0).unwrap().len(), 30);
    }
}
