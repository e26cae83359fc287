// src/drivers/csv_file.rs
use std::fs::File;
use std::path::{Path, PathBuf};
use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use crate::drivers::{ChannelConfig, Sample, SampleSource, StreamError};
const TIMESTAMP_COLUMNS: [&str; 3] = ["timestamp", "time", "t"];
/// CSV replay: a header row, an optional leading timestamp column, then one
/// column per channel.
pub struct CsvSource {
    path: PathBuf,
    reader: Reader<File>,
    config: ChannelConfig,
    has_timestamp: bool,
    record: StringRecord,
    index: u64,
    last_timestamp: Option<f64>,
}
impl CsvSource {
    /// `sample_rate_hz` and `scale`/`unit` come from settings; CSV carries no rate.
    pub fn open(
        path: impl AsRef<Path>,
        sample_rate_hz: f32,
        scale: f32,
        unit: &str,
    ) -> Result<Self, StreamError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = Self::reader(&path)?;
        let headers = reader.headers()?.clone();
        let has_timestamp = headers
            .get(0)
            .is_some_and(|h| TIMESTAMP_COLUMNS.contains(&h.to_ascii_lowercase().as_str()));
        let labels: Vec<String> = headers
            .iter()
            .skip(usize::from(has_timestamp))
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            return Err(StreamError::format(format!(
                "{} has no channel columns",
                path.display()
            )));
        }
        let config = ChannelConfig::new(labels, sample_rate_hz)?.with_scale(scale, unit)?;
        log::info!(
            "{}: {} channels, timestamps {}",
            path.display(),
            config.channel_count(),
            if has_timestamp { "from file" } else { "from sample rate" }
        );
        Ok(Self {
            path,
            reader,
            config,
            has_timestamp,
            record: StringRecord::new(),
            index: 0,
            last_timestamp: None,
        })
    }
    fn reader(path: &Path) -> Result<Reader<File>, StreamError> {
        Ok(ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_path(path)?)
    }
    fn line(&self) -> u64 {
        self.record.position().map_or(0, |p| p.line())
    }
    fn field<T: std::str::FromStr>(&self, idx: usize) -> Result<T, StreamError> {
        let text = self.record.get(idx).unwrap_or_default();
        text.parse().map_err(|_| {
            StreamError::format(format!(
                "{} line {}: '{text}' is not a number",
                self.path.display(),
                self.line()
            ))
        })
    }
}
impl SampleSource for CsvSource {
    fn channel_config(&self) -> &ChannelConfig {
        &self.config
    }
    fn next_sample(&mut self) -> Result<Option<Sample>, StreamError> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        let first = usize::from(self.has_timestamp);
        let expected = first + self.config.channel_count();
        if self.record.len() != expected {
            return Err(StreamError::format(format!(
                "{} line {}: {} columns, expected {expected}",
                self.path.display(),
                self.line(),
                self.record.len()
            )));
        }
        let timestamp = if self.has_timestamp {
            let ts: f64 = self.field(0)?;
            if !ts.is_finite() {
                return Err(StreamError::format(format!(
                    "{} line {}: timestamp is not finite",
                    self.path.display(),
                    self.line()
                )));
            }
            if let Some(previous) = self.last_timestamp.filter(|&p| ts < p) {
                return Err(StreamError::NonMonotonic {
                    previous,
                    current: ts,
                });
            }
            ts
        } else {
            self.index as f64 * self.config.sample_period()
        };
        let scale = self.config.scale();
        let values = (first..expected)
            .map(|idx| self.field::<f32>(idx).map(|v| v * scale))
            .collect::<Result<Vec<f32>, _>>()?;
        self.last_timestamp = Some(timestamp);
        self.index += 1;
        Ok(Some(Sample::new(timestamp, values)))
    }
    fn is_restartable(&self) -> bool {
        true
    }
    fn restart(&mut self) -> Result<(), StreamError> {
        self.reader = Self::reader(&self.path)?;
        self.index = 0;
        self.last_timestamp = None;
        Ok(())
    }
    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;
    fn write_csv(body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }
    #[test]
    fn reads_timestamp_column_when_present() {
        let file = write_csv("Timestamp,CH1,CH2\n0.0,1,2\n0.5,3,4\n0.5,5,6\n");
        let mut source = CsvSource::open(file.path(), 2.0, 1.0, "uV").unwrap();
        assert_eq!(source.channel_config().labels(), &["CH1", "CH2"]);
        let samples: Vec<Sample> = source.samples().collect::<Result<_, _>>().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].timestamp(), 0.5);
        assert_eq!(samples[2].values(), &[5.0, 6.0]);
    }
    #[test]
    fn derives_timestamps_and_scales_without_timestamp_column() {
        let file = write_csv("Fz,Cz\n1,2\n3,4\n");
        let mut source = CsvSource::open(file.path(), 4.0, 0.5, "uV").unwrap();
        let samples: Vec<Sample> = source.samples().collect::<Result<_, _>>().unwrap();
        assert_eq!(samples[1].timestamp(), 0.25);
        assert_eq!(samples[1].values(), &[1.5, 2.0]);
    }
    #[test]
    fn replay_is_deterministic() {
        let file = write_csv("t,A\n0,1\n1,2\n2,3\n");
        let mut source = CsvSource::open(file.path(), 1.0, 1.0, "uV").unwrap();
        let first: Vec<Sample> = source.samples().collect::<Result<_, _>>().unwrap();
        source.restart().unwrap();
        let second: Vec<Sample> = source.samples().collect::<Result<_, _>>().unwrap();
        assert_eq!(first, second);
    }
    #[test]
    fn bad_rows_are_format_errors() {
        let file = write_csv("timestamp,A\n0,1\n1,oops\n");
        let mut source = CsvSource::open(file.path(), 1.0, 1.0, "uV").unwrap();
        assert!(source.next_sample().unwrap().is_some());
        let err = source.next_sample().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("line 3"), "{err}");
        let file = write_csv("timestamp,A\n2,1\n1,1\n");
        let mut source = CsvSource::open(file.path(), 1.0, 1.0, "uV").unwrap();
        source.next_sample().unwrap();
        assert!(matches!(
            source.next_sample(),
            Err(StreamError::NonMonotonic { .. })
        ));
    }
}
