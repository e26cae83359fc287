// src/drivers/source.rs
use std::collections::VecDeque;
use crate::drivers::{ChannelConfig, Sample, StreamError};
/// Something that yields timestamped multi-channel samples on demand.
///
/// `Ok(None)` marks the end of the stream. Live links (serial, TCP) block until
/// the next frame arrives and are not restartable; recordings and synthetic
/// sources can be rewound with [`SampleSource::restart`].
pub trait SampleSource: Send {
    fn channel_config(&self) -> &ChannelConfig;
    fn next_sample(&mut self) -> Result<Option<Sample>, StreamError>;
    fn is_live(&self) -> bool {
        false
    }
    fn is_restartable(&self) -> bool {
        false
    }
    fn restart(&mut self) -> Result<(), StreamError> {
        Err(StreamError::NotRestartable)
    }
    fn describe(&self) -> String;
    /// Lazy iterator view. Stops after the first error.
    fn samples(&mut self) -> Samples<'_, Self>
    where
        Self: Sized,
    {
        Samples {
            source: self,
            done: false,
        }
    }
}
impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn channel_config(&self) -> &ChannelConfig {
        (**self).channel_config()
    }
    fn next_sample(&mut self) -> Result<Option<Sample>, StreamError> {
        (**self).next_sample()
    }
    fn is_live(&self) -> bool {
        (**self).is_live()
    }
    fn is_restartable(&self) -> bool {
        (**self).is_restartable()
    }
    fn restart(&mut self) -> Result<(), StreamError> {
        (**self).restart()
    }
    fn describe(&self) -> String {
        (**self).describe()
    }
}
pub struct Samples<'a, S: SampleSource> {
    source: &'a mut S,
    done: bool,
}
impl<S: SampleSource> Iterator for Samples<'_, S> {
    type Item = Result<Sample, StreamError>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.next_sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    config: ChannelConfig,
    samples: Vec<Sample>,
    cursor: usize,
}
impl ManualSource {
    pub fn new(config: ChannelConfig, samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            config,
            samples: samples.into_iter().collect(),
            cursor: 0,
        }
    }
    /// Builds evenly spaced samples from rows of channel values.
    pub fn from_rows(config: ChannelConfig, rows: impl IntoIterator<Item = Vec<f32>>) -> Self {
        let period = config.sample_period();
        let samples: Vec<Sample> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| Sample::new(i as f64 * period, row))
            .collect();
        Self::new(config, samples)
    }
}
impl SampleSource for ManualSource {
    fn channel_config(&self) -> &ChannelConfig {
        &self.config
    }
    fn next_sample(&mut self) -> Result<Option<Sample>, StreamError> {
        let sample = self.samples.get(self.cursor).cloned();
        if sample.is_some() {
            self.cursor += 1;
        }
        Ok(sample)
    }
    fn is_restartable(&self) -> bool {
        true
    }
    fn restart(&mut self) -> Result<(), StreamError> {
        self.cursor = 0;
        Ok(())
    }
    fn describe(&self) -> String {
        format!("manual source ({} samples)", self.samples.len())
    }
}
/// Scripted source that replays a fixed list of results, errors included.
/// Lets the ingestion loop be exercised against link drops and bad frames.
pub struct ScriptedSource {
    config: ChannelConfig,
    script: VecDeque<Result<Option<Sample>, StreamError>>,
    live: bool,
}
impl ScriptedSource {
    pub fn new(
        config: ChannelConfig,
        script: impl IntoIterator<Item = Result<Option<Sample>, StreamError>>,
        live: bool,
    ) -> Self {
        Self {
            config,
            script: script.into_iter().collect(),
            live,
        }
    }
}
impl SampleSource for ScriptedSource {
    fn channel_config(&self) -> &ChannelConfig {
        &self.config
    }
    fn next_sample(&mut self) -> Result<Option<Sample>, StreamError> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
    fn is_live(&self) -> bool {
        self.live
    }
    fn describe(&self) -> String {
        "scripted source".to_string()
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn manual_source_replays_identically_after_restart() {
        let config = ChannelConfig::numbered(2, 100.0).unwrap();
        let mut source =
            ManualSource::from_rows(config, (0..5).map(|i| vec![i as f32, -(i as f32)]));
        let first: Vec<Sample> = source.samples().collect::<Result<_, _>>().unwrap();
        source.restart().unwrap();
        let second: Vec<Sample> = source.samples().collect::<Result<_, _>>().unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        assert!((first[4].timestamp() - 0.04).abs() < 1e-12);
    }
    #[test]
    fn iterator_stops_after_error() {
        let config = ChannelConfig::numbered(1, 10.0).unwrap();
        let mut source = ScriptedSource::new(
            config,
            vec![
                Ok(Some(Sample::new(0.0, vec![1.0]))),
                Err(StreamError::connection("unplugged")),
                Ok(Some(Sample::new(0.1, vec![2.0]))),
            ],
            true,
        );
        let items: Vec<_> = source.samples().collect();
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
        assert!(matches!(
            source.restart(),
            Err(StreamError::NotRestartable)
        ));
    }
}
