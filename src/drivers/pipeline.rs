// src/drivers/pipeline.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crate::drivers::buffer::{ring_buffer, RingReader, RingWriter};
use crate::drivers::filter::{ChannelFilters, FilterSettings};
use crate::drivers::{ErrorKind, SampleSource, StreamError};
use crate::recorder::Recorder;
const PACE_SLICE: Duration = Duration::from_millis(50);
pub struct IngestOptions {
    /// Ring capacity in samples.
    pub capacity: usize,
    pub filters: Option<FilterSettings>,
    /// Playback speed for recordings and synthetic sources; 0 means unpaced.
    pub speed: f64,
    pub loop_playback: bool,
    pub max_frame_errors: usize,
    /// Receives raw samples before filtering.
    pub recorder: Option<Recorder>,
}
impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            capacity: 30_000,
            filters: None,
            speed: 1.0,
            loop_playback: false,
            max_frame_errors: 16,
            recorder: None,
        }
    }
}
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IngestSummary {
    pub samples: u64,
    pub frame_errors: u64,
    pub restarts: u64,
    pub last_timestamp: Option<f64>,
    pub stopped: bool,
}
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Started {
        source: String,
        channels: usize,
        sample_rate_hz: f32,
    },
    FrameError {
        error: String,
        consecutive: usize,
    },
    Restarted {
        offset: f64,
    },
    Finished(IngestSummary),
    Failed(String),
}
/// Outcome of a single [`Ingestor::pump_once`] step.
#[derive(Debug)]
pub enum Pumped {
    Sample(f64),
    FrameError {
        error: StreamError,
        consecutive: usize,
    },
    Restarted(f64),
    End,
}
/// Moves samples from a source through the filters into the ring.
pub struct Ingestor<S: SampleSource> {
    source: S,
    writer: RingWriter,
    filters: Option<ChannelFilters>,
    recorder: Option<Recorder>,
    loop_playback: bool,
    max_frame_errors: usize,
    offset: f64,
    consecutive_errors: usize,
    since_restart: u64,
    summary: IngestSummary,
}
impl<S: SampleSource> Ingestor<S> {
    pub fn new(source: S, options: IngestOptions) -> Result<(Self, RingReader), StreamError> {
        let config = Arc::new(source.channel_config().clone());
        let (writer, reader) = ring_buffer(Arc::clone(&config), options.capacity)?;
        let filters = options
            .filters
            .as_ref()
            .map(|settings| ChannelFilters::new(&config, settings));
        Ok((
            Self {
                source,
                writer,
                filters,
                recorder: options.recorder,
                loop_playback: options.loop_playback,
                max_frame_errors: options.max_frame_errors,
                offset: 0.0,
                consecutive_errors: 0,
                since_restart: 0,
                summary: IngestSummary::default(),
            },
            reader,
        ))
    }
    pub fn source(&self) -> &S {
        &self.source
    }
    pub fn summary(&self) -> IngestSummary {
        self.summary
    }
    pub fn pump_once(&mut self) -> Result<Pumped, StreamError> {
        match self.source.next_sample() {
            Ok(Some(sample)) => {
                self.consecutive_errors = 0;
                let sample = if self.offset != 0.0 {
                    sample.shifted(self.offset)
                } else {
                    sample
                };
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.write_sample(&sample)?;
                }
                let sample = match self.filters.as_mut() {
                    Some(filters) => filters.process(&sample)?,
                    None => sample,
                };
                self.writer.push(&sample)?;
                self.since_restart += 1;
                self.summary.samples += 1;
                self.summary.last_timestamp = Some(sample.timestamp());
                Ok(Pumped::Sample(sample.timestamp()))
            }
            Ok(None) => self.end_of_stream(),
            Err(err) if self.tolerates(&err) => {
                self.consecutive_errors += 1;
                self.summary.frame_errors += 1;
                Ok(Pumped::FrameError {
                    error: err,
                    consecutive: self.consecutive_errors,
                })
            }
            Err(err) => Err(err),
        }
    }
    fn tolerates(&self, err: &StreamError) -> bool {
        self.source.is_live()
            && err.kind() == ErrorKind::Format
            && self.consecutive_errors < self.max_frame_errors
    }
    fn end_of_stream(&mut self) -> Result<Pumped, StreamError> {
        // an empty pass would loop forever
        if !self.loop_playback || !self.source.is_restartable() || self.since_restart == 0 {
            return Ok(Pumped::End);
        }
        self.source.restart()?;
        // The replayed signal jumps back to its start, so the filters settle afresh.
        if let Some(filters) = self.filters.as_mut() {
            filters.reset();
        }
        let period = self.writer.config().sample_period();
        self.offset = self.summary.last_timestamp.map_or(0.0, |t| t + period);
        self.since_restart = 0;
        self.summary.restarts += 1;
        Ok(Pumped::Restarted(self.offset))
    }
    /// Closes the recorder and returns the counters.
    pub fn finish(mut self) -> Result<IngestSummary, StreamError> {
        if let Some(recorder) = self.recorder.take() {
            recorder.finish()?;
        }
        Ok(self.summary)
    }
}
/// Owns the ingestion thread. Dropping the handle asks the thread to stop.
pub struct IngestHandle {
    reader: RingReader,
    stop: Arc<AtomicBool>,
    events: Receiver<StreamEvent>,
    thread: Option<JoinHandle<Result<IngestSummary, StreamError>>>,
}
impl IngestHandle {
    pub fn reader(&self) -> &RingReader {
        &self.reader
    }
    pub fn events(&self) -> &Receiver<StreamEvent> {
        &self.events
    }
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }
    pub fn join(mut self) -> Result<IngestSummary, StreamError> {
        let Some(thread) = self.thread.take() else {
            return Err(StreamError::config("ingestion thread already joined"));
        };
        thread.join().unwrap_or_else(|_| {
            Err(StreamError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "ingestion thread panicked",
            )))
        })
    }
}
impl Drop for IngestHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
/// Starts ingesting `source` on a dedicated thread.
pub fn spawn_ingest<S>(source: S, options: IngestOptions) -> Result<IngestHandle, StreamError>
where
    S: SampleSource + 'static,
{
    let speed = options.speed;
    let paced = !source.is_live() && speed > 0.0;
    let (ingestor, reader) = Ingestor::new(source, options)?;
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, events) = mpsc::channel();
    let thread_stop = Arc::clone(&stop);
    let thread = thread::Builder::new()
        .name("ingest".into())
        .spawn(move || run_ingest(ingestor, tx, thread_stop, paced.then_some(speed)))?;
    Ok(IngestHandle {
        reader,
        stop,
        events,
        thread: Some(thread),
    })
}
fn run_ingest<S: SampleSource>(
    mut ingestor: Ingestor<S>,
    tx: Sender<StreamEvent>,
    stop: Arc<AtomicBool>,
    speed: Option<f64>,
) -> Result<IngestSummary, StreamError> {
    let config = ingestor.writer.config();
    tx.send(StreamEvent::Started {
        source: ingestor.source.describe(),
        channels: config.channel_count(),
        sample_rate_hz: config.sample_rate_hz(),
    })
    .ok();
    let started = Instant::now();
    let mut first_timestamp = None;
    let mut stopped = false;
    let outcome = loop {
        if stop.load(Ordering::Relaxed) {
            stopped = true;
            break Ok(());
        }
        match ingestor.pump_once() {
            Ok(Pumped::Sample(timestamp)) => {
                let Some(speed) = speed else { continue };
                let origin = *first_timestamp.get_or_insert(timestamp);
                let due = Duration::from_secs_f64(((timestamp - origin) / speed).max(0.0));
                if !pace_until(started + due, &stop) {
                    stopped = true;
                    break Ok(());
                }
            }
            Ok(Pumped::FrameError { error, consecutive }) => {
                tx.send(StreamEvent::FrameError {
                    error: error.to_string(),
                    consecutive,
                })
                .ok();
            }
            Ok(Pumped::Restarted(offset)) => {
                tx.send(StreamEvent::Restarted { offset }).ok();
            }
            Ok(Pumped::End) => break Ok(()),
            // A read that was blocked when stop was requested ends the run cleanly.
            Err(err) if stop.load(Ordering::Relaxed) => {
                log::debug!("ingestion stopped during a pending read: {err}");
                stopped = true;
                break Ok(());
            }
            Err(err) => break Err(err),
        }
    };
    let finished = ingestor.finish();
    match outcome.and(finished) {
        Ok(mut summary) => {
            summary.stopped = stopped;
            tx.send(StreamEvent::Finished(summary)).ok();
            Ok(summary)
        }
        Err(err) => {
            tx.send(StreamEvent::Failed(err.to_string())).ok();
            Err(err)
        }
    }
}
/// Sleeps until `deadline` in short slices. Returns `false` if stopped meanwhile.
fn pace_until(deadline: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(PACE_SLICE));
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::dummy::DummySource;
    use crate::drivers::source::{ManualSource, ScriptedSource};
    use crate::drivers::{ChannelConfig, Sample};
    fn rows(n: usize) -> ManualSource {
        let config = ChannelConfig::numbered(2, 100.0).unwrap();
        ManualSource::from_rows(config, (0..n).map(|i| vec![i as f32, 0.0]))
    }
    fn unpaced() -> IngestOptions {
        IngestOptions {
            capacity: 64,
            speed: 0.0,
            ..IngestOptions::default()
        }
    }
    #[test]
    fn pump_moves_samples_into_the_ring() {
        let (mut ingestor, reader) = Ingestor::new(rows(3), unpaced()).unwrap();
        assert!(matches!(ingestor.pump_once().unwrap(), Pumped::Sample(_)));
        assert!(matches!(ingestor.pump_once().unwrap(), Pumped::Sample(_)));
        assert!(matches!(ingestor.pump_once().unwrap(), Pumped::Sample(t) if (t - 0.02).abs() < 1e-12));
        assert!(matches!(ingestor.pump_once().unwrap(), Pumped::End));
        assert_eq!(reader.snapshot(10).channel(0).to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(ingestor.finish().unwrap().samples, 3);
    }
    #[test]
    fn looping_keeps_timestamps_monotonic() {
        let options = IngestOptions {
            loop_playback: true,
            ..unpaced()
        };
        let (mut ingestor, reader) = Ingestor::new(rows(4), options).unwrap();
        let mut restarts = Vec::new();
        for _ in 0..10 {
            if let Pumped::Restarted(offset) = ingestor.pump_once().unwrap() {
                restarts.push(offset);
            }
        }
        assert_eq!(restarts.len(), 2);
        assert!((restarts[0] - 0.04).abs() < 1e-9);
        let window = reader.snapshot(64);
        assert_eq!(window.len(), 8);
        assert!(window.timestamps().windows(2).all(|p| p[0] < p[1]));
        assert_eq!(window.channel(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0]);
    }
    #[test]
    fn empty_source_does_not_loop_forever() {
        let options = IngestOptions {
            loop_playback: true,
            ..unpaced()
        };
        let (mut ingestor, _reader) = Ingestor::new(rows(0), options).unwrap();
        assert!(matches!(ingestor.pump_once().unwrap(), Pumped::End));
    }
    #[test]
    fn looping_resettles_the_filters() {
        let config = ChannelConfig::numbered(1, 100.0).unwrap();
        let source = ManualSource::from_rows(config, (0..4).map(|i| vec![10.0 + i as f32 * 10.0]));
        let options = IngestOptions {
            loop_playback: true,
            filters: Some(FilterSettings {
                notch_hz: None,
                notch_q: 30.0,
                highpass_hz: Some(1.0),
                lowpass_hz: None,
                order: 2,
            }),
            ..unpaced()
        };
        let (mut ingestor, reader) = Ingestor::new(source, options).unwrap();
        for _ in 0..9 {
            ingestor.pump_once().unwrap();
        }
        let filtered = reader.snapshot(8).channel(0).to_vec();
        assert_eq!(filtered.len(), 8);
        // Each pass starts primed, so both passes filter identically.
        for i in 0..4 {
            assert!((filtered[i] - filtered[i + 4]).abs() < 1e-4, "{filtered:?}");
        }
    }
    #[test]
    fn live_frame_errors_are_tolerated_up_to_the_limit() {
        let config = ChannelConfig::numbered(1, 10.0).unwrap();
        let good = |t: f64| -> Result<Option<Sample>, StreamError> {
            Ok(Some(Sample::new(t, vec![1.0])))
        };
        let bad = || -> Result<Option<Sample>, StreamError> { Err(StreamError::format("garbled")) };
        let script = vec![good(0.0), bad(), bad(), good(0.1), bad(), bad(), bad()];
        let source = ScriptedSource::new(config, script, true);
        let options = IngestOptions {
            max_frame_errors: 2,
            ..unpaced()
        };
        let (mut ingestor, _reader) = Ingestor::new(source, options).unwrap();
        let mut outcomes = Vec::new();
        let err = loop {
            match ingestor.pump_once() {
                Ok(pumped) => outcomes.push(pumped),
                Err(err) => break err,
            }
        };
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(outcomes.len(), 6);
        assert!(matches!(outcomes[5], Pumped::FrameError { consecutive: 2, .. }));
        assert_eq!(ingestor.summary().frame_errors, 4);
    }
    #[test]
    fn file_format_errors_and_lost_links_are_fatal() {
        let config = ChannelConfig::numbered(1, 10.0).unwrap();
        let source = ScriptedSource::new(
            config.clone(),
            vec![Err(StreamError::format("bad row"))],
            false,
        );
        let (mut ingestor, _r) = Ingestor::new(source, unpaced()).unwrap();
        assert!(ingestor.pump_once().is_err());
        let source = ScriptedSource::new(config, vec![Err(StreamError::connection("eof"))], true);
        let (mut ingestor, _r) = Ingestor::new(source, unpaced()).unwrap();
        assert_eq!(ingestor.pump_once().unwrap_err().kind(), ErrorKind::Connection);
    }
    #[test]
    fn recorder_sees_raw_samples_and_ring_sees_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig::numbered(1, 100.0).unwrap();
        let source = ManualSource::from_rows(config.clone(), (0..50).map(|_| vec![25.0]));
        let options = IngestOptions {
            filters: Some(FilterSettings {
                notch_hz: None,
                notch_q: 30.0,
                highpass_hz: Some(1.0),
                lowpass_hz: None,
                order: 2,
            }),
            recorder: Some(Recorder::create(dir.path().join("raw.csv"), &config).unwrap()),
            ..unpaced()
        };
        let (mut ingestor, reader) = Ingestor::new(source, options).unwrap();
        while !matches!(ingestor.pump_once().unwrap(), Pumped::End) {}
        ingestor.finish().unwrap();
        assert!(reader.snapshot(50).channel(0).iter().all(|v| v.abs() < 1e-3));
        let raw = std::fs::read_to_string(dir.path().join("raw.csv")).unwrap();
        assert_eq!(raw.lines().count(), 51);
        assert!(raw.lines().nth(1).unwrap().ends_with(",25"));
    }
    #[test]
    fn spawned_ingest_finishes_and_reports() {
        let handle = spawn_ingest(rows(20), unpaced()).unwrap();
        let events: Vec<StreamEvent> = handle.events().iter().collect();
        assert!(matches!(events.first(), Some(StreamEvent::Started { channels: 2, .. })));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Finished(IngestSummary { samples: 20, .. }))
        ));
        assert_eq!(handle.reader().stats().total_written, 20);
        let summary = handle.join().unwrap();
        assert!(!summary.stopped);
    }
    struct StallingSource {
        config: ChannelConfig,
    }
    impl SampleSource for StallingSource {
        fn channel_config(&self) -> &ChannelConfig {
            &self.config
        }
        fn next_sample(&mut self) -> Result<Option<Sample>, StreamError> {
            thread::sleep(Duration::from_millis(300));
            Err(StreamError::connection("no data for 0.3s"))
        }
        fn is_live(&self) -> bool {
            true
        }
        fn describe(&self) -> String {
            "quiet board".to_string()
        }
    }
    #[test]
    fn stop_during_a_blocked_read_is_not_a_failure() {
        let source = StallingSource {
            config: ChannelConfig::numbered(1, 250.0).unwrap(),
        };
        let handle = spawn_ingest(source, unpaced()).unwrap();
        thread::sleep(Duration::from_millis(50));
        handle.stop();
        let summary = handle.join().unwrap();
        assert!(summary.stopped);
        assert_eq!(summary.samples, 0);
    }
    #[test]
    fn stop_interrupts_an_endless_source() {
        let config = ChannelConfig::numbered(2, 1000.0).unwrap();
        let source = DummySource::new(config, 1).unwrap();
        let options = IngestOptions {
            speed: 1.0,
            ..IngestOptions::default()
        };
        let handle = spawn_ingest(source, options).unwrap();
        thread::sleep(Duration::from_millis(100));
        handle.stop();
        let summary = handle.join().unwrap();
        assert!(summary.stopped);
        assert!(summary.samples > 0);
    }
}
