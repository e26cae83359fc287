// src/monitor.rs
use std::thread;
use std::time::{Duration, Instant};
use crate::drivers::buffer::RingReader;
use crate::drivers::pipeline::{IngestHandle, IngestSummary, StreamEvent};
use crate::drivers::sink::WindowSink;
use crate::drivers::StreamError;
/// Consumer-side loop: polls the ring on a fixed interval and feeds each sink
/// a fresh snapshot of the length it asked for.
pub struct Monitor {
    sinks: Vec<Box<dyn WindowSink>>,
    interval: Duration,
    duration: Option<Duration>,
    last_sequence: u64,
    refreshes: u64,
}
impl Monitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            interval: interval.max(Duration::from_millis(1)),
            duration: None,
            last_sequence: 0,
            refreshes: 0,
        }
    }
    pub fn with_sink(mut self, sink: Box<dyn WindowSink>) -> Self {
        self.sinks.push(sink);
        self
    }
    /// Stops ingestion once `duration` has elapsed.
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }
    /// Hands every sink a new window if samples arrived since the last call.
    pub fn refresh(&mut self, reader: &RingReader) -> Result<bool, StreamError> {
        let sequence = reader.total_written();
        if sequence == self.last_sequence {
            return Ok(false);
        }
        self.last_sequence = sequence;
        for sink in &mut self.sinks {
            let window = reader.snapshot(sink.window_len());
            let Some(timestamp) = window.latest_timestamp() else {
                continue;
            };
            sink.accept(&window, timestamp)?;
        }
        self.refreshes += 1;
        Ok(true)
    }
    /// Runs until ingestion ends, then flushes the sinks and returns the
    /// ingestion result.
    pub fn run(mut self, handle: IngestHandle) -> Result<IngestSummary, StreamError> {
        let started = Instant::now();
        loop {
            drain_events(&handle);
            if let Err(err) = self.refresh(handle.reader()) {
                handle.stop();
                return Err(err);
            }
            if handle.is_finished() {
                break;
            }
            if self.duration.is_some_and(|limit| started.elapsed() >= limit) {
                log::info!("duration reached, stopping");
                handle.stop();
            }
            thread::sleep(self.interval);
        }
        drain_events(&handle);
        self.refresh(handle.reader())?;
        let summary = handle.join();
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        log::debug!("monitor refreshed {} times", self.refreshes);
        summary
    }
}
fn drain_events(handle: &IngestHandle) {
    for event in handle.events().try_iter() {
        match event {
            StreamEvent::Started {
                source,
                channels,
                sample_rate_hz,
            } => log::info!("streaming from {source}: {channels} channels at {sample_rate_hz} Hz"),
            StreamEvent::FrameError { error, consecutive } => {
                log::warn!("dropped frame ({consecutive} in a row): {error}")
            }
            StreamEvent::Restarted { offset } => {
                log::info!("replay restarted, timestamps continue at {offset:.3}s")
            }
            StreamEvent::Finished(summary) => log::info!(
                "ingestion finished: {} samples, {} frame errors, {} restarts{}",
                summary.samples,
                summary.frame_errors,
                summary.restarts,
                if summary.stopped { " (stopped)" } else { "" }
            ),
            StreamEvent::Failed(error) => log::error!("ingestion failed: {error}"),
        }
    }
}
