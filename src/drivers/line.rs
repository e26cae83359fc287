// src/drivers/line.rs
//! ASCII line protocol spoken by the acquisition firmware.
//!
//! Every frame is one line `Channel:v1,v2,...,vN` terminated by `\n`. Anything
//! else on the link (boot banners, debug prints) is skipped.
use std::io::{self, BufRead, Read};
use std::time::{Duration, Instant};
use crate::drivers::{ChannelConfig, Sample, SampleSource, StreamError};
pub const FRAME_PREFIX: &str = "Channel:";
/// Longest line kept in memory. Longer lines are dropped up to their newline.
pub const MAX_LINE_BYTES: usize = 4096;
/// Parses one line. `Ok(None)` means the line is not a frame.
pub fn parse_frame(line: &str, channels: usize) -> Result<Option<Vec<f32>>, StreamError> {
    let line = line.trim();
    let Some(body) = line.strip_prefix(FRAME_PREFIX) else {
        return Ok(None);
    };
    let mut values = Vec::with_capacity(channels);
    for field in body.split(',') {
        let value: f32 = field
            .trim()
            .parse()
            .map_err(|_| StreamError::format(format!("bad value '{field}' in frame '{line}'")))?;
        if !value.is_finite() {
            return Err(StreamError::format(format!(
                "non-finite value in frame '{line}'"
            )));
        }
        values.push(value);
    }
    if values.len() != channels {
        return Err(StreamError::format(format!(
            "frame has {} values, expected {channels}",
            values.len()
        )));
    }
    Ok(Some(values))
}
/// Line-framed reader over any byte stream with read timeouts.
pub struct LineSource<R: BufRead + Send> {
    reader: R,
    config: ChannelConfig,
    description: String,
    pending: Vec<u8>,
    /// Set while skipping the rest of an over-long line.
    discarding: bool,
    index: u64,
    stall_timeout: Duration,
    last_byte_at: Instant,
}
impl<R: BufRead + Send> LineSource<R> {
    pub fn new(
        reader: R,
        config: ChannelConfig,
        description: impl Into<String>,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            reader,
            config,
            description: description.into(),
            pending: Vec::with_capacity(256),
            discarding: false,
            index: 0,
            stall_timeout,
            last_byte_at: Instant::now(),
        }
    }
    fn decode_pending(&mut self) -> Result<Option<Sample>, StreamError> {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        let Some(raw) = parse_frame(&line, self.config.channel_count())? else {
            log::trace!("{}: skipping non-frame line '{}'", self.description, line.trim());
            return Ok(None);
        };
        let scale = self.config.scale();
        let values: Vec<f32> = raw.into_iter().map(|v| v * scale).collect();
        let timestamp = self.index as f64 * self.config.sample_period();
        self.index += 1;
        Ok(Some(Sample::new(timestamp, values)))
    }
}
impl<R: BufRead + Send> SampleSource for LineSource<R> {
    fn channel_config(&self) -> &ChannelConfig {
        &self.config
    }
    fn next_sample(&mut self) -> Result<Option<Sample>, StreamError> {
        loop {
            let before = self.pending.len();
            let room = (MAX_LINE_BYTES - before) as u64;
            match (&mut self.reader)
                .take(room)
                .read_until(b'\n', &mut self.pending)
            {
                Ok(0) if self.pending.is_empty() => {
                    return Err(StreamError::connection(format!(
                        "{} closed the link",
                        self.description
                    )));
                }
                Ok(_) => {
                    self.last_byte_at = Instant::now();
                    let complete = self.pending.last() == Some(&b'\n');
                    if self.discarding {
                        self.pending.clear();
                        self.discarding = !complete;
                        continue;
                    }
                    if !complete && self.pending.len() >= MAX_LINE_BYTES {
                        self.pending.clear();
                        self.discarding = true;
                        return Err(StreamError::format(format!(
                            "{}: frame longer than {MAX_LINE_BYTES} bytes",
                            self.description
                        )));
                    }
                    if let Some(sample) = self.decode_pending()? {
                        return Ok(Some(sample));
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    // read_until keeps the bytes of a partial line in `pending`.
                    if self.pending.len() > before {
                        self.last_byte_at = Instant::now();
                    }
                    if self.last_byte_at.elapsed() >= self.stall_timeout {
                        return Err(StreamError::connection(format!(
                            "no data from {} for {:.1}s",
                            self.description,
                            self.stall_timeout.as_secs_f32()
                        )));
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    return Err(StreamError::connection(format!(
                        "{}: {err}",
                        self.description
                    )));
                }
            }
        }
    }
    fn is_live(&self) -> bool {
        true
    }
    fn describe(&self) -> String {
        self.description.clone()
    }
}
