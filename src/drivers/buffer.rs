// src/drivers/buffer.rs
use std::sync::Arc;
use ndarray::Array2;
use parking_lot::RwLock;
use crate::drivers::{ChannelConfig, Sample, StreamError, Window};
/// Counters describing the ring's life so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub capacity: usize,
    pub len: usize,
    pub total_written: u64,
    pub total_overwritten: u64,
}
/// Fixed storage: `capacity` slots of `channels` values plus one timestamp each.
struct Ring {
    channels: usize,
    capacity: usize,
    values: Vec<f32>,
    timestamps: Vec<f64>,
    head: usize, // next slot to write
    len: usize,
    total_written: u64,
    last_timestamp: Option<f64>,
}
impl Ring {
    fn slot(&self, offset_from_oldest: usize) -> usize {
        (self.head + self.capacity - self.len + offset_from_oldest) % self.capacity
    }
}
/// Creates a ring of `capacity` samples with one writer and a clonable reader.
pub fn ring_buffer(
    config: Arc<ChannelConfig>,
    capacity: usize,
) -> Result<(RingWriter, RingReader), StreamError> {
    if capacity == 0 {
        return Err(StreamError::config("ring capacity must be greater than zero"));
    }
    let channels = config.channel_count();
    let ring = Arc::new(RwLock::new(Ring {
        channels,
        capacity,
        values: vec![0.0; capacity * channels],
        timestamps: vec![0.0; capacity],
        head: 0,
        len: 0,
        total_written: 0,
        last_timestamp: None,
    }));
    Ok((
        RingWriter {
            ring: Arc::clone(&ring),
            config: Arc::clone(&config),
        },
        RingReader { ring, config },
    ))
}
/// The single writer. Deliberately not `Clone`.
pub struct RingWriter {
    ring: Arc<RwLock<Ring>>,
    config: Arc<ChannelConfig>,
}
impl RingWriter {
    /// Appends a sample, overwriting the oldest one once the ring is full.
    pub fn push(&mut self, sample: &Sample) -> Result<(), StreamError> {
        let values = sample.values();
        let timestamp = sample.timestamp();
        let mut ring = self.ring.write();
        if values.len() != ring.channels {
            return Err(StreamError::ChannelMismatch {
                expected: ring.channels,
                actual: values.len(),
            });
        }
        if !timestamp.is_finite() {
            return Err(StreamError::format(format!(
                "sample timestamp is not finite ({timestamp})"
            )));
        }
        if let Some(previous) = ring.last_timestamp.filter(|&p| timestamp < p) {
            return Err(StreamError::NonMonotonic {
                previous,
                current: timestamp,
            });
        }
        let head = ring.head;
        let channels = ring.channels;
        ring.values[head * channels..(head + 1) * channels].copy_from_slice(values);
        ring.timestamps[head] = timestamp;
        ring.head = (head + 1) % ring.capacity;
        ring.len = (ring.len + 1).min(ring.capacity);
        ring.total_written += 1;
        ring.last_timestamp = Some(timestamp);
        Ok(())
    }
    pub fn reader(&self) -> RingReader {
        RingReader {
            ring: Arc::clone(&self.ring),
            config: Arc::clone(&self.config),
        }
    }
    pub fn config(&self) -> &Arc<ChannelConfig> {
        &self.config
    }
}
/// Read-only access. Snapshots copy out of the ring under a short read lock.
#[derive(Clone)]
pub struct RingReader {
    ring: Arc<RwLock<Ring>>,
    config: Arc<ChannelConfig>,
}
impl RingReader {
    /// The last `min(window_size, len)` samples, oldest first.
    pub fn snapshot(&self, window_size: usize) -> Window {
        let ring = self.ring.read();
        let n = window_size.min(ring.len);
        let channels = ring.channels;
        let mut data = vec![0.0f32; channels * n];
        let mut timestamps = Vec::with_capacity(n);
        let skip = ring.len - n;
        for i in 0..n {
            let slot = ring.slot(skip + i);
            timestamps.push(ring.timestamps[slot]);
            let row = &ring.values[slot * channels..(slot + 1) * channels];
            for (c, &value) in row.iter().enumerate() {
                data[c * n + i] = value;
            }
        }
        let sequence = ring.total_written;
        drop(ring);
        let data = Array2::from_shape_vec((channels, n), data)
            .unwrap_or_else(|_| Array2::zeros((channels, 0)));
        Window::new(Arc::clone(&self.config), timestamps, data, sequence)
    }
    /// Most recent `seconds` of signal.
    pub fn latest_seconds(&self, seconds: f32) -> Window {
        self.snapshot(self.config.samples_for(seconds))
    }
    /// Total samples ever written. Cheap way to detect new data.
    pub fn total_written(&self) -> u64 {
        self.ring.read().total_written
    }
    pub fn stats(&self) -> BufferStats {
        let ring = self.ring.read();
        BufferStats {
            capacity: ring.capacity,
            len: ring.len,
            total_written: ring.total_written,
            total_overwritten: ring.total_written - ring.len as u64,
        }
    }
    pub fn config(&self) -> &Arc<ChannelConfig> {
        &self.config
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    fn ring(capacity: usize) -> (RingWriter, RingReader) {
        let config = Arc::new(ChannelConfig::numbered(2, 100.0).unwrap());
        ring_buffer(config, capacity).unwrap()
    }
    fn sample(i: usize) -> Sample {
        Sample::new(i as f64 * 0.01, vec![i as f32, -(i as f32)])
    }
    #[test]
    fn latest_seconds_converts_to_samples_and_clamps() {
        let (mut writer, reader) = ring(500);
        for i in 0..200 {
            writer.push(&sample(i)).unwrap();
        }
        let window = reader.latest_seconds(1.5);
        assert_eq!(window.len(), 150);
        assert_eq!(window.channel(0)[0], 50.0);
        assert_eq!(reader.latest_seconds(10.0).len(), 200);
        assert_eq!(reader.latest_seconds(0.0).len(), 0);
    }
    #[test]
    fn keeps_exactly_the_most_recent_capacity_samples() {
        let (mut writer, reader) = ring(5);
        for i in 0..12 {
            writer.push(&sample(i)).unwrap();
        }
        let window = reader.snapshot(100);
        assert_eq!(window.len(), 5);
        assert_eq!(window.channel(0).to_vec(), vec![7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(window.channel(1).to_vec(), vec![-7.0, -8.0, -9.0, -10.0, -11.0]);
        assert_eq!(
            reader.stats(),
            BufferStats {
                capacity: 5,
                len: 5,
                total_written: 12,
                total_overwritten: 7
            }
        );
    }
    #[test]
    fn snapshot_length_is_min_of_request_and_written() {
        let (mut writer, reader) = ring(8);
        assert!(reader.snapshot(4).is_empty());
        for written in 1..=12 {
            writer.push(&sample(written)).unwrap();
            for request in [0, 1, 3, 8, 20] {
                let expected = request.min(written).min(8);
                assert_eq!(reader.snapshot(request).len(), expected);
            }
        }
        let window = reader.snapshot(3);
        assert_eq!(window.channel(0).to_vec(), vec![10.0, 11.0, 12.0]);
        assert_eq!(window.sequence(), 12);
    }
    #[test]
    fn rejects_backwards_time_and_wrong_width() {
        let (mut writer, reader) = ring(4);
        writer.push(&Sample::new(1.0, vec![0.0, 0.0])).unwrap();
        writer.push(&Sample::new(1.0, vec![0.0, 0.0])).unwrap();
        assert!(matches!(
            writer.push(&Sample::new(0.5, vec![0.0, 0.0])),
            Err(StreamError::NonMonotonic { .. })
        ));
        assert!(matches!(
            writer.push(&Sample::new(2.0, vec![0.0])),
            Err(StreamError::ChannelMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert_eq!(reader.stats().total_written, 2);
    }
    #[test]
    fn zero_capacity_is_a_configuration_error() {
        let config = Arc::new(ChannelConfig::numbered(1, 10.0).unwrap());
        assert!(matches!(
            ring_buffer(config, 0),
            Err(StreamError::Configuration(_))
        ));
    }
    #[test]
    fn concurrent_snapshots_stay_ordered() {
        let (mut writer, reader) = ring(64);
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let reader = reader.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let window = reader.snapshot(32);
                        let ts = window.timestamps();
                        assert!(ts.windows(2).all(|p| p[0] <= p[1]));
                        let values = window.channel(0).to_vec();
                        assert!(values.windows(2).all(|p| p[1] == p[0] + 1.0));
                    }
                })
            })
            .collect();
        for i in 0..5000 {
            writer.push(&sample(i)).unwrap();
        }
        for handle in readers {
            handle.join().unwrap();
        }
        assert_eq!(reader.snapshot(1).channel(0)[0], 4999.0);
    }
}
