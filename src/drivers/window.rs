// src/drivers/window.rs
use std::sync::Arc;
use ndarray::{s, Array2, ArrayView1, Axis};
use crate::drivers::ChannelConfig;
/// Contiguous view over the most recent samples, channel-major.
#[derive(Clone, Debug)]
pub struct Window {
    config: Arc<ChannelConfig>,
    timestamps: Vec<f64>,
    data: Array2<f32>, // channels x samples
    sequence: u64,
}
impl Window {
    /// `data` must be `channels x timestamps.len()`.
    pub fn new(
        config: Arc<ChannelConfig>,
        timestamps: Vec<f64>,
        data: Array2<f32>,
        sequence: u64,
    ) -> Self {
        debug_assert_eq!(data.nrows(), config.channel_count());
        debug_assert_eq!(data.ncols(), timestamps.len());
        Self {
            config,
            timestamps,
            data,
            sequence,
        }
    }
    pub fn config(&self) -> &Arc<ChannelConfig> {
        &self.config
    }
    pub fn sample_rate_hz(&self) -> f32 {
        self.config.sample_rate_hz()
    }
    pub fn labels(&self) -> &[String] {
        self.config.labels()
    }
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
    pub fn num_channels(&self) -> usize {
        self.data.nrows()
    }
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }
    pub fn channel(&self, idx: usize) -> ArrayView1<'_, f32> {
        self.data.row(idx)
    }
    /// Total samples written to the ring when this window was taken.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }
    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 * self.config.sample_period()
    }
    /// Last `n` samples (or all of them when shorter).
    pub fn tail(&self, n: usize) -> Window {
        let start = self.len().saturating_sub(n);
        Window {
            config: Arc::clone(&self.config),
            timestamps: self.timestamps[start..].to_vec(),
            data: self.data.slice(s![.., start..]).to_owned(),
            sequence: self.sequence,
        }
    }
    /// Sum across channels, sample by sample.
    pub fn channel_sum(&self) -> Vec<f32> {
        self.data.sum_axis(Axis(0)).to_vec()
    }
}
