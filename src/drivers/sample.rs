// src/drivers/sample.rs
use std::collections::HashSet;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::drivers::StreamError;
/// One multi-channel reading. Values are already in physical units.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    timestamp: f64,
    values: Arc<[f32]>,
}
impl Sample {
    pub fn new(timestamp: f64, values: impl Into<Arc<[f32]>>) -> Self {
        Self {
            timestamp,
            values: values.into(),
        }
    }
    /// Seconds since the start of the session.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }
    pub fn values(&self) -> &[f32] {
        &self.values
    }
    pub fn num_channels(&self) -> usize {
        self.values.len()
    }
    /// Same values, shifted in time. Used when a replay loops.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            timestamp: self.timestamp + offset,
            values: Arc::clone(&self.values),
        }
    }
}
/// Channel layout of a session. Built once, then shared read-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    labels: Vec<String>,
    sample_rate_hz: f32,
    scale: f32,
    unit: String,
}
impl ChannelConfig {
    pub fn new(labels: Vec<String>, sample_rate_hz: f32) -> Result<Self, StreamError> {
        let config = Self {
            labels,
            sample_rate_hz,
            scale: 1.0,
            unit: "uV".to_string(),
        };
        config.validate()?;
        Ok(config)
    }
    /// `CH1..CHn`, as the acquisition board labels them.
    pub fn numbered(count: usize, sample_rate_hz: f32) -> Result<Self, StreamError> {
        Self::new(
            (1..=count).map(|i| format!("CH{i}")).collect(),
            sample_rate_hz,
        )
    }
    pub fn with_scale(mut self, scale: f32, unit: impl Into<String>) -> Result<Self, StreamError> {
        self.scale = scale;
        self.unit = unit.into();
        self.validate()?;
        Ok(self)
    }
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.labels.is_empty() {
            return Err(StreamError::config("at least one channel is required"));
        }
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(StreamError::config(format!(
                "sample rate must be a positive number, got {}",
                self.sample_rate_hz
            )));
        }
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(StreamError::config(format!(
                "unit scale must be finite and non-zero, got {}",
                self.scale
            )));
        }
        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.trim().is_empty() {
                return Err(StreamError::config("channel labels must not be empty"));
            }
            if !seen.insert(label.as_str()) {
                return Err(StreamError::config(format!(
                    "duplicate channel label '{label}'"
                )));
            }
        }
        Ok(())
    }
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
    pub fn channel_count(&self) -> usize {
        self.labels.len()
    }
    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }
    pub fn sample_period(&self) -> f64 {
        1.0 / self.sample_rate_hz as f64
    }
    pub fn scale(&self) -> f32 {
        self.scale
    }
    pub fn unit(&self) -> &str {
        &self.unit
    }
    /// Number of samples covering `seconds` at this rate, rounded up.
    pub fn samples_for(&self, seconds: f32) -> usize {
        (self.sample_rate_hz * seconds.max(0.0)).ceil() as usize
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn numbered_config_uses_board_labels() {
        let config = ChannelConfig::numbered(3, 250.0).unwrap();
        assert_eq!(config.labels(), &["CH1", "CH2", "CH3"]);
        assert_eq!(config.samples_for(1.5), 375);
        assert!((config.sample_period() - 0.004).abs() < 1e-12);
    }
    #[test]
    fn invalid_configs_are_rejected() {
        assert!(ChannelConfig::new(vec![], 250.0).is_err());
        assert!(ChannelConfig::numbered(2, 0.0).is_err());
        assert!(ChannelConfig::numbered(2, f32::NAN).is_err());
        assert!(ChannelConfig::new(vec!["A".into(), "A".into()], 250.0).is_err());
        assert!(ChannelConfig::numbered(2, 250.0)
            .unwrap()
            .with_scale(0.0, "uV")
            .is_err());
    }
    #[test]
    fn shifted_sample_keeps_values() {
        let sample = Sample::new(1.0, vec![1.0, 2.0]);
        let moved = sample.shifted(2.5);
        assert_eq!(moved.timestamp(), 3.5);
        assert_eq!(moved.values(), sample.values());
    }
}
