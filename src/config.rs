// src/config.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::drivers::filter::FilterSettings;
use crate::drivers::spectrum::SpectrumBuilder;
use crate::drivers::{ChannelConfig, StreamError};
const MAX_BUTTER_ORDER: usize = 8;
/// Session settings, stored as JSON with upper-case keys.
///
/// Missing keys take their defaults and keys this version does not know are
/// kept in `extra`, so a round-trip through [`Settings::save`] never drops them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    /// Ring capacity in samples.
    pub data_length: usize,
    /// Waveform window in samples.
    pub plot_length: usize,
    /// Spectrum and band-power window in samples.
    pub fft_length: usize,
    pub fft_freq_min: f32,
    pub fft_freq_max: f32,
    /// Monitor refresh period in milliseconds.
    pub update_interval: u64,
    pub sample_rate: f32,
    pub notch_freq: f32,
    pub quality_factor: f32,
    pub bandpass_lo: f32,
    pub bandpass_hi: f32,
    pub butter_order: usize,
    /// Default epoch length in seconds.
    pub record_length: f32,
    pub channel_names: Vec<String>,
    pub scale: f32,
    pub unit: String,
    pub baud_rate: u32,
    pub filters_enabled: bool,
    pub max_frame_errors: usize,
    /// Seconds without a byte before a live link counts as lost.
    pub stall_timeout: f32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            data_length: 30_000,
            plot_length: 2_000,
            fft_length: 120,
            fft_freq_min: 3.0,
            fft_freq_max: 50.0,
            update_interval: 40,
            sample_rate: 500.0,
            notch_freq: 60.0,
            quality_factor: 30.0,
            bandpass_lo: 4.0,
            bandpass_hi: 60.0,
            butter_order: 4,
            record_length: 5.0,
            channel_names: (1..=9).map(|i| format!("CH{i}")).collect(),
            scale: 1.0,
            unit: "uV".to_string(),
            baud_rate: 115_200,
            filters_enabled: true,
            max_frame_errors: 16,
            stall_timeout: 5.0,
            extra: BTreeMap::new(),
        }
    }
}
impl Settings {
    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("{} not found, using default settings", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&text).map_err(|err| {
            StreamError::config(format!("{}: {err}", path.display()))
        })?;
        settings.validate()?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StreamError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
    pub fn to_json(&self) -> Result<String, StreamError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    pub fn validate(&self) -> Result<(), StreamError> {
        let positive = |name: &str, value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(StreamError::config(format!(
                    "{name} must be a positive number, got {value}"
                )))
            }
        };
        positive("SAMPLE_RATE", self.sample_rate)?;
        positive("RECORD_LENGTH", self.record_length)?;
        positive("STALL_TIMEOUT", self.stall_timeout)?;
        if self.data_length == 0 {
            return Err(StreamError::config("DATA_LENGTH must be greater than zero"));
        }
        if self.plot_length == 0 || self.plot_length > self.data_length {
            return Err(StreamError::config(format!(
                "PLOT_LENGTH must be in 1..={} (DATA_LENGTH), got {}",
                self.data_length, self.plot_length
            )));
        }
        if self.fft_length < 2 || self.fft_length > self.data_length {
            return Err(StreamError::config(format!(
                "FFT_LENGTH must be in 2..={} (DATA_LENGTH), got {}",
                self.data_length, self.fft_length
            )));
        }
        if !self.fft_freq_min.is_finite()
            || !self.fft_freq_max.is_finite()
            || self.fft_freq_min.min(self.fft_freq_max) < 0.0
        {
            return Err(StreamError::config(
                "FFT_FREQ_MIN and FFT_FREQ_MAX must be non-negative",
            ));
        }
        if self.update_interval == 0 {
            return Err(StreamError::config("UPDATE_INTERVAL must be greater than zero"));
        }
        if self.baud_rate == 0 {
            return Err(StreamError::config("BAUD_RATE must be greater than zero"));
        }
        if self.filters_enabled {
            self.validate_filters()?;
        }
        self.channel_config().map(|_| ())
    }
    fn validate_filters(&self) -> Result<(), StreamError> {
        let nyquist = self.sample_rate / 2.0;
        if !(1..=MAX_BUTTER_ORDER).contains(&self.butter_order) {
            return Err(StreamError::config(format!(
                "BUTTER_ORDER must be in 1..={MAX_BUTTER_ORDER}, got {}",
                self.butter_order
            )));
        }
        if !(self.quality_factor.is_finite() && self.quality_factor > 0.0) {
            return Err(StreamError::config("QUALITY_FACTOR must be positive"));
        }
        for (name, value) in [
            ("NOTCH_FREQ", self.notch_freq),
            ("BANDPASS_LO", self.bandpass_lo),
            ("BANDPASS_HI", self.bandpass_hi),
        ] {
            if !value.is_finite() || value < 0.0 || value >= nyquist {
                return Err(StreamError::config(format!(
                    "{name} must be in [0, {nyquist}) Hz for SAMPLE_RATE {}, got {value}",
                    self.sample_rate
                )));
            }
        }
        if self.bandpass_lo >= self.bandpass_hi {
            return Err(StreamError::config(format!(
                "BANDPASS_LO ({}) must be below BANDPASS_HI ({})",
                self.bandpass_lo, self.bandpass_hi
            )));
        }
        Ok(())
    }
    pub fn channel_config(&self) -> Result<ChannelConfig, StreamError> {
        ChannelConfig::new(self.channel_names.clone(), self.sample_rate)?
            .with_scale(self.scale, self.unit.as_str())
    }
    /// `None` when online filtering is switched off. A zero frequency disables
    /// that stage.
    pub fn filter_settings(&self) -> Option<FilterSettings> {
        if !self.filters_enabled {
            return None;
        }
        let stage = |hz: f32| (hz > 0.0).then_some(hz);
        Some(FilterSettings {
            notch_hz: stage(self.notch_freq),
            notch_q: self.quality_factor,
            highpass_hz: stage(self.bandpass_lo),
            lowpass_hz: stage(self.bandpass_hi),
            order: self.butter_order,
        })
    }
    pub fn spectrum_builder(&self) -> SpectrumBuilder {
        SpectrumBuilder::with_size(self.fft_length).with_range(self.fft_freq_min, self.fft_freq_max)
    }
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval)
    }
    pub fn stall_timeout(&self) -> Duration {
        Duration::try_from_secs_f32(self.stall_timeout).unwrap_or(Duration::from_secs(5))
    }
}
