// src/drivers/filter.rs
use std::f64::consts::PI;
use crate::drivers::{ChannelConfig, Sample, StreamError};
/// Online preprocessing applied to every channel before samples reach the ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterSettings {
    pub notch_hz: Option<f32>,
    pub notch_q: f32,
    pub highpass_hz: Option<f32>,
    pub lowpass_hz: Option<f32>,
    pub order: usize,
}
impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            notch_hz: Some(60.0),
            notch_q: 30.0,
            highpass_hz: Some(4.0),
            lowpass_hz: Some(60.0),
            order: 4,
        }
    }
}
#[derive(Clone, Copy, Debug)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}
impl BiquadCoeffs {
    /// Gain at 0 Hz.
    fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a1 + self.a2;
        if den.abs() < 1e-12 {
            0.0
        } else {
            (self.b0 + self.b1 + self.b2) / den
        }
    }
}
#[derive(Clone, Copy, Debug)]
struct BiquadFilter {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}
impl BiquadFilter {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }
    /// Loads the state the section would hold after an endless run of `input`.
    fn prime(&mut self, input: f64) {
        let c = self.coeffs;
        let y = c.dc_gain() * input;
        self.z1 = y - c.b0 * input;
        self.z2 = c.b2 * input - c.a2 * y;
    }
    fn process(&mut self, input: f64) -> f64 {
        // Transposed direct form II
        let c = self.coeffs;
        let y = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * y + self.z2;
        self.z2 = c.b2 * input - c.a2 * y;
        y
    }
}
/// Cascade of biquad sections for a single channel.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    sections: Vec<BiquadFilter>,
    primed: bool,
}
impl FilterChain {
    pub fn new(sample_rate_hz: f32, settings: &FilterSettings) -> Self {
        let fs = sample_rate_hz as f64;
        let nyquist = fs * 0.5;
        let usable = |f: Option<f32>| {
            f.map(f64::from)
                .filter(|&f| f.is_finite() && f > 0.0 && f < nyquist)
        };
        let order = settings.order.max(1);
        let mut sections = Vec::new();
        if let Some(f0) = usable(settings.notch_hz) {
            sections.push(BiquadFilter::new(notch(f0, fs, settings.notch_q as f64)));
        }
        if let Some(fc) = usable(settings.highpass_hz) {
            sections.extend(butterworth(order, fc, fs, Pass::High));
        }
        if let Some(fc) = usable(settings.lowpass_hz) {
            sections.extend(butterworth(order, fc, fs, Pass::Low));
        }
        Self {
            sections,
            primed: false,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
    pub fn len(&self) -> usize {
        self.sections.len()
    }
    pub fn process_sample(&mut self, value: f32) -> f32 {
        let mut value = value as f64;
        let prime = !self.primed;
        self.primed = true;
        for section in &mut self.sections {
            if prime {
                section.prime(value);
            }
            value = section.process(value);
        }
        value as f32
    }
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.z1 = 0.0;
            section.z2 = 0.0;
        }
        self.primed = false;
    }
}
/// One [`FilterChain`] per channel.
#[derive(Clone, Debug)]
pub struct ChannelFilters {
    chains: Vec<FilterChain>,
}
impl ChannelFilters {
    pub fn new(config: &ChannelConfig, settings: &FilterSettings) -> Self {
        let chain = FilterChain::new(config.sample_rate_hz(), settings);
        if chain.is_empty() {
            log::warn!(
                "all filter stages are at or above Nyquist ({} Hz), signal passes unfiltered",
                config.sample_rate_hz() / 2.0
            );
        } else {
            log::debug!("filter chain: {} sections per channel", chain.len());
        }
        Self {
            chains: vec![chain; config.channel_count()],
        }
    }
    pub fn process(&mut self, sample: &Sample) -> Result<Sample, StreamError> {
        if sample.num_channels() != self.chains.len() {
            return Err(StreamError::ChannelMismatch {
                expected: self.chains.len(),
                actual: sample.num_channels(),
            });
        }
        let values: Vec<f32> = self
            .chains
            .iter_mut()
            .zip(sample.values())
            .map(|(chain, &v)| chain.process_sample(v))
            .collect();
        Ok(Sample::new(sample.timestamp(), values))
    }
    pub fn reset(&mut self) {
        self.chains.iter_mut().for_each(FilterChain::reset);
    }
}
#[derive(Clone, Copy)]
enum Pass {
    Low,
    High,
}
/// Butterworth of `order` as cascaded second-order sections, plus a first-order
/// section when the order is odd.
fn butterworth(order: usize, cutoff_hz: f64, fs: f64, pass: Pass) -> Vec<BiquadFilter> {
    let mut sections = Vec::with_capacity(order / 2 + 1);
    for k in 0..order / 2 {
        let q = 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * order) as f64).sin());
        let coeffs = match pass {
            Pass::Low => lowpass(cutoff_hz, fs, q),
            Pass::High => highpass(cutoff_hz, fs, q),
        };
        sections.push(BiquadFilter::new(coeffs));
    }
    if order % 2 == 1 {
        sections.push(BiquadFilter::new(first_order(cutoff_hz, fs, pass)));
    }
    sections
}
fn first_order(cutoff_hz: f64, fs: f64, pass: Pass) -> BiquadCoeffs {
    let k = (PI * cutoff_hz / fs).tan();
    let norm = 1.0 / (1.0 + k);
    let (b0, b1) = match pass {
        Pass::Low => (k * norm, k * norm),
        Pass::High => (norm, -norm),
    };
    BiquadCoeffs {
        b0,
        b1,
        b2: 0.0,
        a1: (k - 1.0) * norm,
        a2: 0.0,
    }
}
fn lowpass(freq_hz: f64, fs: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / fs;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn highpass(freq_hz: f64, fs: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / fs;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 + cos_w0) * 0.5;
    let b1 = -(1.0 + cos_w0);
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn notch(center_hz: f64, fs: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * center_hz / fs;
    let alpha = w0.sin() / (2.0 * q.max(1e-3));
    let cos_w0 = w0.cos();
    let b0 = 1.0;
    let b1 = -2.0 * cos_w0;
    let b2 = 1.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    const FS: f32 = 500.0;
    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / FS).sin())
            .collect()
    }
    fn peak(chain: &mut FilterChain, input: &[f32], settle: usize) -> f32 {
        input
            .iter()
            .map(|&v| chain.process_sample(v))
            .skip(settle)
            .fold(0.0f32, |acc, v| acc.max(v.abs()))
    }
    fn only(notch: Option<f32>, hp: Option<f32>, lp: Option<f32>) -> FilterSettings {
        FilterSettings {
            notch_hz: notch,
            notch_q: 30.0,
            highpass_hz: hp,
            lowpass_hz: lp,
            order: 4,
        }
    }
    #[test]
    fn notch_attenuates_mains() {
        let mut chain = FilterChain::new(FS, &only(Some(60.0), None, None));
        assert!(peak(&mut chain, &sine(60.0, 2000), 1000) < 0.05);
        let mut chain = FilterChain::new(FS, &only(Some(60.0), None, None));
        assert!(peak(&mut chain, &sine(20.0, 2000), 1000) > 0.95);
    }
    #[test]
    fn lowpass_passes_dc_from_the_first_sample() {
        let mut chain = FilterChain::new(FS, &only(None, None, Some(40.0)));
        for _ in 0..500 {
            assert!((chain.process_sample(10.0) - 10.0).abs() < 1e-3);
        }
    }
    #[test]
    fn highpass_removes_electrode_offset() {
        let mut chain = FilterChain::new(FS, &only(None, Some(4.0), None));
        for _ in 0..500 {
            assert!(chain.process_sample(100.0).abs() < 1e-3);
        }
    }
    #[test]
    fn default_chain_keeps_alpha_band() {
        let mut chain = FilterChain::new(FS, &FilterSettings::default());
        let amplitude = peak(&mut chain, &sine(10.0, 3000), 1500);
        assert!((0.9..1.1).contains(&amplitude), "{amplitude}");
    }
    #[test]
    fn stages_at_or_above_nyquist_are_skipped() {
        // notch 60 and low-pass 60 are out of reach at 100 Hz
        let chain = FilterChain::new(100.0, &FilterSettings::default());
        assert_eq!(chain.len(), 2);
        let odd = FilterSettings {
            order: 3,
            ..FilterSettings::default()
        };
        assert_eq!(FilterChain::new(FS, &odd).len(), 1 + 2 + 2);
    }
    #[test]
    fn channel_filters_check_width() {
        let config = ChannelConfig::numbered(2, FS).unwrap();
        let mut filters = ChannelFilters::new(&config, &only(None, None, Some(40.0)));
        let out = filters.process(&Sample::new(0.5, vec![3.0, -3.0])).unwrap();
        assert_eq!(out.timestamp(), 0.5);
        assert!((out.values()[0] - 3.0).abs() < 1e-4);
        assert!(filters.process(&Sample::new(0.6, vec![1.0])).is_err());
    }
}
