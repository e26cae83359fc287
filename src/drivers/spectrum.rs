// src/drivers/spectrum.rs
use std::f64::consts::PI;
use std::sync::Arc;
use rustfft::num_complex::{Complex, Complex32};
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use crate::drivers::Window;
const WELCH_MAX_SEGMENT: usize = 256;
/// Magnitude spectrum for each channel.
#[derive(Clone, Debug)]
pub struct FrequencySpectrum {
    pub sample_rate_hz: f32,
    pub frequencies_hz: Vec<f32>,
    pub magnitudes: Vec<Vec<f32>>, // channel -> bins
    pub channel_labels: Vec<String>,
}
impl FrequencySpectrum {
    /// Frequency of the strongest bin of `channel`.
    pub fn peak_frequency(&self, channel: usize) -> Option<f32> {
        let mags = self.magnitudes.get(channel)?;
        mags.iter()
            .zip(&self.frequencies_hz)
            .max_by(|a, b| a.0.total_cmp(b.0))
            .map(|(_, &f)| f)
    }
}
/// Computes `|rfft(x, n)|` over the newest `n` samples, masked to a frequency range.
pub struct SpectrumBuilder {
    fft_size: usize,
    min_hz: f32,
    max_hz: f32,
    fft: Arc<dyn Fft<f32>>,
}
impl SpectrumBuilder {
    pub fn with_size(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Self {
            fft_size,
            min_hz: 0.0,
            max_hz: f32::INFINITY,
            fft,
        }
    }
    /// Bounds are swapped when given in reverse.
    pub fn with_range(mut self, min_hz: f32, max_hz: f32) -> Self {
        self.min_hz = min_hz.min(max_hz);
        self.max_hz = min_hz.max(max_hz);
        self
    }
    pub fn size(&self) -> usize {
        self.fft_size
    }
    pub fn compute(&self, window: &Window) -> FrequencySpectrum {
        let n = self.fft_size;
        let rate = window.sample_rate_hz();
        let bins: Vec<usize> = (0..=n / 2)
            .filter(|&k| {
                let f = k as f32 * rate / n as f32;
                f >= self.min_hz && f <= self.max_hz
            })
            .collect();
        let frequencies_hz = bins.iter().map(|&k| k as f32 * rate / n as f32).collect();
        let start = window.len().saturating_sub(n);
        let magnitudes = (0..window.num_channels())
            .map(|c| {
                let channel = window.channel(c);
                let mut buffer: Vec<Complex32> = channel
                    .iter()
                    .skip(start)
                    .map(|&v| Complex32::new(v, 0.0))
                    .collect();
                buffer.resize(n, Complex32::new(0.0, 0.0));
                self.fft.process(&mut buffer);
                bins.iter().map(|&k| buffer[k].norm()).collect()
            })
            .collect();
        FrequencySpectrum {
            sample_rate_hz: rate,
            frequencies_hz,
            magnitudes,
            channel_labels: window.labels().to_vec(),
        }
    }
}
/// One-sided power spectral density.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Psd {
    pub frequencies_hz: Vec<f64>,
    pub density: Vec<f64>,
    pub resolution_hz: f64,
}
/// Welch estimate: Hann segments of `min(256, n)` samples with half overlap,
/// mean removed per segment, density scaling, segments averaged.
pub fn welch_psd(signal: &[f32], sample_rate_hz: f32) -> Psd {
    let n = signal.len();
    let fs = sample_rate_hz as f64;
    if n < 2 || fs <= 0.0 {
        return Psd::default();
    }
    let nperseg = n.min(WELCH_MAX_SEGMENT);
    let noverlap = nperseg / 2;
    let step = nperseg - noverlap;
    let segments = (n - noverlap) / step;
    let hann: Vec<f64> = (0..nperseg)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / nperseg as f64).cos())
        .collect();
    let scale = 1.0 / (fs * hann.iter().map(|w| w * w).sum::<f64>());
    let fft = FftPlanner::<f64>::new().plan_fft_forward(nperseg);
    let bins = nperseg / 2 + 1;
    let mut density = vec![0.0f64; bins];
    let mut buffer = vec![Complex::new(0.0f64, 0.0); nperseg];
    for s in 0..segments {
        let segment = &signal[s * step..s * step + nperseg];
        let mean = segment.iter().map(|&v| v as f64).sum::<f64>() / nperseg as f64;
        for ((slot, &v), w) in buffer.iter_mut().zip(segment).zip(&hann) {
            *slot = Complex::new((v as f64 - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, c) in density.iter_mut().zip(&buffer) {
            *acc += c.norm_sqr() * scale;
        }
    }
    let last_doubled = if nperseg % 2 == 0 { bins - 1 } else { bins };
    for (k, value) in density.iter_mut().enumerate() {
        *value /= segments as f64;
        if k > 0 && k < last_doubled {
            *value *= 2.0;
        }
    }
    let resolution_hz = fs / nperseg as f64;
    Psd {
        frequencies_hz: (0..bins).map(|k| k as f64 * resolution_hz).collect(),
        density,
        resolution_hz,
    }
}
fn trapezoid(values: &[f64], dx: f64) -> f64 {
    values.windows(2).map(|p| (p[0] + p[1]) * 0.5 * dx).sum()
}
/// Integrated PSD over `[low_hz, high_hz]`, optionally divided by total power.
pub fn band_power(psd: &Psd, low_hz: f64, high_hz: f64, relative: bool) -> f64 {
    let selected: Vec<f64> = psd
        .frequencies_hz
        .iter()
        .zip(&psd.density)
        .filter(|(&f, _)| f >= low_hz && f <= high_hz)
        .map(|(_, &p)| p)
        .collect();
    let power = trapezoid(&selected, psd.resolution_hz);
    if !relative {
        return power;
    }
    let total = trapezoid(&psd.density, psd.resolution_hz);
    if total > 0.0 {
        power / total
    } else {
        0.0
    }
}
/// Root mean square amplitude.
pub fn vrms(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|&v| (v as f64) * (v as f64)).sum();
    (sum / values.len() as f64).sqrt() as f32
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub low_hz: f64,
    pub high_hz: f64,
}
impl Band {
    pub fn new(name: impl Into<String>, low_hz: f64, high_hz: f64) -> Self {
        Self {
            name: name.into(),
            low_hz,
            high_hz,
        }
    }
}
/// Classic EEG rhythms.
pub fn default_bands() -> Vec<Band> {
    vec![
        Band::new("Delta", 0.5, 4.0),
        Band::new("Theta", 4.0, 8.0),
        Band::new("Alpha", 8.0, 12.0),
        Band::new("Beta1", 12.0, 18.0),
        Band::new("Beta2", 18.0, 30.0),
        Band::new("Gamma", 30.0, 45.0),
    ]
}
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureParams {
    pub bands: Vec<Band>,
}
impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelFeatures {
    pub label: String,
    pub vrms: f32,
    pub absolute: Vec<f64>,
    pub relative: Vec<f64>,
}
impl ChannelFeatures {
    fn compute(label: String, values: &[f32], sample_rate_hz: f32, bands: &[Band]) -> Self {
        let psd = welch_psd(values, sample_rate_hz);
        let (absolute, relative) = bands
            .iter()
            .map(|b| {
                (
                    band_power(&psd, b.low_hz, b.high_hz, false),
                    band_power(&psd, b.low_hz, b.high_hz, true),
                )
            })
            .unzip();
        Self {
            label,
            vrms: vrms(values),
            absolute,
            relative,
        }
    }
}
/// Features of one window: one entry per channel plus the channel sum.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSet {
    pub timestamp: f64,
    pub bands: Vec<Band>,
    pub channels: Vec<ChannelFeatures>,
    pub combined: ChannelFeatures,
}
pub fn extract_features(window: &Window, params: &FeatureParams) -> FeatureSet {
    let rate = window.sample_rate_hz();
    let channels = (0..window.num_channels())
        .map(|c| {
            let values = window.channel(c).to_vec();
            ChannelFeatures::compute(window.labels()[c].clone(), &values, rate, &params.bands)
        })
        .collect();
    let combined = ChannelFeatures::compute(
        "combined".to_string(),
        &window.channel_sum(),
        rate,
        &params.bands,
    );
    FeatureSet {
        timestamp: window.latest_timestamp().unwrap_or(0.0),
        bands: params.bands.clone(),
        channels,
        combined,
    }
}
