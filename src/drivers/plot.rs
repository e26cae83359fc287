// src/drivers/plot.rs
use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;
use crate::drivers::spectrum::{FeatureSet, FrequencySpectrum};
use crate::drivers::{StreamError, Window};
// Charts carry no captions, axis labels or legends: the bitmap backend is built
// without a font renderer.
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub ruler: RGBColor,
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            ruler: RGBColor(60, 60, 60),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
        }
    }
}
impl PlotStyle {
    fn color(&self, idx: usize) -> RGBColor {
        self.palette
            .get(idx % self.palette.len().max(1))
            .copied()
            .unwrap_or(WHITE)
    }
    fn canvas(&self) -> Vec<u8> {
        vec![0u8; (self.width * self.height * 3) as usize]
    }
}
/// One lane per channel, first channel on top, x axis in seconds with a ruler
/// at every whole second.
pub fn render_waveform_png(window: &Window, style: &PlotStyle) -> Result<Vec<u8>, StreamError> {
    if window.is_empty() {
        return Err(StreamError::Plot("window has no samples".into()));
    }
    let timestamps = window.timestamps();
    let t0 = timestamps[0];
    let mut t1 = timestamps[timestamps.len() - 1];
    if t1 <= t0 {
        t1 = t0 + window.config().sample_period();
    }
    let lanes = window.num_channels();
    let peak = window
        .data()
        .iter()
        .fold(0.0f32, |acc, v| acc.max(v.abs()));
    let gain = if peak > f32::EPSILON { 0.45 / peak as f64 } else { 0.0 };
    let mut buffer = style.canvas();
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(t0..t1, -0.5f64..lanes as f64 - 0.5)?;
        let first_second = t0.ceil() as i64;
        let last_second = t1.floor() as i64;
        chart.draw_series((first_second..=last_second).map(|s| {
            PathElement::new(
                vec![(s as f64, -0.5), (s as f64, lanes as f64 - 0.5)],
                style.ruler,
            )
        }))?;
        for c in 0..lanes {
            let center = (lanes - 1 - c) as f64;
            let color = style.color(c);
            let channel = window.channel(c);
            let series = timestamps
                .iter()
                .zip(channel.iter())
                .map(|(&t, &v)| (t, center + v as f64 * gain));
            chart.draw_series(LineSeries::new(series, &color))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
pub fn render_spectrum_png(
    spectrum: &FrequencySpectrum,
    style: &PlotStyle,
) -> Result<Vec<u8>, StreamError> {
    if spectrum.magnitudes.is_empty() || spectrum.frequencies_hz.is_empty() {
        return Err(StreamError::Plot("spectrum has no magnitudes".into()));
    }
    let f_min = spectrum.frequencies_hz[0];
    let mut f_max = spectrum.frequencies_hz[spectrum.frequencies_hz.len() - 1];
    if f_max <= f_min {
        f_max = f_min + 1.0;
    }
    let m_max = spectrum
        .magnitudes
        .iter()
        .flat_map(|c| c.iter().copied())
        .fold(0.0f32, f32::max)
        .max(1e-3);
    let mut buffer = style.canvas();
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(f_min..f_max, 0f32..m_max)?;
        for (idx, mags) in spectrum.magnitudes.iter().enumerate() {
            let color = style.color(idx);
            let series = spectrum
                .frequencies_hz
                .iter()
                .copied()
                .zip(mags.iter().copied());
            chart.draw_series(LineSeries::new(series, &color))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
/// Relative band power of the channel sum, one bar per band.
pub fn render_band_power_png(
    features: &FeatureSet,
    style: &PlotStyle,
) -> Result<Vec<u8>, StreamError> {
    let relative = &features.combined.relative;
    if relative.is_empty() {
        return Err(StreamError::Plot("no bands to draw".into()));
    }
    let mut buffer = style.canvas();
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(0f64..relative.len() as f64, 0f64..1.0)?;
        chart.draw_series(relative.iter().enumerate().map(|(i, &power)| {
            let x = i as f64;
            Rectangle::new(
                [(x + 0.15, 0.0), (x + 0.85, power.clamp(0.0, 1.0))],
                style.color(i).filled(),
            )
        }))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, StreamError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| StreamError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
