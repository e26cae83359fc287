// src/drivers/sink.rs
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::drivers::plot::{
    render_band_power_png, render_spectrum_png, render_waveform_png, PlotStyle,
};
use crate::drivers::spectrum::{extract_features, ChannelFeatures, FeatureParams, SpectrumBuilder};
use crate::drivers::{StreamError, Window};
/// Consumer of ring snapshots. Each sink asks for its own window length.
pub trait WindowSink: Send {
    fn name(&self) -> &str;
    fn window_len(&self) -> usize;
    /// `timestamp` is the timestamp of the newest sample in `window`.
    fn accept(&mut self, window: &Window, timestamp: f64) -> Result<(), StreamError>;
    fn finish(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}
/// Writes `waveform.png`, `spectrum.png` and `bandpower.png` into a directory.
pub struct PlotRenderer {
    dir: PathBuf,
    style: PlotStyle,
    window_len: usize,
    spectrum: SpectrumBuilder,
    features: FeatureParams,
    every: u64,
    accepted: u64,
    rendered: u64,
    spectrum_skipped: bool,
}
impl PlotRenderer {
    pub fn new(
        dir: impl Into<PathBuf>,
        window_len: usize,
        spectrum: SpectrumBuilder,
        features: FeatureParams,
    ) -> Result<Self, StreamError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            style: PlotStyle::default(),
            window_len: window_len.max(1),
            spectrum,
            features,
            every: 1,
            accepted: 0,
            rendered: 0,
            spectrum_skipped: false,
        })
    }
    /// Render on every `n`th accepted window only.
    pub fn every(mut self, n: u64) -> Self {
        self.every = n.max(1);
        self
    }
    pub fn rendered(&self) -> u64 {
        self.rendered
    }
    pub fn dir(&self) -> &Path {
        &self.dir
    }
    fn render(&mut self, window: &Window) -> Result<(), StreamError> {
        let waveform = render_waveform_png(window, &self.style)?;
        fs::write(self.dir.join("waveform.png"), waveform)?;
        let spectrum = self.spectrum.compute(window);
        if spectrum.frequencies_hz.is_empty() {
            if !self.spectrum_skipped {
                log::warn!(
                    "no spectrum bins inside the frequency range at {} Hz, skipping spectrum.png",
                    window.sample_rate_hz()
                );
                self.spectrum_skipped = true;
            }
        } else {
            fs::write(
                self.dir.join("spectrum.png"),
                render_spectrum_png(&spectrum, &self.style)?,
            )?;
        }
        let features = extract_features(&window.tail(self.spectrum.size()), &self.features);
        fs::write(
            self.dir.join("bandpower.png"),
            render_band_power_png(&features, &self.style)?,
        )?;
        self.rendered += 1;
        Ok(())
    }
}
impl WindowSink for PlotRenderer {
    fn name(&self) -> &str {
        "plots"
    }
    fn window_len(&self) -> usize {
        self.window_len
    }
    fn accept(&mut self, window: &Window, timestamp: f64) -> Result<(), StreamError> {
        self.accepted += 1;
        if (self.accepted - 1) % self.every != 0 {
            return Ok(());
        }
        log::trace!("rendering plots at t={timestamp:.3}s");
        self.render(window)
    }
}
/// Band-power features as CSV rows, one per channel plus the channel sum.
pub struct FeatureExporter<W: Write + Send> {
    writer: csv::Writer<W>,
    params: FeatureParams,
    window_len: usize,
    header_written: bool,
    rows: u64,
}
impl FeatureExporter<File> {
    pub fn create(
        path: impl AsRef<Path>,
        window_len: usize,
        params: FeatureParams,
    ) -> Result<Self, StreamError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self::new(File::create(path)?, window_len, params))
    }
}
impl<W: Write + Send> FeatureExporter<W> {
    pub fn new(writer: W, window_len: usize, params: FeatureParams) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            params,
            window_len: window_len.max(2),
            header_written: false,
            rows: 0,
        }
    }
    pub fn rows(&self) -> u64 {
        self.rows
    }
    pub fn into_inner(self) -> Result<W, StreamError> {
        self.writer
            .into_inner()
            .map_err(|err| StreamError::Io(err.into_error()))
    }
    fn write_header(&mut self) -> Result<(), StreamError> {
        let mut header = vec!["timestamp".to_string(), "channel".into(), "vrms".into()];
        header.extend(self.params.bands.iter().map(|b| b.name.clone()));
        header.extend(self.params.bands.iter().map(|b| format!("{}_rel", b.name)));
        self.writer.write_record(&header)?;
        self.header_written = true;
        Ok(())
    }
    fn write_row(&mut self, timestamp: f64, row: &ChannelFeatures) -> Result<(), StreamError> {
        let mut record = vec![
            format!("{timestamp:.6}"),
            row.label.clone(),
            row.vrms.to_string(),
        ];
        record.extend(row.absolute.iter().map(f64::to_string));
        record.extend(row.relative.iter().map(f64::to_string));
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }
}
impl<W: Write + Send> WindowSink for FeatureExporter<W> {
    fn name(&self) -> &str {
        "features"
    }
    fn window_len(&self) -> usize {
        self.window_len
    }
    fn accept(&mut self, window: &Window, timestamp: f64) -> Result<(), StreamError> {
        if !self.header_written {
            self.write_header()?;
        }
        let features = extract_features(window, &self.params);
        for row in &features.channels {
            self.write_row(timestamp, row)?;
        }
        self.write_row(timestamp, &features.combined)
    }
    fn finish(&mut self) -> Result<(), StreamError> {
        self.writer.flush()?;
        log::info!("feature export: {} rows", self.rows);
        Ok(())
    }
}
