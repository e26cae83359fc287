// src/drivers/mod.rs
pub mod buffer;
pub mod csv_file;
pub mod dummy;
pub mod edf;
pub mod error;
pub mod filter;
pub mod line;
pub mod pipeline;
pub mod plot;
pub mod replay;
pub mod sample;
pub mod serial;
pub mod sink;
pub mod source;
pub mod spectrum;
pub mod tcp;
pub mod window;
// Types most callers need, re-exported at the module root
pub use buffer::{ring_buffer, BufferStats, RingReader, RingWriter};
pub use error::{ErrorKind, StreamError, StreamResult};
pub use filter::{ChannelFilters, FilterSettings};
pub use pipeline::{spawn_ingest, IngestHandle, IngestOptions, IngestSummary, StreamEvent};
pub use plot::{render_band_power_png, render_spectrum_png, render_waveform_png, PlotStyle};
pub use replay::open_recording;
pub use sample::{ChannelConfig, Sample};
pub use sink::{FeatureExporter, PlotRenderer, WindowSink};
pub use source::{ManualSource, SampleSource};
pub use spectrum::{
    band_power, default_bands, extract_features, vrms, welch_psd, Band, FeatureParams,
    FeatureSet, FrequencySpectrum, SpectrumBuilder,
};
pub use window::Window;
