// src/main.rs
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser};
use bci_stream::drivers::dummy::DummySource;
use bci_stream::drivers::serial::{find_usb_port, open_serial};
use bci_stream::drivers::tcp::connect_tcp;
use bci_stream::drivers::{
    open_recording, spawn_ingest, FeatureExporter, FeatureParams, IngestOptions, PlotRenderer,
    SampleSource,
};
use bci_stream::{Monitor, Recorder, Settings};
const DUMMY_SEED: u64 = 0x5EED;
#[derive(Parser, Debug)]
#[command(
    name = "bci-monitor",
    version,
    about = "Stream multi-channel EEG into a ring buffer and export plots and band-power features",
    long_about = "Reads EEG from a serial port, a TCP socket, an EDF/BDF/CSV recording or a \
                  synthetic generator. With no source flag the first USB serial device is used, \
                  falling back to the synthetic generator."
)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    /// JSON settings file (missing file means defaults)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Print the effective settings as JSON and exit
    #[arg(long)]
    print_config: bool,
    /// Serial baud rate (overrides BAUD_RATE)
    #[arg(long)]
    baud: Option<u32>,
    /// Replay speed for recordings and simulation; 0 replays as fast as possible
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Restart recordings when they end
    #[arg(long = "loop")]
    loop_playback: bool,
    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<f64>,
    /// Directory for waveform.png, spectrum.png and bandpower.png
    #[arg(long, value_name = "DIR")]
    plot_dir: Option<PathBuf>,
    /// Render plots on every Nth refresh
    #[arg(long, default_value_t = 25)]
    plot_every: u64,
    /// Write band-power features as CSV
    #[arg(long, value_name = "PATH")]
    features: Option<PathBuf>,
    /// Record raw samples as CSV
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,
    /// Disable the notch and band-pass filters
    #[arg(long)]
    raw: bool,
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}
#[derive(Args, Debug)]
#[group(multiple = false)]
struct SourceArgs {
    /// Replay an EDF, BDF or CSV recording
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
    /// Serial port of the acquisition board
    #[arg(long, value_name = "NAME")]
    port: Option<String>,
    /// Line-protocol stream over TCP
    #[arg(long, value_name = "HOST:PORT")]
    tcp: Option<String>,
    /// Synthetic 8 Hz signal with noise
    #[arg(long)]
    simulate: bool,
}
fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }
    settings.validate().context("invalid settings")?;
    if cli.print_config {
        println!("{}", settings.to_json()?);
        return Ok(());
    }
    if !cli.speed.is_finite() || cli.speed < 0.0 {
        bail!("--speed must be a non-negative number, got {}", cli.speed);
    }
    let duration = cli
        .duration
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid --duration {secs}"))
        })
        .transpose()?;
    let source = open_source(&cli.source, &settings)?;
    log::info!("source: {}", source.describe());
    let recorder = cli
        .record
        .as_ref()
        .map(|path| Recorder::create(path, source.channel_config()))
        .transpose()
        .context("failed to start recording")?;
    let options = IngestOptions {
        capacity: settings.data_length,
        filters: if cli.raw {
            None
        } else {
            settings.filter_settings()
        },
        speed: cli.speed,
        loop_playback: cli.loop_playback,
        max_frame_errors: settings.max_frame_errors,
        recorder,
    };
    let mut monitor = Monitor::new(settings.update_interval()).with_duration(duration);
    if let Some(dir) = &cli.plot_dir {
        let renderer = PlotRenderer::new(
            dir,
            settings.plot_length,
            settings.spectrum_builder(),
            FeatureParams::default(),
        )
        .with_context(|| format!("cannot write plots to {}", dir.display()))?
        .every(cli.plot_every);
        monitor = monitor.with_sink(Box::new(renderer));
    }
    if let Some(path) = &cli.features {
        let exporter = FeatureExporter::create(path, settings.fft_length, FeatureParams::default())
            .with_context(|| format!("cannot create {}", path.display()))?;
        monitor = monitor.with_sink(Box::new(exporter));
    }
    let handle = spawn_ingest(source, options).context("failed to start ingestion")?;
    let summary = monitor.run(handle).context("pipeline failed")?;
    println!(
        "ingested {} samples ({} frame errors, {} restarts{})",
        summary.samples,
        summary.frame_errors,
        summary.restarts,
        if summary.stopped { ", stopped" } else { "" }
    );
    Ok(())
}
fn open_source(args: &SourceArgs, settings: &Settings) -> Result<Box<dyn SampleSource>> {
    let config = settings.channel_config()?;
    let stall = settings.stall_timeout();
    if let Some(path) = &args.file {
        return open_recording(path, settings)
            .with_context(|| format!("failed to open {}", path.display()));
    }
    if let Some(port) = &args.port {
        return Ok(Box::new(open_serial(port, settings.baud_rate, config, stall)?));
    }
    if let Some(address) = &args.tcp {
        return Ok(Box::new(connect_tcp(address, config, stall)?));
    }
    if args.simulate {
        return Ok(Box::new(DummySource::new(config, DUMMY_SEED)?));
    }
    match find_usb_port() {
        Some(port) => {
            log::info!("found USB serial device {port}");
            Ok(Box::new(open_serial(&port, settings.baud_rate, config, stall)?))
        }
        None => {
            log::warn!("no USB serial device found, using the simulated signal");
            Ok(Box::new(DummySource::new(config, DUMMY_SEED)?))
        }
    }
}
