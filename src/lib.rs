// src/lib.rs
//! Real-time multi-channel EEG pipeline: source readers (serial, TCP, EDF/BDF,
//! CSV, synthetic) feed a bounded ring buffer, and sinks consume windows of it
//! for plots and band-power features.
pub mod config;
pub mod drivers;
pub mod monitor;
pub mod recorder;
pub use config::Settings;
pub use monitor::Monitor;
pub use recorder::{record_epoch, Recorder};
