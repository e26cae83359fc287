// src/drivers/error.rs
use thiserror::Error;
/// Broad category of a [`StreamError`], used by the ingestion loop and the UI
/// layer to decide whether a failure is recoverable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Format,
    Configuration,
    Io,
    Render,
}
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("format error: {0}")]
    Format(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("timestamp went backwards: {previous} -> {current}")]
    NonMonotonic { previous: f64, current: f64 },
    #[error("source cannot be restarted")]
    NotRestartable,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Connection(_) => ErrorKind::Connection,
            StreamError::Format(_)
            | StreamError::ChannelMismatch { .. }
            | StreamError::NonMonotonic { .. } => ErrorKind::Format,
            StreamError::Configuration(_) | StreamError::NotRestartable => {
                ErrorKind::Configuration
            }
            StreamError::Io(_) => ErrorKind::Io,
            StreamError::Plot(_) => ErrorKind::Render,
        }
    }
    pub fn format(msg: impl Into<String>) -> Self {
        StreamError::Format(msg.into())
    }
    pub fn config(msg: impl Into<String>) -> Self {
        StreamError::Configuration(msg.into())
    }
    pub fn connection(msg: impl Into<String>) -> Self {
        StreamError::Connection(msg.into())
    }
}
impl From<serialport::Error> for StreamError {
    fn from(value: serialport::Error) -> Self {
        StreamError::Connection(value.to_string())
    }
}
impl From<csv::Error> for StreamError {
    fn from(value: csv::Error) -> Self {
        if value.is_io_error() {
            match value.into_kind() {
                csv::ErrorKind::Io(err) => StreamError::Io(err),
                other => StreamError::Format(format!("{other:?}")),
            }
        } else {
            StreamError::Format(value.to_string())
        }
    }
}
impl From<serde_json::Error> for StreamError {
    fn from(value: serde_json::Error) -> Self {
        StreamError::Configuration(value.to_string())
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for StreamError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        StreamError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for StreamError {
    fn from(value: image::ImageError) -> Self {
        StreamError::Plot(value.to_string())
    }
}
pub type StreamResult<T> = Result<T, StreamError>;
