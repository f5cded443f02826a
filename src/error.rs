//! Error type shared by every pipeline stage.
//!
//! Each stage converts its local failures (network, filesystem, decode,
//! subprocess) into an [`Error`] tagged with the stage's [`ErrorKind`] and the
//! source location that raised it. Nothing is retried; every error is fatal to
//! the current run.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Boxed source error that can cross thread boundaries.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage that raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or inconsistent configuration.
    Config,
    /// Fetching or extracting the dataset archive failed.
    Ingestion,
    /// Inspecting the feature store failed, or the data was rejected.
    Validation,
    /// Reading, resizing or writing images failed.
    FeatureEngineering,
    /// Preparing or running the external trainer failed.
    Training,
    /// Running the external detector failed.
    Inference,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Ingestion => "ingestion",
            ErrorKind::Validation => "validation",
            ErrorKind::FeatureEngineering => "feature_engineering",
            ErrorKind::Training => "training",
            ErrorKind::Inference => "inference",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline error carrying the stage, a message, the raising call site and
/// the underlying cause.
#[derive(Debug, Error)]
#[error("{kind} error at {}:{}: {message}", .location.file(), .location.line())]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub location: &'static Location<'static>,
    #[source]
    pub source: Option<BoxedError>,
}

impl Error {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Location::caller(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxedError>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[track_caller]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    #[track_caller]
    pub fn ingestion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ingestion, message)
    }

    #[track_caller]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[track_caller]
    pub fn feature_engineering(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FeatureEngineering, message)
    }

    #[track_caller]
    pub fn training(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Training, message)
    }

    #[track_caller]
    pub fn inference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Inference, message)
    }
}

/// Wrap foreign errors into [`Error`] at a stage boundary.
pub trait ResultExt<T> {
    /// Convert the error into `kind` with a message built lazily.
    fn with_kind<F, M>(self, kind: ErrorKind, message: F) -> Result<T>
    where
        F: FnOnce() -> M,
        M: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BoxedError>,
{
    #[track_caller]
    fn with_kind<F, M>(self, kind: ErrorKind, message: F) -> Result<T>
    where
        F: FnOnce() -> M,
        M: Into<String>,
    {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(Error::new(kind, message()).with_source(err)),
        }
    }
}
