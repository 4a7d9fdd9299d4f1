use thiserror::Error;

/// Rejected configuration or request. Raised before anything is mutated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("calibration fit needs at least {required} points, got {actual}")]
    InsufficientCalibrationPoints { required: usize, actual: usize },
    #[error("calibration points are degenerate; the quadratic fit is singular")]
    SingularFit,
    #[error("Savitzky-Golay window must be odd and positive, got {0}")]
    EvenWindow(usize),
    #[error("Savitzky-Golay polynomial order {poly_order} must be less than window {window}")]
    PolyOrderTooLarge { window: usize, poly_order: usize },
    #[error("Savitzky-Golay window {window} is longer than the spectrum ({len} samples)")]
    WindowTooLong { window: usize, len: usize },
    #[error("invalid range: minimum {min} must be below maximum {max}")]
    InvalidRange { min: f64, max: f64 },
    #[error("excitation wavelength must be positive, got {0}")]
    InvalidExcitation(f64),
    #[error("unsupported baud rate {0} (expected 19200, 38400 or 115200)")]
    InvalidBaudRate(u32),
    #[error("unknown calibration group {0} (expected 1, 2 or 3)")]
    UnknownCalibrationGroup(u8),
    #[error("calibration file holds {0} numeric values, need 3")]
    ShortCalibrationFile(usize),
    #[error("top N must be at least 1")]
    ZeroTopN,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("axis/intensity length mismatch: axis {axis}, intensity {intensity}")]
    LengthMismatch { axis: usize, intensity: usize },
    #[error("spectral axis is not strictly monotonic at index {0}")]
    NonMonotonicAxis(usize),
}

/// Failure while rendering a PNG plot.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("nothing to plot: {0}")]
    Empty(String),
    #[error("failed to render plot: {0}")]
    Render(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for PlotError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        PlotError::Render(format!("{value:?}"))
    }
}

impl From<image::ImageError> for PlotError {
    fn from(value: image::ImageError) -> Self {
        PlotError::Render(value.to_string())
    }
}

/// Failure while loading or saving a spectral library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("library file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported library schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("no library entry with key `{0}`")]
    UnknownEntry(String),
}

/// Failure while reading or writing a tabular data file (calibration, exports).
#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
    #[error("line {line}: `{value}` is not a number")]
    BadNumber { line: u64, value: String },
}

/// Failure while running the preprocessing pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
}

/// Failure while turning a device reading into a calibrated spectrum.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Protocol(#[from] crate::protocol::ProtocolError),
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
    #[error("no spectrum available: {0}")]
    NoSpectrum(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}
