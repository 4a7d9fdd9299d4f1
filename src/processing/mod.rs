// src/processing/mod.rs
// 光谱预处理与峰检测
pub mod baseline;
pub mod interpolate;
pub mod linalg;
pub mod peaks;
pub mod pipeline;
pub mod savgol;
// 公开导出
pub use baseline::AslsParams;
pub use interpolate::{interp_linear, linspace};
pub use peaks::{detect_peaks, find_peaks, Peak, PeakSettings};
pub use pipeline::{NormKind, PreprocessingConfig, Stage, StageConfig};
