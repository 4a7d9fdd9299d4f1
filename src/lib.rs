// src/lib.rs
// 光纤线阵光谱仪：串口协议、轴标定、预处理、峰检测与光谱库检索
pub mod calibration;
pub mod cancel;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod export;
pub mod library;
pub mod plot;
pub mod processing;
pub mod protocol;
pub mod spectrum;
pub mod types;

pub use cancel::{CancellationToken, SearchObserver};
pub use context::SpectrometerContext;
pub use spectrum::{AxisUnit, Spectrum};
