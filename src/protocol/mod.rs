// src/protocol/mod.rs
// 串口协议：帧编解码、传输层、设备会话
pub mod command;
pub mod error;
pub mod frame;
pub mod session;
pub mod simulator;
pub mod transport;
// 公开导出常用类型
pub use command::{Command, IntegrationUnit, TriggerMode};
pub use error::ProtocolError;
pub use frame::{Frame, ReplyScanner, PIXEL_COUNT};
pub use session::{DeviceSession, DeviceSettings, RawSpectrum, SessionConfig, SessionState};
pub use simulator::{SimulatedBand, SimulatedSpectrometer};
pub use transport::{available_ports, BaudRate, ScriptedTransport, SerialTransport, Transport};
