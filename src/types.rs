// src/types.rs
use crate::calibration::{CalibrationCoefficients, CalibrationGroup};
use crate::library::SearchOutcome;
use crate::processing::Peak;
use crate::protocol::{BaudRate, SessionState};
use crate::spectrum::Spectrum;

// 连接模式
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

// 前端发给后台引擎的命令
#[derive(Clone, Debug)]
pub enum EngineCommand {
    Connect {
        mode: ConnectionMode,
        port: String,
        baud: BaudRate,
    },
    Disconnect,
    AcquireSingle,
    StartContinuous,
    Stop,
    AcquireBackground,
    ClearBackground,
    // 设备参数
    SetIntegrationTime(u16),
    SetGain(u8),
    SetOffset(i16),
    SetAverage(u8),
    SetSmoothing(u8),
    SetLaserVoltage(u16),
    SetTriggerOut(bool),
    ReadCalibration(CalibrationGroup),
    WriteCalibration(CalibrationCoefficients),
    SaveToFlash,
    // 处理与检索
    Process,
    RevertProcessing,
    Search,
    AddToLibrary(String),
    Shutdown,
}

// 后台发给前端的消息
#[derive(Clone, Debug)]
pub enum EngineMessage {
    Log(String),
    Status(SessionState),
    Spectrum(Spectrum),
    Processed { spectrum: Spectrum, peaks: Vec<Peak> },
    SearchProgress { index: usize, total: usize },
    SearchFinished(SearchOutcome),
    Background(bool),
    Calibration(CalibrationCoefficients),
    Fps(f64),
}
