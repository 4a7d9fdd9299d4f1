// src/engine.rs
// 后台引擎线程：独占 SpectrometerContext，按命令驱动，连续采集在命令之间进行
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use crate::cancel::{CancellationToken, SearchObserver};
use crate::config::AppConfig;
use crate::context::SpectrometerContext;
use crate::error::ConfigError;
use crate::library::Library;
use crate::protocol::{SerialTransport, SimulatedSpectrometer, Transport};
use crate::types::*;

/// Commands drained per loop turn before the next acquisition.
const COMMANDS_PER_TURN: usize = 10;

/// Front-end side of a running engine.
pub struct EngineHandle {
    tx: Sender<EngineCommand>,
    rx: Receiver<EngineMessage>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Queues a command. Sending `Search` clears any earlier cancellation, so
    /// a `cancel_search` issued after this call reaches the new search.
    pub fn send(&self, command: EngineCommand) -> bool {
        if matches!(command, EngineCommand::Search) {
            self.cancel.reset();
        }
        self.tx.send(command).is_ok()
    }

    pub fn try_recv(&self) -> Option<EngineMessage> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineMessage> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Waits for the first message `pick` accepts, dropping the others.
    pub fn wait_for<T>(
        &self,
        timeout: Duration,
        mut pick: impl FnMut(EngineMessage) -> Option<T>,
    ) -> Option<T> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(std::time::Instant::now())?;
            match self.rx.recv_timeout(left) {
                Ok(message) => {
                    if let Some(found) = pick(message) {
                        return Some(found);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Asks a running search to stop at its next entry.
    pub fn cancel_search(&self) {
        self.cancel.cancel();
    }

    /// Stops the worker and waits for it.
    pub fn shutdown(mut self) {
        self.tx.send(EngineCommand::Shutdown).ok();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("engine thread panicked");
            }
        }
    }
}

struct EngineObserver<'a> {
    tx: &'a Sender<EngineMessage>,
    cancel: &'a CancellationToken,
}

impl SearchObserver for EngineObserver<'_> {
    fn on_progress(&mut self, index: usize, total: usize) {
        self.tx.send(EngineMessage::SearchProgress { index, total }).ok();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn on_yield(&mut self) {
        thread::yield_now();
    }
}

fn log(tx: &Sender<EngineMessage>, text: impl Into<String>) {
    let text = text.into();
    info!("{text}");
    tx.send(EngineMessage::Log(text)).ok();
}

/// Starts the worker thread. The context is built here so configuration
/// errors surface before any thread exists.
pub fn spawn_engine(config: AppConfig, library: Library) -> Result<EngineHandle, ConfigError> {
    let mut ctx = SpectrometerContext::new(&config)?;
    ctx.set_library(library);
    let (tx_cmd, rx_cmd) = mpsc::channel();
    let (tx_msg, rx_msg) = mpsc::channel();
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let join = thread::spawn(move || run(ctx, tx_msg, rx_cmd, worker_cancel));
    Ok(EngineHandle {
        tx: tx_cmd,
        rx: rx_msg,
        cancel,
        join: Some(join),
    })
}

fn open_transport(mode: ConnectionMode, port: &str, baud: crate::protocol::BaudRate) -> Result<Box<dyn Transport>, String> {
    match mode {
        ConnectionMode::Simulation => Ok(Box::new(SimulatedSpectrometer::new(rand::random()))),
        ConnectionMode::Hardware => SerialTransport::open(port, baud)
            .map(|t| Box::new(t) as Box<dyn Transport>)
            .map_err(|e| format!("cannot open {port}: {e}")),
    }
}

fn run(
    mut ctx: SpectrometerContext,
    tx: Sender<EngineMessage>,
    rx_cmd: Receiver<EngineCommand>,
    cancel: CancellationToken,
) {
    log(&tx, "engine ready");
    let mut streaming = false;
    loop {
        // 1. 命令处理
        for _ in 0..COMMANDS_PER_TURN {
            let command = match rx_cmd.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    ctx.session.disconnect();
                    return;
                }
            };
            match command {
                EngineCommand::Connect { mode, port, baud } => {
                    if ctx.session.is_open() {
                        log(&tx, "already connected");
                        continue;
                    }
                    match open_transport(mode, &port, baud) {
                        Ok(transport) => {
                            ctx.session.connect(transport);
                            log(&tx, format!("connected ({mode:?})"));
                        }
                        Err(e) => log(&tx, e),
                    }
                    tx.send(EngineMessage::Status(ctx.session.state())).ok();
                }
                EngineCommand::Disconnect => {
                    streaming = false;
                    ctx.session.disconnect();
                    tx.send(EngineMessage::Status(ctx.session.state())).ok();
                }
                EngineCommand::AcquireSingle => {
                    if streaming {
                        log(&tx, "stop continuous acquisition first");
                        continue;
                    }
                    match ctx.acquire_single() {
                        Ok(spectrum) => {
                            tx.send(EngineMessage::Spectrum(spectrum.clone())).ok();
                        }
                        Err(e) => log(&tx, format!("acquisition failed: {e}")),
                    }
                }
                EngineCommand::StartContinuous => match ctx.session.begin_acquisition() {
                    Ok(()) => {
                        streaming = true;
                        log(&tx, "continuous acquisition started");
                        tx.send(EngineMessage::Status(ctx.session.state())).ok();
                    }
                    Err(e) => log(&tx, format!("cannot start acquisition: {e}")),
                },
                EngineCommand::Stop => {
                    streaming = false;
                    if let Err(e) = ctx.session.stop() {
                        log(&tx, format!("stop failed: {e}"));
                    }
                    tx.send(EngineMessage::Status(ctx.session.state())).ok();
                }
                EngineCommand::AcquireBackground => match ctx.acquire_background() {
                    Ok(stored) => {
                        tx.send(EngineMessage::Background(stored)).ok();
                    }
                    Err(e) => log(&tx, format!("background acquisition failed: {e}")),
                },
                EngineCommand::ClearBackground => {
                    ctx.clear_background();
                    tx.send(EngineMessage::Background(false)).ok();
                }
                EngineCommand::SetIntegrationTime(ms) => {
                    if let Err(e) = ctx.session.set_integration_time(ms) {
                        log(&tx, format!("integration time not set: {e}"));
                    }
                }
                EngineCommand::SetGain(gain) => {
                    if let Err(e) = ctx.session.set_gain(gain) {
                        log(&tx, format!("gain not set: {e}"));
                    }
                }
                EngineCommand::SetOffset(offset) => {
                    if let Err(e) = ctx.session.set_offset(offset) {
                        log(&tx, format!("offset not set: {e}"));
                    }
                }
                EngineCommand::SetAverage(count) => {
                    if let Err(e) = ctx.session.set_average(count) {
                        log(&tx, format!("average not set: {e}"));
                    }
                }
                EngineCommand::SetSmoothing(level) => {
                    if let Err(e) = ctx.session.set_smoothing(level) {
                        log(&tx, format!("smoothing not set: {e}"));
                    }
                }
                EngineCommand::SetLaserVoltage(mv) => {
                    if let Err(e) = ctx.session.set_laser_voltage(mv) {
                        log(&tx, format!("laser voltage not set: {e}"));
                    }
                }
                EngineCommand::SetTriggerOut(high) => {
                    if let Err(e) = ctx.session.set_trigger_out(high) {
                        log(&tx, format!("trigger output not set: {e}"));
                    }
                }
                EngineCommand::ReadCalibration(group) => match ctx.session.read_calibration(group) {
                    Ok(coeffs) => {
                        tx.send(EngineMessage::Calibration(coeffs)).ok();
                    }
                    Err(e) => log(&tx, format!("calibration group {group} not read: {e}")),
                },
                EngineCommand::WriteCalibration(coeffs) => {
                    let group = coeffs.group;
                    ctx.session.set_calibration(coeffs);
                    if let Err(e) = ctx.session.write_calibration(group) {
                        log(&tx, format!("calibration group {group} not written: {e}"));
                    }
                }
                EngineCommand::SaveToFlash => {
                    if let Err(e) = ctx.session.save_to_flash() {
                        log(&tx, format!("save to flash failed: {e}"));
                    }
                }
                EngineCommand::Process => match ctx.apply_processing() {
                    Ok(spectrum) => {
                        let spectrum = spectrum.clone();
                        let peaks = ctx.peaks().to_vec();
                        tx.send(EngineMessage::Processed { spectrum, peaks }).ok();
                    }
                    Err(e) => log(&tx, format!("processing failed: {e}")),
                },
                EngineCommand::RevertProcessing => {
                    ctx.revert_processing();
                    if let Some(spectrum) = ctx.current() {
                        tx.send(EngineMessage::Spectrum(spectrum.clone())).ok();
                    }
                }
                EngineCommand::Search => {
                    let mut observer = EngineObserver {
                        tx: &tx,
                        cancel: &cancel,
                    };
                    match ctx.search(&mut observer) {
                        Ok(outcome) => {
                            tx.send(EngineMessage::SearchFinished(outcome)).ok();
                        }
                        Err(e) => log(&tx, format!("search failed: {e}")),
                    }
                }
                EngineCommand::AddToLibrary(name) => match ctx.add_current_to_library(&name) {
                    Ok(key) => log(&tx, format!("added {key} to library")),
                    Err(e) => log(&tx, format!("not added to library: {e}")),
                },
                EngineCommand::Shutdown => {
                    ctx.session.disconnect();
                    log(&tx, "engine stopped");
                    return;
                }
            }
        }

        // 2. 连续采集：每轮一帧
        if streaming {
            match ctx.acquire_frame() {
                Ok(spectrum) => {
                    tx.send(EngineMessage::Spectrum(spectrum.clone())).ok();
                }
                Err(e) => {
                    streaming = false;
                    log(&tx, format!("continuous acquisition stopped: {e}"));
                }
            }
            if let Some(fps) = ctx.fps() {
                tx.send(EngineMessage::Fps(fps)).ok();
            }
            thread::sleep(Duration::from_millis(5));
        } else {
            thread::sleep(Duration::from_millis(50));
        }
    }
}
