// src/protocol/simulator.rs
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::protocol::command::{decode_offset, Command};
use crate::protocol::frame::{
    decode_calibration_payload, encode_calibration_reply, encode_spectrum_reply, Frame,
    CALIBRATION_REPLY_LEN, FRAME_LEN, HEADER, PIXEL_COUNT,
};
use crate::protocol::Transport;

/// Gaussian band on the simulated sensor, in pixel units.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedBand {
    pub center_px: f64,
    pub sigma_px: f64,
    /// Counts per millisecond of integration at unity gain.
    pub counts_per_ms: f64,
}

/// A spectrometer that lives in memory and speaks the binary protocol.
///
/// Lets the whole stack run without hardware: the session writes command
/// frames, the simulator updates its registers and queues the replies a real
/// device would send.
pub struct SimulatedSpectrometer {
    outgoing: VecDeque<u8>,
    rng: StdRng,
    bands: Vec<SimulatedBand>,
    noise_counts: f64,
    responsive: bool,
    pub integration_time: u16,
    pub integration_unit: u8,
    pub gain: u8,
    pub offset: i16,
    pub average: u8,
    pub smoothing: u8,
    pub trigger_mode: u8,
    pub trigger_out: u8,
    pub analog_mv: u16,
    pub continuous: bool,
    pub flash_writes: usize,
    pub calibration: [[f64; 4]; 3],
}

impl SimulatedSpectrometer {
    pub fn new(seed: u64) -> Self {
        Self {
            outgoing: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            bands: vec![
                SimulatedBand { center_px: 412.0, sigma_px: 4.0, counts_per_ms: 90.0 },
                SimulatedBand { center_px: 780.0, sigma_px: 6.0, counts_per_ms: 160.0 },
                SimulatedBand { center_px: 1190.0, sigma_px: 3.5, counts_per_ms: 60.0 },
                SimulatedBand { center_px: 1540.0, sigma_px: 8.0, counts_per_ms: 120.0 },
            ],
            noise_counts: 25.0,
            responsive: true,
            integration_time: 100,
            integration_unit: 0,
            gain: 128,
            offset: 0,
            average: 1,
            smoothing: 6,
            trigger_mode: 0,
            trigger_out: 0,
            analog_mv: 0,
            continuous: false,
            flash_writes: 0,
            calibration: [
                [0.0, -1.2e-5, 0.1825, 796.0],
                [0.0, 0.0, 1.87, 170.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }

    pub fn with_bands(mut self, bands: Vec<SimulatedBand>) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_noise(mut self, counts: f64) -> Self {
        self.noise_counts = counts.max(0.0);
        self
    }

    /// A device that ignores every request, for exercising timeouts.
    pub fn unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }

    fn synthesize(&mut self) -> Vec<u16> {
        let integration_ms = if self.integration_unit == 0 {
            self.integration_time as f64
        } else {
            self.integration_time as f64 / 1000.0
        };
        let gain = self.gain as f64 / 128.0;
        let averages = self.average.max(1) as f64;
        (0..PIXEL_COUNT)
            .map(|px| {
                let x = px as f64;
                let fluorescence = 800.0 + 0.35 * x - 1.1e-4 * x * x;
                let signal: f64 = self
                    .bands
                    .iter()
                    .map(|b| {
                        let z = (x - b.center_px) / b.sigma_px;
                        b.counts_per_ms * integration_ms * (-0.5 * z * z).exp()
                    })
                    .sum();
                let noise = if self.noise_counts > 0.0 {
                    self.rng.gen_range(-self.noise_counts..self.noise_counts) / averages.sqrt()
                } else {
                    0.0
                };
                let value = (fluorescence + signal) * gain + self.offset as f64 + noise;
                value.clamp(0.0, u16::MAX as f64) as u16
            })
            .collect()
    }

    fn reply(&mut self, command: u8, d1: u8, d2: u8) {
        self.outgoing.extend(Frame::new(command, d1, d2).encode());
    }

    fn handle_frame(&mut self, frame: Frame) {
        let Some(command) = Command::from_code(frame.command) else {
            debug!("simulator: ignoring unknown op-code 0x{:02X}", frame.command);
            return;
        };
        match command {
            Command::SingleAcquire => {
                let samples = self.synthesize();
                self.outgoing.extend(encode_spectrum_reply(&samples));
            }
            Command::ContinuousStart => self.continuous = true,
            Command::Stop => self.continuous = false,
            Command::SetIntegrationTime => self.integration_time = frame.data_u16(),
            Command::SetIntegrationUnit => self.integration_unit = frame.data1,
            Command::SetGain => self.gain = frame.data1,
            Command::SetOffset => self.offset = decode_offset(frame.data1, frame.data2),
            Command::SetTriggerMode => self.trigger_mode = frame.data1,
            Command::SetTriggerOut => self.trigger_out = frame.data1,
            Command::SetAverage => self.average = frame.data1,
            Command::SetAnalogOutput => self.analog_mv = frame.data_u16(),
            Command::SaveToFlash => self.flash_writes += 1,
            Command::GetIntegrationTime => {
                let [hi, lo] = self.integration_time.to_be_bytes();
                self.reply(command.reply_code(), hi, lo);
            }
            Command::GetIntegrationUnit => self.reply(0x12, self.integration_unit, 0),
            Command::GetGain => self.reply(0x23, self.gain, 0),
            Command::GetOffset => {
                let (mag, sign) = crate::protocol::command::encode_offset(self.offset);
                self.reply(0x24, mag, sign);
            }
            Command::Smoothing => {
                if frame.data1 == 0 {
                    self.reply(0x25, self.smoothing, 0);
                } else {
                    self.smoothing = frame.data1;
                }
            }
            Command::ReadCalibration => {
                let group = frame.data1;
                if (1..=3).contains(&group) {
                    let coeffs = self.calibration[group as usize - 1];
                    self.outgoing.extend(encode_calibration_reply(group, &coeffs));
                }
            }
            Command::WriteCalibration => {}
        }
    }
}

impl Transport for SimulatedSpectrometer {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.responsive {
            return Ok(());
        }
        if bytes.len() == CALIBRATION_REPLY_LEN && bytes[0] == HEADER && bytes[1] == 0x28 {
            let group = bytes[2];
            if (1..=3).contains(&group) {
                self.calibration[group as usize - 1] =
                    decode_calibration_payload(&bytes[FRAME_LEN..FRAME_LEN + 64]);
            }
            return Ok(());
        }
        for chunk in bytes.chunks(FRAME_LEN) {
            match Frame::decode(chunk) {
                Ok(frame) => self.handle_frame(frame),
                Err(e) => debug!("simulator: dropped malformed frame: {e}"),
            }
        }
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let n = buf.len().min(self.outgoing.len());
        for (slot, byte) in buf.iter_mut().zip(self.outgoing.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.outgoing.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "simulator"
    }
}
