// src/protocol/session.rs
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationCoefficients, CalibrationGroup};
use crate::protocol::command::{decode_offset, encode_offset, Command, IntegrationUnit, TriggerMode};
use crate::protocol::frame::{
    decode_calibration_reply, decode_spectrum_payload, encode_calibration_write,
    parse_spectrum_header, Frame, ReplyScanner, CALIBRATION_REPLY_LEN, FRAME_LEN, PIXEL_COUNT,
};
use crate::protocol::{ProtocolError, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    Acquiring,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Closed => "closed",
            SessionState::Open => "open",
            SessionState::Acquiring => "acquiring",
        };
        f.write_str(text)
    }
}

/// Timing knobs for request/reply exchanges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wait for a typed reply (gain, offset, ...).
    pub reply_timeout_ms: u64,
    /// Base wait for a spectral reply; the integration time is added on top.
    pub read_timeout_ms: u64,
    /// Pause the firmware needs around parameter queries and calibration writes.
    pub settle_ms: u64,
    /// Hardware averaging count pushed on connect.
    pub average: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 1_000,
            read_timeout_ms: 10_000,
            settle_ms: 300,
            average: 1,
        }
    }
}

/// Last values confirmed by (or pushed to) the device. Kept stale when a
/// request goes unanswered.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceSettings {
    pub integration_time: u16,
    pub integration_unit: IntegrationUnit,
    pub gain: u8,
    pub offset: i16,
    pub average: u8,
    pub smoothing: u8,
    pub trigger_mode: TriggerMode,
    pub trigger_out_high: bool,
    pub laser_mv: u16,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            integration_time: 100,
            integration_unit: IntegrationUnit::Milliseconds,
            gain: 128,
            offset: 0,
            average: 1,
            smoothing: 6,
            trigger_mode: TriggerMode::Software,
            trigger_out_high: false,
            laser_mv: 0,
        }
    }
}

/// Pixel counts from one acquisition. `valid == false` marks the zero-filled
/// stand-in used when the device reply was unusable.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSpectrum {
    pub counts: Vec<f64>,
    pub valid: bool,
}

impl RawSpectrum {
    pub fn zeroed() -> Self {
        Self {
            counts: vec![0.0; PIXEL_COUNT],
            valid: false,
        }
    }
}

/// The one owner of the spectrometer link.
pub struct DeviceSession {
    transport: Option<Box<dyn Transport>>,
    state: SessionState,
    config: SessionConfig,
    settings: DeviceSettings,
    calibration: [CalibrationCoefficients; 3],
}

impl DeviceSession {
    pub fn new(config: SessionConfig) -> Self {
        let settings = DeviceSettings {
            average: config.average.max(1),
            ..DeviceSettings::default()
        };
        Self {
            transport: None,
            state: SessionState::Closed,
            config,
            settings,
            calibration: CalibrationGroup::ALL.map(CalibrationCoefficients::zero),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Closed
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn port_name(&self) -> Option<&str> {
        self.transport.as_deref().map(|t| t.name())
    }

    pub fn calibration(&self, group: CalibrationGroup) -> &CalibrationCoefficients {
        &self.calibration[group.index()]
    }

    /// User edit of a coefficient group; nothing is sent until
    /// [`write_calibration`](Self::write_calibration).
    pub fn set_calibration(&mut self, coefficients: CalibrationCoefficients) {
        let index = coefficients.group.index();
        self.calibration[index] = coefficients;
    }

    /// Takes ownership of an already-open transport and runs the start-up
    /// exchange. Individual start-up failures are only logged.
    pub fn connect(&mut self, transport: Box<dyn Transport>) {
        if self.is_open() {
            warn!("connect ignored: session already open on {:?}", self.port_name());
            return;
        }
        info!("session open on {}", transport.name());
        self.transport = Some(transport);
        self.state = SessionState::Open;
        self.initialize();
    }

    /// Adopts a transport without the start-up exchange, e.g. for replaying
    /// captured replies.
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        info!("session attached to {}", transport.name());
        self.transport = Some(transport);
        self.state = SessionState::Open;
    }

    fn initialize(&mut self) {
        if let Err(e) = self.set_trigger_mode(TriggerMode::Software) {
            warn!("start-up: trigger mode not set: {e}");
        }
        if let Err(e) = self.set_average(self.settings.average) {
            warn!("start-up: hardware average not set: {e}");
        }
        match self.get_integration_unit() {
            Ok(unit) => info!("initial device integration unit: {}", unit.label()),
            Err(e) => warn!("start-up: integration unit unavailable: {e}"),
        }
        match self.get_integration_time() {
            Ok(t) => info!("initial device integration time: {t}"),
            Err(e) => warn!("start-up: integration time unavailable: {e}"),
        }
        if let Err(e) = self.get_gain() {
            warn!("start-up: gain unavailable: {e}");
        }
        if let Err(e) = self.get_offset() {
            warn!("start-up: offset unavailable: {e}");
        }
        if let Err(e) = self.get_smoothing() {
            warn!("start-up: smoothing level unavailable: {e}");
        }
    }

    /// Stops any acquisition and releases the transport.
    pub fn disconnect(&mut self) -> Option<Box<dyn Transport>> {
        if self.state == SessionState::Acquiring {
            if let Err(e) = self.stop() {
                warn!("stop before disconnect failed: {e}");
            }
        }
        self.state = SessionState::Closed;
        let transport = self.transport.take();
        if let Some(t) = &transport {
            info!("session closed on {}", t.name());
        }
        transport
    }

    fn transport(&mut self) -> Result<&mut dyn Transport, ProtocolError> {
        match self.transport.as_deref_mut() {
            Some(t) => Ok(t),
            None => Err(ProtocolError::PortNotOpen),
        }
    }

    fn settle(&self) {
        if self.config.settle_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.settle_ms));
        }
    }

    /// Wait for a spectral reply: base timeout plus the integration time.
    pub fn spectral_timeout(&self) -> Duration {
        let integration = match self.settings.integration_unit {
            IntegrationUnit::Milliseconds => Duration::from_millis(self.settings.integration_time as u64),
            IntegrationUnit::Microseconds => Duration::from_micros(self.settings.integration_time as u64),
        };
        Duration::from_millis(self.config.read_timeout_ms) + integration
    }

    pub fn send_command(&mut self, command: Command) -> Result<(), ProtocolError> {
        self.send_command_with_data(command, 0x00, 0x00)
    }

    pub fn send_command_with_data(&mut self, command: Command, d1: u8, d2: u8) -> Result<(), ProtocolError> {
        let bytes = Frame::new(command.code(), d1, d2).encode();
        self.transport()?.write_all(&bytes)?;
        debug!("sent {command} {bytes:02X?}");
        Ok(())
    }

    /// Reads until a valid frame carrying `expected` arrives or `timeout` passes.
    pub fn read_reply(&mut self, expected: u8, timeout: Duration) -> Result<Frame, ProtocolError> {
        let transport = self.transport()?;
        let deadline = Instant::now() + timeout;
        let mut scanner = ReplyScanner::new(expected);
        let mut chunk = [0u8; 64];
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(ProtocolError::NoResponse {
                    command: expected,
                    timeout_ms: timeout.as_millis(),
                });
            }
            let n = transport.read_some(&mut chunk, deadline - now)?;
            if n == 0 {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            if let Some(frame) = scanner.push(&chunk[..n]) {
                return Ok(frame);
            }
        }
    }

    /// Clears pending input, sends `command` and waits for its reply frame.
    fn query(&mut self, command: Command) -> Result<Frame, ProtocolError> {
        self.transport()?.clear_input()?;
        self.send_command(command)?;
        let timeout = Duration::from_millis(self.config.reply_timeout_ms);
        self.read_reply(command.reply_code(), timeout)
    }

    pub fn stop(&mut self) -> Result<(), ProtocolError> {
        self.send_command(Command::Stop)?;
        if self.state == SessionState::Acquiring {
            self.state = SessionState::Open;
        }
        info!("acquisition STOP sent");
        Ok(())
    }

    pub fn start_continuous(&mut self) -> Result<(), ProtocolError> {
        self.send_command(Command::ContinuousStart)
    }

    /// Marks the session as polling for spectra.
    pub fn begin_acquisition(&mut self) -> Result<(), ProtocolError> {
        self.transport()?;
        self.state = SessionState::Acquiring;
        Ok(())
    }

    pub fn set_gain(&mut self, gain: u8) -> Result<(), ProtocolError> {
        self.send_command_with_data(Command::SetGain, gain, 0x00)?;
        self.settings.gain = gain;
        info!("gain set to {gain}");
        Ok(())
    }

    pub fn set_offset(&mut self, offset: i16) -> Result<(), ProtocolError> {
        let offset = offset.clamp(-255, 255);
        let (magnitude, sign) = encode_offset(offset);
        self.send_command_with_data(Command::SetOffset, magnitude, sign)?;
        self.settings.offset = offset;
        info!("offset set to {offset} (data={magnitude}, sign={sign})");
        Ok(())
    }

    pub fn set_average(&mut self, count: u8) -> Result<(), ProtocolError> {
        let count = count.max(1);
        self.send_command_with_data(Command::SetAverage, count, 0x00)?;
        self.settings.average = count;
        info!("hardware average set to {count}");
        Ok(())
    }

    pub fn set_laser_voltage(&mut self, millivolts: u16) -> Result<(), ProtocolError> {
        let [hi, lo] = millivolts.to_be_bytes();
        self.send_command_with_data(Command::SetAnalogOutput, hi, lo)?;
        self.settings.laser_mv = millivolts;
        info!("analog output (laser voltage) set to {millivolts} mV");
        Ok(())
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), ProtocolError> {
        self.send_command_with_data(Command::SetTriggerMode, mode.as_byte(), 0x00)?;
        self.settings.trigger_mode = mode;
        info!("trigger mode set to {mode:?}");
        Ok(())
    }

    pub fn set_trigger_out(&mut self, high: bool) -> Result<(), ProtocolError> {
        self.send_command_with_data(Command::SetTriggerOut, u8::from(high), 0x00)?;
        self.settings.trigger_out_high = high;
        info!("trigger out {}", if high { "HIGH (5V)" } else { "LOW (0V)" });
        Ok(())
    }

    pub fn set_smoothing(&mut self, level: u8) -> Result<(), ProtocolError> {
        let level = level.clamp(1, 10);
        self.send_command_with_data(Command::Smoothing, level, 0x00)?;
        self.settings.smoothing = level;
        info!("smoothing level set to {level}");
        Ok(())
    }

    pub fn set_integration_unit(&mut self, unit: IntegrationUnit) -> Result<(), ProtocolError> {
        self.send_command_with_data(Command::SetIntegrationUnit, unit.as_byte(), 0x00)?;
        self.settings.integration_unit = unit;
        Ok(())
    }

    pub fn save_to_flash(&mut self) -> Result<(), ProtocolError> {
        self.send_command(Command::SaveToFlash)?;
        info!("parameters saved to device flash");
        Ok(())
    }

    /// Full integration-time change: stop, force the unit to ms, set the time,
    /// read it back, widen the read timeout and persist to flash.
    ///
    /// Read-backs that go unanswered are logged and the requested value kept.
    pub fn set_integration_time(&mut self, millis: u16) -> Result<(), ProtocolError> {
        self.stop()?;
        self.settle();
        match self.get_integration_unit() {
            Ok(unit) => debug!("integration unit before set: {}", unit.label()),
            Err(e) => warn!("integration unit unavailable: {e}"),
        }
        self.set_integration_unit(IntegrationUnit::Milliseconds)?;
        match self.get_integration_unit() {
            Ok(unit) => info!("confirmed integration unit: {}", unit.label()),
            Err(e) => warn!("unit read-back unavailable: {e}"),
        }
        let [hi, lo] = millis.to_be_bytes();
        self.send_command_with_data(Command::SetIntegrationTime, hi, lo)?;
        self.settings.integration_time = millis;
        info!("integration time set request = {millis} ms");
        match self.get_integration_time() {
            Ok(confirmed) => info!("integration time confirmed by device: {confirmed} ms"),
            Err(e) => warn!("integration time read-back unavailable (firmware busy): {e}"),
        }
        self.settings.integration_time = millis;
        info!("spectral read timeout now {:?}", self.spectral_timeout());
        self.save_to_flash()
    }

    pub fn get_integration_time(&mut self) -> Result<u16, ProtocolError> {
        self.settle();
        let reply = self.query(Command::GetIntegrationTime)?;
        let value = reply.data_u16();
        self.settings.integration_time = value;
        Ok(value)
    }

    pub fn get_integration_unit(&mut self) -> Result<IntegrationUnit, ProtocolError> {
        self.settle();
        let reply = self.query(Command::GetIntegrationUnit)?;
        let unit = IntegrationUnit::from_byte(reply.data1);
        self.settings.integration_unit = unit;
        Ok(unit)
    }

    pub fn get_gain(&mut self) -> Result<u8, ProtocolError> {
        let reply = self.query(Command::GetGain)?;
        self.settings.gain = reply.data1;
        info!("current gain = {}", reply.data1);
        Ok(reply.data1)
    }

    pub fn get_offset(&mut self) -> Result<i16, ProtocolError> {
        let reply = self.query(Command::GetOffset)?;
        let offset = decode_offset(reply.data1, reply.data2);
        self.settings.offset = offset;
        info!("current offset = {offset}");
        Ok(offset)
    }

    pub fn get_smoothing(&mut self) -> Result<u8, ProtocolError> {
        let reply = self.query(Command::Smoothing)?;
        let level = reply.data1;
        if !(1..=10).contains(&level) {
            return Err(ProtocolError::OutOfRange {
                what: "smoothing level",
                value: level,
            });
        }
        self.settings.smoothing = level;
        info!("smoothing level read from device: {level}");
        Ok(level)
    }

    /// Reads one coefficient group. On failure the stored coefficients are
    /// left as they were.
    pub fn read_calibration(&mut self, group: CalibrationGroup) -> Result<CalibrationCoefficients, ProtocolError> {
        self.transport()?.clear_input()?;
        self.send_command_with_data(Command::ReadCalibration, group.id(), 0x00)?;
        self.settle();
        let timeout = Duration::from_millis(self.config.reply_timeout_ms);
        let raw = self.transport()?.read_up_to(CALIBRATION_REPLY_LEN, timeout)?;
        if raw.is_empty() {
            return Err(ProtocolError::NoResponse {
                command: Command::ReadCalibration.code(),
                timeout_ms: timeout.as_millis(),
            });
        }
        let coeffs = decode_calibration_reply(group.id(), &raw)?;
        let coefficients = CalibrationCoefficients::new(group, coeffs);
        info!(
            "group {} ({}): f0={:.8e}, f1={:.8e}, f2={:.6}, f3={:.6}",
            group.id(),
            group.label(),
            coeffs[0],
            coeffs[1],
            coeffs[2],
            coeffs[3]
        );
        self.calibration[group.index()] = coefficients.clone();
        Ok(coefficients)
    }

    /// Reads all three groups; a failing group keeps its previous values.
    pub fn read_all_calibration(&mut self) -> Vec<(CalibrationGroup, Result<CalibrationCoefficients, ProtocolError>)> {
        CalibrationGroup::ALL
            .into_iter()
            .map(|group| {
                let result = self.read_calibration(group);
                if let Err(e) = &result {
                    warn!("calibration group {} not read: {e}", group.id());
                }
                (group, result)
            })
            .collect()
    }

    /// Sends the stored coefficients of `group`. Persisting them needs a
    /// separate [`save_to_flash`](Self::save_to_flash).
    pub fn write_calibration(&mut self, group: CalibrationGroup) -> Result<(), ProtocolError> {
        let coeffs = self.calibration[group.index()].coeffs;
        let packet = encode_calibration_write(group.id(), &coeffs);
        self.transport()?.write_all(&packet)?;
        info!("wrote calibration group {} ({}) to device", group.id(), group.label());
        self.settle();
        Ok(())
    }

    fn try_read_spectrum(&mut self) -> Result<Vec<u16>, ProtocolError> {
        let timeout = self.spectral_timeout();
        let transport = self.transport()?;
        let head = transport.read_up_to(FRAME_LEN, timeout)?;
        if head.is_empty() {
            return Err(ProtocolError::NoResponse {
                command: Command::SingleAcquire.code(),
                timeout_ms: timeout.as_millis(),
            });
        }
        let length = parse_spectrum_header(&head)?;
        debug!("spectral payload length from header: {length}");
        let data = transport.read_up_to(length + 2, timeout)?;
        if data.len() != length + 2 {
            return Err(ProtocolError::Incomplete {
                expected: length + 2,
                actual: data.len(),
            });
        }
        decode_spectrum_payload(&data)
    }

    /// Reads one spectral reply. Any malformed, short or missing reply yields
    /// a zero-filled spectrum marked invalid instead of an error.
    pub fn read_spectrum(&mut self) -> Result<RawSpectrum, ProtocolError> {
        self.transport()?;
        match self.try_read_spectrum() {
            Ok(samples) => Ok(RawSpectrum {
                counts: samples.into_iter().map(f64::from).collect(),
                valid: true,
            }),
            Err(e) => {
                warn!("spectral read failed, substituting zeros: {e}");
                Ok(RawSpectrum::zeroed())
            }
        }
    }

    /// Single-shot: request one acquisition and read it.
    pub fn acquire(&mut self) -> Result<RawSpectrum, ProtocolError> {
        self.send_command(Command::SingleAcquire)?;
        self.read_spectrum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{encode_calibration_reply, encode_spectrum_reply};
    use crate::protocol::{ScriptedTransport, SimulatedSpectrometer};

    fn fast_config() -> SessionConfig {
        SessionConfig {
            reply_timeout_ms: 50,
            read_timeout_ms: 50,
            settle_ms: 0,
            average: 1,
        }
    }

    fn open_scripted(replies: Vec<Vec<u8>>) -> DeviceSession {
        let mut session = DeviceSession::new(fast_config());
        session.transport = Some(Box::new(ScriptedTransport::with_replies(replies)));
        session.state = SessionState::Open;
        session
    }

    #[test]
    fn operations_on_closed_session_fail_cleanly() {
        let mut session = DeviceSession::new(fast_config());
        assert!(matches!(session.set_gain(3), Err(ProtocolError::PortNotOpen)));
        assert!(matches!(session.read_spectrum(), Err(ProtocolError::PortNotOpen)));
        assert_eq!(session.settings().gain, 128);
    }

    #[test]
    fn missing_reply_is_no_response_and_keeps_state() {
        let mut session = open_scripted(vec![]);
        let err = session.get_gain().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(session.settings().gain, 128);
    }

    #[test]
    fn typed_get_skips_noise_before_reply() {
        let mut noisy = vec![0x00, 0x81, 0x23];
        noisy.extend_from_slice(&Frame::new(0x23, 42, 0).encode());
        let mut session = open_scripted(vec![noisy]);
        assert_eq!(session.get_gain().unwrap(), 42);
        assert_eq!(session.settings().gain, 42);
    }

    #[test]
    fn integration_time_reply_is_read_under_0x02() {
        let mut session = open_scripted(vec![Frame::new(0x02, 0x01, 0xF4).encode().to_vec()]);
        assert_eq!(session.get_integration_time().unwrap(), 500);
    }

    #[test]
    fn smoothing_out_of_range_is_rejected() {
        let mut session = open_scripted(vec![Frame::new(0x25, 0, 0).encode().to_vec()]);
        assert!(matches!(
            session.get_smoothing(),
            Err(ProtocolError::OutOfRange { .. })
        ));
        assert_eq!(session.settings().smoothing, 6);
    }

    #[test]
    fn short_spectrum_degrades_to_zeros() {
        let reply = encode_spectrum_reply(&[5u16; 100]);
        let mut session = open_scripted(vec![reply]);
        let raw = session.read_spectrum().unwrap();
        assert!(!raw.valid);
        assert_eq!(raw.counts.len(), PIXEL_COUNT);
        assert!(raw.counts.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn full_spectrum_is_decoded() {
        let mut samples = vec![0u16; PIXEL_COUNT];
        samples[1024] = 1000;
        let mut session = open_scripted(vec![encode_spectrum_reply(&samples)]);
        let raw = session.acquire().unwrap();
        assert!(raw.valid);
        assert_eq!(raw.counts[1024], 1000.0);
    }

    #[test]
    fn connect_runs_start_up_exchange_against_simulator() {
        let mut session = DeviceSession::new(fast_config());
        let mut sim = SimulatedSpectrometer::new(3);
        sim.gain = 90;
        sim.offset = -4;
        sim.smoothing = 3;
        sim.integration_time = 250;
        session.connect(Box::new(sim));
        assert_eq!(session.state(), SessionState::Open);
        let s = session.settings();
        assert_eq!((s.gain, s.offset, s.smoothing, s.integration_time), (90, -4, 3, 250));
    }

    #[test]
    fn set_integration_time_sequence_and_timeout() {
        let mut session = DeviceSession::new(fast_config());
        session.connect(Box::new(SimulatedSpectrometer::new(3)));
        session.set_integration_time(1500).unwrap();
        assert_eq!(session.settings().integration_time, 1500);
        assert_eq!(session.spectral_timeout(), Duration::from_millis(1550));
    }

    #[test]
    fn calibration_write_then_read_back() {
        let mut session = DeviceSession::new(fast_config());
        session.connect(Box::new(SimulatedSpectrometer::new(3)));
        let coeffs = [1.5e-9, -2.25e-5, 0.1712, 801.25];
        session.set_calibration(CalibrationCoefficients::new(CalibrationGroup::Wavelength, coeffs));
        session.write_calibration(CalibrationGroup::Wavelength).unwrap();
        session.set_calibration(CalibrationCoefficients::zero(CalibrationGroup::Wavelength));
        let read = session.read_calibration(CalibrationGroup::Wavelength).unwrap();
        for (a, b) in coeffs.iter().zip(read.coeffs.iter()) {
            assert!(((a - b) / a).abs() < 1e-6);
        }
    }

    #[test]
    fn failed_calibration_read_keeps_coefficients() {
        let mut session = open_scripted(vec![]);
        let kept = CalibrationCoefficients::new(CalibrationGroup::RamanShift, [0.0, 0.0, 2.0, 1.0]);
        session.set_calibration(kept.clone());
        assert!(session.read_calibration(CalibrationGroup::RamanShift).is_err());
        assert_eq!(session.calibration(CalibrationGroup::RamanShift), &kept);
    }

    #[test]
    fn disconnect_stops_acquisition() {
        let mut session = open_scripted(vec![]);
        session.begin_acquisition().unwrap();
        assert_eq!(session.state(), SessionState::Acquiring);
        assert!(session.disconnect().is_some());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[derive(Clone, Default)]
    struct Recorder(std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>);

    impl Transport for Recorder {
        fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.0.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        fn read_some(&mut self, _buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
            Ok(0)
        }

        fn clear_input(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    #[test]
    fn continuous_start_sends_0x02() {
        let sent = Recorder::default();
        let mut session = DeviceSession::new(fast_config());
        session.attach(Box::new(sent.clone()));
        session.start_continuous().unwrap();
        let frames = sent.0.lock().unwrap();
        assert_eq!(frames.as_slice(), &[Frame::bare(0x02).encode().to_vec()]);
    }

    #[test]
    fn read_all_calibration_keeps_groups_that_fail() {
        let [first, second, third] = CalibrationGroup::ALL;
        let a = [1.0e-9, 2.0e-5, 0.16, 796.0];
        let b = [0.0, 0.0, 1.5, -3.0];
        let mut session = open_scripted(vec![
            encode_calibration_reply(first.id(), &a),
            encode_calibration_reply(second.id(), &b),
        ]);
        let kept = CalibrationCoefficients::new(third, [0.0, 0.0, 2.0, 1.0]);
        session.set_calibration(kept.clone());

        let results = session.read_all_calibration();
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_ok());
        assert!(results[2].1.is_err());
        assert!((session.calibration(first).coeffs[3] - 796.0).abs() < 1e-6);
        assert!((session.calibration(second).coeffs[2] - 1.5).abs() < 1e-6);
        assert_eq!(session.calibration(third), &kept);
    }
}
