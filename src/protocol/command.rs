// src/protocol/command.rs
use std::fmt;

/// Single-byte op-codes carried in the second byte of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    SingleAcquire = 0x01,
    ContinuousStart = 0x02,
    SetIntegrationTime = 0x03,
    SetGain = 0x04,
    SetOffset = 0x05,
    Stop = 0x06,
    SetTriggerMode = 0x07,
    GetIntegrationTime = 0x0A,
    SetAverage = 0x0C,
    SetAnalogOutput = 0x0D,
    SetTriggerOut = 0x10,
    SetIntegrationUnit = 0x11,
    GetIntegrationUnit = 0x12,
    SaveToFlash = 0x22,
    GetGain = 0x23,
    GetOffset = 0x24,
    Smoothing = 0x25,
    WriteCalibration = 0x28,
    ReadCalibration = 0x29,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Op-code the device puts in its reply frame.
    ///
    /// The integration-time query is answered under 0x02; every other query
    /// echoes its own op-code.
    pub fn reply_code(self) -> u8 {
        match self {
            Command::GetIntegrationTime => 0x02,
            other => other.code(),
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let cmd = match code {
            0x01 => Command::SingleAcquire,
            0x02 => Command::ContinuousStart,
            0x03 => Command::SetIntegrationTime,
            0x04 => Command::SetGain,
            0x05 => Command::SetOffset,
            0x06 => Command::Stop,
            0x07 => Command::SetTriggerMode,
            0x0A => Command::GetIntegrationTime,
            0x0C => Command::SetAverage,
            0x0D => Command::SetAnalogOutput,
            0x10 => Command::SetTriggerOut,
            0x11 => Command::SetIntegrationUnit,
            0x12 => Command::GetIntegrationUnit,
            0x22 => Command::SaveToFlash,
            0x23 => Command::GetGain,
            0x24 => Command::GetOffset,
            0x25 => Command::Smoothing,
            0x28 => Command::WriteCalibration,
            0x29 => Command::ReadCalibration,
            _ => return None,
        };
        Some(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.code())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IntegrationUnit {
    #[default]
    Milliseconds,
    Microseconds,
}

impl IntegrationUnit {
    pub fn from_byte(byte: u8) -> Self {
        if byte == 0x00 {
            IntegrationUnit::Milliseconds
        } else {
            IntegrationUnit::Microseconds
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            IntegrationUnit::Milliseconds => 0x00,
            IntegrationUnit::Microseconds => 0x01,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IntegrationUnit::Milliseconds => "ms",
            IntegrationUnit::Microseconds => "µs",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TriggerMode {
    #[default]
    Software,
    ExternalContinuous,
    ExternalSingle,
}

impl TriggerMode {
    pub fn as_byte(self) -> u8 {
        match self {
            TriggerMode::Software => 0,
            TriggerMode::ExternalContinuous => 1,
            TriggerMode::ExternalSingle => 2,
        }
    }
}

/// Offset encoding: magnitude byte plus a sign byte (1 = non-negative).
pub fn encode_offset(offset: i16) -> (u8, u8) {
    let magnitude = (offset.unsigned_abs() & 0xFF) as u8;
    let sign = if offset >= 0 { 0x01 } else { 0x00 };
    (magnitude, sign)
}

pub fn decode_offset(magnitude: u8, sign: u8) -> i16 {
    if sign == 0x01 {
        magnitude as i16
    } else {
        -(magnitude as i16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_time_reply_uses_continuous_code() {
        assert_eq!(Command::GetIntegrationTime.reply_code(), 0x02);
        assert_eq!(Command::GetGain.reply_code(), 0x23);
    }

    #[test]
    fn offset_sign_byte() {
        assert_eq!(encode_offset(-12), (12, 0));
        assert_eq!(encode_offset(40), (40, 1));
        assert_eq!(decode_offset(12, 0), -12);
        assert_eq!(decode_offset(40, 1), 40);
    }

    #[test]
    fn codes_round_trip() {
        for code in 0u8..=0x30 {
            if let Some(cmd) = Command::from_code(code) {
                assert_eq!(cmd.code(), code);
            }
        }
    }
}
