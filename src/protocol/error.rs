use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("serial port is not open")]
    PortNotOpen,
    #[error("no response to command 0x{command:02X} within {timeout_ms} ms")]
    NoResponse { command: u8, timeout_ms: u128 },
    #[error("invalid frame header: {0:02X?}")]
    BadHeader(Vec<u8>),
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },
    #[error("incomplete payload: expected {expected} bytes, got {actual}")]
    Incomplete { expected: usize, actual: usize },
    #[error("pixel payload must be 4096 bytes, got {0}")]
    PayloadLength(usize),
    #[error("reply value {value} out of range for {what}")]
    OutOfRange { what: &'static str, value: u8 },
    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl ProtocolError {
    /// True when the failure only means the device did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::NoResponse { .. })
    }
}
