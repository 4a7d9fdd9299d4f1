use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};

use crate::error::ConfigError;
use crate::protocol::ProtocolError;

/// Byte stream to the spectrometer. The shell opens and closes it; the session
/// only reads, writes and waits.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads whatever arrives within `timeout`. Returns 0 when nothing came.
    fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Drops unread input.
    fn clear_input(&mut self) -> io::Result<()>;

    fn name(&self) -> &str;

    /// Reads until `len` bytes arrived or `timeout` elapsed; may return fewer.
    fn read_up_to(&mut self, len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::with_capacity(len);
        let mut chunk = vec![0u8; len.clamp(1, 4096)];
        while out.len() < len {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let want = (len - out.len()).min(chunk.len());
            let n = self.read_some(&mut chunk[..want], deadline - now)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    #[default]
    B19200,
    B38400,
    B115200,
}

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B19200 => 19_200,
            BaudRate::B38400 => 38_400,
            BaudRate::B115200 => 115_200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            19_200 => Ok(BaudRate::B19200),
            38_400 => Ok(BaudRate::B38400),
            115_200 => Ok(BaudRate::B115200),
            other => Err(ConfigError::InvalidBaudRate(other)),
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        value.as_u32()
    }
}

/// Names of the serial ports the OS reports.
pub fn available_ports() -> Result<Vec<String>, ProtocolError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    pub fn open(port_name: &str, baud: BaudRate) -> Result<Self, ProtocolError> {
        let port = serialport::new(port_name, baud.as_u32())
            .timeout(Duration::from_secs(10))
            .open()?;
        info!("opened {port_name} at {} baud", baud.as_u32());
        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port
            .set_timeout(timeout.max(Duration::from_millis(1)))
            .map_err(io::Error::from)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory transport for tests and deterministic playback: replies are
/// queued up front and every write is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    incoming: VecDeque<u8>,
    pub written: Vec<Vec<u8>>,
    pub clears: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, B>(replies: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut transport = Self::new();
        for reply in replies {
            transport.queue(reply.as_ref());
        }
        transport
    }

    pub fn queue(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes.iter().copied());
    }
}

impl Transport for ScriptedTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        debug!("scripted <- {bytes:02X?}");
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let n = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        // Queued replies represent bytes that arrive after the request, so
        // they are kept.
        self.clears += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rates_are_restricted() {
        assert_eq!(BaudRate::try_from(38_400).unwrap(), BaudRate::B38400);
        assert_eq!(
            BaudRate::try_from(9_600),
            Err(ConfigError::InvalidBaudRate(9_600))
        );
    }

    #[test]
    fn read_up_to_returns_partial_on_exhaustion() {
        let mut t = ScriptedTransport::with_replies([[1u8, 2, 3]]);
        let got = t.read_up_to(10, Duration::from_millis(100)).unwrap();
        assert_eq!(got, vec![1, 2, 3]);
        assert!(t.read_up_to(1, Duration::from_millis(100)).unwrap().is_empty());
    }
}
