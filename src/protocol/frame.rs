//! Byte-level framing for the spectrometer link.
//!
//! Three shapes travel over the wire:
//!
//! - 5-byte command/reply frames `[0x81, cmd, d1, d2, crc]`, where `crc` is the
//!   low byte of the sum of the first four bytes.
//! - Spectral replies: header `[0x81, 0x01, lenHi, lenLo, 0x00]`, then `len`
//!   pixel bytes (big-endian u16 samples) and a 16-bit payload checksum.
//! - Calibration packets: a 5-byte header, a 64-byte ASCII payload holding four
//!   coefficients and a trailing checksum over everything before it.
use log::debug;

use crate::protocol::ProtocolError;

pub const HEADER: u8 = 0x81;
pub const FRAME_LEN: usize = 5;
/// Pixels on the line sensor.
pub const PIXEL_COUNT: usize = 2048;
pub const PIXEL_PAYLOAD_LEN: usize = PIXEL_COUNT * 2;
pub const CALIBRATION_PAYLOAD_LEN: usize = 64;
const CALIBRATION_FIELD_LEN: usize = 16;
/// Longest ASCII rendering of one coefficient; the 16th byte stays NUL.
const CALIBRATION_FIELD_MAX_CHARS: usize = 15;
/// Reply to a calibration read: header + payload + checksum.
pub const CALIBRATION_REPLY_LEN: usize = FRAME_LEN + CALIBRATION_PAYLOAD_LEN + 1;

/// Low byte of the sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Sum of the pixel payload, truncated to 16 bits.
pub fn payload_checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, b| acc.wrapping_add(*b as u16))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub data1: u8,
    pub data2: u8,
}

impl Frame {
    pub fn new(command: u8, data1: u8, data2: u8) -> Self {
        Self {
            command,
            data1,
            data2,
        }
    }

    pub fn bare(command: u8) -> Self {
        Self::new(command, 0x00, 0x00)
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let head = [HEADER, self.command, self.data1, self.data2];
        [head[0], head[1], head[2], head[3], checksum(&head)]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < FRAME_LEN || bytes[0] != HEADER {
            return Err(ProtocolError::BadHeader(bytes.iter().take(FRAME_LEN).copied().collect()));
        }
        let expected = checksum(&bytes[..4]);
        if expected != bytes[4] {
            return Err(ProtocolError::Checksum {
                expected,
                actual: bytes[4],
            });
        }
        Ok(Self::new(bytes[1], bytes[2], bytes[3]))
    }

    /// Big-endian u16 carried in the two data bytes.
    pub fn data_u16(&self) -> u16 {
        u16::from_be_bytes([self.data1, self.data2])
    }
}

/// Accumulates incoming bytes and yields the first valid reply for `expected`.
///
/// Candidates with a wrong op-code, header or checksum are skipped one byte at
/// a time, so a corrupted or foreign frame never aborts the exchange.
#[derive(Debug)]
pub struct ReplyScanner {
    expected: u8,
    buf: Vec<u8>,
}

impl ReplyScanner {
    pub fn new(expected: u8) -> Self {
        Self {
            expected,
            buf: Vec::with_capacity(16),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Option<Frame> {
        self.buf.extend_from_slice(bytes);
        while self.buf.len() >= FRAME_LEN {
            if self.buf[1] == self.expected {
                if let Ok(frame) = Frame::decode(&self.buf[..FRAME_LEN]) {
                    self.buf.drain(..FRAME_LEN);
                    return Some(frame);
                }
            }
            self.buf.remove(0);
        }
        None
    }
}

/// Validates a spectral reply header and returns the announced payload length.
pub fn parse_spectrum_header(head: &[u8]) -> Result<usize, ProtocolError> {
    if head.len() != FRAME_LEN || head[0] != HEADER || head[1] != 0x01 || head[4] != 0x00 {
        return Err(ProtocolError::BadHeader(head.to_vec()));
    }
    Ok(u16::from_be_bytes([head[2], head[3]]) as usize)
}

/// Splits `length + 2` payload bytes into pixel data and decodes the samples.
///
/// The trailing checksum is only compared for diagnostics.
pub fn decode_spectrum_payload(data: &[u8]) -> Result<Vec<u16>, ProtocolError> {
    if data.len() < 2 {
        return Err(ProtocolError::Incomplete {
            expected: 2,
            actual: data.len(),
        });
    }
    let (pixels, tail) = data.split_at(data.len() - 2);
    let received = u16::from_be_bytes([tail[0], tail[1]]);
    let computed = payload_checksum(pixels);
    if received != computed {
        debug!("pixel payload checksum differs: device 0x{received:04X}, computed 0x{computed:04X}");
    }
    decode_pixels(pixels)
}

pub fn decode_pixels(pixels: &[u8]) -> Result<Vec<u16>, ProtocolError> {
    if pixels.len() != PIXEL_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadLength(pixels.len()));
    }
    Ok(pixels
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Builds a full spectral reply. Used by the simulator and tests.
pub fn encode_spectrum_reply(samples: &[u16]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        pixels.extend_from_slice(&s.to_be_bytes());
    }
    let len = pixels.len() as u16;
    let mut out = Vec::with_capacity(FRAME_LEN + pixels.len() + 2);
    out.extend_from_slice(&[HEADER, 0x01]);
    out.extend_from_slice(&len.to_be_bytes());
    out.push(0x00);
    out.extend_from_slice(&pixels);
    out.extend_from_slice(&payload_checksum(&pixels).to_be_bytes());
    out
}

/// Shortest scientific rendering of `value` that fits a calibration field,
/// keeping at least 7 significant digits.
fn format_coefficient(value: f64) -> String {
    for precision in (6..=9).rev() {
        let text = format!("{value:.precision$e}");
        if text.len() <= CALIBRATION_FIELD_MAX_CHARS {
            return text;
        }
    }
    let mut text = format!("{value:.6e}");
    text.truncate(CALIBRATION_FIELD_MAX_CHARS);
    text
}

pub fn encode_calibration_payload(coeffs: &[f64; 4]) -> [u8; CALIBRATION_PAYLOAD_LEN] {
    let mut payload = [0u8; CALIBRATION_PAYLOAD_LEN];
    for (slot, value) in payload.chunks_exact_mut(CALIBRATION_FIELD_LEN).zip(coeffs) {
        let text = format_coefficient(*value);
        slot[..text.len()].copy_from_slice(text.as_bytes());
    }
    payload
}

/// Unparsable fields decode as 0.0.
pub fn decode_calibration_payload(payload: &[u8]) -> [f64; 4] {
    let mut out = [0.0; 4];
    for (value, slot) in out.iter_mut().zip(payload.chunks(CALIBRATION_FIELD_LEN)) {
        let end = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
        let text = String::from_utf8_lossy(&slot[..end]);
        *value = text.trim().parse::<f64>().unwrap_or(0.0);
    }
    out
}

/// `[0x81, 0x28, group, 0x00, crc] + payload + crc(all previous bytes)`.
pub fn encode_calibration_write(group: u8, coeffs: &[f64; 4]) -> Vec<u8> {
    let head = Frame::new(0x28, group, 0x00).encode();
    let mut packet = Vec::with_capacity(CALIBRATION_REPLY_LEN);
    packet.extend_from_slice(&head);
    packet.extend_from_slice(&encode_calibration_payload(coeffs));
    packet.push(checksum(&packet));
    packet
}

/// Builds the device's answer to a calibration read.
pub fn encode_calibration_reply(group: u8, coeffs: &[f64; 4]) -> Vec<u8> {
    let head = Frame::new(0x29, group, CALIBRATION_PAYLOAD_LEN as u8).encode();
    let mut packet = Vec::with_capacity(CALIBRATION_REPLY_LEN);
    packet.extend_from_slice(&head);
    packet.extend_from_slice(&encode_calibration_payload(coeffs));
    packet.push(checksum(&packet));
    packet
}

pub fn decode_calibration_reply(group: u8, raw: &[u8]) -> Result<[f64; 4], ProtocolError> {
    if raw.len() < FRAME_LEN + CALIBRATION_PAYLOAD_LEN {
        return Err(ProtocolError::Incomplete {
            expected: CALIBRATION_REPLY_LEN,
            actual: raw.len(),
        });
    }
    if raw[0] != HEADER
        || raw[1] != 0x29
        || raw[2] != group
        || raw[3] != CALIBRATION_PAYLOAD_LEN as u8
    {
        return Err(ProtocolError::BadHeader(raw[..FRAME_LEN].to_vec()));
    }
    let body_end = FRAME_LEN + CALIBRATION_PAYLOAD_LEN;
    if let Some(&received) = raw.get(body_end) {
        let computed = checksum(&raw[..body_end]);
        if received != computed {
            debug!("calibration reply checksum differs: device 0x{received:02X}, computed 0x{computed:02X}");
        }
    }
    Ok(decode_calibration_payload(&raw[FRAME_LEN..body_end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        for (cmd, d1, d2) in [(0x01, 0, 0), (0x03, 0x01, 0xF4), (0x25, 10, 0), (0xFF, 0xFF, 0xFF)] {
            let bytes = Frame::new(cmd, d1, d2).encode();
            assert_eq!(bytes[0], HEADER);
            let frame = Frame::decode(&bytes).unwrap();
            assert_eq!((frame.command, frame.data1, frame.data2), (cmd, d1, d2));
        }
    }

    #[test]
    fn checksum_is_sum_mod_256() {
        let bytes = Frame::new(0x0A, 0x00, 0x00).encode();
        assert_eq!(bytes, [0x81, 0x0A, 0x00, 0x00, 0x8B]);
        let wrap = Frame::new(0xFF, 0xFF, 0xFF).encode();
        assert_eq!(wrap[4], ((0x81u32 + 0xFF * 3) % 256) as u8);
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let bytes = Frame::new(0x23, 0x80, 0x00).encode();
        for flip in 1u8..=255 {
            let mut bad = bytes;
            bad[4] ^= flip;
            assert!(Frame::decode(&bad).is_err());
        }
    }

    #[test]
    fn scanner_skips_garbage_and_foreign_frames() {
        let mut scanner = ReplyScanner::new(0x23);
        let mut stream = vec![0x00, 0x13, 0x81];
        stream.extend_from_slice(&Frame::new(0x24, 5, 1).encode());
        let mut corrupt = Frame::new(0x23, 7, 0).encode();
        corrupt[4] = corrupt[4].wrapping_add(1);
        stream.extend_from_slice(&corrupt);
        assert!(scanner.push(&stream).is_none());
        let frame = scanner.push(&Frame::new(0x23, 200, 0).encode()).unwrap();
        assert_eq!(frame.data1, 200);
    }

    #[test]
    fn spectrum_reply_decodes() {
        let samples: Vec<u16> = (0..PIXEL_COUNT as u16).collect();
        let reply = encode_spectrum_reply(&samples);
        let len = parse_spectrum_header(&reply[..FRAME_LEN]).unwrap();
        assert_eq!(len, PIXEL_PAYLOAD_LEN);
        let decoded = decode_spectrum_payload(&reply[FRAME_LEN..]).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn short_pixel_payload_is_rejected() {
        let reply = encode_spectrum_reply(&[1, 2, 3]);
        assert!(matches!(
            decode_spectrum_payload(&reply[FRAME_LEN..]),
            Err(ProtocolError::PayloadLength(6))
        ));
    }

    #[test]
    fn spectrum_header_requires_trailing_zero() {
        assert!(parse_spectrum_header(&[0x81, 0x01, 0x10, 0x00, 0x01]).is_err());
        assert!(parse_spectrum_header(&[0x81, 0x02, 0x10, 0x00, 0x00]).is_err());
    }

    #[test]
    fn calibration_payload_round_trip() {
        let coeffs = [-1.234_567_891e-9, 3.141_592_653e-5, 0.157_894_736_8, 796.123_456_7];
        let payload = encode_calibration_payload(&coeffs);
        assert_eq!(payload.len(), 64);
        for slot in payload.chunks(16) {
            assert_eq!(slot[15], 0);
        }
        let decoded = decode_calibration_payload(&payload);
        for (a, b) in coeffs.iter().zip(decoded.iter()) {
            assert!(((a - b) / a).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn calibration_extreme_exponent_still_fits() {
        let coeffs = [-9.876_543_21e-300, 1.0e300, 0.0, -0.5];
        let decoded = decode_calibration_payload(&encode_calibration_payload(&coeffs));
        assert!(((decoded[0] - coeffs[0]) / coeffs[0]).abs() < 1e-6);
        assert!(((decoded[1] - coeffs[1]) / coeffs[1]).abs() < 1e-6);
        assert_eq!(decoded[2], 0.0);
        assert_eq!(decoded[3], -0.5);
    }

    #[test]
    fn calibration_write_packet_shape() {
        let packet = encode_calibration_write(2, &[0.0, 0.0, 0.16, 796.0]);
        assert_eq!(packet.len(), CALIBRATION_REPLY_LEN);
        assert_eq!(&packet[..4], &[0x81, 0x28, 0x02, 0x00]);
        assert_eq!(packet[4], checksum(&packet[..4]));
        assert_eq!(*packet.last().unwrap(), checksum(&packet[..packet.len() - 1]));
    }

    #[test]
    fn calibration_reply_rejects_wrong_group() {
        let reply = encode_calibration_reply(1, &[0.0, 0.0, 1.0, 2.0]);
        assert!(decode_calibration_reply(2, &reply).is_err());
        assert_eq!(decode_calibration_reply(1, &reply).unwrap(), [0.0, 0.0, 1.0, 2.0]);
    }
}
