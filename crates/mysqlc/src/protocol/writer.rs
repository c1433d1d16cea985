//! Write-side wire primitives.
//!
//! [`PacketWriter`] accumulates a payload and frames it into one or more
//! packets. Splitting for payloads of 2^24 - 1 bytes and larger happens at
//! frame time, including the empty terminator packet when the payload is an
//! exact multiple of the maximum.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{Command, MAX_PACKET_SIZE, PacketHeader};

/// A growable payload buffer with MySQL encoding helpers.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    /// Create a writer with a small default capacity.
    pub fn new() -> Self {
        Self::with_capacity(128)
    }

    /// Create a writer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Current payload length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Borrow the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer, returning the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Write one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a little-endian u16.
    pub fn write_u16_le(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian 3-byte integer.
    pub fn write_u24_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    /// Write a little-endian u32.
    pub fn write_u32_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian u64.
    pub fn write_u64_le(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-encoded integer.
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 251 {
            self.write_u8(value as u8);
        } else if value < 0x1_0000 {
            self.write_u8(0xFC);
            self.write_u16_le(value as u16);
        } else if value < 0x100_0000 {
            self.write_u8(0xFD);
            self.write_u24_le(value as u32);
        } else {
            self.write_u8(0xFE);
            self.write_u64_le(value);
        }
    }

    /// Write a length-encoded byte string.
    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.buffer.extend_from_slice(data);
    }

    /// Write a length-encoded string.
    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    /// Write a NUL-terminated string.
    pub fn write_null_string(&mut self, s: &str) {
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write `count` zero bytes.
    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Frame the accumulated payload into wire packets starting at
    /// `sequence_id`.
    pub fn frame(&self, sequence_id: u8) -> Vec<u8> {
        frame_payload(&self.buffer, sequence_id)
    }
}

/// Frame an arbitrary payload into wire packets starting at `sequence_id`.
pub fn frame_payload(payload: &[u8], mut sequence_id: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + PacketHeader::SIZE);

    if payload.len() < MAX_PACKET_SIZE {
        let header = PacketHeader {
            payload_length: payload.len() as u32,
            sequence_id,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(payload);
        return out;
    }

    let mut chunks = payload.chunks(MAX_PACKET_SIZE).peekable();
    let mut last_len = 0;
    while let Some(chunk) = chunks.next() {
        let header = PacketHeader {
            payload_length: chunk.len() as u32,
            sequence_id,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(chunk);
        sequence_id = sequence_id.wrapping_add(1);
        if chunks.peek().is_none() {
            last_len = chunk.len();
        }
    }

    // A final full-sized chunk needs an empty packet to mark the end.
    if last_len == MAX_PACKET_SIZE {
        let header = PacketHeader {
            payload_length: 0,
            sequence_id,
        };
        out.extend_from_slice(&header.to_bytes());
    }

    out
}

/// Build a complete command packet: command byte plus argument payload.
pub fn build_command_packet(command: Command, payload: &[u8], sequence_id: u8) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(1 + payload.len());
    writer.write_u8(command as u8);
    writer.write_bytes(payload);
    writer.frame(sequence_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_integers() {
        let mut w = PacketWriter::new();
        w.write_u8(0x01);
        w.write_u16_le(0x1234);
        w.write_u24_le(0x0012_3456);
        w.write_u32_le(0x1234_5678);
        assert_eq!(
            w.as_bytes(),
            &[0x01, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn lenenc_int_thresholds() {
        let mut w = PacketWriter::new();
        w.write_lenenc_int(250);
        assert_eq!(w.as_bytes(), &[0xFA]);

        let mut w = PacketWriter::new();
        w.write_lenenc_int(251);
        assert_eq!(w.as_bytes(), &[0xFC, 0xFB, 0x00]);

        let mut w = PacketWriter::new();
        w.write_lenenc_int(0x1_0000);
        assert_eq!(w.as_bytes(), &[0xFD, 0x00, 0x00, 0x01]);

        let mut w = PacketWriter::new();
        w.write_lenenc_int(0x100_0000);
        assert_eq!(w.as_bytes(), &[0xFE, 0, 0, 0, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn lenenc_roundtrip_with_reader() {
        use crate::protocol::PacketReader;
        for value in [0u64, 1, 250, 251, 65535, 65536, 0xFF_FFFF, 0x100_0000, u64::MAX] {
            let mut w = PacketWriter::new();
            w.write_lenenc_int(value);
            let mut r = PacketReader::new(w.as_bytes());
            assert_eq!(r.read_lenenc_int(), Some(value), "value {value}");
        }
    }

    #[test]
    fn strings() {
        let mut w = PacketWriter::new();
        w.write_null_string("user");
        w.write_lenenc_string("db");
        assert_eq!(w.as_bytes(), b"user\0\x02db");
    }

    #[test]
    fn frame_small_payload() {
        let mut w = PacketWriter::new();
        w.write_bytes(b"ping");
        let packet = w.frame(3);
        assert_eq!(&packet[..4], &[0x04, 0x00, 0x00, 0x03]);
        assert_eq!(&packet[4..], b"ping");
    }

    #[test]
    fn frame_splits_oversized_payload() {
        let payload = vec![0xAA; MAX_PACKET_SIZE + 10];
        let framed = frame_payload(&payload, 0);

        // First packet: full size, seq 0.
        let first = PacketHeader::from_bytes(&[framed[0], framed[1], framed[2], framed[3]]);
        assert_eq!(first.payload_length as usize, MAX_PACKET_SIZE);
        assert_eq!(first.sequence_id, 0);

        // Second packet: the 10-byte remainder, seq 1.
        let off = 4 + MAX_PACKET_SIZE;
        let second =
            PacketHeader::from_bytes(&[framed[off], framed[off + 1], framed[off + 2], framed[off + 3]]);
        assert_eq!(second.payload_length, 10);
        assert_eq!(second.sequence_id, 1);
        assert_eq!(framed.len(), 4 + MAX_PACKET_SIZE + 4 + 10);
    }

    #[test]
    fn frame_exact_multiple_appends_empty_packet() {
        let payload = vec![0x55; MAX_PACKET_SIZE];
        let framed = frame_payload(&payload, 0);

        let off = 4 + MAX_PACKET_SIZE;
        let tail = PacketHeader::from_bytes(&[framed[off], framed[off + 1], framed[off + 2], framed[off + 3]]);
        assert_eq!(tail.payload_length, 0);
        assert_eq!(tail.sequence_id, 1);
        assert_eq!(framed.len(), 4 + MAX_PACKET_SIZE + 4);
    }

    #[test]
    fn command_packet_layout() {
        let packet = build_command_packet(Command::Query, b"SELECT 1", 0);
        assert_eq!(&packet[..4], &[0x09, 0x00, 0x00, 0x00]);
        assert_eq!(packet[4], 0x03);
        assert_eq!(&packet[5..], b"SELECT 1");
    }
}
