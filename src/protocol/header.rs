//! Frame header wire format.
//!
//! ```text
//! offset  field                 type
//!  0      magic                 u32  ("ESP2")
//!  4      sequence              u32
//!  8      first_sample_index    u64
//! 16      timestamp_us          u64
//! 24      frame_count           u16
//! 26      channel_count         u8
//! 27      bytes_per_sample      u8
//! 28      declared_sample_rate  u32
//! 32      format_id             u16
//! ```
//!
//! All multi-byte integers are little-endian. The payload that follows holds
//! `frame_count * channel_count * bytes_per_sample` bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{HEADER_MAGIC, HEADER_SIZE};
use crate::error::ProtocolError;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub sequence: u32,
    pub first_sample_index: u64,
    pub timestamp_us: u64,
    pub frame_count: u16,
    pub channel_count: u8,
    pub bytes_per_sample: u8,
    pub declared_sample_rate: u32,
    pub format_id: u16,
}

impl FrameHeader {
    /// Parse the fixed header. Does not check the magic.
    pub fn parse(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &raw[..];
        Self {
            magic: buf.get_u32_le(),
            sequence: buf.get_u32_le(),
            first_sample_index: buf.get_u64_le(),
            timestamp_us: buf.get_u64_le(),
            frame_count: buf.get_u16_le(),
            channel_count: buf.get_u8(),
            bytes_per_sample: buf.get_u8(),
            declared_sample_rate: buf.get_u32_le(),
            format_id: buf.get_u16_le(),
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        let mut buf = &mut raw[..];
        buf.put_u32_le(self.magic);
        buf.put_u32_le(self.sequence);
        buf.put_u64_le(self.first_sample_index);
        buf.put_u64_le(self.timestamp_us);
        buf.put_u16_le(self.frame_count);
        buf.put_u8(self.channel_count);
        buf.put_u8(self.bytes_per_sample);
        buf.put_u32_le(self.declared_sample_rate);
        buf.put_u16_le(self.format_id);
        raw
    }

    pub fn check_magic(&self) -> Result<(), ProtocolError> {
        if self.magic != HEADER_MAGIC {
            return Err(ProtocolError::BadMagic {
                found: self.magic,
                expected: HEADER_MAGIC,
            });
        }
        Ok(())
    }

    /// Payload size implied by the header geometry
    pub fn payload_len(&self) -> usize {
        self.frame_count as usize * self.channel_count as usize * self.bytes_per_sample as usize
    }

    /// Index of the last sample frame carried by this packet
    pub fn last_sample_index(&self) -> u64 {
        self.first_sample_index
            .saturating_add((self.frame_count as u64).saturating_sub(1))
    }
}

/// Header plus raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Serialize header and payload back to back
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
