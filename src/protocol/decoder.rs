//! Frame decoder
//!
//! Pulls header + payload pairs off a [`ByteSource`]. Framing always follows
//! the header's own geometry fields; the expected stream format is only used
//! to warn about a misconfigured producer.

use bytes::Bytes;

use crate::config::StreamConfig;
use crate::constants::HEADER_SIZE;
use crate::error::{DecodeError, ProtocolError};
use crate::network::{ByteSource, Fill};
use crate::protocol::header::{Frame, FrameHeader};

/// Widest sample slot the converter can handle
pub const MAX_BYTES_PER_SAMPLE: u8 = 8;

/// Header fields checked against the expected stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatField {
    SampleRate,
    Channels,
    BytesPerSample,
    FormatId,
}

impl FormatField {
    const ALL: [FormatField; 4] = [
        FormatField::SampleRate,
        FormatField::Channels,
        FormatField::BytesPerSample,
        FormatField::FormatId,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Decoder for one session's byte stream
pub struct FrameDecoder<S> {
    source: S,
    expected: StreamConfig,
    /// Header buffer (reused)
    header_buf: [u8; HEADER_SIZE],
    last_sequence: Option<u32>,
    /// Fields already warned about this session
    warned: u8,
    /// Set after a fault or end of stream
    finished: bool,
    frames_decoded: u64,
    bytes_received: u64,
    sequence_gaps: u64,
    config_mismatches: u64,
}

impl<S: ByteSource> FrameDecoder<S> {
    pub fn new(source: S, expected: StreamConfig) -> Self {
        Self {
            source,
            expected,
            header_buf: [0u8; HEADER_SIZE],
            last_sequence: None,
            warned: 0,
            finished: false,
            frames_decoded: 0,
            bytes_received: 0,
            sequence_gaps: 0,
            config_mismatches: 0,
        }
    }

    /// Decode the next frame.
    ///
    /// `Ok(None)` means the peer closed the connection; that is the normal
    /// end of a session, even when it happens halfway through a frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.finished {
            return Ok(None);
        }
        let result = self.read_frame();
        match &result {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => self.finished = true,
        }
        result
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.source.fill(&mut self.header_buf)? {
            Fill::Complete => {}
            Fill::Closed { received: 0 } => return Ok(None),
            Fill::Closed { received } => {
                tracing::debug!("Peer closed mid-header after {} bytes", received);
                return Ok(None);
            }
        }
        self.bytes_received += HEADER_SIZE as u64;

        let header = FrameHeader::parse(&self.header_buf);
        header.check_magic()?;
        self.check_format(&header);

        let len = header.payload_len();
        if len == 0 {
            return Err(ProtocolError::EmptyPayload {
                frame_count: header.frame_count,
                channel_count: header.channel_count,
                bytes_per_sample: header.bytes_per_sample,
            }
            .into());
        }
        if len > self.expected.max_payload_bytes {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: self.expected.max_payload_bytes,
            }
            .into());
        }
        if header.bytes_per_sample > MAX_BYTES_PER_SAMPLE {
            return Err(ProtocolError::UnsupportedSampleWidth(header.bytes_per_sample).into());
        }

        let mut payload = vec![0u8; len];
        match self.source.fill(&mut payload)? {
            Fill::Complete => {}
            Fill::Closed { received } => {
                tracing::debug!(
                    "Peer closed mid-payload of frame {} ({}/{} bytes)",
                    header.sequence,
                    received,
                    len
                );
                return Ok(None);
            }
        }
        self.bytes_received += len as u64;

        self.track_sequence(header.sequence);
        self.frames_decoded += 1;

        Ok(Some(Frame {
            header,
            payload: Bytes::from(payload),
        }))
    }

    /// Warn (once per field per session) about unexpected format fields
    fn check_format(&mut self, header: &FrameHeader) {
        let mut mismatched = false;
        for field in FormatField::ALL {
            let (found, expected) = match field {
                FormatField::SampleRate => {
                    (header.declared_sample_rate, self.expected.sample_rate)
                }
                FormatField::Channels => {
                    (header.channel_count as u32, self.expected.channels as u32)
                }
                FormatField::BytesPerSample => (
                    header.bytes_per_sample as u32,
                    self.expected.bytes_per_sample as u32,
                ),
                FormatField::FormatId => {
                    (header.format_id as u32, self.expected.format_id as u32)
                }
            };
            if found == expected {
                continue;
            }
            mismatched = true;
            if self.warned & field.bit() == 0 {
                self.warned |= field.bit();
                tracing::warn!(
                    ?field,
                    found,
                    expected,
                    sequence = header.sequence,
                    "Header field does not match expected stream format"
                );
            }
        }
        if mismatched {
            self.config_mismatches += 1;
        }
    }

    fn track_sequence(&mut self, sequence: u32) {
        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                self.sequence_gaps += 1;
                tracing::debug!(
                    "Sequence gap: expected {}, got {} ({} frames missing)",
                    expected,
                    sequence,
                    sequence.wrapping_sub(expected)
                );
            }
        }
        self.last_sequence = Some(sequence);
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            bytes_received: self.bytes_received,
            sequence_gaps: self.sequence_gaps,
            config_mismatches: self.config_mismatches,
        }
    }

    /// Give back the underlying source
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: ByteSource> Iterator for FrameDecoder<S> {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Decoder statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub bytes_received: u64,
    pub sequence_gaps: u64,
    pub config_mismatches: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FORMAT_INT32_LEFT24, HEADER_MAGIC};
    use crate::network::source::tests::ChunkedReader;
    use std::io::{self, Cursor};

    fn header(sequence: u32, frame_count: u16) -> FrameHeader {
        FrameHeader {
            magic: HEADER_MAGIC,
            sequence,
            first_sample_index: sequence as u64 * frame_count as u64,
            timestamp_us: sequence as u64 * 1000,
            frame_count,
            channel_count: 1,
            bytes_per_sample: 4,
            declared_sample_rate: 48000,
            format_id: FORMAT_INT32_LEFT24,
        }
    }

    fn wire(header: FrameHeader) -> Vec<u8> {
        let mut out = header.encode().to_vec();
        out.extend((0..header.payload_len()).map(|i| i as u8));
        out
    }

    #[test]
    fn test_decode_two_frames_then_end() {
        let mut stream = wire(header(0, 4));
        stream.extend(wire(header(1, 4)));
        let mut decoder = FrameDecoder::new(Cursor::new(stream), StreamConfig::default());

        let first = decoder.next_frame().unwrap().unwrap();
        assert_eq!(first.header.sequence, 0);
        assert_eq!(first.payload.len(), 16);
        assert_eq!(first.payload[5], 5);

        let second = decoder.next_frame().unwrap().unwrap();
        assert_eq!(second.header.sequence, 1);

        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.stats().frames_decoded, 2);
        assert_eq!(decoder.stats().bytes_received, 2 * (34 + 16));
    }

    #[test]
    fn test_decode_trickled_bytes() {
        let stream = wire(header(7, 32));
        let mut decoder =
            FrameDecoder::new(ChunkedReader::trickle(&stream, 3), StreamConfig::default());
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.header.sequence, 7);
        assert_eq!(frame.payload.len(), 128);
    }

    #[test]
    fn test_bad_magic_is_fault() {
        let mut bad = header(0, 4);
        bad.magic = 0x1234_5678;
        let mut decoder = FrameDecoder::new(Cursor::new(wire(bad)), StreamConfig::default());
        assert!(matches!(
            decoder.next_frame(),
            Err(DecodeError::Protocol(ProtocolError::BadMagic { found: 0x1234_5678, .. }))
        ));
        // Fused after a fault
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_zero_frame_count_reads_no_payload() {
        let mut stream = header(0, 0).encode().to_vec();
        stream.extend([0xAA; 8]);
        let mut decoder = FrameDecoder::new(Cursor::new(stream), StreamConfig::default());
        assert!(matches!(
            decoder.next_frame(),
            Err(DecodeError::Protocol(ProtocolError::EmptyPayload { frame_count: 0, .. }))
        ));
        let cursor = decoder.into_inner();
        assert_eq!(cursor.position(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_oversized_payload_is_fault() {
        let config = StreamConfig {
            max_payload_bytes: 64,
            ..StreamConfig::default()
        };
        let mut decoder = FrameDecoder::new(Cursor::new(wire(header(0, 17))), config);
        assert!(matches!(
            decoder.next_frame(),
            Err(DecodeError::Protocol(ProtocolError::PayloadTooLarge { len: 68, max: 64 }))
        ));
    }

    #[test]
    fn test_close_mid_payload_ends_session() {
        let mut stream = wire(header(0, 8));
        stream.truncate(HEADER_SIZE + 10);
        let mut decoder = FrameDecoder::new(Cursor::new(stream), StreamConfig::default());
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_close_mid_header_ends_session() {
        let stream = header(0, 8).encode()[..20].to_vec();
        let mut decoder = FrameDecoder::new(Cursor::new(stream), StreamConfig::default());
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_transport_error_is_fault() {
        let mut stream = header(0, 4).encode().to_vec();
        stream.extend([0u8; 4]);
        let reader = ChunkedReader::new(vec![
            Ok(stream),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
        ]);
        let mut decoder = FrameDecoder::new(reader, StreamConfig::default());
        match decoder.next_frame() {
            Err(DecodeError::Transport(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected transport fault, got {:?}", other.map(|f| f.is_some())),
        }
    }

    #[test]
    fn test_format_mismatch_still_uses_header_geometry() {
        let mut stereo = header(0, 4);
        stereo.channel_count = 2;
        stereo.declared_sample_rate = 44100;
        let mut stream = wire(stereo);
        stream.extend(wire(header(1, 4)));

        let mut decoder = FrameDecoder::new(Cursor::new(stream), StreamConfig::default());
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload.len(), 32);

        // Next frame still in sync
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.header.sequence, 1);
        assert_eq!(decoder.stats().config_mismatches, 1);
    }

    #[test]
    fn test_sequence_gaps_are_counted_not_fatal() {
        let mut stream = Vec::new();
        for seq in [10, 11, 14, 15, 20] {
            stream.extend(wire(header(seq, 2)));
        }
        let mut decoder = FrameDecoder::new(Cursor::new(stream), StreamConfig::default());
        let frames: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(decoder.stats().sequence_gaps, 2);
    }

    #[test]
    fn test_sequence_wraparound_is_not_a_gap() {
        let mut stream = wire(header(u32::MAX, 2));
        stream.extend(wire(header(0, 2)));
        let mut decoder = FrameDecoder::new(Cursor::new(stream), StreamConfig::default());
        while decoder.next_frame().unwrap().is_some() {}
        assert_eq!(decoder.stats().sequence_gaps, 0);
    }

    #[test]
    fn test_unsupported_sample_width() {
        let mut wide = header(0, 1);
        wide.bytes_per_sample = 9;
        let mut decoder = FrameDecoder::new(Cursor::new(wire(wide)), StreamConfig::default());
        assert!(matches!(
            decoder.next_frame(),
            Err(DecodeError::Protocol(ProtocolError::UnsupportedSampleWidth(9)))
        ));
    }
}
