//! One producer session: decode, convert, append, repeat

use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::audio::convert_frames_into;
use crate::config::StreamConfig;
use crate::control::ControlState;
use crate::error::DecodeError;
use crate::network::ByteSource;
use crate::protocol::{DecoderStats, FrameDecoder};
use crate::recording::ContainerWriter;

/// Identity of an accepted connection
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            started_at: Utc::now(),
        }
    }
}

/// Why a session stopped
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer closed the connection
    Closed,
    /// Protocol or transport fault
    Fault(DecodeError),
    /// Receiver is shutting down
    Shutdown,
}

/// Summary logged when a session ends
#[derive(Debug)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub stats: DecoderStats,
    pub bytes_written: u64,
    pub samples_written: u64,
}

/// Drive frames from `source` into `writer` until the stream ends, faults,
/// or the receiver stops running.
///
/// The writer must already be open. Samples are written in the writer's
/// channel layout; a producer declaring a different channel count has its
/// extra channels dropped or the missing ones filled with silence.
pub fn run_session<S: ByteSource>(
    session: &Session,
    source: S,
    expected: &StreamConfig,
    writer: &ContainerWriter,
    state: &ControlState,
) -> SessionReport {
    let mut decoder = FrameDecoder::new(source, expected.clone());
    let out_channels = writer.format().channels.min(u8::MAX as u16) as u8;
    let mut out = Vec::new();
    let mut bytes_written = 0u64;
    let mut gaps_reported = 0u64;

    let end = loop {
        if !state.is_running() {
            break SessionEnd::Shutdown;
        }

        let frame = match decoder.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break SessionEnd::Closed,
            Err(e) => break SessionEnd::Fault(e),
        };
        let header = frame.header;

        out.clear();
        convert_frames_into(
            &frame.payload,
            header.channel_count,
            out_channels,
            header.bytes_per_sample,
            state,
            &mut out,
        );

        match writer.append(&out, header.frame_count as u64) {
            Ok(n) => bytes_written += n as u64,
            Err(e) => {
                tracing::warn!(
                    session = %session.id,
                    "Frame {} not recorded: {}",
                    header.sequence,
                    e
                );
            }
        }

        let gaps = decoder.stats().sequence_gaps;
        state.record_frame(&header, writer.total_samples_written(), gaps - gaps_reported);
        gaps_reported = gaps;

        tracing::trace!(
            seq = header.sequence,
            first_sample = header.first_sample_index,
            frames = header.frame_count,
            ts_us = header.timestamp_us,
            "frame"
        );
    };

    // A shutdown unblocks the read by closing the socket, which looks like
    // a close or a reset from here
    let end = match end {
        SessionEnd::Closed | SessionEnd::Fault(_) if !state.is_running() => SessionEnd::Shutdown,
        other => other,
    };

    SessionReport {
        end,
        stats: decoder.stats(),
        bytes_written,
        samples_written: writer.total_samples_written(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FORMAT_INT32_LEFT24, HEADER_MAGIC};
    use crate::error::ProtocolError;
    use crate::protocol::FrameHeader;
    use crate::recording::WavFormat;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn temp_wav() -> PathBuf {
        std::env::temp_dir().join(format!("esp-session-{}.wav", uuid::Uuid::new_v4()))
    }

    fn frame_with_channels(sequence: u32, channels: u8, slots: &[i32]) -> Vec<u8> {
        let frame_count = slots.len() / channels as usize;
        let header = FrameHeader {
            magic: HEADER_MAGIC,
            sequence,
            first_sample_index: sequence as u64 * frame_count as u64,
            timestamp_us: 0,
            frame_count: frame_count as u16,
            channel_count: channels,
            bytes_per_sample: 4,
            declared_sample_rate: 48000,
            format_id: FORMAT_INT32_LEFT24,
        };
        let mut out = header.encode().to_vec();
        out.extend(slots.iter().flat_map(|s| s.to_le_bytes()));
        out
    }

    fn frame(sequence: u32, samples: &[i32]) -> Vec<u8> {
        frame_with_channels(sequence, 1, samples)
    }

    fn setup() -> (PathBuf, ContainerWriter, ControlState, Session) {
        let path = temp_wav();
        let writer = ContainerWriter::new(&path, WavFormat::new(48000, 1));
        writer.open().unwrap();
        let session = Session::new("127.0.0.1:5000".parse().unwrap());
        (path, writer, ControlState::new(1.0), session)
    }

    fn run(stream: Vec<u8>, writer: &ContainerWriter, state: &ControlState) -> SessionReport {
        let session = Session::new("127.0.0.1:5001".parse().unwrap());
        run_session(
            &session,
            Cursor::new(stream),
            &StreamConfig::default(),
            writer,
            state,
        )
    }

    fn u32_at(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_frames_reach_the_file() {
        let (path, writer, state, _) = setup();
        let mut stream = frame(0, &[0x100, 0x200]);
        stream.extend(frame(1, &[0x300, 0x400]));

        let report = run(stream, &writer, &state);
        writer.close();

        assert!(matches!(report.end, SessionEnd::Closed));
        assert_eq!(report.stats.frames_decoded, 2);
        assert_eq!(report.bytes_written, 12);
        assert_eq!(report.samples_written, 4);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[44..], &[1, 0, 0, 2, 0, 0, 3, 0, 0, 4, 0, 0]);

        let status = state.get_status();
        assert_eq!(status.last_sequence, 1);
        assert_eq!(status.highest_sample_index, 3);
        assert_eq!(status.samples_written, 4);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_gain_comes_from_control_state() {
        let (path, writer, state, _) = setup();
        state.set_gain(2.0);
        let stream = frame(0, &[0x0001_0000, 0xFFFE_0000u32 as i32]);

        run(stream, &writer, &state);
        writer.close();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[44..], &[0x00, 0x02, 0x00, 0x00, 0xFC, 0xFF]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_stereo_producer_into_mono_container() {
        let (path, writer, state, _) = setup();
        // Left channel carries the signal, right is junk that must not land
        let slots = [0x100, 0x900, 0x200, 0x900, 0x300, 0x900, 0x400, 0x900];
        let stream = frame_with_channels(0, 2, &slots);

        let report = run(stream, &writer, &state);
        assert_eq!(report.stats.config_mismatches, 1);
        assert_eq!(report.samples_written, 4);
        writer.close();

        let summary = writer.finalize().unwrap().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let on_disk = (bytes.len() - 44) as u32;
        assert_eq!(summary.sizes.data_bytes, on_disk);
        assert_eq!(u32_at(&bytes, 40), on_disk);
        assert_eq!(&bytes[44..], &[1, 0, 0, 2, 0, 0, 3, 0, 0, 4, 0, 0]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_mono_producer_into_stereo_container() {
        let path = temp_wav();
        let writer = ContainerWriter::new(&path, WavFormat::new(48000, 2));
        writer.open().unwrap();
        let state = ControlState::new(1.0);

        run(frame(0, &[0x100, 0x200, 0x300]), &writer, &state);
        writer.close();

        let summary = writer.finalize().unwrap().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(summary.total_samples, 3);
        assert_eq!(u32_at(&bytes, 40), 18);
        assert_eq!(bytes.len(), 44 + 18);
        assert_eq!(&bytes[44..50], &[1, 0, 0, 0, 0, 0]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_fault_keeps_frames_already_written() {
        let (path, writer, state, _) = setup();
        let mut stream = frame(0, &[0x100]);
        let mut bad = frame(1, &[0x100]);
        bad[0] ^= 0xFF;
        stream.extend(bad);

        let report = run(stream, &writer, &state);
        assert!(matches!(
            report.end,
            SessionEnd::Fault(DecodeError::Protocol(ProtocolError::BadMagic { .. }))
        ));
        assert_eq!(report.samples_written, 1);
        writer.close();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_stopped_receiver_reads_nothing() {
        let (path, writer, state, session) = setup();
        state.stop();
        let report = run_session(
            &session,
            Cursor::new(frame(0, &[1])),
            &StreamConfig::default(),
            &writer,
            &state,
        );
        assert!(matches!(report.end, SessionEnd::Shutdown));
        assert_eq!(report.stats.frames_decoded, 0);
        writer.close();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_gaps_are_reported_to_status() {
        let (path, writer, state, _) = setup();
        let mut stream = Vec::new();
        for seq in [0, 1, 5, 6, 9] {
            stream.extend(frame(seq, &[0]));
        }
        run(stream, &writer, &state);
        assert_eq!(state.get_status().sequence_gaps, 2);
        assert_eq!(state.get_status().frames_received, 5);
        writer.close();
        std::fs::remove_file(&path).ok();
    }
}
