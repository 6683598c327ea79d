//! ESP32 Stream Emulator
//!
//! Connects to the receiver and streams a sine tone in the device's wire
//! format: int32 slots carrying left-aligned 24-bit samples.

use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use clap::Parser;
use std::f64::consts::TAU;
use std::io::Write;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use esp_audio_receiver::{constants::*, protocol::FrameHeader};

#[derive(Parser, Debug)]
#[command(version, about = "Stream a test tone to the ESP32 audio receiver")]
struct Args {
    /// Receiver address
    #[arg(long, default_value_t = format!("127.0.0.1:{}", DEFAULT_TCP_PORT))]
    target: String,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    frequency: f64,

    /// Peak level as a fraction of full scale
    #[arg(long, default_value_t = 0.5)]
    amplitude: f64,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    #[arg(long, default_value_t = DEFAULT_CHANNELS)]
    channels: u8,

    #[arg(long, default_value_t = DEFAULT_FRAMES_PER_PACKET)]
    frames_per_packet: u16,

    /// Seconds to stream; 0 streams until the connection drops
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,
}

/// Sine generator producing left-aligned int32 slots
struct Tone {
    phase: f64,
    step: f64,
    peak: f64,
}

impl Tone {
    fn new(frequency: f64, sample_rate: u32, amplitude: f64) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate as f64,
            peak: amplitude.clamp(0.0, 1.0) * 8_388_607.0,
        }
    }

    /// Next 24-bit sample placed in the top bits of an i32
    fn next_slot(&mut self) -> i32 {
        let sample = (self.phase.sin() * self.peak).round() as i32;
        self.phase = (self.phase + self.step) % TAU;
        sample << 8
    }

    /// Payload for `frames` sample frames, same value on every channel
    fn fill(&mut self, frames: u16, channels: u8, out: &mut BytesMut) {
        for _ in 0..frames {
            let slot = self.next_slot();
            for _ in 0..channels {
                out.put_i32_le(slot);
            }
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.channels > 0, "channels must be at least 1");
    anyhow::ensure!(args.frames_per_packet > 0, "frames per packet must be at least 1");
    anyhow::ensure!(args.sample_rate > 0, "sample rate must be non-zero");

    let mut stream = TcpStream::connect(&args.target)
        .with_context(|| format!("connecting to {}", args.target))?;
    stream.set_nodelay(true)?;
    tracing::info!(
        "Streaming {:.1} Hz tone to {} ({} Hz, {} ch, {} frames/packet)",
        args.frequency,
        args.target,
        args.sample_rate,
        args.channels,
        args.frames_per_packet
    );

    let mut tone = Tone::new(args.frequency, args.sample_rate, args.amplitude);
    let total_frames =
        (args.seconds > 0.0).then(|| (args.seconds * args.sample_rate as f64) as u64);
    let packet_duration =
        Duration::from_secs_f64(args.frames_per_packet as f64 / args.sample_rate as f64);

    let start = Instant::now();
    let mut buf = BytesMut::new();
    let mut sequence: u32 = 0;
    let mut sample_index: u64 = 0;

    while total_frames.map_or(true, |total| sample_index < total) {
        let header = FrameHeader {
            magic: HEADER_MAGIC,
            sequence,
            first_sample_index: sample_index,
            timestamp_us: start.elapsed().as_micros() as u64,
            frame_count: args.frames_per_packet,
            channel_count: args.channels,
            bytes_per_sample: IN_BYTES_PER_SAMPLE,
            declared_sample_rate: args.sample_rate,
            format_id: FORMAT_INT32_LEFT24,
        };

        buf.clear();
        buf.put_slice(&header.encode());
        tone.fill(args.frames_per_packet, args.channels, &mut buf);

        if let Err(e) = stream.write_all(&buf) {
            tracing::warn!("Receiver went away after {} packets: {}", sequence, e);
            break;
        }

        sequence = sequence.wrapping_add(1);
        sample_index += args.frames_per_packet as u64;

        // Pace to real time like the device would
        let due = packet_duration * sequence;
        if let Some(wait) = due.checked_sub(start.elapsed()) {
            thread::sleep(wait);
        }

        if sequence % 100 == 0 {
            tracing::debug!("Sent {} packets ({} samples)", sequence, sample_index);
        }
    }

    tracing::info!(
        "Done: {} packets, {} samples in {:.1}s",
        sequence,
        sample_index,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
