//! Streaming RIFF/WAVE layout for 24-bit PCM
//!
//! ```text
//!  0  "RIFF"   4  riff size (patched)   8  "WAVE"
//! 12  "fmt "  16  16  20 PCM=1  22 channels  24 sample rate
//! 28  byte rate  32 block align  34 bits per sample (24)
//! 36  "data"  40  data size (patched)   44  samples...
//! ```

use bytes::{BufMut, BytesMut};
use std::io::{self, Seek, SeekFrom, Write};

use crate::constants::OUT_BYTES_PER_SAMPLE;

/// Size of the header written by [`WavFormat::header_bytes`]
pub const WAV_HEADER_SIZE: usize = 44;

/// Offset of the RIFF chunk size field
pub const RIFF_SIZE_OFFSET: u64 = 4;

/// Offset of the data chunk size field
pub const DATA_SIZE_OFFSET: u64 = 40;

const FMT_CHUNK_SIZE: u32 = 16;
const WAVE_FORMAT_PCM: u16 = 1;

/// Output format of the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl WavFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * OUT_BYTES_PER_SAMPLE as u16
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Header with both size fields left at zero
    pub fn header_bytes(&self) -> [u8; WAV_HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(WAV_HEADER_SIZE);
        buf.put_slice(b"RIFF");
        buf.put_u32_le(0);
        buf.put_slice(b"WAVE");

        buf.put_slice(b"fmt ");
        buf.put_u32_le(FMT_CHUNK_SIZE);
        buf.put_u16_le(WAVE_FORMAT_PCM);
        buf.put_u16_le(self.channels);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(self.byte_rate());
        buf.put_u16_le(self.block_align());
        buf.put_u16_le(OUT_BYTES_PER_SAMPLE as u16 * 8);

        buf.put_slice(b"data");
        buf.put_u32_le(0);

        let mut header = [0u8; WAV_HEADER_SIZE];
        header.copy_from_slice(&buf);
        header
    }
}

/// Values patched into the header at finalize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalSizes {
    pub riff_size: u32,
    pub data_bytes: u32,
}

/// Size fields for `total_samples` sample frames of `channels` channels.
///
/// Both fields saturate at `u32::MAX`; the RIFF format cannot describe more.
pub fn finalized_sizes(total_samples: u64, channels: u16) -> FinalSizes {
    let data_bytes = total_samples
        .saturating_mul(channels as u64)
        .saturating_mul(OUT_BYTES_PER_SAMPLE as u64);
    // "WAVE" + fmt chunk + data chunk header + data
    let riff_size = data_bytes.saturating_add(4 + (8 + FMT_CHUNK_SIZE as u64) + 8);
    FinalSizes {
        riff_size: u32::try_from(riff_size).unwrap_or(u32::MAX),
        data_bytes: u32::try_from(data_bytes).unwrap_or(u32::MAX),
    }
}

/// Overwrite the two size placeholders in place
pub fn patch_sizes<W: Write + Seek>(out: &mut W, sizes: FinalSizes) -> io::Result<()> {
    out.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
    out.write_all(&sizes.riff_size.to_le_bytes())?;
    out.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
    out.write_all(&sizes.data_bytes.to_le_bytes())?;
    out.flush()
}
