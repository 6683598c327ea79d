//! Sample conversion: left-aligned integer slots to packed 24-bit PCM
//!
//! Each slot is a little-endian signed integer whose top 24 bits carry the
//! sample. Gain is applied at the slot's full width, saturated to that width,
//! rounded half away from zero, then shifted down to 24 bits.

use std::sync::Arc;

use crate::constants::OUT_BYTES_PER_SAMPLE;

/// Anything that can report the current makeup gain.
///
/// The converter asks once per sample, so a live source is picked up in the
/// middle of a frame.
pub trait GainSource {
    fn gain(&self) -> f64;
}

impl GainSource for f64 {
    fn gain(&self) -> f64 {
        *self
    }
}

impl<G: GainSource + ?Sized> GainSource for Arc<G> {
    fn gain(&self) -> f64 {
        (**self).gain()
    }
}

/// Convert a raw payload into packed 24-bit little-endian samples
pub fn convert<G: GainSource + ?Sized>(
    payload: &[u8],
    channel_count: u8,
    bytes_per_sample: u8,
    gain: &G,
) -> Vec<u8> {
    let mut out = Vec::new();
    convert_into(payload, channel_count, bytes_per_sample, gain, &mut out);
    out
}

/// Like [`convert`], appending into a reusable buffer
pub fn convert_into<G: GainSource + ?Sized>(
    payload: &[u8],
    channel_count: u8,
    bytes_per_sample: u8,
    gain: &G,
    out: &mut Vec<u8>,
) {
    let width = bytes_per_sample as usize;
    if width == 0 {
        return;
    }
    debug_assert!(width <= 8, "sample slots wider than 64 bits");
    debug_assert_eq!(
        payload.len() % (width * channel_count.max(1) as usize),
        0,
        "payload is not a whole number of sample frames"
    );

    let width_bits = (width * 8) as u32;
    out.reserve(payload.len() / width * OUT_BYTES_PER_SAMPLE as usize);
    for slot in payload.chunks_exact(width) {
        out.extend_from_slice(&convert_slot(slot, gain.gain(), width_bits));
    }
}

/// Like [`convert_into`], but emit exactly `out_channels` samples per frame.
///
/// Input channels beyond `out_channels` are dropped; missing ones are
/// written as silence. The output always holds whole frames of the
/// container's layout, whatever the producer declared.
pub fn convert_frames_into<G: GainSource + ?Sized>(
    payload: &[u8],
    in_channels: u8,
    out_channels: u8,
    bytes_per_sample: u8,
    gain: &G,
    out: &mut Vec<u8>,
) {
    if in_channels == out_channels {
        convert_into(payload, in_channels, bytes_per_sample, gain, out);
        return;
    }
    let width = bytes_per_sample as usize;
    let in_ch = in_channels as usize;
    if width == 0 || in_ch == 0 {
        return;
    }

    let width_bits = (width * 8) as u32;
    let keep = in_ch.min(out_channels as usize);
    let silence = (out_channels as usize - keep) * OUT_BYTES_PER_SAMPLE as usize;
    let frames = payload.len() / (width * in_ch);
    out.reserve(frames * out_channels as usize * OUT_BYTES_PER_SAMPLE as usize);

    for frame in payload.chunks_exact(width * in_ch) {
        for slot in frame.chunks_exact(width).take(keep) {
            out.extend_from_slice(&convert_slot(slot, gain.gain(), width_bits));
        }
        out.resize(out.len() + silence, 0);
    }
}

fn convert_slot(slot: &[u8], gain: f64, width_bits: u32) -> [u8; 3] {
    let scaled = scale_sample(read_slot(slot), gain, width_bits);
    pack_24le(align_to_24(scaled, width_bits))
}

/// Sign-extend a little-endian slot of 1..=8 bytes
pub fn read_slot(slot: &[u8]) -> i64 {
    let mut bytes = [0u8; 8];
    bytes[..slot.len()].copy_from_slice(slot);
    let unused = 64 - slot.len() as u32 * 8;
    (i64::from_le_bytes(bytes) << unused) >> unused
}

/// Apply gain, saturating to the signed range of `width_bits` before
/// rounding half away from zero
pub fn scale_sample(raw: i64, gain: f64, width_bits: u32) -> i64 {
    let max = (i64::MAX >> (64 - width_bits)) as f64;
    let min = (i64::MIN >> (64 - width_bits)) as f64;
    let scaled = (raw as f64 * gain).clamp(min, max);
    scaled.round() as i64
}

/// Shift a full-width sample so its significant bits land in a 24-bit value
pub fn align_to_24(value: i64, width_bits: u32) -> i32 {
    let aligned = if width_bits >= 24 {
        value >> (width_bits - 24)
    } else {
        value << (24 - width_bits)
    };
    aligned as i32
}

/// Low 24 bits, little-endian
pub fn pack_24le(sample: i32) -> [u8; 3] {
    let u24 = (sample as u32) & 0x00FF_FFFF;
    [u24 as u8, (u24 >> 8) as u8, (u24 >> 16) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    const I24_MAX: i32 = 0x7F_FFFF;
    const I24_MIN: i32 = -0x80_0000;

    fn unpack(b: &[u8]) -> i32 {
        let u = b[0] as i32 | (b[1] as i32) << 8 | (b[2] as i32) << 16;
        (u << 8) >> 8
    }

    fn slots(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_documented_scenario() {
        let payload = slots(&[0x0001_0000, 0xFFFE_0000u32 as i32]);
        let out = convert(&payload, 1, 4, &2.0);
        assert_eq!(out, vec![0x00, 0x02, 0x00, 0x00, 0xFC, 0xFF]);
        assert_eq!(unpack(&out[0..3]), 512);
        assert_eq!(unpack(&out[3..6]), -1024);
    }

    #[test]
    fn test_unity_gain_is_shift_only() {
        let payload = slots(&[0x7FFF_FF00, -256, 0x1234_5600]);
        let out = convert(&payload, 1, 4, &1.0);
        assert_eq!(unpack(&out[0..3]), I24_MAX);
        assert_eq!(unpack(&out[3..6]), -1);
        assert_eq!(unpack(&out[6..9]), 0x12_3456);
    }

    #[test]
    fn test_zero_gain_silences() {
        let payload = slots(&[i32::MAX, i32::MIN, 12345 << 8]);
        let out = convert(&payload, 1, 4, &0.0);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(out.len(), 9);
    }

    #[test]
    fn test_saturates_instead_of_wrapping() {
        let payload = slots(&[i32::MAX, i32::MIN, 0x4000_0000]);
        let out = convert(&payload, 1, 4, &16.0);
        assert_eq!(unpack(&out[0..3]), I24_MAX);
        assert_eq!(unpack(&out[3..6]), I24_MIN);
        assert_eq!(unpack(&out[6..9]), I24_MAX);
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        assert_eq!(scale_sample(3, 0.5, 32), 2);
        assert_eq!(scale_sample(-3, 0.5, 32), -2);
        // Ties-to-even would give 2 here
        assert_eq!(scale_sample(5, 0.5, 32), 3);
        assert_eq!(scale_sample(-5, 0.5, 32), -3);
        assert_eq!(scale_sample(7, 0.25, 32), 2);
    }

    #[test]
    fn test_clamp_happens_before_rounding() {
        assert_eq!(scale_sample(i32::MAX as i64, 1.0000001, 32), i32::MAX as i64);
        assert_eq!(scale_sample(i32::MIN as i64, 1.5, 32), i32::MIN as i64);
    }

    #[test]
    fn test_shift_derived_from_width() {
        // 3-byte slots need no shift
        let out = convert(&[0x56, 0x34, 0x12], 1, 3, &1.0);
        assert_eq!(out, vec![0x56, 0x34, 0x12]);

        // 2-byte slots are widened
        let out = convert(&(-2i16).to_le_bytes(), 1, 2, &1.0);
        assert_eq!(unpack(&out), -2 << 8);

        // 8-byte slots shift by 40
        let wide = (0x12_3456i64 << 40).to_le_bytes();
        let out = convert(&wide, 1, 8, &1.0);
        assert_eq!(unpack(&out), 0x12_3456);
    }

    #[test]
    fn test_stereo_converts_every_slot() {
        let payload = slots(&[0x100, 0x200, 0x300, 0x400]);
        let out = convert(&payload, 2, 4, &1.0);
        assert_eq!(out.len(), 12);
        assert_eq!(unpack(&out[9..12]), 4);
    }

    #[test]
    fn test_frames_drop_extra_channels() {
        let payload = slots(&[0x100, 0x900, 0x200, 0x900]);
        let mut out = Vec::new();
        convert_frames_into(&payload, 2, 1, 4, &1.0, &mut out);
        assert_eq!(out, vec![1, 0, 0, 2, 0, 0]);
    }

    #[test]
    fn test_frames_pad_missing_channels() {
        let payload = slots(&[0x100, 0x200]);
        let mut out = Vec::new();
        convert_frames_into(&payload, 1, 2, 4, &1.0, &mut out);
        assert_eq!(out, vec![1, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_frames_matching_layout_is_plain_convert() {
        let payload = slots(&[0x0001_0000, 0xFFFE_0000u32 as i32]);
        let mut out = Vec::new();
        convert_frames_into(&payload, 1, 1, 4, &2.0, &mut out);
        assert_eq!(out, convert(&payload, 1, 4, &2.0));
    }

    #[test]
    fn test_read_slot_sign_extends() {
        assert_eq!(read_slot(&[0xFF]), -1);
        assert_eq!(read_slot(&[0x00, 0x80]), i16::MIN as i64);
        assert_eq!(read_slot(&[0xFF, 0xFF, 0x7F]), 0x7F_FFFF);
        assert_eq!(read_slot(&0xFFFE_0000u32.to_le_bytes()), -131072);
    }

    struct Ramp(Cell<f64>);

    impl GainSource for Ramp {
        fn gain(&self) -> f64 {
            let g = self.0.get();
            self.0.set(g + 1.0);
            g
        }
    }

    #[test]
    fn test_gain_read_per_sample() {
        let payload = slots(&[1 << 8, 1 << 8, 1 << 8]);
        let out = convert(&payload, 1, 4, &Ramp(Cell::new(1.0)));
        assert_eq!(unpack(&out[0..3]), 1);
        assert_eq!(unpack(&out[3..6]), 2);
        assert_eq!(unpack(&out[6..9]), 3);
    }

    proptest! {
        #[test]
        fn prop_output_stays_in_24_bit_range(raw in any::<i32>(), gain in 0.0f64..=16.0) {
            let out = convert(&raw.to_le_bytes(), 1, 4, &gain);
            let v = unpack(&out);
            prop_assert!((I24_MIN..=I24_MAX).contains(&v));
            if gain >= 1.0 && raw > 0 {
                prop_assert!(v >= raw >> 8);
            }
        }

        #[test]
        fn prop_unity_gain_is_neutral(raw in any::<i32>()) {
            let out = convert(&raw.to_le_bytes(), 1, 4, &1.0);
            prop_assert_eq!(unpack(&out), raw >> 8);
        }

        #[test]
        fn prop_unity_gain_preserves_order(a in any::<i32>(), b in any::<i32>()) {
            let out = convert(&slots(&[a, b]), 1, 4, &1.0);
            if a <= b {
                prop_assert!(unpack(&out[0..3]) <= unpack(&out[3..6]));
            }
        }
    }
}
