//! Pixel-buffer utilities shared by the invisible codec.
//!
//! The codec addresses an RGBA8 buffer as a sequence of one-bit *slots*:
//! slot `k` is the least-significant bit of channel `k % 3` (R, G, B) of
//! pixel `k / 3`, pixels taken in raster order. Alpha is never addressed.

use image::RgbaImage;

/// Colour channels per pixel that carry payload bits.
pub const CHANNELS_PER_PIXEL: u64 = 3;

/// Width of the big-endian payload length prefix, in bits.
pub const LENGTH_PREFIX_BITS: u64 = 32;

/// Number of writable bit slots in `image`.
#[must_use]
pub fn capacity_bits(image: &RgbaImage) -> u64 {
    u64::from(image.width()) * u64::from(image.height()) * CHANNELS_PER_PIXEL
}

/// Bits needed to store a payload of `payload_len` bytes, prefix included.
#[must_use]
pub fn required_bits(payload_len: usize) -> u64 {
    LENGTH_PREFIX_BITS + 8 * payload_len as u64
}

/// Index into the interleaved RGBA sample buffer for `slot`.
fn sample_index(slot: usize) -> usize {
    (slot / 3) * 4 + slot % 3
}

/// Overwrite the least-significant bit of `slot` with `bit`.
///
/// # Panics
///
/// Panics if `slot` lies outside `samples`; callers check capacity first.
pub fn write_slot(samples: &mut [u8], slot: usize, bit: bool) {
    let i = sample_index(slot);
    samples[i] = (samples[i] & !1) | u8::from(bit);
}

/// Read the least-significant bit of `slot`.
///
/// # Panics
///
/// Panics if `slot` lies outside `samples`; callers check capacity first.
#[must_use]
pub fn read_slot(samples: &[u8], slot: usize) -> bool {
    samples[sample_index(slot)] & 1 == 1
}

/// Read eight consecutive slots starting at `first_slot` as one byte, MSB first.
#[must_use]
pub fn read_byte(samples: &[u8], first_slot: usize) -> u8 {
    (0..8).fold(0u8, |acc, i| (acc << 1) | u8::from(read_slot(samples, first_slot + i)))
}

/// Expand bytes into bits, most-significant bit first within each byte.
pub fn bits_msb_first(bytes: &[u8]) -> impl Iterator<Item = bool> + '_ {
    bytes
        .iter()
        .flat_map(|&byte| (0..8).rev().map(move |shift| (byte >> shift) & 1 == 1))
}
