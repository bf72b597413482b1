//! Invisible watermark: a length-prefixed UTF-8 payload hidden in the
//! least-significant bits of the red, green and blue channels.
//!
//! Layout: a 32-bit big-endian byte count followed by the payload bytes,
//! every byte written MSB first into consecutive slots (see [`crate::bits`]).
//! Each touched channel changes by at most one; alpha is never modified.

use image::RgbaImage;
use tracing::debug;

use crate::bits::{self, LENGTH_PREFIX_BITS};
use crate::error::{Error, Result};

/// Maximum payload size in bytes that `image` can carry, prefix excluded.
#[must_use]
pub fn capacity_bytes(image: &RgbaImage) -> u64 {
    bits::capacity_bits(image).saturating_sub(LENGTH_PREFIX_BITS) / 8
}

/// Embed `payload` into a copy of `image`.
///
/// The source buffer is left untouched.
///
/// # Errors
///
/// Returns [`Error::EmptyPayload`] for an empty payload,
/// [`Error::PayloadTooLarge`] if the byte count does not fit in 32 bits, and
/// [`Error::CapacityExceeded`] if the prefix plus payload need more bits than
/// the image has writable channels. Nothing is ever truncated.
pub fn embed(image: &RgbaImage, payload: &str) -> Result<RgbaImage> {
    let bytes = payload.as_bytes();
    if bytes.is_empty() {
        return Err(Error::EmptyPayload);
    }
    let len = u32::try_from(bytes.len()).map_err(|_| Error::PayloadTooLarge(bytes.len()))?;

    let required_bits = bits::required_bits(bytes.len());
    let capacity_bits = bits::capacity_bits(image);
    if required_bits > capacity_bits {
        return Err(Error::CapacityExceeded {
            required_bits,
            capacity_bits,
        });
    }

    let prefix = len.to_be_bytes();
    let mut marked = image.clone();
    let samples: &mut [u8] = &mut marked;
    for (slot, bit) in bits::bits_msb_first(&prefix)
        .chain(bits::bits_msb_first(bytes))
        .enumerate()
    {
        bits::write_slot(samples, slot, bit);
    }

    debug!(
        width = image.width(),
        height = image.height(),
        payload_bytes = bytes.len(),
        required_bits,
        capacity_bits,
        "embedded invisible watermark"
    );
    Ok(marked)
}

/// Recover a payload previously written by [`embed`].
///
/// Returns `None` when the image carries no valid watermark: too few slots
/// for the prefix, a zero or out-of-capacity declared length, or payload
/// bytes that are not UTF-8. Never panics on arbitrary pixel data.
#[must_use]
pub fn extract(image: &RgbaImage) -> Option<String> {
    let capacity_bits = bits::capacity_bits(image);
    if capacity_bits < LENGTH_PREFIX_BITS {
        debug!(capacity_bits, "image too small for a length prefix");
        return None;
    }

    let samples: &[u8] = image;
    let prefix = [
        bits::read_byte(samples, 0),
        bits::read_byte(samples, 8),
        bits::read_byte(samples, 16),
        bits::read_byte(samples, 24),
    ];
    let declared = u32::from_be_bytes(prefix);
    if declared == 0 {
        return None;
    }

    let required_bits = LENGTH_PREFIX_BITS + 8 * u64::from(declared);
    if required_bits > capacity_bits {
        debug!(declared, capacity_bits, "declared length exceeds capacity");
        return None;
    }

    // Bounded by the capacity check above, so the length fits in memory.
    #[allow(clippy::cast_possible_truncation)]
    let (len, first) = (declared as usize, LENGTH_PREFIX_BITS as usize);
    let payload: Vec<u8> = (0..len)
        .map(|i| bits::read_byte(samples, first + i * 8))
        .collect();

    match String::from_utf8(payload) {
        Ok(text) => Some(text),
        Err(_) => {
            debug!(declared, "payload is not valid UTF-8");
            None
        }
    }
}
