//! Error types for the image-watermark crate.

/// Errors that can occur while embedding, decoding or stamping watermarks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The payload does not fit into the image's least-significant bits.
    #[error("payload needs {required_bits} bits but the image only holds {capacity_bits}")]
    CapacityExceeded {
        /// Bits needed for the length prefix plus the payload.
        required_bits: u64,
        /// Writable bits in the image (three channels per pixel).
        capacity_bits: u64,
    },

    /// An invisible watermark must carry at least one byte.
    #[error("watermark payload is empty")]
    EmptyPayload,

    /// The payload length does not fit into the 32-bit length prefix.
    #[error("payload of {0} bytes exceeds the 32-bit length prefix")]
    PayloadTooLarge(usize),

    /// The visible stamp could not be rendered.
    #[error("failed to render visible stamp: {0}")]
    Render(String),

    /// Stamp options are out of range.
    #[error("invalid stamp options: {0}")]
    InvalidOptions(String),

    /// The input bytes are not a decodable image.
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),

    /// A data URI or base64 string could not be parsed.
    #[error("invalid data URI: {0}")]
    DataUri(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred while encoding an output image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
