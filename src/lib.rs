//! Invisible and visible image watermarking.
//!
//! The invisible watermark hides a short UTF-8 payload in the least-significant
//! bits of the red, green and blue channels (alpha is left alone), prefixed by
//! a 32-bit big-endian byte count. The visible watermark is a low-opacity text
//! stamp drawn in the bottom-right corner.
//!
//! # Quick Start
//!
//! ```no_run
//! use image_watermark::WatermarkEngine;
//!
//! let engine = WatermarkEngine::default();
//! let bytes = std::fs::read("photo.png").unwrap();
//! let marked = engine.embed_invisible(&bytes, "generated:1234").unwrap();
//! assert_eq!(
//!     engine.decode_invisible(&marked).unwrap().as_deref(),
//!     Some("generated:1234")
//! );
//! let stamped = engine.apply_visible(&marked, "AI generated").unwrap();
//! std::fs::write("photo_marked.png", stamped).unwrap();
//! ```
//!
//! # Pixel buffers
//!
//! The bit-level codec and the stamp renderer also work directly on
//! [`image::RgbaImage`] buffers:
//!
//! ```
//! use image::{Rgba, RgbaImage};
//! use image_watermark::invisible;
//!
//! let img = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
//! let marked = invisible::embed(&img, "ABC").unwrap();
//! assert_eq!(invisible::extract(&marked).as_deref(), Some("ABC"));
//! ```
//!
//! # Failure policy
//!
//! Every operation reports failures to its caller. [`WatermarkEngine::protect`]
//! is the one place that turns a failure into a fall-back: it hands back the
//! original bytes together with the error, so a batch pipeline can still show
//! the unwatermarked image.

#![deny(missing_docs)]

pub mod bits;
mod engine;
pub mod error;
pub mod invisible;
pub mod transport;
pub mod visible;

pub use engine::{
    default_output_path, is_supported_image, Operation, ProcessOptions, ProcessResult,
    ProtectOptions, Protected, WatermarkEngine,
};
pub use error::{Error, Result};
pub use visible::StampOptions;
