//! Byte-level watermark engine and file processing.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::invisible;
use crate::transport;
use crate::visible::{self, StampOptions};

/// Which watermarks [`WatermarkEngine::protect`] should apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectOptions {
    /// Invisible payload to embed, if any.
    pub mark: Option<String>,
    /// Visible stamp text, if any.
    pub stamp: Option<String>,
}

/// Outcome of [`WatermarkEngine::protect`].
///
/// On failure `bytes` holds the untouched input and `error` says why.
#[derive(Debug)]
pub struct Protected {
    /// Encoded output image, or the original bytes on failure.
    pub bytes: Vec<u8>,
    /// Whether any watermark was applied.
    pub watermarked: bool,
    /// The error that forced a fall-back to the original, if any.
    pub error: Option<Error>,
}

/// A single operation applied by [`WatermarkEngine::process_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Embed an invisible payload.
    Embed(String),
    /// Recover an invisible payload.
    Decode,
    /// Apply a visible stamp.
    Stamp(String),
    /// Apply both, keeping the original on failure.
    Protect(ProtectOptions),
}

impl Operation {
    fn done_message(&self) -> &'static str {
        match self {
            Self::Embed(_) => "Invisible watermark embedded",
            Self::Decode => "Watermark found",
            Self::Stamp(_) => "Visible stamp applied",
            Self::Protect(_) => "Watermarks applied",
        }
    }
}

/// Options controlling CLI reporting.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Enable verbose logging.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Where the output was written, if anything was written.
    pub output: Option<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the file was left as-is (no watermark found, or fell back to
    /// the original).
    pub skipped: bool,
    /// Recovered invisible payload for [`Operation::Decode`].
    pub payload: Option<String>,
    /// Human-readable status message.
    pub message: String,
}

/// Stateless watermark engine working on encoded image bytes.
///
/// Holds only the stamp configuration, so one engine can be shared across
/// threads and reused for any number of images.
#[derive(Debug, Clone, Default)]
pub struct WatermarkEngine {
    stamp_options: StampOptions,
}

impl WatermarkEngine {
    /// Create an engine with the given stamp options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if the options are out of range.
    pub fn new(stamp_options: StampOptions) -> Result<Self> {
        stamp_options.validate()?;
        Ok(Self { stamp_options })
    }

    /// Stamp options used by [`Self::apply_visible`].
    #[must_use]
    pub fn stamp_options(&self) -> &StampOptions {
        &self.stamp_options
    }

    /// Embed `text` invisibly into an encoded image.
    ///
    /// The output keeps the input format when it is lossless; JPEG input is
    /// re-encoded as PNG since quantisation would erase the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for undecodable input and the embedding
    /// errors of [`invisible::embed`], including [`Error::CapacityExceeded`].
    pub fn embed_invisible(&self, bytes: &[u8], text: &str) -> Result<Vec<u8>> {
        let (img, format) = load(bytes)?;
        let marked = invisible::embed(&img, text)?;
        encode(&marked, lossless_format(format))
    }

    /// Recover an invisible payload from an encoded image.
    ///
    /// `Ok(None)` means no valid watermark is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] only when the bytes are not a valid image.
    pub fn decode_invisible(&self, bytes: &[u8]) -> Result<Option<String>> {
        let (img, _) = load(bytes)?;
        Ok(invisible::extract(&img))
    }

    /// Apply a visible text stamp to an encoded image, keeping its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for undecodable input and [`Error::Render`]
    /// when the stamp cannot be drawn.
    pub fn apply_visible(&self, bytes: &[u8], text: &str) -> Result<Vec<u8>> {
        let (img, format) = load(bytes)?;
        let stamped = visible::stamp(&img, text, &self.stamp_options)?;
        encode(&stamped, output_format(format))
    }

    /// Apply the requested watermarks, falling back to the original bytes on
    /// any failure.
    ///
    /// The invisible payload is embedded first and the stamp drawn after it.
    /// If the stamp overlaps the payload bits, the payload is written again
    /// so it still decodes.
    #[must_use]
    pub fn protect(&self, bytes: &[u8], opts: &ProtectOptions) -> Protected {
        if opts.mark.is_none() && opts.stamp.is_none() {
            return Protected {
                bytes: bytes.to_vec(),
                watermarked: false,
                error: None,
            };
        }

        match self.try_protect(bytes, opts) {
            Ok(out) => Protected {
                bytes: out,
                watermarked: true,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "watermarking failed, keeping original image");
                Protected {
                    bytes: bytes.to_vec(),
                    watermarked: false,
                    error: Some(e),
                }
            }
        }
    }

    fn try_protect(&self, bytes: &[u8], opts: &ProtectOptions) -> Result<Vec<u8>> {
        let (mut img, mut format) = load(bytes)?;

        if let Some(mark) = &opts.mark {
            img = invisible::embed(&img, mark)?;
            format = lossless_format(format);
        }

        if let Some(text) = &opts.stamp {
            img = visible::stamp(&img, text, &self.stamp_options)?;
            if let Some(mark) = &opts.mark {
                if invisible::extract(&img).as_deref() != Some(mark.as_str()) {
                    debug!("stamp overlapped the invisible payload, re-embedding");
                    img = invisible::embed(&img, mark)?;
                }
            }
        }

        encode(&img, output_format(format))
    }

    /// [`Self::embed_invisible`] for data-URI transport.
    ///
    /// # Errors
    ///
    /// As [`Self::embed_invisible`], plus [`Error::DataUri`] for a bad URI.
    pub fn embed_invisible_data_uri(&self, data_uri: &str, text: &str) -> Result<String> {
        let bytes = transport::from_data_uri(data_uri)?;
        transport::to_data_uri(&self.embed_invisible(&bytes, text)?)
    }

    /// [`Self::decode_invisible`] for data-URI transport.
    ///
    /// # Errors
    ///
    /// As [`Self::decode_invisible`], plus [`Error::DataUri`] for a bad URI.
    pub fn decode_invisible_data_uri(&self, data_uri: &str) -> Result<Option<String>> {
        self.decode_invisible(&transport::from_data_uri(data_uri)?)
    }

    /// [`Self::apply_visible`] for data-URI transport.
    ///
    /// # Errors
    ///
    /// As [`Self::apply_visible`], plus [`Error::DataUri`] for a bad URI.
    pub fn apply_visible_data_uri(&self, data_uri: &str, text: &str) -> Result<String> {
        let bytes = transport::from_data_uri(data_uri)?;
        transport::to_data_uri(&self.apply_visible(&bytes, text)?)
    }

    /// Process a single image file: read, apply `op`, write.
    ///
    /// If the produced format does not match the extension of `output`, the
    /// extension is replaced. [`Operation::Decode`] writes nothing.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path, op: &Operation) -> ProcessResult {
        let mut result = ProcessResult {
            path: input.to_path_buf(),
            output: None,
            success: false,
            skipped: false,
            payload: None,
            message: String::new(),
        };

        let bytes = match std::fs::read(input) {
            Ok(b) => b,
            Err(e) => {
                result.message = format!("Failed to read: {e}");
                return result;
            }
        };

        let produced = match op {
            Operation::Decode => {
                match self.decode_invisible(&bytes) {
                    Ok(Some(payload)) => {
                        result.success = true;
                        result.payload = Some(payload);
                        result.message = op.done_message().to_string();
                    }
                    Ok(None) => {
                        result.success = true;
                        result.skipped = true;
                        result.message = "No invisible watermark found".to_string();
                    }
                    Err(e) => result.message = format!("Failed to decode: {e}"),
                }
                return result;
            }
            Operation::Embed(text) => self.embed_invisible(&bytes, text),
            Operation::Stamp(text) => self.apply_visible(&bytes, text),
            Operation::Protect(opts) => {
                let protected = self.protect(&bytes, opts);
                if let Some(e) = &protected.error {
                    result.skipped = true;
                    result.message = format!("Kept original: {e}");
                } else if !protected.watermarked {
                    result.skipped = true;
                    result.message = "Nothing to apply".to_string();
                }
                Ok(protected.bytes)
            }
        };

        let out_bytes = match produced {
            Ok(b) => b,
            Err(e) => {
                result.message = format!("Failed to process: {e}");
                return result;
            }
        };

        let output = matching_extension(output, &out_bytes);
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match std::fs::write(&output, &out_bytes) {
            Ok(()) => {
                debug!(input = %input.display(), output = %output.display(), "wrote image");
                result.success = true;
                if result.message.is_empty() {
                    result.message = op.done_message().to_string();
                }
                result.output = Some(output);
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }

    /// Process all supported images in a directory.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    /// Returns a [`ProcessResult`] for each image found.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        op: &Operation,
    ) -> Vec<ProcessResult> {
        let entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                return vec![failed(input_dir, format!("Failed to read directory: {e}"))];
            }
        };

        if *op != Operation::Decode && !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![failed(
                    output_dir,
                    format!("Failed to create output directory: {e}"),
                )];
            }
        }

        let run = |input_path: &PathBuf| match input_path.file_name() {
            Some(filename) => self.process_file(input_path, &output_dir.join(filename), op),
            None => failed(input_path, "Path has no file name".to_string()),
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries.par_iter().map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries.iter().map(run).collect()
        }
    }
}

fn failed(path: &Path, message: String) -> ProcessResult {
    ProcessResult {
        path: path.to_path_buf(),
        output: None,
        success: false,
        skipped: false,
        payload: None,
        message,
    }
}

/// Decode bytes to an RGBA buffer, remembering the source format.
fn load(bytes: &[u8]) -> Result<(RgbaImage, ImageFormat)> {
    let format = image::guess_format(bytes).map_err(Error::Decode)?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(Error::Decode)?
        .to_rgba8();
    Ok((img, format))
}

/// Format used when the output must preserve every bit.
fn lossless_format(format: ImageFormat) -> ImageFormat {
    match format {
        ImageFormat::Png | ImageFormat::Bmp | ImageFormat::WebP | ImageFormat::Tiff => format,
        _ => ImageFormat::Png,
    }
}

/// Format used for general output: the input format when it can be
/// encoded, PNG otherwise.
fn output_format(format: ImageFormat) -> ImageFormat {
    match format {
        ImageFormat::Jpeg => ImageFormat::Jpeg,
        other => lossless_format(other),
    }
}

/// Encode an RGBA buffer with format-specific settings.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for formats outside
/// [`output_format`], or [`Error::Image`] if encoding fails.
fn encode(img: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).into_rgb8();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 100);
            encoder.encode_image(&rgb)?;
        }
        ImageFormat::Png | ImageFormat::Bmp | ImageFormat::WebP | ImageFormat::Tiff => {
            img.write_to(&mut out, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }
    Ok(out.into_inner())
}

/// Swap the extension of `path` when it does not match the encoded bytes.
fn matching_extension(path: &Path, bytes: &[u8]) -> PathBuf {
    let Ok(actual) = image::guess_format(bytes) else {
        return path.to_path_buf();
    };
    if ImageFormat::from_path(path).ok() == Some(actual) {
        return path.to_path_buf();
    }
    match actual.extensions_str().first() {
        Some(ext) => path.with_extension(ext),
        None => path.to_path_buf(),
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.png"` becomes `"photo_marked.png"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_marked.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn encoded(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
        encode(img, format).unwrap()
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WatermarkEngine>();
    }

    #[test]
    fn new_rejects_invalid_options() {
        let opts = StampOptions {
            opacity: 2.0,
            ..StampOptions::default()
        };
        assert!(matches!(
            WatermarkEngine::new(opts),
            Err(Error::InvalidOptions(_))
        ));
    }

    #[test]
    fn lossy_input_is_marked_as_png() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([200, 100, 50, 255]));
        let jpeg = encoded(&img, ImageFormat::Jpeg);
        let engine = WatermarkEngine::default();

        let marked = engine.embed_invisible(&jpeg, "id-42").unwrap();
        assert_eq!(image::guess_format(&marked).unwrap(), ImageFormat::Png);
        assert_eq!(
            engine.decode_invisible(&marked).unwrap().as_deref(),
            Some("id-42")
        );
    }

    #[test]
    fn stamp_keeps_jpeg_format() {
        let img = RgbaImage::from_pixel(120, 80, Rgba([90, 90, 90, 255]));
        let jpeg = encoded(&img, ImageFormat::Jpeg);
        let stamped = WatermarkEngine::default()
            .apply_visible(&jpeg, "AI")
            .unwrap();
        assert_eq!(image::guess_format(&stamped).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn bmp_round_trips_invisible_mark() {
        let img = RgbaImage::from_pixel(30, 30, Rgba([10, 20, 30, 255]));
        let engine = WatermarkEngine::default();
        let marked = engine
            .embed_invisible(&encoded(&img, ImageFormat::Bmp), "bmp")
            .unwrap();
        assert_eq!(image::guess_format(&marked).unwrap(), ImageFormat::Bmp);
        assert_eq!(
            engine.decode_invisible(&marked).unwrap().as_deref(),
            Some("bmp")
        );
    }

    #[test]
    fn protect_payload_survives_overlapping_stamp() {
        // 40 bytes fill rows 0..10 of a 12x12 image; the stamp lands on row 2.
        let img = RgbaImage::from_pixel(12, 12, Rgba([128, 128, 128, 255]));
        let mark = "x".repeat(40);
        let opts = ProtectOptions {
            mark: Some(mark.clone()),
            stamp: Some("WWWWWWWW".to_string()),
        };
        let engine = WatermarkEngine::default();
        let protected = engine.protect(&encoded(&img, ImageFormat::Png), &opts);
        assert!(protected.watermarked);
        assert!(protected.error.is_none());
        assert_eq!(
            engine.decode_invisible(&protected.bytes).unwrap(),
            Some(mark)
        );
    }

    #[test]
    fn matching_extension_follows_bytes() {
        let png = encoded(&RgbaImage::new(2, 2), ImageFormat::Png);
        assert_eq!(
            matching_extension(Path::new("/tmp/a.jpg"), &png),
            PathBuf::from("/tmp/a.png")
        );
        assert_eq!(
            matching_extension(Path::new("/tmp/a.png"), &png),
            PathBuf::from("/tmp/a.png")
        );
    }

    #[test]
    fn lossless_format_replaces_lossy_formats() {
        assert_eq!(lossless_format(ImageFormat::Jpeg), ImageFormat::Png);
        assert_eq!(lossless_format(ImageFormat::Gif), ImageFormat::Png);
        assert_eq!(lossless_format(ImageFormat::Bmp), ImageFormat::Bmp);
        assert_eq!(output_format(ImageFormat::Jpeg), ImageFormat::Jpeg);
    }

    #[test]
    fn default_output_path_appends_marked_suffix() {
        let p = default_output_path(Path::new("/tmp/photo.jpg"));
        assert_eq!(p, PathBuf::from("/tmp/photo_marked.jpg"));

        let p = default_output_path(Path::new("image.png"));
        assert_eq!(p.file_name().unwrap().to_str().unwrap(), "image_marked.png");
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo")));
    }
}
