//! Visible watermark: a low-opacity text stamp in the bottom-right corner.
//!
//! Text is rasterised from the 8x8 `font8x8` glyph tables, scaled by an
//! integer factor derived from the image width, and composited source-over
//! at a fixed opacity, so transparent regions receive the full stamp colour.
//!
//! A dark shadow is drawn one scale unit down-right of a white fill so the
//! stamp stays legible on both light and dark content.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};

/// Glyph cell edge in font pixels.
const GLYPH_SIZE: u32 = 8;
/// Fill colour of the stamp text.
const FILL: [u8; 3] = [255, 255, 255];
/// Shadow colour drawn underneath the fill.
const SHADOW: [u8; 3] = [0, 0, 0];

/// Options controlling the visible stamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampOptions {
    /// Stamp opacity in `(0, 1)`.
    pub opacity: f32,
    /// Text height as a fraction of image width, in `[0, 1]`.
    pub text_height_ratio: f32,
    /// Inset from the bottom-right corner as a fraction of the shorter side,
    /// in `[0, 1]`.
    pub margin_ratio: f32,
}

impl Default for StampOptions {
    fn default() -> Self {
        Self {
            opacity: 0.35,
            text_height_ratio: 0.035,
            margin_ratio: 0.02,
        }
    }
}

impl StampOptions {
    /// Check that every option is within range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        // Opacity 1 would make repeated stamps indistinguishable.
        if !(self.opacity > 0.0 && self.opacity < 1.0) {
            return Err(Error::InvalidOptions(format!(
                "opacity must be in (0, 1), got {}",
                self.opacity
            )));
        }
        for (name, value) in [
            ("text height ratio", self.text_height_ratio),
            ("margin ratio", self.margin_ratio),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidOptions(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Placement of the stamp text in image coordinates.
///
/// `x`/`y` is the top-left corner of the fill; it may be negative when the
/// text is wider than the image, in which case the left part is clipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampLayout {
    /// Left edge of the first glyph.
    pub x: i64,
    /// Top edge of the glyph row.
    pub y: i64,
    /// Image pixels per font pixel.
    pub scale: u32,
    /// Total text width in image pixels.
    pub text_width: u64,
    /// Text height in image pixels.
    pub text_height: u32,
    /// Inset from the right and bottom edges.
    pub margin: u32,
}

/// Compute where a stamp of `char_count` characters lands on a
/// `width` x `height` image.
#[must_use]
pub fn layout(width: u32, height: u32, char_count: usize, opts: &StampOptions) -> StampLayout {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let (scale, margin) = {
        let scale = (width as f32 * opts.text_height_ratio / GLYPH_SIZE as f32).round();
        let margin = (width.min(height) as f32 * opts.margin_ratio).round();
        ((scale as u32).max(1), (margin as u32).max(1))
    };

    let text_height = GLYPH_SIZE.saturating_mul(scale);
    let text_width = char_count as u64 * u64::from(text_height);
    // Reserve room for the shadow offset so it is not clipped at the edges.
    #[allow(clippy::cast_possible_wrap)]
    let x = i64::from(width) - i64::from(margin) - i64::from(scale) - text_width as i64;
    let y = i64::from(height) - i64::from(margin) - i64::from(scale) - i64::from(text_height);

    StampLayout {
        x,
        y,
        scale,
        text_width,
        text_height,
        margin,
    }
}

/// Look up the 8x8 bitmap for `c`, falling back to `?`.
fn glyph_for(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Source-over composite of `colour` at `opacity` onto `px`.
///
/// `out_a = a_s + a_d * (1 - a_s)`,
/// `out_c = (a_s * c + a_d * (1 - a_s) * dst_c) / out_a`.
fn blend(px: &mut Rgba<u8>, colour: [u8; 3], opacity: f32) {
    let dst_alpha = f32::from(px[3]) / 255.0;
    let dst_weight = dst_alpha * (1.0 - opacity);
    let out_alpha = opacity + dst_weight;
    if out_alpha <= 0.0 {
        return;
    }
    for (ch, &c) in colour.iter().enumerate() {
        let value = (opacity * f32::from(c) + dst_weight * f32::from(px[ch])) / out_alpha;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            px[ch] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        px[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

/// Paint every set glyph pixel as a `scale` x `scale` block, clipped to the
/// image. Returns the number of image pixels painted.
fn draw_glyphs(
    image: &mut RgbaImage,
    glyphs: &[[u8; 8]],
    layout: &StampLayout,
    offset: i64,
    colour: [u8; 3],
    opacity: f32,
) -> u64 {
    let (img_w, img_h) = (i64::from(image.width()), i64::from(image.height()));
    let scale = i64::from(layout.scale);
    let advance = i64::from(layout.text_height);
    let mut painted = 0;

    for (gi, glyph) in (0_i64..).zip(glyphs) {
        let origin_x = layout.x + gi * advance + offset;
        let origin_y = layout.y + offset;
        if origin_x >= img_w || origin_x + advance <= 0 {
            continue;
        }
        for (row, bits) in (0_i64..).zip(glyph) {
            for col in 0..8 {
                if bits & (1u8 << col) == 0 {
                    continue;
                }
                let x0 = (origin_x + col * scale).max(0);
                let x1 = (origin_x + (col + 1) * scale).min(img_w);
                let y0 = (origin_y + row * scale).max(0);
                let y1 = (origin_y + (row + 1) * scale).min(img_h);
                for y in y0..y1 {
                    for x in x0..x1 {
                        // Clipped to the image above, so both fit in u32.
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let px = image.get_pixel_mut(x as u32, y as u32);
                        blend(px, colour, opacity);
                        painted += 1;
                    }
                }
            }
        }
    }
    painted
}

/// Composite `text` onto a copy of `image`.
///
/// # Errors
///
/// Returns [`Error::InvalidOptions`] for out-of-range options and
/// [`Error::Render`] for a zero-sized image, blank text, or an image too
/// small for any glyph pixel to land inside it. The unmodified input is
/// never returned as a silent fallback.
pub fn stamp(image: &RgbaImage, text: &str, opts: &StampOptions) -> Result<RgbaImage> {
    opts.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::Render(format!("zero-sized image ({width}x{height})")));
    }
    if text.trim().is_empty() {
        return Err(Error::Render("stamp text is blank".to_string()));
    }

    let glyphs: Vec<[u8; 8]> = text.chars().map(glyph_for).collect();
    let layout = layout(width, height, glyphs.len(), opts);

    let mut stamped = image.clone();
    let shadow = draw_glyphs(
        &mut stamped,
        &glyphs,
        &layout,
        i64::from(layout.scale),
        SHADOW,
        opts.opacity,
    );
    let fill = draw_glyphs(&mut stamped, &glyphs, &layout, 0, FILL, opts.opacity);

    if shadow + fill == 0 {
        return Err(Error::Render(format!(
            "image ({width}x{height}) too small for stamp text"
        )));
    }

    debug!(
        width,
        height,
        chars = glyphs.len(),
        scale = layout.scale,
        x = layout.x,
        y = layout.y,
        painted = shadow + fill,
        "applied visible stamp"
    );
    Ok(stamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grey(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn layout_anchors_bottom_right() {
        let opts = StampOptions::default();
        let l = layout(1000, 800, 4, &opts);
        // 1000 * 0.035 / 8 = 4.375 -> 4
        assert_eq!(l.scale, 4);
        assert_eq!(l.text_height, 32);
        assert_eq!(l.text_width, 128);
        assert_eq!(l.margin, 16);
        assert_eq!(l.x, 1000 - 16 - 4 - 128);
        assert_eq!(l.y, 800 - 16 - 4 - 32);
    }

    #[test]
    fn layout_scale_never_below_one() {
        let l = layout(20, 20, 1, &StampOptions::default());
        assert_eq!(l.scale, 1);
        assert_eq!(l.margin, 1);
    }

    #[test]
    fn stamp_preserves_dimensions_and_changes_corner() {
        let img = grey(400, 300);
        let out = stamp(&img, "AI", &StampOptions::default()).unwrap();
        assert_eq!(out.dimensions(), img.dimensions());
        assert_ne!(out, img);

        // Top-left corner is untouched.
        for y in 0..50 {
            for x in 0..50 {
                assert_eq!(out.get_pixel(x, y), img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn stamp_does_not_mutate_source() {
        let img = grey(200, 200);
        let before = img.clone();
        let _ = stamp(&img, "mark", &StampOptions::default()).unwrap();
        assert_eq!(img, before);
    }

    #[test]
    fn stamping_twice_differs_from_once() {
        let img = grey(300, 200);
        let opts = StampOptions::default();
        let once = stamp(&img, "Generated", &opts).unwrap();
        let twice = stamp(&once, "Generated", &opts).unwrap();
        assert_ne!(once, twice);
        assert_eq!(once.dimensions(), twice.dimensions());
    }

    #[test]
    fn zero_sized_image_fails() {
        let img = RgbaImage::new(0, 10);
        assert!(matches!(
            stamp(&img, "x", &StampOptions::default()),
            Err(Error::Render(_))
        ));
    }

    #[test]
    fn blank_text_fails() {
        assert!(matches!(
            stamp(&grey(100, 100), "   ", &StampOptions::default()),
            Err(Error::Render(_))
        ));
    }

    #[test]
    fn image_too_small_for_any_glyph_fails() {
        assert!(matches!(
            stamp(&grey(1, 1), "A", &StampOptions::default()),
            Err(Error::Render(_))
        ));
    }

    #[test]
    fn long_text_is_clipped_not_rejected() {
        let img = grey(64, 64);
        let out = stamp(&img, "a very long attribution line", &StampOptions::default()).unwrap();
        assert_eq!(out.dimensions(), (64, 64));
        assert_ne!(out, img);
    }

    #[test]
    fn non_ascii_text_renders() {
        let img = grey(200, 100);
        assert!(stamp(&img, "café ✨", &StampOptions::default()).is_ok());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let img = grey(100, 100);
        for opts in [
            StampOptions {
                opacity: 0.0,
                ..StampOptions::default()
            },
            StampOptions {
                opacity: 1.5,
                ..StampOptions::default()
            },
            StampOptions {
                opacity: 1.0,
                ..StampOptions::default()
            },
            StampOptions {
                text_height_ratio: 1.0e7,
                ..StampOptions::default()
            },
            StampOptions {
                margin_ratio: -0.1,
                ..StampOptions::default()
            },
            StampOptions {
                text_height_ratio: f32::NAN,
                ..StampOptions::default()
            },
        ] {
            assert!(matches!(
                stamp(&img, "x", &opts),
                Err(Error::InvalidOptions(_))
            ));
        }
    }

    #[test]
    fn blend_mixes_towards_colour() {
        let mut px = Rgba([0, 100, 255, 255]);
        blend(&mut px, [255, 255, 255], 0.5);
        assert_eq!(px, Rgba([128, 178, 255, 255]));
    }

    #[test]
    fn blend_over_transparent_keeps_full_colour() {
        let mut px = Rgba([0, 0, 0, 0]);
        blend(&mut px, [255, 255, 255], 0.35);
        assert_eq!(px, Rgba([255, 255, 255, 89]));

        let mut half = Rgba([0, 0, 0, 128]);
        blend(&mut half, [255, 255, 255], 0.35);
        // Source dominates: 0.35 vs 0.502 * 0.65 = 0.326 destination weight.
        assert!(half[0] > 128);
        assert_eq!(half[3], 172);
    }

    #[test]
    fn stamp_on_transparent_image_is_legible() {
        let img = RgbaImage::new(200, 100);
        let out = stamp(&img, "AI", &StampOptions::default()).unwrap();
        let touched: Vec<&Rgba<u8>> = out.pixels().filter(|p| p[3] > 0).collect();
        assert!(!touched.is_empty());
        // Pure fill or pure shadow pixels keep their colour; overlaps mix.
        assert!(touched.iter().any(|p| p.0 == [255, 255, 255, 89]));
        assert!(touched.iter().any(|p| p.0 == [0, 0, 0, 89]));
        assert!(touched.iter().all(|p| p[3] >= 89));
    }

    #[test]
    fn huge_text_ratio_is_rejected_without_overflow() {
        let opts = StampOptions {
            text_height_ratio: 1.0e7,
            ..StampOptions::default()
        };
        assert!(matches!(opts.validate(), Err(Error::InvalidOptions(_))));
        assert!(matches!(
            stamp(&RgbaImage::new(1000, 100), "A", &opts),
            Err(Error::InvalidOptions(_))
        ));
        // Layout saturates instead of panicking for unvalidated options.
        let l = layout(1000, 100, 1, &opts);
        assert_eq!(l.text_height, u32::MAX);
    }

    #[test]
    fn largest_accepted_ratio_renders() {
        let wide_margin = StampOptions {
            margin_ratio: 1.0,
            ..StampOptions::default()
        };
        assert!(wide_margin.validate().is_ok());

        let opts = StampOptions {
            text_height_ratio: 1.0,
            margin_ratio: 0.0,
            ..StampOptions::default()
        };
        let img = grey(64, 64);
        assert!(stamp(&img, "A", &opts).is_ok());
    }
}
