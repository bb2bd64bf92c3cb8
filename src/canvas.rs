//! Canvas extension and inpainting mask construction.
//!
//! A base image is centered on a larger canvas along one axis. The exposed
//! border is pre-filled with a blurred, stretched copy of the image so the
//! inpainting model starts from plausible colors, and a mask marks that
//! border as the region to synthesize.

use crate::api::AspectRatio;
use crate::error::{Result, WidefillError};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

/// Length of the extended side for both supported ratios.
pub const DEFAULT_TARGET_LONG_SIDE: u32 = 1824;

/// Gaussian blur sigma applied to the background filler.
pub const DEFAULT_BLUR_SIGMA: f32 = 20.0;

/// Mask value for pixels the inpainting model should synthesize.
pub const MASK_FILL: u8 = 255;

/// Mask value for pixels that must be kept.
pub const MASK_PRESERVE: u8 = 0;

/// Tunables for canvas extension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasOptions {
    /// Target length of the extended axis in pixels.
    pub target_long_side: u32,
    /// Blur strength of the background filler.
    pub blur_sigma: f32,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            target_long_side: DEFAULT_TARGET_LONG_SIDE,
            blur_sigma: DEFAULT_BLUR_SIGMA,
        }
    }
}

/// Where the original image sits on the extended canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// True if `(px, py)` falls inside the rectangle.
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Size of the extended canvas and the position of the original on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasGeometry {
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
}

impl CanvasGeometry {
    /// Computes the extended canvas for an image of `width`×`height`.
    ///
    /// Only the axis selected by `ratio` grows, to exactly `target_long_side`.
    /// When the growth is odd the extra pixel lands on the far side.
    pub fn compute(
        width: u32,
        height: u32,
        ratio: AspectRatio,
        target_long_side: u32,
    ) -> Result<Self> {
        let original = if ratio.extends_width() { width } else { height };
        if original > target_long_side {
            return Err(WidefillError::InvalidRequest(format!(
                "{width}x{height} image does not fit a {ratio} canvas of {target_long_side}px"
            )));
        }
        let extension = (target_long_side - original) / 2;

        let (canvas_w, canvas_h, x, y) = if ratio.extends_width() {
            (target_long_side, height, extension, 0)
        } else {
            (width, target_long_side, 0, extension)
        };

        Ok(Self {
            width: canvas_w,
            height: canvas_h,
            placement: Placement {
                x,
                y,
                width,
                height,
            },
        })
    }
}

/// An extended canvas with the original image composited on top.
#[derive(Debug, Clone)]
pub struct ExtendedCanvas {
    pub canvas: RgbImage,
    pub placement: Placement,
}

/// Extends `image` to `ratio`, backfilling the border with a blurred stretch.
pub fn extend(image: &RgbImage, ratio: AspectRatio, options: &CanvasOptions) -> Result<ExtendedCanvas> {
    let (width, height) = image.dimensions();
    let geometry = CanvasGeometry::compute(width, height, ratio, options.target_long_side)?;

    let blurred = imageops::blur(image, options.blur_sigma);
    let mut canvas = imageops::resize(
        &blurred,
        geometry.width,
        geometry.height,
        FilterType::CatmullRom,
    );

    let Placement { x, y, .. } = geometry.placement;
    imageops::replace(&mut canvas, image, i64::from(x), i64::from(y));

    Ok(ExtendedCanvas {
        canvas,
        placement: geometry.placement,
    })
}

/// Builds a `width`×`height` mask: fill everywhere except `placement`.
pub fn build_mask(width: u32, height: u32, placement: &Placement) -> GrayImage {
    let mut mask = GrayImage::from_pixel(width, height, Luma([MASK_FILL]));
    let preserve = GrayImage::from_pixel(placement.width, placement.height, Luma([MASK_PRESERVE]));
    imageops::replace(
        &mut mask,
        &preserve,
        i64::from(placement.x),
        i64::from(placement.y),
    );
    mask
}

/// Runs [`extend`] and [`build_mask`] with a shared placement.
pub fn extend_with_mask(
    image: &RgbImage,
    ratio: AspectRatio,
    options: &CanvasOptions,
) -> Result<(ExtendedCanvas, GrayImage)> {
    let extended = extend(image, ratio, options)?;
    let (w, h) = extended.canvas.dimensions();
    let mask = build_mask(w, h, &extended.placement);
    Ok((extended, mask))
}
