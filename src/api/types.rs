//! Core types shared by the generation and inpainting providers.

use crate::error::{Result, WidefillError};
use image::{DynamicImage, RgbImage};
use std::str::FromStr;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }

    fn codec(&self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

/// Remote service that produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI image models (gpt-image-1).
    OpenAI,
    /// Flux Fill Pro served through Replicate.
    FluxFill,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::FluxFill => write!(f, "flux-fill"),
        }
    }
}

/// Output aspect ratio of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    /// 16:9 landscape; the canvas grows horizontally.
    #[default]
    Landscape,
    /// 9:16 portrait; the canvas grows vertically.
    Portrait,
}

impl AspectRatio {
    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }

    /// Size of the base image requested from the generation service.
    pub fn base_size(&self) -> (u32, u32) {
        match self {
            Self::Landscape => (1536, 1024),
            Self::Portrait => (1024, 1536),
        }
    }

    /// Final size for a given extended side length.
    pub fn extended_size(&self, long_side: u32) -> (u32, u32) {
        let (w, h) = self.base_size();
        match self {
            Self::Landscape => (long_side, h),
            Self::Portrait => (w, long_side),
        }
    }

    /// True when the canvas grows along the x axis.
    pub fn extends_width(&self) -> bool {
        matches!(self, Self::Landscape)
    }
}

impl FromStr for AspectRatio {
    type Err = WidefillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "16:9" => Ok(Self::Landscape),
            "9:16" => Ok(Self::Portrait),
            other => Err(WidefillError::UnsupportedAspectRatio(other.to_string())),
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Upstream request/prediction identifier, if any.
    pub request_id: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
}

/// A request to generate a base image.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Aspect ratio; selects the requested size.
    pub aspect_ratio: Option<AspectRatio>,
}

impl GenerationRequest {
    /// Creates a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: None,
        }
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    /// Resolves the `WxH` size string for the aspect ratio.
    pub fn size_string(&self) -> Option<String> {
        self.aspect_ratio.map(|ar| {
            let (w, h) = ar.base_size();
            format!("{w}x{h}")
        })
    }
}

/// A request to fill the masked regions of a canvas.
#[derive(Debug, Clone)]
pub struct InpaintRequest {
    /// PNG-encoded canvas.
    pub image: Vec<u8>,
    /// PNG-encoded single-channel mask (white = fill, black = preserve).
    pub mask: Vec<u8>,
    /// Prompt of the record being processed. Not sent upstream.
    pub prompt: String,
}

impl InpaintRequest {
    /// PNG-encodes a canvas and its mask.
    pub fn from_canvas(
        canvas: &RgbImage,
        mask: &image::GrayImage,
        prompt: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            image: encode_png(canvas)?,
            mask: encode_png(mask)?,
            prompt: prompt.into(),
        })
    }

    /// Returns the canvas as a `data:` URI.
    pub fn image_data_url(&self) -> String {
        to_data_url(&self.image, ImageFormat::Png)
    }

    /// Returns the mask as a `data:` URI.
    pub fn mask_data_url(&self) -> String {
        to_data_url(&self.mask, ImageFormat::Png)
    }
}

/// A generated image with its data and metadata.
#[derive(Debug, Clone)]
#[must_use = "generated image should be decoded or saved"]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Provider that generated this image.
    pub provider: ProviderKind,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(
        data: Vec<u8>,
        format: ImageFormat,
        provider: ProviderKind,
        metadata: GenerationMetadata,
    ) -> Self {
        Self {
            data,
            format,
            provider,
            metadata,
        }
    }

    /// Creates a new generated image, detecting format from magic bytes.
    pub fn from_bytes(
        data: Vec<u8>,
        provider: ProviderKind,
        metadata: GenerationMetadata,
    ) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| WidefillError::Decode("unknown image format".into()))?;
        Ok(Self::new(data, format, provider, metadata))
    }

    /// Decodes the bytes, keeping the source color type.
    pub fn decode_dynamic(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory_with_format(
            &self.data,
            self.format.codec(),
        )?)
    }

    /// Decodes the bytes into an RGB raster.
    pub fn decode(&self) -> Result<RgbImage> {
        Ok(self.decode_dynamic()?.to_rgb8())
    }
}

/// Encodes any raster as PNG bytes.
pub fn encode_png<P>(img: &image::ImageBuffer<P, Vec<u8>>) -> Result<Vec<u8>>
where
    P: image::Pixel<Subpixel = u8> + image::PixelWithColorType,
{
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(buf.into_inner())
}

fn to_data_url(data: &[u8], format: ImageFormat) -> String {
    use base64::Engine;
    format!(
        "data:{};base64,{}",
        format.mime_type(),
        base64::engine::general_purpose::STANDARD.encode(data)
    )
}
