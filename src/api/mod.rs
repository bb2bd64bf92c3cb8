//! Remote generation and inpainting services.

mod provider;
pub mod providers;
mod types;

pub use provider::{ImageProvider, InpaintProvider};
pub use types::{
    encode_png, AspectRatio, GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat,
    InpaintRequest, ProviderKind,
};
