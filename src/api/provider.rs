//! Provider traits for the two remote services.

use crate::api::types::{GeneratedImage, GenerationRequest, InpaintRequest, ProviderKind};
use crate::error::Result;
use async_trait::async_trait;

/// Text-to-image service that produces the base image.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generates an image from the given request.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage>;

    /// Returns the kind of this provider.
    fn kind(&self) -> ProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        display_name(self.kind())
    }
}

/// Inpainting service that fills the masked border of an extended canvas.
///
/// Implementations make at most one submission per call; failures are
/// returned to the caller, which decides whether to skip the record.
#[async_trait]
pub trait InpaintProvider: Send + Sync {
    /// Fills the white regions of `request.mask` on `request.image`.
    async fn inpaint(&self, request: &InpaintRequest) -> Result<GeneratedImage>;

    /// Returns the kind of this provider.
    fn kind(&self) -> ProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        display_name(self.kind())
    }
}

fn display_name(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAI => "OpenAI (gpt-image-1)",
        ProviderKind::FluxFill => "Flux Fill Pro (Replicate)",
    }
}
