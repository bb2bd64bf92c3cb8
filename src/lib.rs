//! Widefill - widescreen images from text prompts.
//!
//! Each prompt is rendered by a text-to-image service, the result is
//! centered on a wider (16:9) or taller (9:16) canvas, and an inpainting
//! service fills the exposed border so the final image reads as one
//! composition.
//!
//! # Quick Start
//!
//! ```no_run
//! use widefill::{
//!     read_prompts, BatchOptions, FluxFillProvider, OpenAiImageProvider, Pipeline,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> widefill::Result<()> {
//!     let generator = OpenAiImageProvider::builder().api_key("sk-...").build()?;
//!     let inpainter = FluxFillProvider::builder().api_token("r8_...").build()?;
//!
//!     let records = read_prompts("input.csv")?;
//!     let pipeline = Pipeline::new(&generator, &inpainter, BatchOptions::default());
//!     let summary = pipeline.run(records).await?;
//!     println!("saved {} images", summary.saved());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `openai-image`: base images from OpenAI gpt-image-1
//! - `flux-fill`: inpainting with Flux Fill Pro on Replicate
//! - `cli`: the `widefill` command-line tool

pub mod api;
pub mod batch;
pub mod canvas;
mod error;
pub mod prompts;

pub use error::{Result, WidefillError};

pub use api::{
    AspectRatio, GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat,
    ImageProvider, InpaintProvider, InpaintRequest, ProviderKind,
};
pub use batch::{BatchOptions, BatchSummary, OutputPaths, Pipeline, RecordOutcome, Stage};
pub use canvas::{build_mask, extend, extend_with_mask, CanvasGeometry, CanvasOptions, Placement};
pub use prompts::{parse_prompts, read_prompts, PromptRecord};

#[cfg(feature = "openai-image")]
pub use api::providers::{OpenAiImageProvider, OpenAiImageProviderBuilder};

#[cfg(feature = "flux-fill")]
pub use api::providers::{FluxFillProvider, FluxFillProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::api::{AspectRatio, ImageProvider, InpaintProvider};
    pub use crate::batch::{BatchOptions, Pipeline};
    pub use crate::error::{Result, WidefillError};
    pub use crate::prompts::read_prompts;

    #[cfg(feature = "openai-image")]
    pub use crate::api::providers::OpenAiImageProvider;

    #[cfg(feature = "flux-fill")]
    pub use crate::api::providers::FluxFillProvider;
}
