//! Concrete service clients.

#[cfg(feature = "flux-fill")]
mod flux_fill;
#[cfg(feature = "openai-image")]
mod openai;

#[cfg(feature = "flux-fill")]
pub use flux_fill::{FluxFillProvider, FluxFillProviderBuilder};

#[cfg(feature = "openai-image")]
pub use openai::{OpenAiImageProvider, OpenAiImageProviderBuilder};
