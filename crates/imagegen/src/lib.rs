//! Image/style generation
//!
//! Request/response wrapper around the external image model. Reference
//! outfits route to the virtual try-on model; free-form prompts use the
//! text-conditioned edit model with fixed parameters. Generated assets are
//! copied into persistent object storage under a deterministic key.

pub mod fal;
pub mod storage;

pub use fal::FalStyleClient;
pub use storage::{HttpObjectStore, MemoryObjectStore, ObjectStore};

use async_trait::async_trait;
use thiserror::Error;

/// Image-generation errors
#[derive(Error, Debug)]
pub enum ImageGenError {
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("no media returned by provider")]
    NoMediaReturned,

    #[error("failed to fetch local source image: {0}")]
    LocalFetchFailed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ImageGenError {
    fn from(err: reqwest::Error) -> Self {
        ImageGenError::Upstream(err.to_string())
    }
}

impl From<ImageGenError> for avatar_core::Error {
    fn from(err: ImageGenError) -> Self {
        avatar_core::Error::Upstream(err.to_string())
    }
}

/// One style-generation request.
#[derive(Debug, Clone)]
pub struct StyleRequest {
    /// Source image of the user (URL or data URL).
    pub image_url: String,
    pub prompt: String,
    pub session_id: String,
    pub persona_id: String,
    /// Garment images for virtual try-on; empty means free generation.
    pub reference_image_urls: Vec<String>,
}

/// Result of a style generation.
#[derive(Debug, Clone)]
pub struct StyleOutput {
    /// Persistent URL when the object-store copy succeeded, else the
    /// provider URL.
    pub generated_url: String,
    /// URL as returned by the provider.
    pub provider_url: String,
    pub model_used: String,
}

/// Seam for the style tool; lets tests script generations.
#[async_trait]
pub trait StyleGenerator: Send + Sync {
    async fn generate_style(&self, request: StyleRequest) -> Result<StyleOutput, ImageGenError>;
}
