//! Last-captured vision image
//!
//! One slot per session, replaced on every `vision-image` frame. Freshness
//! policies: inline use on voice/text turns requires age < 30 s; the style
//! tool accepts up to 5 min.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::time::{Duration, Instant};

/// Maximum age for inlining the image into a turn's user message.
pub const INLINE_MAX_AGE: Duration = Duration::from_secs(30);
/// Maximum age for tool-invoked style requests.
pub const TOOL_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Encoded JPEG bytes plus capture time.
#[derive(Debug, Clone)]
pub struct VisionImage {
    pub bytes: Vec<u8>,
    pub captured_at: Instant,
}

impl VisionImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            captured_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn fresh_for_inline(&self) -> bool {
        self.age() < INLINE_MAX_AGE
    }

    pub fn fresh_for_tools(&self) -> bool {
        self.age() < TOOL_MAX_AGE
    }

    /// Data URL usable as an image part or generator input.
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", BASE64.encode(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_image_passes_both_policies() {
        let image = VisionImage::new(vec![0xff, 0xd8, 0xff]);
        assert!(image.fresh_for_inline());
        assert!(image.fresh_for_tools());
    }

    #[test]
    fn stale_image_fails_inline_policy() {
        let image = VisionImage {
            bytes: vec![1, 2, 3],
            captured_at: Instant::now() - Duration::from_secs(60),
        };
        assert!(!image.fresh_for_inline());
        assert!(image.fresh_for_tools());
    }

    #[test]
    fn data_url_prefix() {
        let image = VisionImage::new(vec![1, 2, 3]);
        assert!(image.data_url().starts_with("data:image/jpeg;base64,"));
    }
}
