//! Merge Request

use serde::{Deserialize, Serialize};

/// Immutable input for one merge: canvas size plus ordered image locators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: u32,
    pub height: u32,
    pub images: Vec<String>,
}

impl GridSpec {
    pub fn new(width: u32, height: u32, images: Vec<String>) -> Self {
        Self { width, height, images }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}
