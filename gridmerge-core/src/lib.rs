//! GridMerge Core - Image Grid Compositor
//!
//! Tiles an ordered list of remote images into one PNG canvas.
//!
//! # Guarantees
//! 1. Layout depends only on image count and canvas size
//! 2. Placement follows input order, never fetch completion order
//! 3. Output is exactly `width x height`, or one structured error
//! 4. First fetch/decode failure aborts the merge
//! 5. Temporary storage is released on every exit path

pub mod request;
pub mod layout;
pub mod validation;
pub mod resources;
pub mod fetch;
pub mod compositor;
pub mod pipeline;
pub mod error;
pub mod config;

pub use request::GridSpec;
pub use layout::{plan, Cell, Layout};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use resources::{ResourceManager, ResourceSnapshot, TempSlot, WorkingArea};
pub use fetch::{FetchError, HttpSource, ImageFetcher, ImageSource};
pub use compositor::Compositor;
pub use pipeline::{GridCompositorService, MergeState, MergedImage};
pub use error::{ErrorKind, MergeError};
pub use config::{MergeConfig, ResizeFilter};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
