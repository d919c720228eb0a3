//! Built-in node variants.
//!
//! This module contains the standard nodes that ship with Vortex.

mod blur;
mod color;
mod constants;
mod io;
mod math;

use crate::filters::registry::NodeRegistry;

/// Register all built-in variants.
pub fn register_all(registry: &mut NodeRegistry) {
    io::register(registry);
    blur::register(registry);
    color::register(registry);
    constants::register(registry);
    math::register(registry);
}

// Re-export for direct access
pub use blur::{Blur, BlurMethod};
pub use color::{Brightness, Sepia};
pub use constants::{ColorConstant, NumberConstant};
pub use io::{ImageOutput, ImageSource, SUPPORTED_EXTENSIONS};
pub use math::{Math, MathMethod};
