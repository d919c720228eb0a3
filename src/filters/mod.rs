//! Node variants.
//!
//! Contains the variant registry and the built-in image nodes.

pub mod builtin;
pub mod registry;

pub use registry::{NodeRegistry, VariantFactory};
