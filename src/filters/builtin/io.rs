//! Image I/O nodes: ImageSource, ImageOutput

use crate::core::context::ComputeContext;
use crate::core::error::ComputeError;
use crate::core::node::{Category, NodeMetadata, NodeVariant};
use crate::core::port::{Constraint, ParameterDefinition, PortSpec};
use crate::core::types::{ImageValue, PortType, Value};
use crate::filters::registry::NodeRegistry;
use std::path::Path;

/// Register I/O nodes.
pub fn register(registry: &mut NodeRegistry) {
    registry.register(|| Box::new(ImageSource));
    registry.register(|| Box::new(ImageOutput));
}

/// File extensions the image source accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp"];

/// Loads an image from disk. Has no sinks, so it computes as soon as it
/// is added.
#[derive(Debug, Clone)]
pub struct ImageSource;

impl NodeVariant for ImageSource {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("image_source", "Image Source")
            .description("Load an image from a file path")
            .category(Category::Input)
            .port(PortSpec::source("image", PortType::Image).with_description("The loaded image"))
            .parameter(
                ParameterDefinition::new("path", "")
                    .with_description("Path to the image file")
                    .with_constraint(Constraint::NotEmpty),
            )
            .asynchronous()
            // The file may change under the same path
            .uncached()
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let path = ctx.text("path")?.to_string();

        let extension = Path::new(&path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ctx.invalid_parameter("path", format!("unsupported image format '{}'", extension)));
        }

        let image = ImageValue::from_path(&path).map_err(|e| ComputeError::Resource {
            node_id: ctx.node_id,
            resource: path.clone(),
            reason: e.to_string(),
        })?;

        log::debug!("Loaded {} ({}x{})", path, image.width(), image.height());
        ctx.set_output("image", Value::Image(image))
    }
}

/// Terminal display node: republishes its input as a preview.
#[derive(Debug, Clone)]
pub struct ImageOutput;

impl NodeVariant for ImageOutput {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("image_output", "Image Output")
            .description("Display the final image")
            .category(Category::Output)
            .port(PortSpec::sink("image", PortType::Image).with_description("Image to display"))
            .port(PortSpec::source("preview", PortType::Image).with_description("Displayed image"))
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let image = ctx.input_image("image")?.clone();
        ctx.set_output("preview", Value::Image(image))
    }
}
