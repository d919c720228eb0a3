//! Color adjustment nodes: brightness and sepia toning.

use crate::core::context::ComputeContext;
use crate::core::error::ComputeError;
use crate::core::node::{Category, NodeMetadata, NodeVariant};
use crate::core::port::{ParameterDefinition, PortSpec};
use crate::core::types::{Color, ImageValue, PortType, Value};
use crate::filters::registry::NodeRegistry;
use image::{Pixel, RgbaImage};

/// Register color nodes.
pub fn register(registry: &mut NodeRegistry) {
    registry.register(|| Box::new(Brightness));
    registry.register(|| Box::new(Sepia));
}

fn input_rgba(ctx: &ComputeContext) -> Result<RgbaImage, ComputeError> {
    ctx.input_image("image")?
        .to_rgba8()
        .ok_or_else(|| ctx.processing_error("Image has no data"))
}

/// Adds a constant to every color channel.
///
/// The amount comes from the optional `amount` sink when wired, otherwise
/// from the `amount` parameter.
#[derive(Debug, Clone)]
pub struct Brightness;

impl NodeVariant for Brightness {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("brightness", "Brightness")
            .description("Adjust the brightness of an image")
            .category(Category::Color)
            .port(PortSpec::sink("image", PortType::Image).with_description("Input image"))
            .port(
                PortSpec::sink("amount", PortType::Number)
                    .optional()
                    .with_description("Overrides the amount parameter when connected"),
            )
            .port(PortSpec::source("result", PortType::Image).with_description("Adjusted image"))
            .parameter(
                ParameterDefinition::new("amount", 0.0)
                    .with_description("Value added to each channel (-255 to 255)")
                    .with_range(-255.0, 255.0),
            )
            .asynchronous()
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let amount = if ctx.has_input("amount") {
            ctx.input_number("amount")?
        } else {
            ctx.number("amount")?
        };
        if !amount.is_finite() {
            return Err(ctx.invalid_parameter("amount", "must be finite"));
        }
        let adjustment = amount.round().clamp(-255.0, 255.0) as i32;

        let mut result = input_rgba(ctx)?;
        for pixel in result.pixels_mut() {
            let channels = pixel.channels_mut();
            for channel in channels.iter_mut().take(3) {
                *channel = (*channel as i32 + adjustment).clamp(0, 255) as u8;
            }
        }

        ctx.set_output("result", Value::Image(ImageValue::from_rgba(result)))
    }
}

/// Tints an image by mapping luminance onto a tone color.
#[derive(Debug, Clone)]
pub struct Sepia;

impl NodeVariant for Sepia {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("sepia", "Sepia")
            .description("Tone an image with a color, classic sepia by default")
            .category(Category::Color)
            .port(PortSpec::sink("image", PortType::Image).with_description("Input image"))
            .port(
                PortSpec::sink("tone", PortType::Color)
                    .with_default(Value::Color(Color::SEPIA))
                    .with_description("Tone color"),
            )
            .port(PortSpec::source("result", PortType::Image).with_description("Toned image"))
            .parameter(
                ParameterDefinition::new("intensity", 1.0)
                    .with_description("Blend between original (0) and fully toned (1)")
                    .with_range(0.0, 1.0),
            )
            .asynchronous()
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let tone = if ctx.has_input("tone") {
            ctx.input_color("tone")?
        } else {
            Color::SEPIA
        };
        let intensity = ctx.number("intensity")?.clamp(0.0, 1.0) as f32;
        let mut result = input_rgba(ctx)?;

        let tone = [tone.r as f32, tone.g as f32, tone.b as f32];
        let mean = (tone[0] + tone[1] + tone[2]) / 3.0;
        let scale = if mean > 0.0 {
            [tone[0] / mean, tone[1] / mean, tone[2] / mean]
        } else {
            [0.0; 3]
        };

        for pixel in result.pixels_mut() {
            let channels = pixel.channels_mut();
            let luma = 0.299 * channels[0] as f32 + 0.587 * channels[1] as f32 + 0.114 * channels[2] as f32;
            for (channel, s) in channels.iter_mut().zip(scale) {
                let toned = (luma * s).clamp(0.0, 255.0);
                let original = *channel as f32;
                *channel = (original + (toned - original) * intensity).round().clamp(0.0, 255.0) as u8;
            }
        }

        ctx.set_output("result", Value::Image(ImageValue::from_rgba(result)))
    }
}
