//! Constant value nodes.

use crate::core::context::ComputeContext;
use crate::core::error::ComputeError;
use crate::core::node::{Category, NodeMetadata, NodeVariant};
use crate::core::port::{ParameterDefinition, PortSpec};
use crate::core::types::{Color, PortType, Value};
use crate::filters::registry::NodeRegistry;

/// Register constant nodes.
pub fn register(registry: &mut NodeRegistry) {
    registry.register(|| Box::new(NumberConstant));
    registry.register(|| Box::new(ColorConstant));
}

/// Outputs a number.
#[derive(Debug, Clone)]
pub struct NumberConstant;

impl NodeVariant for NumberConstant {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("number", "Number")
            .description("Output a constant number")
            .category(Category::Constant)
            .port(PortSpec::source("value", PortType::Number))
            .parameter(ParameterDefinition::new("value", 0.0).with_description("The number"))
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let value = ctx.number("value")?;
        ctx.set_output("value", Value::Number(value))
    }
}

/// Outputs a color.
#[derive(Debug, Clone)]
pub struct ColorConstant;

impl NodeVariant for ColorConstant {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("color", "Color")
            .description("Output a constant color")
            .category(Category::Constant)
            .port(PortSpec::source("color", PortType::Color))
            .parameter(ParameterDefinition::new("color", Color::WHITE).with_description("The color"))
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let color = ctx.color("color")?;
        ctx.set_output("color", Value::Color(color))
    }
}
