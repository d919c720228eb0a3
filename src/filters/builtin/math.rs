//! Arithmetic on two numbers.

use crate::core::context::ComputeContext;
use crate::core::error::ComputeError;
use crate::core::node::{Category, NodeMetadata, NodeVariant};
use crate::core::port::{ParameterDefinition, PortSpec};
use crate::core::types::{PortType, Value};
use crate::filters::registry::NodeRegistry;
use std::str::FromStr;

/// Register math nodes.
pub fn register(registry: &mut NodeRegistry) {
    registry.register(|| Box::new(Math));
}

/// Operation applied by the math node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathMethod {
    Add,
    Subtract,
    /// Mean of both operands
    Mix,
    Min,
    Max,
    Multiply,
}

impl MathMethod {
    pub const ALL: [&'static str; 6] = ["add", "subtract", "mix", "min", "max", "multiply"];

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            MathMethod::Add => a + b,
            MathMethod::Subtract => a - b,
            MathMethod::Mix => (a + b) / 2.0,
            MathMethod::Min => a.min(b),
            MathMethod::Max => a.max(b),
            MathMethod::Multiply => a * b,
        }
    }
}

impl FromStr for MathMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(MathMethod::Add),
            "subtract" => Ok(MathMethod::Subtract),
            "mix" => Ok(MathMethod::Mix),
            "min" => Ok(MathMethod::Min),
            "max" => Ok(MathMethod::Max),
            "multiply" => Ok(MathMethod::Multiply),
            other => Err(format!("unknown math method '{}'", other)),
        }
    }
}

/// Combines two numbers.
#[derive(Debug, Clone)]
pub struct Math;

impl NodeVariant for Math {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("math", "Math")
            .description("Combine two numbers")
            .category(Category::Math)
            .port(PortSpec::sink("a", PortType::Number).with_description("First operand"))
            .port(PortSpec::sink("b", PortType::Number).with_description("Second operand"))
            .port(PortSpec::source("result", PortType::Number))
            .parameter(
                ParameterDefinition::new("method", "add")
                    .with_description("Operation")
                    .with_options(MathMethod::ALL),
            )
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let method: MathMethod = ctx
            .text("method")?
            .parse()
            .map_err(|e: String| ctx.invalid_parameter("method", e))?;
        let a = ctx.input_number("a")?;
        let b = ctx.input_number("b")?;

        ctx.set_output("result", Value::Number(method.apply(a, b)))
    }
}
