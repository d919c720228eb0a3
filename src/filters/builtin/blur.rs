//! Blur node: a family of small convolution kernels plus a true Gaussian.

use crate::core::context::ComputeContext;
use crate::core::error::ComputeError;
use crate::core::node::{Category, NodeMetadata, NodeVariant};
use crate::core::port::{ParameterDefinition, PortSpec};
use crate::core::types::{ImageValue, PortType, Value};
use crate::filters::registry::NodeRegistry;
use image::{DynamicImage, Rgba, RgbaImage};
use std::str::FromStr;

/// Register the blur node.
pub fn register(registry: &mut NodeRegistry) {
    registry.register(|| Box::new(Blur));
}

/// Convolution applied by the blur node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurMethod {
    /// 3x3 mean
    Box,
    /// 3x3 binomial
    Gaussian3,
    /// 5x5 binomial
    Gaussian5,
    /// 3x3 unsharp cross
    Sharpen,
    /// Gradient magnitude (edges)
    Sobel,
    /// Gaussian of arbitrary sigma
    Gaussian,
}

impl BlurMethod {
    pub const ALL: [&'static str; 6] = ["box", "gaussian3", "gaussian5", "sharpen", "sobel", "gaussian"];
}

impl FromStr for BlurMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "box" => Ok(BlurMethod::Box),
            "gaussian3" => Ok(BlurMethod::Gaussian3),
            "gaussian5" => Ok(BlurMethod::Gaussian5),
            "sharpen" => Ok(BlurMethod::Sharpen),
            "sobel" => Ok(BlurMethod::Sobel),
            "gaussian" => Ok(BlurMethod::Gaussian),
            other => Err(format!("unknown blur method '{}'", other)),
        }
    }
}

const BOX: [f32; 3] = [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];
const BINOMIAL3: [f32; 3] = [0.25, 0.5, 0.25];
const BINOMIAL5: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
const SHARPEN: [[f32; 3]; 3] = [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]];

struct BlurParams {
    method: BlurMethod,
    sigma: f32,
}

impl BlurParams {
    fn from_context(ctx: &ComputeContext) -> Result<Self, ComputeError> {
        let method = ctx
            .text("method")?
            .parse()
            .map_err(|e: String| ctx.invalid_parameter("method", e))?;
        Ok(Self {
            method,
            sigma: ctx.number("sigma")? as f32,
        })
    }
}

/// Convolves an image with the selected kernel.
#[derive(Debug, Clone)]
pub struct Blur;

impl NodeVariant for Blur {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("blur", "Blur")
            .description("Convolve an image with a blur, sharpen or edge kernel")
            .category(Category::Filter)
            .port(PortSpec::sink("image", PortType::Image).with_description("Input image"))
            .port(PortSpec::source("result", PortType::Image).with_description("Filtered image"))
            .parameter(
                ParameterDefinition::new("method", "box")
                    .with_description("Kernel to apply")
                    .with_options(BlurMethod::ALL),
            )
            .parameter(
                ParameterDefinition::new("sigma", 2.0)
                    .with_description("Standard deviation for the 'gaussian' method")
                    .with_range(0.1, 50.0),
            )
            .asynchronous()
            .build()
    }

    fn compute(&self, ctx: &mut ComputeContext) -> Result<(), ComputeError> {
        let params = BlurParams::from_context(ctx)?;
        let rgba = ctx
            .input_image("image")?
            .to_rgba8()
            .ok_or_else(|| ctx.processing_error("Image has no data"))?;

        let filtered = apply(&rgba, &params);
        ctx.set_output("result", Value::Image(ImageValue::from_rgba(filtered)))
    }
}

fn apply(rgba: &RgbaImage, params: &BlurParams) -> RgbaImage {
    match params.method {
        BlurMethod::Box => imageproc::filter::separable_filter(rgba, &BOX, &BOX),
        BlurMethod::Gaussian3 => imageproc::filter::separable_filter(rgba, &BINOMIAL3, &BINOMIAL3),
        BlurMethod::Gaussian5 => imageproc::filter::separable_filter(rgba, &BINOMIAL5, &BINOMIAL5),
        BlurMethod::Gaussian => imageproc::filter::gaussian_blur_f32(rgba, params.sigma),
        BlurMethod::Sharpen => convolve3x3(rgba, &SHARPEN),
        BlurMethod::Sobel => sobel(rgba),
    }
}

/// 3x3 convolution on the color channels with clamped edges. Alpha is kept.
fn convolve3x3(src: &RgbaImage, kernel: &[[f32; 3]; 3]) -> RgbaImage {
    let (w, h) = src.dimensions();
    let max_x = w.saturating_sub(1) as i64;
    let max_y = h.saturating_sub(1) as i64;

    RgbaImage::from_fn(w, h, |x, y| {
        let mut acc = [0.0f32; 3];
        for (ky, row) in kernel.iter().enumerate() {
            for (kx, weight) in row.iter().enumerate() {
                let sx = (x as i64 + kx as i64 - 1).clamp(0, max_x) as u32;
                let sy = (y as i64 + ky as i64 - 1).clamp(0, max_y) as u32;
                let p = src.get_pixel(sx, sy);
                for c in 0..3 {
                    acc[c] += p[c] as f32 * weight;
                }
            }
        }
        let alpha = src.get_pixel(x, y)[3];
        Rgba([
            acc[0].round().clamp(0.0, 255.0) as u8,
            acc[1].round().clamp(0.0, 255.0) as u8,
            acc[2].round().clamp(0.0, 255.0) as u8,
            alpha,
        ])
    })
}

/// Sobel gradient magnitude of the luminance, as an opaque gray image.
fn sobel(src: &RgbaImage) -> RgbaImage {
    let gray = DynamicImage::ImageRgba8(src.clone()).to_luma8();
    let gradients = imageproc::gradients::sobel_gradients(&gray);

    RgbaImage::from_fn(src.width(), src.height(), |x, y| {
        let v = gradients.get_pixel(x, y)[0].min(255) as u8;
        Rgba([v, v, v, 255])
    })
}
