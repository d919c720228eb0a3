//! Core value types that flow through the dataflow graph.
//!
//! The port type system is a small closed enumeration. Every value carried
//! by a port is a tagged [`Value`] whose tag is its [`PortType`], so a link
//! only needs to be type-checked once, when it is created.

use image::{DynamicImage, RgbaImage};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Port types for type checking connections between nodes.
///
/// Two ports are compatible iff their types are equal. There is no
/// wildcard and no implicit conversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PortType {
    /// Raster image
    Image,
    /// Scalar number
    Number,
    /// RGBA color
    Color,
}

/// A value carried by a port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// Image data with metadata
    Image(ImageValue),
    /// 64-bit floating point number
    Number(f64),
    /// RGBA color value
    Color(Color),
}

/// Shared, immutable image with metadata.
///
/// Pixel data lives behind an `Arc`, so cloning a value (for example when
/// snapshotting inputs for a background compute) never copies pixels.
/// Each freshly produced image gets a new `revision`; clones share it, so
/// the revision identifies the pixel content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageValue {
    /// Image metadata (dimensions, origin)
    pub metadata: ImageMetadata,
    /// Content identity of the pixel data
    pub revision: Uuid,
    #[serde(skip)]
    data: Option<Arc<DynamicImage>>,
}

impl PartialEq for ImageValue {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision
    }
}

/// Image metadata without the pixel data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// File the image was read from, if any
    pub origin: Option<PathBuf>,
}

/// RGBA color value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

// ============================================================================
// PortType / Value
// ============================================================================

impl PortType {
    /// Check if a value matches this port type.
    pub fn matches(&self, value: &Value) -> bool {
        value.port_type() == *self
    }

    /// Check if a source of this type may feed a sink of `other`.
    pub fn compatible_with(&self, other: &PortType) -> bool {
        self == other
    }

    /// Get a human-readable name for this type.
    pub fn display_name(&self) -> &'static str {
        match self {
            PortType::Image => "Image",
            PortType::Number => "Number",
            PortType::Color => "Color",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Value {
    /// Get the port type of this value.
    pub fn port_type(&self) -> PortType {
        match self {
            Value::Image(_) => PortType::Image,
            Value::Number(_) => PortType::Number,
            Value::Color(_) => PortType::Color,
        }
    }

    /// Try to get this value as an image reference.
    pub fn as_image(&self) -> Option<&ImageValue> {
        if let Value::Image(img) = self {
            Some(img)
        } else {
            None
        }
    }

    /// Try to get this value as a number.
    pub fn as_number(&self) -> Option<f64> {
        if let Value::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// Try to get this value as a color.
    pub fn as_color(&self) -> Option<Color> {
        if let Value::Color(c) = self {
            Some(*c)
        } else {
            None
        }
    }

    /// Feed a content fingerprint of this value into `hasher`.
    ///
    /// Images hash by revision, never by pixels.
    pub fn fingerprint<H: Hasher>(&self, hasher: &mut H) {
        std::mem::discriminant(self).hash(hasher);
        match self {
            Value::Image(img) => img.revision.hash(hasher),
            Value::Number(n) => n.to_bits().hash(hasher),
            Value::Color(c) => c.hash(hasher),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Image(img) => write!(f, "Image({}x{})", img.metadata.width, img.metadata.height),
            Value::Number(n) => write!(f, "{}", n),
            Value::Color(c) => write!(f, "{}", c),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<ImageValue> for Value {
    fn from(img: ImageValue) -> Self {
        Value::Image(img)
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// A node parameter value.
///
/// Parameters are configured on the node itself rather than wired through
/// ports, so they use a slightly wider set of kinds than [`Value`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum ParamValue {
    Number(f64),
    Integer(i64),
    Text(String),
    Boolean(bool),
    Color(Color),
}

impl ParamValue {
    /// Name of the kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Number(_) => "number",
            ParamValue::Integer(_) => "integer",
            ParamValue::Text(_) => "text",
            ParamValue::Boolean(_) => "boolean",
            ParamValue::Color(_) => "color",
        }
    }

    /// Whether `other` may replace a parameter currently holding `self`.
    ///
    /// Integers and numbers are interchangeable.
    pub fn same_kind(&self, other: &ParamValue) -> bool {
        matches!(
            (self, other),
            (ParamValue::Number(_) | ParamValue::Integer(_), ParamValue::Number(_) | ParamValue::Integer(_))
                | (ParamValue::Text(_), ParamValue::Text(_))
                | (ParamValue::Boolean(_), ParamValue::Boolean(_))
                | (ParamValue::Color(_), ParamValue::Color(_))
        )
    }

    /// Try to get this value as a float. Integers are widened.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        if let ParamValue::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_text(&self) -> Option<&str> {
        if let ParamValue::Text(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let ParamValue::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Try to get this value as a color.
    pub fn as_color(&self) -> Option<Color> {
        if let ParamValue::Color(c) = self {
            Some(*c)
        } else {
            None
        }
    }

    fn fingerprint<H: Hasher>(&self, hasher: &mut H) {
        std::mem::discriminant(self).hash(hasher);
        match self {
            ParamValue::Number(n) => n.to_bits().hash(hasher),
            ParamValue::Integer(i) => i.hash(hasher),
            ParamValue::Text(s) => s.hash(hasher),
            ParamValue::Boolean(b) => b.hash(hasher),
            ParamValue::Color(c) => c.hash(hasher),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{:.4}", n),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Text(s) => write!(f, "\"{}\"", s),
            ParamValue::Boolean(b) => write!(f, "{}", b),
            ParamValue::Color(c) => write!(f, "{}", c),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Integer(i)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Boolean(b)
    }
}

impl From<Color> for ParamValue {
    fn from(c: Color) -> Self {
        ParamValue::Color(c)
    }
}

/// Named parameter values of one node, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Parameters(IndexMap<String, ParamValue>);

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Feed all names and values into `hasher`, in declaration order.
    pub fn fingerprint<H: Hasher>(&self, hasher: &mut H) {
        self.0.len().hash(hasher);
        for (name, value) in &self.0 {
            name.hash(hasher);
            value.fingerprint(hasher);
        }
    }
}

impl FromIterator<(String, ParamValue)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// ImageValue Implementation
// ============================================================================

impl ImageValue {
    /// Create a new ImageValue from a DynamicImage.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            metadata: ImageMetadata {
                width: image.width(),
                height: image.height(),
                origin: None,
            },
            revision: Uuid::new_v4(),
            data: Some(Arc::new(image)),
        }
    }

    /// Create an ImageValue from an RGBA buffer.
    pub fn from_rgba(buffer: RgbaImage) -> Self {
        Self::new(DynamicImage::ImageRgba8(buffer))
    }

    /// Load an image from a file path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        let path = path.as_ref();
        let image = image::open(path)?;
        let mut value = Self::new(image);
        value.metadata.origin = Some(path.to_path_buf());
        Ok(value)
    }

    /// Get a shared reference to the underlying image.
    ///
    /// Returns None for a value deserialized without pixel data.
    pub fn get_image(&self) -> Option<&DynamicImage> {
        self.data.as_deref()
    }

    /// Copy the pixels into an owned RGBA buffer.
    pub fn to_rgba8(&self) -> Option<RgbaImage> {
        self.get_image().map(|img| img.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.metadata.width
    }

    pub fn height(&self) -> u32 {
        self.metadata.height
    }
}

// ============================================================================
// Color Implementation
// ============================================================================

impl Color {
    /// Create a new color from RGBA components.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create a color from RGB components (alpha = 255).
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a hex color string.
    ///
    /// Supports formats: "#RRGGBB", "#RRGGBBAA"
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| e.to_string())
        };

        match hex.len() {
            6 => Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, channel(6..8)?)),
            n => Err(format!(
                "Invalid hex color format: expected 6 or 8 characters, got {}",
                n
            )),
        }
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// Convert to image crate's Rgba type.
    pub fn to_rgba(&self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    /// Classic sepia brown.
    pub const SEPIA: Color = Color::rgb(112, 66, 20);
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_type_compatibility_is_equality() {
        assert!(PortType::Image.compatible_with(&PortType::Image));
        assert!(!PortType::Number.compatible_with(&PortType::Image));
        assert!(!PortType::Color.compatible_with(&PortType::Number));
    }

    #[test]
    fn test_value_port_type() {
        assert_eq!(Value::Number(5.0).port_type(), PortType::Number);
        assert_eq!(Value::Color(Color::WHITE).port_type(), PortType::Color);
        assert!(PortType::Number.matches(&Value::Number(1.0)));
        assert!(!PortType::Image.matches(&Value::Number(1.0)));
    }

    #[test]
    fn test_image_identity_follows_revision() {
        let a = ImageValue::from_rgba(RgbaImage::new(2, 2));
        let b = ImageValue::from_rgba(RgbaImage::new(2, 2));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.width(), 2);
        assert!(a.get_image().is_some());
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::from_hex("#704214").unwrap(), Color::SEPIA);
        assert_eq!(Color::new(0, 255, 0, 128).to_hex(), "#00FF0080");
        assert!(Color::from_hex("#12").is_err());
    }

    #[test]
    fn test_param_kinds() {
        assert!(ParamValue::Number(1.0).same_kind(&ParamValue::Integer(2)));
        assert!(!ParamValue::Text("a".into()).same_kind(&ParamValue::Boolean(true)));
        assert_eq!(ParamValue::Integer(3).as_number(), Some(3.0));
    }

    #[test]
    fn test_parameters_fingerprint_differs_by_value() {
        use std::collections::hash_map::DefaultHasher;

        let hash = |p: &Parameters| {
            let mut h = DefaultHasher::new();
            p.fingerprint(&mut h);
            h.finish()
        };
        let a = Parameters::new().with("amount", 1.0);
        let b = Parameters::new().with("amount", 2.0);
        assert_ne!(hash(&a), hash(&b));
        assert_eq!(hash(&a), hash(&a.clone()));
    }
}
