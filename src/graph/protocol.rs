//! Protocols: named contracts over published ports
//!
//! A protocol names the published ports (direction, name, type) a
//! composition must expose to plug into a particular runtime role, such as
//! filtering an image stream. Activating a protocol on a composition adds or
//! renames the mandated ports; validation reports compliance.

use serde::{Deserialize, Serialize};

/// One port a protocol mandates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolPort {
    pub name: String,
    pub data_type: String,
}

impl ProtocolPort {
    fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }
}

/// A named contract specifying the published ports required for a runtime role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    name: String,
    inputs: Vec<ProtocolPort>,
    outputs: Vec<ProtocolPort>,
}

impl Protocol {
    pub fn new(name: impl Into<String>, inputs: Vec<ProtocolPort>, outputs: Vec<ProtocolPort>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mandated published inputs, in the order they must appear
    pub fn inputs(&self) -> &[ProtocolPort] {
        &self.inputs
    }

    /// Mandated published outputs, in the order they must appear
    pub fn outputs(&self) -> &[ProtocolPort] {
        &self.outputs
    }

    /// Receives a stream of images and produces a filtered stream
    pub fn image_filter() -> Self {
        Self::new(
            "ImageFilter",
            vec![
                ProtocolPort::new("time", "real"),
                ProtocolPort::new("image", "image"),
            ],
            vec![ProtocolPort::new("outputImage", "image")],
        )
    }

    /// Produces a stream of images from scratch
    pub fn image_generator() -> Self {
        Self::new(
            "ImageGenerator",
            vec![
                ProtocolPort::new("time", "real"),
                ProtocolPort::new("width", "integer"),
                ProtocolPort::new("height", "integer"),
            ],
            vec![ProtocolPort::new("outputImage", "image")],
        )
    }

    /// Blends two image streams over a progress curve
    pub fn image_transition() -> Self {
        Self::new(
            "ImageTransition",
            vec![
                ProtocolPort::new("time", "real"),
                ProtocolPort::new("startImage", "image"),
                ProtocolPort::new("endImage", "image"),
                ProtocolPort::new("progress", "real"),
            ],
            vec![ProtocolPort::new("outputImage", "image")],
        )
    }

    /// Look up a built-in protocol by name
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "ImageFilter" => Some(Self::image_filter()),
            "ImageGenerator" => Some(Self::image_generator()),
            "ImageTransition" => Some(Self::image_transition()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_filter_mandates_three_ports() {
        let p = Protocol::image_filter();
        assert_eq!(p.inputs().len(), 2);
        assert_eq!(p.outputs().len(), 1);
        assert_eq!(p.inputs()[0].name, "time");
        assert_eq!(p.outputs()[0].data_type, "image");
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(Protocol::builtin("ImageFilter").is_some());
        assert!(Protocol::builtin("ImageGenerator").is_some());
        assert!(Protocol::builtin("AudioFilter").is_none());
    }
}
