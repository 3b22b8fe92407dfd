use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ValidationError, ValidationErrorKind};

/// Aspect ratios accepted by `flux-pro-1.1-ultra` (21:9 through 9:21).
pub const ULTRA_ASPECT_RATIOS: &[&str] = &[
    "21:9", "16:9", "3:2", "4:3", "5:4", "1:1", "4:5", "3:4", "2:3", "9:16", "9:21",
];

/// How a model wants its output size expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    Dimensions,
    AspectRatio,
}

/// FLUX model, which is also the endpoint path a job is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluxModel {
    Dev,
    Pro11,
    Pro11Ultra,
}

impl FluxModel {
    pub const ALL: [FluxModel; 3] = [FluxModel::Dev, FluxModel::Pro11, FluxModel::Pro11Ultra];

    pub fn as_str(&self) -> &'static str {
        match self {
            FluxModel::Dev => "flux-dev",
            FluxModel::Pro11 => "flux-pro-1.1",
            FluxModel::Pro11Ultra => "flux-pro-1.1-ultra",
        }
    }

    /// Inclusive `(min, max)` pixel bounds for width and height.
    pub fn dimension_bounds(&self) -> (u32, u32) {
        match self {
            FluxModel::Dev | FluxModel::Pro11 => (256, 1440),
            FluxModel::Pro11Ultra => (256, 2752),
        }
    }

    pub fn sizing_mode(&self) -> SizingMode {
        match self {
            FluxModel::Pro11Ultra => SizingMode::AspectRatio,
            _ => SizingMode::Dimensions,
        }
    }

    pub fn supports_raw(&self) -> bool {
        matches!(self, FluxModel::Pro11Ultra)
    }
}

impl fmt::Display for FluxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FluxModel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FluxModel::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| {
                ValidationError::new(
                    ValidationErrorKind::UnknownModel,
                    format!(
                        "Unknown model '{}'. Expected one of: flux-dev, flux-pro-1.1, flux-pro-1.1-ultra",
                        s
                    ),
                )
            })
    }
}

/// Image encoding requested from FLUX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        }
    }

    /// File extension for persisted images, without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            _ => Err(ValidationError::new(
                ValidationErrorKind::InvalidParameter,
                format!("Output format must be 'jpeg' or 'png', got '{}'", s),
            )),
        }
    }
}

/// Output size as the model expects it. Exactly one form per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sizing {
    Dimensions { width: u32, height: u32 },
    AspectRatio(String),
}

/// Reduce a width/height pair to its lowest-terms `W:H` ratio string.
pub fn reduce_ratio(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }
    let d = gcd(width, height).max(1);
    format!("{}:{}", width / d, height / d)
}
