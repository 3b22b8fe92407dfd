use serde_json::{json, Value};

use crate::error::{ValidationError, ValidationErrorKind};
use crate::model::{reduce_ratio, FluxModel, OutputFormat, Sizing, SizingMode, ULTRA_ASPECT_RATIOS};
use crate::presets::{find_preset, DEFAULT_PRESET};

/// How the caller picked the model and output size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One of the names in [`crate::presets::DIMENSION_PRESETS`].
    Preset(String),
    /// Model plus discrete sizing fields.
    Explicit {
        model: String,
        width: Option<u32>,
        height: Option<u32>,
        aspect_ratio: Option<String>,
    },
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Preset(DEFAULT_PRESET.to_string())
    }
}

/// Unvalidated generation parameters, as they arrive from the host.
///
/// # Example
/// ```
/// use flux_gen::ResolveParams;
///
/// let request = ResolveParams::preset("flux-pro-1.1-ultra: 16:9")
///     .raw(true)
///     .safety_tolerance(2)
///     .output_format("png")
///     .resolve("a red fox in snow")
///     .unwrap();
///
/// assert_eq!(request.payload()["aspect_ratio"], "16:9");
/// assert_eq!(request.payload()["raw"], true);
/// ```
#[derive(Debug, Clone)]
pub struct ResolveParams {
    pub selection: Selection,
    pub raw: bool,
    pub safety_tolerance: i64,
    pub output_format: String,
}

impl Default for ResolveParams {
    fn default() -> Self {
        Self {
            selection: Selection::default(),
            raw: false,
            safety_tolerance: 2,
            output_format: OutputFormat::Jpeg.as_str().to_string(),
        }
    }
}

impl ResolveParams {
    /// Start from a named dimension preset.
    pub fn preset(name: impl Into<String>) -> Self {
        Self {
            selection: Selection::Preset(name.into()),
            ..Self::default()
        }
    }

    /// Start from a model identifier with no sizing set yet.
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            selection: Selection::Explicit {
                model: model.into(),
                width: None,
                height: None,
                aspect_ratio: None,
            },
            ..Self::default()
        }
    }

    /// Set width and height. Ignored for preset selections.
    pub fn size(mut self, w: u32, h: u32) -> Self {
        if let Selection::Explicit { width, height, .. } = &mut self.selection {
            *width = Some(w);
            *height = Some(h);
        }
        self
    }

    /// Set the aspect ratio (e.g. "16:9"). Ignored for preset selections.
    pub fn aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        if let Selection::Explicit { aspect_ratio, .. } = &mut self.selection {
            *aspect_ratio = Some(ratio.into());
        }
        self
    }

    /// Request less processed, more natural-looking output (ultra only).
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Moderation tolerance, 0 (strictest) to 6 (least strict).
    pub fn safety_tolerance(mut self, tolerance: i64) -> Self {
        self.safety_tolerance = tolerance;
        self
    }

    /// Output format, "jpeg" or "png".
    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    /// Validate and build the request. See [`resolve`].
    pub fn resolve(&self, prompt: &str) -> Result<GenerationRequest, ValidationError> {
        resolve(prompt, self)
    }
}

/// A validated, model-specific generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: FluxModel,
    pub prompt: String,
    pub sizing: Sizing,
    pub raw: bool,
    pub safety_tolerance: u8,
    pub output_format: OutputFormat,
}

impl GenerationRequest {
    /// JSON body for `POST {base_url}/{model}`.
    ///
    /// Ultra requests carry `aspect_ratio` and `raw`; the others carry
    /// `width` and `height`.
    pub fn payload(&self) -> Value {
        let mut body = json!({
            "prompt": self.prompt,
            "safety_tolerance": self.safety_tolerance,
            "output_format": self.output_format.as_str(),
        });
        match &self.sizing {
            Sizing::Dimensions { width, height } => {
                body["width"] = json!(width);
                body["height"] = json!(height);
            }
            Sizing::AspectRatio(ratio) => {
                body["aspect_ratio"] = json!(ratio);
            }
        }
        if self.model.supports_raw() {
            body["raw"] = json!(self.raw);
        }
        body
    }
}

fn invalid(kind: ValidationErrorKind, message: impl Into<String>) -> ValidationError {
    ValidationError::new(kind, message)
}

fn check_bounds(model: FluxModel, width: u32, height: u32) -> Result<(), ValidationError> {
    let (min, max) = model.dimension_bounds();
    for (label, value) in [("width", width), ("height", height)] {
        if value < min || value > max {
            return Err(invalid(
                ValidationErrorKind::DimensionOutOfRange,
                format!(
                    "{} {} is outside {}..={} supported by {}",
                    label, value, min, max, model
                ),
            ));
        }
    }
    Ok(())
}

fn check_aspect_ratio(ratio: &str) -> Result<String, ValidationError> {
    let ratio = ratio.trim();
    if ULTRA_ASPECT_RATIOS.contains(&ratio) {
        Ok(ratio.to_string())
    } else {
        Err(invalid(
            ValidationErrorKind::InvalidAspectRatio,
            format!(
                "Aspect ratio '{}' is not supported. Expected one of: {}",
                ratio,
                ULTRA_ASPECT_RATIOS.join(", ")
            ),
        ))
    }
}

/// Map caller parameters to a [`GenerationRequest`].
///
/// Rules run in a fixed order and the first failure wins: unknown model,
/// raw on a non-ultra model, dimensions out of range, unsupported aspect
/// ratio, then safety tolerance / output format / prompt.
pub fn resolve(prompt: &str, params: &ResolveParams) -> Result<GenerationRequest, ValidationError> {
    let (model, width, height, aspect_ratio) = match &params.selection {
        Selection::Preset(name) => {
            let preset = find_preset(name).ok_or_else(|| {
                invalid(
                    ValidationErrorKind::UnknownModel,
                    format!("Unknown dimension preset '{}'", name),
                )
            })?;
            match preset.sizing() {
                Sizing::Dimensions { width, height } => {
                    (preset.model, Some(width), Some(height), None)
                }
                Sizing::AspectRatio(r) => (preset.model, None, None, Some(r)),
            }
        }
        Selection::Explicit {
            model,
            width,
            height,
            aspect_ratio,
        } => (model.parse::<FluxModel>()?, *width, *height, aspect_ratio.clone()),
    };

    if params.raw && !model.supports_raw() {
        return Err(invalid(
            ValidationErrorKind::RawUnsupported,
            "RAW option is only allowed when flux-pro-1.1-ultra is selected",
        ));
    }

    let sizing = match model.sizing_mode() {
        SizingMode::Dimensions => {
            let (Some(w), Some(h)) = (width, height) else {
                return Err(invalid(
                    ValidationErrorKind::InvalidParameter,
                    format!("{} requires both width and height", model),
                ));
            };
            check_bounds(model, w, h)?;
            if aspect_ratio.is_some() {
                tracing::debug!(%model, "ignoring aspect_ratio for a width/height model");
            }
            Sizing::Dimensions {
                width: w,
                height: h,
            }
        }
        SizingMode::AspectRatio => match (aspect_ratio, width, height) {
            (Some(r), _, _) => Sizing::AspectRatio(check_aspect_ratio(&r)?),
            (None, Some(w), Some(h)) => {
                check_bounds(model, w, h)?;
                Sizing::AspectRatio(check_aspect_ratio(&reduce_ratio(w, h))?)
            }
            _ => {
                return Err(invalid(
                    ValidationErrorKind::InvalidParameter,
                    format!("{} requires an aspect ratio", model),
                ))
            }
        },
    };

    let safety_tolerance = u8::try_from(params.safety_tolerance)
        .ok()
        .filter(|t| *t <= 6)
        .ok_or_else(|| {
            invalid(
                ValidationErrorKind::InvalidParameter,
                format!(
                    "Safety tolerance must be between 0 and 6, got {}",
                    params.safety_tolerance
                ),
            )
        })?;
    let output_format: OutputFormat = params.output_format.parse()?;

    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(invalid(
            ValidationErrorKind::InvalidParameter,
            "Prompt must not be empty",
        ));
    }

    Ok(GenerationRequest {
        model,
        prompt: prompt.to_string(),
        sizing,
        raw: params.raw,
        safety_tolerance,
        output_format,
    })
}
