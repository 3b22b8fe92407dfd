use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Which validation rule rejected the caller's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Model identifier (or dimension preset) is not one we know.
    UnknownModel,
    /// `raw` was requested for a model other than `flux-pro-1.1-ultra`.
    RawUnsupported,
    /// Width or height outside the model's bounds.
    DimensionOutOfRange,
    /// Aspect ratio outside the set the ultra model accepts.
    InvalidAspectRatio,
    /// Safety tolerance, output format, prompt, or a missing sizing field.
    InvalidParameter,
    /// No API key configured.
    MissingApiKey,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::UnknownModel => "unknown model",
            ValidationErrorKind::RawUnsupported => "raw unsupported",
            ValidationErrorKind::DimensionOutOfRange => "dimension out of range",
            ValidationErrorKind::InvalidAspectRatio => "invalid aspect ratio",
            ValidationErrorKind::InvalidParameter => "invalid parameter",
            ValidationErrorKind::MissingApiKey => "missing API key",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller input was malformed. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation error ({kind}): {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Transport-level failure talking to the FLUX API or the image host.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response was missing expected fields or had the wrong shape.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },
}

/// Operational failure somewhere between submission and the file on disk.
#[derive(Error, Debug)]
pub enum JobError {
    /// The job could not be submitted; nothing is running remotely.
    #[error("Request failed: {0}")]
    SubmissionFailed(#[source] ApiError),

    /// FLUX reported the job as failed (including moderation).
    #[error("Image generation failed: {detail}")]
    RemoteError { detail: String },

    /// The job did not reach a terminal state in time. It is abandoned, not cancelled.
    #[error("Image generation timed out after {}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    /// The finished image could not be fetched.
    #[error("Error downloading image: {0}")]
    DownloadFailed(#[source] ApiError),

    /// The prompt rewriter could not produce an optimized prompt.
    #[error("Translation error: {0}")]
    RewriteFailed(#[source] ApiError),

    /// The fetched image could not be written to the cache.
    #[error("Error saving image to {}: {source}", .path.display())]
    PersistFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Top-level error for the generation pipeline.
#[derive(Error, Debug)]
pub enum FluxError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Job(#[from] JobError),

    /// Environment configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] envy::Error),
}

/// Convenience alias.
pub type Result<T, E = FluxError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_kind() {
        let err = ValidationError::new(
            ValidationErrorKind::RawUnsupported,
            "RAW option is only allowed when flux-pro-1.1-ultra is selected",
        );
        assert_eq!(
            err.to_string(),
            "Validation error (raw unsupported): RAW option is only allowed when flux-pro-1.1-ultra is selected"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = JobError::Timeout {
            timeout: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "Image generation timed out after 60s");
    }

    #[test]
    fn test_flux_error_is_transparent() {
        let err: FluxError = JobError::RemoteError {
            detail: "Content Moderated".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Image generation failed: Content Moderated");
    }
}
