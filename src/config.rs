use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::job::MIN_POLL_INTERVAL;
use crate::request::{ResolveParams, Selection};
use crate::rewrite::RewriteConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.bfl.ml/v1";

/// Everything one generation call needs. Immutable once built and passed by
/// reference, so concurrent calls never share mutable state.
///
/// Use [`FluxConfig::builder()`] for construction, or
/// [`FluxConfig::from_env()`] to read `BFL_*` environment variables.
#[derive(Debug, Clone)]
pub struct FluxConfig {
    /// Sent as the `x-key` header.
    pub api_key: String,

    /// API root, without a trailing slash.
    pub base_url: String,

    /// Model, sizing, raw flag, safety tolerance, and output format.
    pub params: ResolveParams,

    /// Delay between status polls.
    pub poll_interval: Duration,

    /// Hard ceiling on time spent polling after submission.
    pub timeout: Duration,

    /// Host cache root. Images go under `<cache_root>/image/generations/`.
    pub cache_root: PathBuf,

    /// Chat model that rewrites prompts before submission. Off when `None`.
    pub rewrite: Option<RewriteConfig>,
}

impl Default for FluxConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            params: ResolveParams::default(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
            cache_root: PathBuf::from("cache"),
            rewrite: None,
        }
    }
}

/// Shape of the `BFL_*` environment, as read by `envy`.
#[derive(Debug, Deserialize)]
struct EnvConfig {
    #[serde(default)]
    api_key: String,
    base_url: Option<String>,
    dimension: Option<String>,
    raw: Option<bool>,
    safety_tolerance: Option<i64>,
    output_format: Option<String>,
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    cache_dir: Option<PathBuf>,
}

/// Shape of the `OPENAI_*` environment used by the prompt rewriter.
#[derive(Debug, Deserialize)]
struct OpenAiEnv {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

impl FluxConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> FluxConfigBuilder {
        FluxConfigBuilder::default()
    }

    /// Load from `BFL_API_KEY`, `BFL_BASE_URL`, `BFL_DIMENSION`, `BFL_RAW`,
    /// `BFL_SAFETY_TOLERANCE`, `BFL_OUTPUT_FORMAT`, `BFL_POLL_INTERVAL_SECS`,
    /// `BFL_TIMEOUT_SECS` and `BFL_CACHE_DIR`. Unset values keep their defaults.
    ///
    /// Prompt rewriting is enabled when `OPENAI_API_KEY` is set, with
    /// `OPENAI_BASE_URL` and `OPENAI_MODEL` overriding the endpoint and model.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env), reading from the given pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let env: EnvConfig = envy::prefixed("BFL_").from_iter(vars.iter().cloned())?;
        let openai: OpenAiEnv = envy::prefixed("OPENAI_").from_iter(vars)?;
        let mut builder = FluxConfig::builder().with_api_key(env.api_key);

        if let Some(url) = env.base_url {
            builder = builder.with_base_url(url);
        }
        if let Some(dimension) = env.dimension {
            builder = builder.with_preset(dimension);
        }
        if let Some(raw) = env.raw {
            builder = builder.with_raw(raw);
        }
        if let Some(tolerance) = env.safety_tolerance {
            builder = builder.with_safety_tolerance(tolerance);
        }
        if let Some(format) = env.output_format {
            builder = builder.with_output_format(format);
        }
        if let Some(secs) = env.poll_interval_secs {
            builder = builder.with_poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = env.timeout_secs {
            builder = builder.with_timeout(Duration::from_secs(secs));
        }
        if let Some(dir) = env.cache_dir {
            builder = builder.with_cache_root(dir);
        }
        if let Some(key) = openai.api_key.filter(|k| !k.trim().is_empty()) {
            let mut rewrite = RewriteConfig::new(key);
            if let Some(url) = openai.base_url {
                rewrite = rewrite.with_base_url(url);
            }
            if let Some(model) = openai.model {
                rewrite = rewrite.with_model(model);
            }
            builder = builder.with_rewrite(rewrite);
        }
        Ok(builder.build())
    }
}

/// Builder for [`FluxConfig`].
#[derive(Default)]
pub struct FluxConfigBuilder {
    config: FluxConfig,
}

impl FluxConfigBuilder {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Select a named dimension preset, e.g. `"flux-pro-1.1-ultra: 16:9"`.
    pub fn with_preset(mut self, name: impl Into<String>) -> Self {
        self.config.params.selection = Selection::Preset(name.into());
        self
    }

    /// Select a model with explicit sizing instead of a preset.
    pub fn with_model(
        mut self,
        model: impl Into<String>,
        width: Option<u32>,
        height: Option<u32>,
        aspect_ratio: Option<String>,
    ) -> Self {
        self.config.params.selection = Selection::Explicit {
            model: model.into(),
            width,
            height,
            aspect_ratio,
        };
        self
    }

    pub fn with_raw(mut self, raw: bool) -> Self {
        self.config.params.raw = raw;
        self
    }

    pub fn with_safety_tolerance(mut self, tolerance: i64) -> Self {
        self.config.params.safety_tolerance = tolerance;
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.config.params.output_format = format.into();
        self
    }

    /// Delay between polls. Values below 100ms are raised to 100ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(?interval, min = ?MIN_POLL_INTERVAL, "poll interval too short, using minimum");
        }
        self.config.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache_root = root.into();
        self
    }

    /// Rewrite prompts through a chat model before submitting them.
    pub fn with_rewrite(mut self, rewrite: RewriteConfig) -> Self {
        self.config.rewrite = Some(rewrite);
        self
    }

    /// Build the final [`FluxConfig`].
    pub fn build(self) -> FluxConfig {
        self.config
    }
}
