use crate::client::{FluxApi, FluxClient};
use crate::config::FluxConfig;
use crate::error::{FluxError, JobError, Result, ValidationError, ValidationErrorKind};
use crate::job::{submit_and_await, PollPolicy};
use crate::materialize::{materialize, ImageCache};
use crate::request::GenerationRequest;
use crate::rewrite::{ChatRewriter, PromptRewriter};
use crate::types::{stage, Generation, StatusUpdate};

/// Prompt in, local image out: resolve, rewrite, submit, poll, download, persist.
///
/// One call handles one job, start to finish. Nothing is shared between
/// calls except the immutable config and the HTTP connection pools.
#[derive(Debug, Clone)]
pub struct FluxPipeline<A = FluxClient, R = ChatRewriter> {
    api: A,
    rewriter: Option<R>,
    config: FluxConfig,
    cache: ImageCache,
}

impl FluxPipeline<FluxClient> {
    /// Build a pipeline talking to the real API described by `config`.
    pub fn new(config: FluxConfig) -> Self {
        let api = FluxClient::new(config.base_url.clone(), config.api_key.clone());
        Self::with_api(api, config)
    }
}

impl<A: FluxApi> FluxPipeline<A> {
    /// Build a pipeline over any [`FluxApi`] implementation. Prompts are
    /// rewritten through [`ChatRewriter`] when `config.rewrite` is set.
    pub fn with_api(api: A, config: FluxConfig) -> Self {
        let cache = ImageCache::new(&config.cache_root);
        let rewriter = config.rewrite.clone().map(ChatRewriter::new);
        Self {
            api,
            rewriter,
            config,
            cache,
        }
    }
}

impl<A: FluxApi, R: PromptRewriter> FluxPipeline<A, R> {
    /// Replace the prompt rewriter.
    pub fn with_rewriter<R2: PromptRewriter>(self, rewriter: R2) -> FluxPipeline<A, R2> {
        FluxPipeline {
            api: self.api,
            rewriter: Some(rewriter),
            config: self.config,
            cache: self.cache,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn rewriter(&self) -> Option<&R> {
        self.rewriter.as_ref()
    }

    pub fn config(&self) -> &FluxConfig {
        &self.config
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Check the API keys and resolve `prompt` into a request. No I/O.
    pub fn prepare(&self, prompt: &str) -> std::result::Result<GenerationRequest, ValidationError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationErrorKind::MissingApiKey,
                "BFL API key not set",
            ));
        }
        if let Some(rewrite) = &self.config.rewrite {
            if rewrite.api_key.trim().is_empty() {
                return Err(ValidationError::new(
                    ValidationErrorKind::MissingApiKey,
                    "OpenAI API key not set",
                ));
            }
        }
        self.config.params.resolve(prompt)
    }

    /// Generate an image for `prompt` and persist it to the cache.
    pub async fn generate(&self, prompt: &str) -> Result<Generation> {
        self.generate_with_status(prompt, |_| {}).await
    }

    /// Like [`generate`](Self::generate), reporting progress to `on_status`.
    ///
    /// Exactly one update has `done` set, and it is always the last one:
    /// `Complete` once the image is on disk, or `Failed` with the error.
    pub async fn generate_with_status<F>(&self, prompt: &str, mut on_status: F) -> Result<Generation>
    where
        F: FnMut(StatusUpdate),
    {
        let outcome = self.run(prompt, &mut on_status).await;
        match &outcome {
            Ok(generation) => {
                tracing::info!(path = %generation.image.local_path.display(), "image generated");
                on_status(StatusUpdate::new(None, stage::COMPLETE, "Image generated", true));
            }
            Err(e) => on_status(StatusUpdate::new(None, stage::FAILED, e.to_string(), true)),
        }
        outcome
    }

    async fn run<F>(&self, prompt: &str, on_status: &mut F) -> Result<Generation>
    where
        F: FnMut(StatusUpdate),
    {
        let mut request = self.prepare(prompt)?;
        let original = request.prompt.clone();

        let optimized = match &self.rewriter {
            Some(rewriter) => {
                on_status(StatusUpdate::new(
                    None,
                    stage::TRANSLATING,
                    "Normalization and translation of prompt...",
                    false,
                ));
                let rewritten = rewriter
                    .rewrite(&original)
                    .await
                    .map_err(JobError::RewriteFailed)?;
                on_status(StatusUpdate::new(
                    None,
                    stage::TRANSLATED,
                    format!("Optimized prompt: {}", rewritten),
                    false,
                ));
                request.prompt = rewritten.clone();
                Some(rewritten)
            }
            None => None,
        };

        let policy = PollPolicy {
            interval: self.config.poll_interval,
            timeout: self.config.timeout,
        };
        // The pipeline owns the terminal update.
        let job = submit_and_await(&self.api, &request, policy, |u| {
            on_status(StatusUpdate { done: false, ..u })
        })
        .await?;
        let Some(url) = job.result_url.as_deref() else {
            return Err(JobError::RemoteError {
                detail: format!("Job {} is ready but has no result URL", job.id),
            }
            .into());
        };

        on_status(StatusUpdate::new(
            Some(&job.id),
            stage::SAVING,
            "Saving result...",
            false,
        ));
        let image = materialize(&self.api, &self.cache, url, request.output_format).await?;

        Ok(Generation {
            prompt: original,
            optimized_prompt: optimized,
            image,
        })
    }

    /// Run the pipeline and render the outcome as a chat message.
    ///
    /// Success yields markdown embedding the cached image; any failure yields
    /// a single error line followed by the original prompt.
    pub async fn reply(&self, prompt: &str) -> String {
        match self.generate(prompt).await {
            Ok(generation) => render_success(&generation),
            Err(e) => {
                tracing::error!(error = %e, "image generation failed");
                render_failure(prompt, &e)
            }
        }
    }
}

/// Markdown reply embedding the cached image, and the rewritten prompt when
/// there is one.
pub fn render_success(generation: &Generation) -> String {
    let image = generation.image.reference();
    match &generation.optimized_prompt {
        Some(optimized) => format!(
            "**Original prompt:** {}\n\n**Optimized prompt:** {}\n\n![BFL Image]({})",
            generation.prompt, optimized, image
        ),
        None => format!("**Prompt:** {}\n\n![BFL Image]({})", generation.prompt, image),
    }
}

/// Single-message failure reply shown in place of an image.
pub fn render_failure(prompt: &str, err: &FluxError) -> String {
    format!("Error: {}\n\nOriginal prompt: {}", err, prompt.trim())
}
