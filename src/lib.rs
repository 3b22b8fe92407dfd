//! # flux-gen
//!
//! Async Rust client for the [Black Forest Labs](https://docs.bfl.ml) FLUX
//! image-generation API, shaped for chat hosts.
//!
//! One call turns a prompt into an image on local disk:
//!
//! 1. **Resolve** a dimension preset (or explicit width/height/aspect ratio)
//!    and model into a validated [`GenerationRequest`]. Optionally have a chat
//!    model rewrite the prompt first (see [`rewrite`]).
//! 2. **Submit** the job and **poll** `get_result` at a fixed interval until it
//!    is Ready, fails, or hits the timeout.
//! 3. **Materialize** the result: download the image and write it under
//!    `<cache_root>/image/generations/`, so the chat keeps working after the
//!    upstream URL expires.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flux_gen::{FluxConfig, FluxPipeline};
//! use std::time::Duration;
//!
//! # async fn example() -> flux_gen::Result<()> {
//! let config = FluxConfig::builder()
//!     .with_api_key(std::env::var("BFL_API_KEY").unwrap_or_default())
//!     .with_preset("flux-pro-1.1-ultra: 16:9")
//!     .with_timeout(Duration::from_secs(90))
//!     .with_cache_root("/var/cache/webui")
//!     .build();
//!
//! let pipeline = FluxPipeline::new(config);
//! let generation = pipeline
//!     .generate_with_status("a red fox in snow", |s| println!("{}", s.description))
//!     .await?;
//! println!("saved to {}", generation.image.local_path.display());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod materialize;
pub mod model;
pub mod pipeline;
pub mod presets;
pub mod request;
pub mod rewrite;
pub mod types;

pub use client::{FluxApi, FluxClient};
pub use config::{FluxConfig, FluxConfigBuilder};
pub use error::{ApiError, FluxError, JobError, Result, ValidationError, ValidationErrorKind};
pub use job::{submit_and_await, PollPolicy, MIN_POLL_INTERVAL};
pub use materialize::{materialize, ImageCache};
pub use model::{FluxModel, OutputFormat, Sizing};
pub use pipeline::FluxPipeline;
pub use presets::{find_preset, DimensionOption, DIMENSION_PRESETS};
pub use request::{resolve, GenerationRequest, ResolveParams, Selection};
pub use rewrite::{ChatRewriter, PromptRewriter, RewriteConfig};
pub use types::{Generation, Job, JobStatus, PersistedImage, PollStatus, StatusUpdate};
