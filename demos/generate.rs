//! Generate one image from the command line and print the chat reply.
//!
//! Reads `BFL_API_KEY` (and the other `BFL_*` settings) from the environment
//! or a `.env` file. Set `OPENAI_API_KEY` to have the prompt rewritten first.
//!
//! ```sh
//! BFL_DIMENSION="flux-pro-1.1-ultra: 16:9" RUST_LOG=flux_gen=debug \
//!     cargo run --example generate -- "a red fox in snow"
//! ```

use flux_gen::{presets, FluxConfig, FluxPipeline};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flux_gen=info")),
        )
        .init();

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        eprintln!("usage: generate <prompt>");
        eprintln!("presets:");
        for name in presets::preset_names() {
            eprintln!("  {}", name);
        }
        return Ok(());
    }

    let config = FluxConfig::from_env()?;
    println!("Cache: {}", config.cache_root.display());

    let pipeline = FluxPipeline::new(config);
    let outcome = pipeline
        .generate_with_status(&prompt, |s| println!("[{}] {}", s.status, s.description))
        .await;

    match outcome {
        Ok(generation) => {
            let image = &generation.image;
            println!("Saved {} bytes to {}", image.bytes.len(), image.local_path.display());
            println!("{}", flux_gen::pipeline::render_success(&generation));
        }
        Err(e) => println!("{}", flux_gen::pipeline::render_failure(&prompt, &e)),
    }
    Ok(())
}
