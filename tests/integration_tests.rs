
use std::time::Duration;

use flux_gen::*;
use tempfile::tempdir;
use test_helpers::{pending, ready, transient, ScriptedApi, ScriptedRewriter};
use tokio::time::Instant;

const SAMPLE_URL: &str = "https://delivery.example/results/abc/sample.jpeg";

fn config(cache_root: &std::path::Path) -> FluxConfig {
    FluxConfig::builder()
        .with_api_key("test-key")
        .with_cache_root(cache_root)
        .with_poll_interval(Duration::from_secs(1))
        .with_timeout(Duration::from_secs(60))
        .build()
}

fn policy(interval_ms: u64, timeout_ms: u64) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(interval_ms),
        timeout: Duration::from_millis(timeout_ms),
    }
}

fn request() -> GenerationRequest {
    ResolveParams::default().resolve("a cat").unwrap()
}

// ── Job client ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_two_pending_then_ready() {
    let api = ScriptedApi::new(vec![pending(), pending(), ready(SAMPLE_URL)]);
    let start = Instant::now();

    let job = submit_and_await(&api, &request(), policy(1000, 60_000), |_| {})
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Ready);
    assert_eq!(job.result_url.as_deref(), Some(SAMPLE_URL));
    assert_eq!(api.poll_count(), 3);

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2050), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_never_ready_times_out_on_schedule() {
    let api = ScriptedApi::new(vec![]);
    let start = Instant::now();

    let err = submit_and_await(&api, &request(), policy(1000, 5000), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Timeout { timeout } if timeout == Duration::from_secs(5)));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5), "timed out early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(6), "timed out late: {:?}", elapsed);
    // 0s, 1s, 2s, 3s, 4s, 5s
    assert_eq!(api.poll_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_poll_cadence_is_fixed() {
    let api = ScriptedApi::new(vec![pending(), pending(), pending(), ready(SAMPLE_URL)]);
    submit_and_await(&api, &request(), policy(750, 60_000), |_| {})
        .await
        .unwrap();

    let times = api.poll_times.lock().unwrap();
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(750), "{:?}", gap);
        assert!(gap < Duration::from_millis(800), "{:?}", gap);
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_poll_failures_are_retried() {
    let api = ScriptedApi::new(vec![transient(), transient(), ready(SAMPLE_URL)]);
    let start = Instant::now();

    let job = submit_and_await(&api, &request(), policy(1000, 60_000), |_| {})
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Ready);
    assert_eq!(api.poll_count(), 3);
    assert!(start.elapsed() < Duration::from_millis(2050));
}

#[tokio::test(start_paused = true)]
async fn test_poll_failures_until_deadline_time_out() {
    let api = ScriptedApi::new((0..100).map(|_| transient()).collect());
    let err = submit_and_await(&api, &request(), policy(1000, 3000), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Timeout { .. }));
    assert_eq!(api.poll_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_is_terminal() {
    let api = ScriptedApi::failing_submit(ApiError::Http {
        status: 401,
        body: "invalid key".into(),
    });
    let err = submit_and_await(&api, &request(), policy(1000, 60_000), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::SubmissionFailed(ApiError::Http { status: 401, .. })));
    assert_eq!(api.poll_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_moderated_job_is_remote_error() {
    let api = ScriptedApi::new(vec![
        pending(),
        Ok(PollStatus::Failed {
            status: "Content Moderated".into(),
            detail: None,
        }),
        ready(SAMPLE_URL),
    ]);
    let mut updates = Vec::new();
    let err = submit_and_await(&api, &request(), policy(1000, 60_000), |u| updates.push(u))
        .await
        .unwrap_err();

    match err {
        JobError::RemoteError { detail } => assert_eq!(detail, "Content Moderated"),
        other => panic!("unexpected {:?}", other),
    }
    // The trailing Ready is never consumed: terminal states are final.
    assert_eq!(api.poll_count(), 2);
    assert_eq!(updates.last().unwrap().description, "Inadmissible content");
    assert!(updates.last().unwrap().done);
}

// ── Pipeline ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_end_to_end_ultra_fox() {
    let root = tempdir().unwrap();
    let config = FluxConfig::builder()
        .with_api_key("test-key")
        .with_model("flux-pro-1.1-ultra", None, None, Some("16:9".into()))
        .with_raw(false)
        .with_safety_tolerance(2)
        .with_output_format("jpeg")
        .with_cache_root(root.path())
        .build();
    let image_bytes = b"\xFF\xD8\xFF\xE0red-fox".to_vec();
    let api = ScriptedApi::new(vec![pending(), ready(SAMPLE_URL)]).with_image(image_bytes.clone());
    let pipeline = FluxPipeline::with_api(api, config);

    let mut updates = Vec::new();
    let generation = pipeline
        .generate_with_status("a red fox in snow", |u| updates.push(u.status))
        .await
        .unwrap();
    let image = &generation.image;

    let submitted = pipeline.api().submitted.lock().unwrap();
    let payload = &submitted[0];
    assert_eq!(payload["prompt"], "a red fox in snow");
    assert_eq!(payload["aspect_ratio"], "16:9");
    assert_eq!(payload["raw"], false);
    assert_eq!(payload["safety_tolerance"], 2);
    assert_eq!(payload["output_format"], "jpeg");
    assert!(payload.get("width").is_none());

    assert_eq!(pipeline.api().poll_count(), 2);
    assert_eq!(
        updates,
        ["Submitting", "Submitted", "Pending", "Ready", "Saving", "Complete"]
    );
    assert_eq!(*pipeline.api().downloads.lock().unwrap(), [SAMPLE_URL]);

    assert!(image.local_path.starts_with(root.path().join("image/generations")));
    assert_eq!(image.local_path.extension().unwrap(), "jpeg");
    assert_eq!(image.source_url, SAMPLE_URL);
    assert_eq!(std::fs::read(&image.local_path).unwrap(), image_bytes);
}

#[tokio::test(start_paused = true)]
async fn test_png_output_extension() {
    let root = tempdir().unwrap();
    let config = FluxConfig::builder()
        .with_api_key("test-key")
        .with_preset("flux-pro-1.1: 896x1440")
        .with_output_format("png")
        .with_cache_root(root.path())
        .build();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config);

    let generation = pipeline.generate("a lighthouse").await.unwrap();
    assert_eq!(generation.image.local_path.extension().unwrap(), "png");
    assert_eq!(generation.optimized_prompt, None);
    let submitted = pipeline.api().submitted.lock().unwrap();
    assert_eq!(submitted[0]["width"], 896);
    assert_eq!(submitted[0]["height"], 1440);
}

#[tokio::test]
async fn test_concurrent_invocations_do_not_collide() {
    let root = tempdir().unwrap();
    let a = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config(root.path()));
    let b = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config(root.path()));

    let (img_a, img_b) = tokio::join!(a.generate("first"), b.generate("second"));
    let (img_a, img_b) = (img_a.unwrap().image, img_b.unwrap().image);

    assert_ne!(img_a.local_path, img_b.local_path);
    assert!(img_a.local_path.exists());
    assert!(img_b.local_path.exists());
    assert_eq!(std::fs::read_dir(a.cache().dir()).unwrap().count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_validation_aborts_before_network() {
    let root = tempdir().unwrap();
    let config = FluxConfig::builder()
        .with_api_key("test-key")
        .with_preset("flux-dev: 1440x896")
        .with_raw(true)
        .with_cache_root(root.path())
        .build();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config);

    let err = pipeline.generate("a cat").await.unwrap_err();
    match err {
        FluxError::Validation(v) => assert_eq!(v.kind, ValidationErrorKind::RawUnsupported),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(pipeline.api().submit_count(), 0);
    assert_eq!(pipeline.api().poll_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_api_key() {
    let root = tempdir().unwrap();
    let config = FluxConfig::builder().with_cache_root(root.path()).build();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![]), config);

    let err = pipeline.generate("a cat").await.unwrap_err();
    assert!(matches!(
        err,
        FluxError::Validation(ValidationError {
            kind: ValidationErrorKind::MissingApiKey,
            ..
        })
    ));
    assert_eq!(pipeline.api().submit_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_download_failure_leaves_cache_empty() {
    let root = tempdir().unwrap();
    let api = ScriptedApi::new(vec![ready(SAMPLE_URL)]).with_failing_download();
    let pipeline = FluxPipeline::with_api(api, config(root.path()));

    let err = pipeline.generate("a cat").await.unwrap_err();
    assert!(matches!(err, FluxError::Job(JobError::DownloadFailed(_))));
    assert!(!pipeline.cache().dir().exists());
}

#[tokio::test]
async fn test_reply_success_markdown() {
    let root = tempdir().unwrap();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config(root.path()));

    let reply = pipeline.reply("a red fox in snow").await;
    assert!(reply.starts_with("**Prompt:** a red fox in snow\n\n![BFL Image](/cache/image/generations/"));
    assert!(reply.ends_with(".jpeg)"));
}

#[tokio::test(start_paused = true)]
async fn test_reply_failure_message() {
    let root = tempdir().unwrap();
    let config = FluxConfig::builder()
        .with_api_key("test-key")
        .with_cache_root(root.path())
        .with_poll_interval(Duration::from_secs(1))
        .with_timeout(Duration::from_secs(3))
        .build();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![]), config);

    let reply = pipeline.reply("a cat").await;
    assert_eq!(
        reply,
        "Error: Image generation timed out after 3s\n\nOriginal prompt: a cat"
    );
    assert!(!reply.contains("!["));
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_timeout_from_env() {
    let root = tempdir().unwrap();
    let config = FluxConfig::from_vars([
        ("BFL_API_KEY".to_string(), "k".to_string()),
        ("BFL_TIMEOUT_SECS".to_string(), u64::MAX.to_string()),
        ("BFL_CACHE_DIR".to_string(), root.path().display().to_string()),
    ])
    .unwrap();
    let api = ScriptedApi::new(vec![pending(), pending(), ready(SAMPLE_URL)]);
    let pipeline = FluxPipeline::with_api(api, config);

    let generation = pipeline.generate("a cat").await.unwrap();
    assert!(generation.image.local_path.exists());
    assert_eq!(pipeline.api().poll_count(), 3);
}

// ── Status updates ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_status_sequence_on_success() {
    let root = tempdir().unwrap();
    let api = ScriptedApi::new(vec![pending(), Ok(PollStatus::Processing), ready(SAMPLE_URL)]);
    let pipeline = FluxPipeline::with_api(api, config(root.path()));

    let mut updates = Vec::new();
    pipeline
        .generate_with_status("a cat", |u| updates.push(u))
        .await
        .unwrap();

    let descriptions: Vec<_> = updates.iter().map(|u| u.description.as_str()).collect();
    assert_eq!(
        descriptions,
        [
            "Sending a request to Flux...",
            "Waiting for generation to start...",
            "Standing by...",
            "Generating...",
            "Ready",
            "Saving result...",
            "Image generated",
        ]
    );
    let done: Vec<_> = updates.iter().map(|u| u.done).collect();
    assert_eq!(done, [false, false, false, false, false, false, true]);
}

#[tokio::test(start_paused = true)]
async fn test_status_sequence_on_download_failure() {
    let root = tempdir().unwrap();
    let api = ScriptedApi::new(vec![ready(SAMPLE_URL)]).with_failing_download();
    let pipeline = FluxPipeline::with_api(api, config(root.path()));

    let mut updates = Vec::new();
    let err = pipeline
        .generate_with_status("a cat", |u| updates.push(u))
        .await
        .unwrap_err();
    assert!(matches!(err, FluxError::Job(JobError::DownloadFailed(_))));

    let statuses: Vec<_> = updates.iter().map(|u| u.status.as_str()).collect();
    assert_eq!(
        statuses,
        ["Submitting", "Submitted", "Ready", "Saving", "Failed"]
    );
    let last = updates.last().unwrap();
    assert!(last.done);
    assert_eq!(last.description, err.to_string());
    assert_eq!(updates.iter().filter(|u| u.done).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_moderated_pipeline_reports_done_once() {
    let root = tempdir().unwrap();
    let api = ScriptedApi::new(vec![Ok(PollStatus::Failed {
        status: "Content Moderated".into(),
        detail: None,
    })]);
    let pipeline = FluxPipeline::with_api(api, config(root.path()));

    let mut updates = Vec::new();
    pipeline
        .generate_with_status("a cat", |u| updates.push(u))
        .await
        .unwrap_err();

    assert_eq!(updates.iter().filter(|u| u.done).count(), 1);
    assert_eq!(updates.last().unwrap().status, "Failed");
}

#[tokio::test(start_paused = true)]
async fn test_validation_failure_reports_done() {
    let root = tempdir().unwrap();
    let config = FluxConfig::builder().with_cache_root(root.path()).build();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![]), config);

    let mut updates = Vec::new();
    pipeline
        .generate_with_status("a cat", |u| updates.push(u))
        .await
        .unwrap_err();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, "Failed");
    assert!(updates[0].done);
}

// ── Prompt rewriting ────────────────────────────────────────────────

const OPTIMIZED: &str = "Photo of a red fox in deep snow, Nikon D850 with Nikkor 50mm f-1.8";

#[tokio::test(start_paused = true)]
async fn test_rewritten_prompt_is_submitted() {
    let root = tempdir().unwrap();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config(root.path()))
        .with_rewriter(ScriptedRewriter::new(OPTIMIZED));

    let mut updates = Vec::new();
    let generation = pipeline
        .generate_with_status("  лиса в снегу ", |u| updates.push(u))
        .await
        .unwrap();

    let submitted = pipeline.api().submitted.lock().unwrap();
    assert_eq!(submitted[0]["prompt"], OPTIMIZED);
    assert_eq!(generation.prompt, "лиса в снегу");
    assert_eq!(*pipeline.rewriter().unwrap().seen.lock().unwrap(), ["лиса в снегу"]);
    assert_eq!(generation.optimized_prompt.as_deref(), Some(OPTIMIZED));

    assert_eq!(updates[0].status, "Translating");
    assert_eq!(updates[1].description, format!("Optimized prompt: {}", OPTIMIZED));
    assert_eq!(updates[2].status, "Submitting");
}

#[tokio::test(start_paused = true)]
async fn test_reply_shows_both_prompts() {
    let root = tempdir().unwrap();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config(root.path()))
        .with_rewriter(ScriptedRewriter::new(OPTIMIZED));

    let reply = pipeline.reply("a red fox in snow").await;
    let expected = format!(
        "**Original prompt:** a red fox in snow\n\n**Optimized prompt:** {}\n\n![BFL Image](/cache/image/generations/",
        OPTIMIZED
    );
    assert!(reply.starts_with(&expected), "{}", reply);
}

#[tokio::test(start_paused = true)]
async fn test_rewrite_failure_aborts_before_submission() {
    let root = tempdir().unwrap();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![ready(SAMPLE_URL)]), config(root.path()))
        .with_rewriter(ScriptedRewriter::failing());

    let err = pipeline.generate("a cat").await.unwrap_err();
    assert!(matches!(err, FluxError::Job(JobError::RewriteFailed(ApiError::Http { status: 429, .. }))));
    assert!(err.to_string().starts_with("Translation error"));
    assert_eq!(pipeline.api().submit_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_params_skip_rewriter() {
    let root = tempdir().unwrap();
    let config = FluxConfig::builder()
        .with_api_key("test-key")
        .with_output_format("gif")
        .with_cache_root(root.path())
        .build();
    let pipeline = FluxPipeline::with_api(ScriptedApi::new(vec![]), config)
        .with_rewriter(ScriptedRewriter::new(OPTIMIZED));

    let err = pipeline.generate("a cat").await.unwrap_err();
    assert!(matches!(err, FluxError::Validation(_)));
    assert!(pipeline.rewriter().unwrap().seen.lock().unwrap().is_empty());
    assert_eq!(pipeline.api().submit_count(), 0);
}

// ── Materializer ────────────────────────────────────────────────────

#[tokio::test]
async fn test_materialize_round_trip() {
    let root = tempdir().unwrap();
    let cache = ImageCache::new(root.path());
    let bytes: Vec<u8> = (0u32..50_000).map(|i| (i * 31 % 251) as u8).collect();
    let api = ScriptedApi::new(vec![]).with_image(bytes.clone());

    let image = materialize(&api, &cache, SAMPLE_URL, OutputFormat::Jpeg)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&image.local_path).unwrap(), bytes);
}

#[tokio::test]
async fn test_many_writes_unique_names() {
    let root = tempdir().unwrap();
    let cache = ImageCache::new(root.path());
    let mut paths = std::collections::HashSet::new();
    for i in 0..50u8 {
        let image = cache
            .persist(SAMPLE_URL, vec![i], OutputFormat::Png)
            .await
            .unwrap();
        assert!(paths.insert(image.local_path));
    }
    assert_eq!(std::fs::read_dir(cache.dir()).unwrap().count(), 50);
}
