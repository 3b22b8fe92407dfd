use std::future::Future;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;

use crate::error::ApiError;
use crate::request::GenerationRequest;
use crate::types::PollStatus;

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// The three remote calls a generation needs.
///
/// [`FluxClient`] talks to the real API; tests drive the job state machine
/// with a scripted implementation.
pub trait FluxApi: Send + Sync {
    /// Submit a generation job. Returns the job id.
    fn submit(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Fetch the current status of a job.
    fn get_result(&self, job_id: &str) -> impl Future<Output = Result<PollStatus, ApiError>> + Send;

    /// Download a finished image. Returns raw bytes.
    fn download(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ApiError>> + Send;
}

/// Async client for the Black Forest Labs FLUX API.
///
/// # Example
/// ```no_run
/// use flux_gen::{FluxApi, FluxClient, ResolveParams};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FluxClient::new("https://api.bfl.ml/v1", "my-key");
/// let request = ResolveParams::preset("flux-dev: 1440x896").resolve("a cat in space")?;
/// let job_id = client.submit(&request).await?;
/// let status = client.get_result(&job_id).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FluxClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl FluxClient {
    /// Create a new client for the given API root and key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: normalize(base_url.into()),
            api_key: api_key.into(),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Returns the configured API root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn submit_url(&self, request: &GenerationRequest) -> String {
        format!("{}/{}", self.base_url, request.model.as_str())
    }

    fn result_url(&self) -> String {
        format!("{}/get_result", self.base_url)
    }
}

/// Extract the job id from a submission response.
fn parse_job_id(json: &Value) -> Result<String, ApiError> {
    json.get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::InvalidResponse(format!("Response missing id: {}", json)))
}

fn is_image_content_type(content_type: &str) -> bool {
    let mime = content_type.trim().to_ascii_lowercase();
    mime.starts_with("image/") || mime.starts_with("application/octet-stream")
}

impl FluxApi for FluxClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<String, ApiError> {
        let url = self.submit_url(request);
        tracing::debug!(%url, model = %request.model, "submitting generation request");

        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .header(ACCEPT, "application/json")
            .header("x-key", &self.api_key)
            .json(&request.payload())
            .send()
            .await
            .map_err(|e| ApiError::Network {
                context: format!("Cannot reach FLUX API at {}", self.base_url),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http { status, body });
        }

        let json: Value = resp.json().await.map_err(|e| ApiError::Network {
            context: "Failed to parse FLUX submission response".into(),
            source: e,
        })?;

        parse_job_id(&json)
    }

    async fn get_result(&self, job_id: &str) -> Result<PollStatus, ApiError> {
        let resp = self
            .http
            .get(self.result_url())
            .timeout(Duration::from_secs(10))
            .header(ACCEPT, "application/json")
            .header("x-key", &self.api_key)
            .query(&[("id", job_id)])
            .send()
            .await
            .map_err(|e| ApiError::Network {
                context: format!("Failed to fetch status of job {}", job_id),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http { status, body });
        }

        let json: Value = resp.json().await.map_err(|e| ApiError::Network {
            context: "Failed to parse FLUX status response".into(),
            source: e,
        })?;
        Ok(PollStatus::from_json(&json))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let resp = self
            .http
            .get(url)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| ApiError::Network {
                context: "Failed to fetch generated image".into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(ApiError::Http {
                status: resp.status().as_u16(),
                body: format!("Failed to fetch image {}", url),
            });
        }

        if let Some(content_type) = resp.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !is_image_content_type(content_type) {
                return Err(ApiError::InvalidResponse(format!(
                    "URL does not point to an image (content-type {})",
                    content_type
                )));
            }
        }

        let bytes = resp.bytes().await.map_err(|e| ApiError::Network {
            context: "Failed to read image bytes".into(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}
