//! Flux Fill Pro (Black Forest Labs) inpainting, served through Replicate.

use crate::api::provider::InpaintProvider;
use crate::api::types::{GeneratedImage, GenerationMetadata, InpaintRequest, ProviderKind};
use crate::error::{parse_retry_after, sanitize_error_message, Result, WidefillError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
const MODEL: &str = "black-forest-labs/flux-fill-pro";

const STEPS: u32 = 50;
const GUIDANCE: f32 = 2.5;
/// Most permissive level accepted by flux-fill-pro (1 = strict, 5 = lenient).
const SAFETY_TOLERANCE: u8 = 5;

/// Builder for [`FluxFillProvider`].
#[derive(Debug, Clone)]
pub struct FluxFillProviderBuilder {
    api_token: Option<String>,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for FluxFillProviderBuilder {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: DEFAULT_BASE_URL.into(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

impl FluxFillProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Replicate API token (usually `REPLICATE_API_TOKEN`).
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the polling interval used when the prediction outlives `Prefer: wait`.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum time to wait for a prediction.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider.
    ///
    /// A missing token is not an error here; every `inpaint` call fails with
    /// [`WidefillError::Auth`] instead.
    pub fn build(self) -> Result<FluxFillProvider> {
        Ok(FluxFillProvider {
            client: reqwest::Client::new(),
            api_token: self.api_token.filter(|t| !t.trim().is_empty()),
            base_url: self.base_url,
            poll_interval: self.poll_interval,
            timeout: self.timeout,
        })
    }
}

/// Flux Fill Pro inpainting provider.
///
/// The prompt sent upstream is always empty so the surrounding pixels alone
/// drive the fill.
pub struct FluxFillProvider {
    client: reqwest::Client,
    api_token: Option<String>,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl FluxFillProvider {
    /// Creates a new [`FluxFillProviderBuilder`].
    pub fn builder() -> FluxFillProviderBuilder {
        FluxFillProviderBuilder::new()
    }

    fn api_token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| WidefillError::Auth("REPLICATE_API_TOKEN not set".into()))
    }

    fn predictions_url(&self) -> String {
        format!("{}/models/{}/predictions", self.base_url, MODEL)
    }

    async fn submit(&self, api_token: &str, request: &InpaintRequest) -> Result<Prediction> {
        let body = FluxFillRequest::from_inpaint_request(request);

        let response = self
            .client
            .post(self.predictions_url())
            .bearer_auth(api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;

        read_prediction(response).await
    }

    async fn fetch(&self, api_token: &str, url: String) -> Result<Prediction> {
        let response = self
            .client
            .get(&url)
            .bearer_auth(api_token)
            .send()
            .await?;

        read_prediction(response).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(download_error(response.status().as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl InpaintProvider for FluxFillProvider {
    async fn inpaint(&self, request: &InpaintRequest) -> Result<GeneratedImage> {
        let api_token = self.api_token()?;
        let start = Instant::now();

        let prediction = self.submit(api_token, request).await?;
        tracing::debug!(prediction_id = %prediction.id, status = %prediction.status, "submitted inpainting prediction");

        let (id, url) = wait_for_output(prediction, self.poll_interval, self.timeout, |poll_url| {
            self.fetch(api_token, poll_url)
        })
        .await?;
        tracing::debug!(prediction_id = %id, url = %url, "inpainting complete");

        let data = self.download(&url).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        GeneratedImage::from_bytes(
            data,
            ProviderKind::FluxFill,
            GenerationMetadata {
                model: Some(MODEL.to_string()),
                request_id: Some(id),
                duration_ms: Some(duration_ms),
            },
        )
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::FluxFill
    }
}

/// Follows `prediction` until it has an output URL.
///
/// `fetch` loads the prediction from its poll URL. Returns the prediction id
/// and the output URL.
async fn wait_for_output<F, Fut>(
    prediction: Prediction,
    poll_interval: Duration,
    timeout: Duration,
    mut fetch: F,
) -> Result<(String, String)>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Prediction>>,
{
    let start = Instant::now();
    let id = prediction.id.clone();
    let mut current = prediction;

    loop {
        let poll_url = match current.state()? {
            PredictionState::Succeeded(url) => return Ok((id, url)),
            PredictionState::Running(Some(url)) => url,
            PredictionState::Running(None) => {
                return Err(WidefillError::UnexpectedResponse(
                    "prediction still running but has no poll URL".into(),
                ))
            }
        };

        if start.elapsed() >= timeout {
            return Err(WidefillError::Timeout(timeout));
        }
        tokio::time::sleep(poll_interval).await;

        current = fetch(poll_url).await?;
        tracing::debug!(prediction_id = %id, status = %current.status, "polled prediction");
    }
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction> {
    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        return Err(parse_error(status.as_u16(), &text, &headers));
    }
    Ok(response.json().await?)
}

fn download_error(status: u16) -> WidefillError {
    match status {
        403 | 410 => WidefillError::UrlExpired,
        _ => WidefillError::Api {
            status,
            message: "failed to download inpainted image".into(),
        },
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> WidefillError {
    let detail = serde_json::from_str::<ReplicateErrorResponse>(text)
        .ok()
        .and_then(|e| e.detail)
        .unwrap_or_else(|| text.to_string());
    let detail = sanitize_error_message(&detail);

    match status {
        401 | 403 => WidefillError::Auth(detail),
        429 => WidefillError::RateLimited {
            retry_after: parse_retry_after(headers).map(Duration::from_secs),
        },
        _ => WidefillError::Api {
            status,
            message: detail,
        },
    }
}

#[derive(Debug, Serialize)]
struct FluxFillRequest {
    input: FluxFillInput,
}

#[derive(Debug, Serialize)]
struct FluxFillInput {
    prompt: String,
    image: String,
    mask: String,
    steps: u32,
    guidance: f32,
    output_format: &'static str,
    safety_tolerance: u8,
}

impl FluxFillRequest {
    fn from_inpaint_request(req: &InpaintRequest) -> Self {
        Self {
            input: FluxFillInput {
                prompt: String::new(),
                image: req.image_data_url(),
                mask: req.mask_data_url(),
                steps: STEPS,
                guidance: GUIDANCE,
                output_format: "png",
                safety_tolerance: SAFETY_TOLERANCE,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

/// flux-fill-pro returns a single URL; some Replicate models return a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    fn first_url(&self) -> Option<&str> {
        match self {
            Self::Single(url) => Some(url.as_str()),
            Self::Many(urls) => urls.first().map(String::as_str),
        }
        .map(str::trim)
        .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PredictionState {
    Succeeded(String),
    Running(Option<String>),
}

impl Prediction {
    fn state(&self) -> Result<PredictionState> {
        match self.status.as_str() {
            "succeeded" => self
                .output
                .as_ref()
                .and_then(PredictionOutput::first_url)
                .map(|url| PredictionState::Succeeded(url.to_string()))
                .ok_or_else(|| {
                    WidefillError::UnexpectedResponse("prediction succeeded without output".into())
                }),
            "starting" | "processing" => Ok(PredictionState::Running(
                self.urls.as_ref().and_then(|u| u.get.clone()),
            )),
            "failed" | "canceled" => {
                let message = self
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("prediction {}", self.status));
                let lower = message.to_lowercase();
                if lower.contains("nsfw") || lower.contains("flagged") {
                    Err(WidefillError::ContentBlocked(message))
                } else {
                    Err(WidefillError::Api {
                        status: 500,
                        message,
                    })
                }
            }
            other => Err(WidefillError::UnexpectedResponse(format!(
                "unknown prediction status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplicateErrorResponse {
    #[serde(default)]
    detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InpaintRequest {
        InpaintRequest {
            image: vec![1, 2, 3],
            mask: vec![4, 5, 6],
            prompt: "a lighthouse at dusk".into(),
        }
    }

    fn prediction(json: &str) -> Prediction {
        serde_json::from_str(json).unwrap()
    }

    fn running(id: &str) -> Prediction {
        prediction(&format!(
            r#"{{"id":"{id}","status":"processing","urls":{{"get":"https://poll/{id}"}}}}"#
        ))
    }

    #[tokio::test]
    async fn test_inpaint_without_token_fails_per_call() {
        // Unroutable base URL: the call must fail before any request is sent.
        let provider = FluxFillProviderBuilder::new()
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let err = provider.inpaint(&request()).await.unwrap_err();
        assert!(matches!(err, WidefillError::Auth(ref msg) if msg.contains("REPLICATE_API_TOKEN")));

        let provider = FluxFillProviderBuilder::new()
            .api_token("")
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        assert!(matches!(
            provider.inpaint(&request()).await,
            Err(WidefillError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_polls_until_succeeded() {
        let mut responses = vec![
            prediction(r#"{"id":"abc","status":"succeeded","output":"https://out/abc.png"}"#),
            running("abc"),
        ];
        let mut polled = Vec::new();

        let (id, url) = wait_for_output(running("abc"), Duration::ZERO, Duration::from_secs(60), |poll_url| {
            polled.push(poll_url);
            let next = responses.pop();
            async move { next.ok_or_else(|| WidefillError::UnexpectedResponse("exhausted".into())) }
        })
        .await
        .unwrap();

        assert_eq!(id, "abc");
        assert_eq!(url, "https://out/abc.png");
        assert_eq!(polled, vec!["https://poll/abc", "https://poll/abc"]);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_done() {
        let done = prediction(r#"{"id":"abc","status":"succeeded","output":["https://out/1.png"]}"#);
        let (_, url) = wait_for_output(done, Duration::ZERO, Duration::ZERO, |_| async {
            Err::<Prediction, _>(WidefillError::UnexpectedResponse("should not poll".into()))
        })
        .await
        .unwrap();
        assert_eq!(url, "https://out/1.png");
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let mut polls = 0;
        let err = wait_for_output(running("slow"), Duration::ZERO, Duration::ZERO, |_| {
            polls += 1;
            async { Ok(running("slow")) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, WidefillError::Timeout(d) if d == Duration::ZERO));
        assert_eq!(polls, 0);
    }

    #[tokio::test]
    async fn test_wait_surfaces_failure_while_polling() {
        let err = wait_for_output(running("abc"), Duration::ZERO, Duration::from_secs(60), |_| async {
            Ok(prediction(r#"{"id":"abc","status":"failed","error":"flagged as sensitive"}"#))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, WidefillError::ContentBlocked(_)));

        let err = wait_for_output(running("abc"), Duration::ZERO, Duration::from_secs(60), |_| async {
            Err::<Prediction, _>(WidefillError::RateLimited { retry_after: None })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, WidefillError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_wait_requires_poll_url() {
        let stuck = prediction(r#"{"id":"abc","status":"starting"}"#);
        let err = wait_for_output(stuck, Duration::ZERO, Duration::from_secs(60), |_| async {
            Ok(running("abc"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, WidefillError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_download_error_mapping() {
        assert!(matches!(download_error(403), WidefillError::UrlExpired));
        assert!(matches!(download_error(410), WidefillError::UrlExpired));
        assert!(matches!(
            download_error(500),
            WidefillError::Api { status: 500, .. }
        ));
        assert!(matches!(
            download_error(404),
            WidefillError::Api { status: 404, .. }
        ));
    }

    #[test]
    fn test_predictions_url() {
        let provider = FluxFillProvider::builder()
            .api_token("r8_test")
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(
            provider.predictions_url(),
            "http://localhost:8080/v1/models/black-forest-labs/flux-fill-pro/predictions"
        );
    }

    #[test]
    fn test_request_uses_fixed_parameters_and_empty_prompt() {
        let body = FluxFillRequest::from_inpaint_request(&request());
        let json = serde_json::to_value(&body).unwrap();
        let input = &json["input"];

        assert_eq!(input["prompt"], "");
        assert_eq!(input["steps"], 50);
        assert_eq!(input["guidance"], 2.5);
        assert_eq!(input["output_format"], "png");
        assert_eq!(input["safety_tolerance"], 5);
        assert_eq!(input["image"], "data:image/png;base64,AQID");
        assert_eq!(input["mask"], "data:image/png;base64,BAUG");
    }

    #[test]
    fn test_succeeded_with_string_output() {
        let json = r#"{"id":"abc","status":"succeeded","output":"https://replicate.delivery/x.png","error":null}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert_eq!(
            prediction.state().unwrap(),
            PredictionState::Succeeded("https://replicate.delivery/x.png".into())
        );
    }

    #[test]
    fn test_succeeded_with_array_output() {
        let json = r#"{"id":"abc","status":"succeeded","output":["https://a/1.png","https://a/2.png"]}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert_eq!(
            prediction.state().unwrap(),
            PredictionState::Succeeded("https://a/1.png".into())
        );
    }

    #[test]
    fn test_succeeded_without_output_fails_fast() {
        let json = r#"{"id":"abc","status":"succeeded","output":null}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert!(matches!(
            prediction.state(),
            Err(WidefillError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_processing_exposes_poll_url() {
        let json = r#"{"id":"abc","status":"processing","urls":{"get":"https://api.replicate.com/v1/predictions/abc","cancel":"x"}}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert_eq!(
            prediction.state().unwrap(),
            PredictionState::Running(Some(
                "https://api.replicate.com/v1/predictions/abc".into()
            ))
        );
    }

    #[test]
    fn test_failed_prediction_maps_errors() {
        let json = r#"{"id":"abc","status":"failed","error":"NSFW content detected"}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert!(matches!(
            prediction.state(),
            Err(WidefillError::ContentBlocked(_))
        ));

        let json = r#"{"id":"abc","status":"canceled"}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        match prediction.state() {
            Err(WidefillError::Api { message, .. }) => assert_eq!(message, "prediction canceled"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_reads_detail() {
        let headers = reqwest::header::HeaderMap::new();
        let err = parse_error(422, r#"{"detail":"mask must match image size"}"#, &headers);
        match err {
            WidefillError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "mask must match image size");
            }
            other => panic!("expected Api error, got {other:?}"),
        }

        assert!(matches!(
            parse_error(401, "Unauthenticated", &headers),
            WidefillError::Auth(_)
        ));
        assert!(matches!(
            parse_error(429, "", &headers),
            WidefillError::RateLimited { retry_after: None }
        ));
    }

    #[test]
    fn test_rate_limit_reads_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static("7"),
        );
        let err = parse_error(429, r#"{"detail":"Request was throttled"}"#, &headers);
        assert!(matches!(
            err,
            WidefillError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
    }
}
