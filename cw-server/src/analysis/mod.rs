//! External analysis service integration
//!
//! Builds one combined prompt per hazard event, optionally attaches a linked
//! image, and invokes the Gemini `generateContent` API exactly once per
//! event. The single-call design is deliberate: no separate image-analysis
//! round trip, trading some response specificity for latency and cost.
//!
//! An image-fetch failure never aborts the analysis (the call proceeds
//! text-only); an invocation failure is a total failure with no partial
//! result, which the worker resolves with the poison-pill policy.

pub mod severity;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cw_common::HazardEvent;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Default token-bucket budget for analysis invocations
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 50;

/// Total timeout for a generateContent invocation
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Bounded timeout for the optional image fetch
const IMAGE_TIMEOUT: Duration = Duration::from_secs(10);

const IMAGE_TASK: &str =
    "\n\nIMAGE ANALYSIS: Describe damage severity, visible impacts, and affected area";

/// Analysis invocation errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Response contained no analysis text")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Analyzer seam for the enrichment worker.
///
/// Production uses [`GeminiClient`]; tests substitute scripted doubles.
#[async_trait::async_trait]
pub trait EventAnalyzer: Send + Sync {
    /// Analyze one event, returning the raw response text or a total failure
    async fn analyze(&self, event: &HazardEvent) -> Result<String, AnalysisError>;
}

// Gemini generateContent wire types (request subset we use)

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini API client with a token-bucket request budget.
///
/// The limiter is the single external rate discipline: every invocation
/// waits on it regardless of how many worker futures are in flight.
pub struct GeminiClient {
    http_client: reqwest::Client,
    rate_limiter: DefaultDirectRateLimiter,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, requests_per_minute: u32) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(cw_common::config::get_user_agent())
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let quota = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(quota));

        Ok(Self {
            http_client,
            rate_limiter,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: GEMINI_MODEL.to_string(),
        })
    }

    /// Fetch the linked image, tolerating every failure mode.
    ///
    /// Returns None on any non-success status, transport error, or empty
    /// body; the analysis then proceeds text-only.
    async fn fetch_image(&self, url: &str) -> Option<(String, Vec<u8>)> {
        let response = match self
            .http_client
            .get(url)
            .timeout(IMAGE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %url, "Image download error: {}", e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "Image download failed");
            return None;
        }

        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => Some((mime_for_url(url).to_string(), bytes.to_vec())),
            Ok(_) => {
                tracing::warn!(url = %url, "Image download returned empty body");
                None
            }
            Err(e) => {
                tracing::warn!(url = %url, "Image body read error: {}", e);
                None
            }
        }
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api(status.as_u16(), error_text));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        let text: String = generate_response
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait::async_trait]
impl EventAnalyzer for GeminiClient {
    async fn analyze(&self, event: &HazardEvent) -> Result<String, AnalysisError> {
        // Single token-bucket budget for all external analysis calls
        self.rate_limiter.until_ready().await;

        let mut prompt = build_prompt(event);

        let image = match first_image_url(&event.raw_data) {
            Some(url) => self.fetch_image(url).await,
            None => None,
        };

        let mut parts = Vec::with_capacity(2);
        if let Some((mime_type, bytes)) = image {
            prompt.push_str(IMAGE_TASK);
            parts.push(Part {
                text: Some(prompt),
                inline_data: None,
            });
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type,
                    data: BASE64.encode(&bytes),
                }),
            });
        } else {
            parts.push(Part {
                text: Some(prompt),
                inline_data: None,
            });
        }

        tracing::debug!(guid = %event.guid, multimodal = parts.len() > 1, "Invoking analysis service");

        let text = self.generate(parts).await?;

        tracing::info!(
            guid = %event.guid,
            response_chars = text.len(),
            "Analysis invocation successful"
        );

        Ok(text)
    }
}

/// First source URL whose extension denotes an image; absence is not an error
pub fn first_image_url(raw_data: &Value) -> Option<&str> {
    raw_data
        .get("sources")?
        .as_array()?
        .iter()
        .filter_map(|source| source.get("url").and_then(Value::as_str))
        .find(|url| {
            let lower = url.to_ascii_lowercase();
            lower.ends_with(".png") || lower.ends_with(".jpg") || lower.ends_with(".jpeg")
        })
}

fn mime_for_url(url: &str) -> &'static str {
    if url.to_ascii_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Combined prompt from title, description, category, coordinates and date.
///
/// Missing raw payload fields degrade to placeholders rather than failing.
pub fn build_prompt(event: &HazardEvent) -> String {
    let title = event.raw_data["title"].as_str().unwrap_or("Untitled Event");
    let description = event.raw_data["description"]
        .as_str()
        .filter(|d| !d.is_empty())
        .unwrap_or("No description");

    format!(
        "DISASTER ANALYSIS REQUEST:\n\
         **Event**: {}\n\
         **Description**: {}\n\
         **Type**: {}\n\
         **Location**: [{}, {}]\n\
         **Date**: {}\n\
         \n\
         YOUR TASKS:\n\
         1. Severity score (1-10)\n\
         2. Primary disaster type\n\
         3. Top 3 risks\n\
         4. Emergency response plan with:\n\
         a) Immediate actions\n\
         b) Evacuation guidance\n\
         c) Resource priorities",
        title,
        description,
        event.event_type,
        event.location.longitude,
        event.location.latitude,
        event.occurred_at.to_rfc3339(),
    )
}
