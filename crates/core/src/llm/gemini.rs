use crate::config::Settings;
use crate::domain::analysis::{EnrichmentRequest, EventAnalysis};
use crate::error::{truncate, TrackerError};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{analysis_prompt, json, output_language, EnrichmentClient, Provider};
use crate::retry::RetryPolicy;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            language: output_language(),
            retry: RetryPolicy::from_env("ENRICHMENT"),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn generate(&self, prompt: String) -> anyhow::Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let req = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.2,
            },
        };

        let res = self
            .http
            .post(self.url())
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
            }
            .into());
        }

        Self::decode_response(text)
    }

    fn decode_response(text: String) -> anyhow::Result<String> {
        let parsed = serde_json::from_str::<GenerateContentResponse>(&text).with_context(|| {
            format!("failed to decode Gemini response: {}", truncate(&text, 300))
        })?;
        Self::response_text(&parsed).ok_or_else(|| {
            LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "empty_candidates",
                detail: "response carried no candidate text".to_string(),
                raw_output: Some(text),
            }
            .into()
        })
    }

    fn response_text(res: &GenerateContentResponse) -> Option<String> {
        let candidate = res.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    async fn analyze_once(&self, request: &EnrichmentRequest) -> anyhow::Result<EventAnalysis> {
        let text = self.generate(analysis_prompt(request, &self.language)).await?;
        json::parse_analysis(&text).map_err(|err| {
            LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "parse",
                detail: format!("{err:#}"),
                raw_output: Some(text),
            }
            .into()
        })
    }
}

#[async_trait::async_trait]
impl EnrichmentClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn analyze(&self, request: &EnrichmentRequest) -> anyhow::Result<EventAnalysis> {
        self.retry
            .run("gemini_analyze", || self.analyze_once(request))
            .await
            .context(TrackerError::EnrichmentFailed {
                provider: Provider::Gemini.as_str(),
            })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_candidate_text() {
        let res: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"summary\":"}, {"text": "\"x\"}"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(
            GeminiClient::response_text(&res).as_deref(),
            Some("{\"summary\":\"x\"}")
        );
    }

    #[test]
    fn undecodable_body_is_cut_short_in_the_error() {
        let body = format!("<html>{}</html>", "x".repeat(10_000));
        let err = GeminiClient::decode_response(body).unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.starts_with("failed to decode Gemini response: <html>"));
        assert!(rendered.len() < 1_000);
    }

    #[test]
    fn blocked_prompt_has_no_text() {
        let res: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(GeminiClient::response_text(&res).is_none());
    }

    #[test]
    fn request_uses_camel_case_config() {
        let req = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: "hi".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.2,
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
    }
}
