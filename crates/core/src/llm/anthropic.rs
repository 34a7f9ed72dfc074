use crate::config::Settings;
use crate::domain::analysis::{EnrichmentRequest, EventAnalysis, LlmEventAnalysis};
use crate::error::{truncate, TrackerError};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{analysis_prompt, json, output_language, EnrichmentClient, Provider};
use crate::retry::RetryPolicy;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const TOOL_NAME_EMIT_ANALYSIS: &str = "emit_analysis";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    language: String,
    retry: RetryPolicy,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
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
            max_tokens,
            language: output_language(),
            retry: RetryPolicy::from_env("ENRICHMENT"),
        })
    }

    async fn create_message(&self, req: CreateMessageRequest) -> anyhow::Result<CreateMessageResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
            }
            .into());
        }

        serde_json::from_str::<CreateMessageResponse>(&text)
            .with_context(|| format!("failed to decode Anthropic response: {}", truncate(&text, 300)))
    }

    fn request(&self, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        }
    }

    fn tools() -> Vec<Tool> {
        let text = serde_json::json!({"type": "string", "minLength": 1});
        let score = serde_json::json!({"type": "integer", "minimum": 1, "maximum": 10});
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["summary", "analysis", "impact_on_commodities", "gold_impact_score", "silver_impact_score"],
            "properties": {
                "summary": text,
                "analysis": text,
                "impact_on_commodities": text,
                "gold_impact_score": score,
                "silver_impact_score": score
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_ANALYSIS,
            description: "Emit the post-release analysis as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_ANALYSIS,
        }
    }

    fn system_prompt() -> String {
        [
            "You analyze freshly released economic data for commodity traders.",
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
            "Scores are integers from 1 (negligible) to 10 (market-moving).",
        ]
        .join("\n")
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object with keys summary, analysis, impact_on_commodities, \
gold_impact_score, silver_impact_score.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Scores MUST be integers between 1 and 10.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_analysis(res: &CreateMessageResponse) -> anyhow::Result<Option<LlmEventAnalysis>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_ANALYSIS {
                    let parsed = serde_json::from_value::<LlmEventAnalysis>(input.clone())
                        .context("failed to decode tool_use.input into LlmEventAnalysis")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn analyze_once(&self, request: &EnrichmentRequest) -> anyhow::Result<EventAnalysis> {
        let res = self
            .create_message(self.request(analysis_prompt(request, &self.language)))
            .await?;

        if let Some(tool_output) = Self::response_tool_analysis(&res)? {
            return tool_output.validate_and_into_analysis();
        }

        // Fallback to text (should be rare), with a single repair round.
        let text = Self::response_text(&res);
        match json::parse_analysis(&text) {
            Ok(analysis) => Ok(analysis),
            Err(first_err) => {
                tracing::warn!(
                    event_name = %request.event_name,
                    error = %first_err,
                    "LLM output invalid; attempting repair"
                );
                let repair = self.create_message(self.request(Self::repair_prompt(&text))).await?;
                if let Some(tool_output) = Self::response_tool_analysis(&repair)? {
                    return tool_output.validate_and_into_analysis();
                }
                let repair_text = Self::response_text(&repair);
                json::parse_analysis(&repair_text).map_err(|err| {
                    LlmDiagnosticsError {
                        provider: Provider::Anthropic,
                        stage: "parse_after_repair",
                        detail: format!("final_error={err}"),
                        raw_output: Some(repair_text),
                    }
                    .into()
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl EnrichmentClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn analyze(&self, request: &EnrichmentRequest) -> anyhow::Result<EventAnalysis> {
        self.retry
            .run("anthropic_analyze", || self.analyze_once(request))
            .await
            .context(TrackerError::EnrichmentFailed {
                provider: Provider::Anthropic.as_str(),
            })
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_use_analysis_input() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": TOOL_NAME_EMIT_ANALYSIS,
                    "input": {
                        "summary": "s",
                        "analysis": "a",
                        "impact_on_commodities": "i",
                        "gold_impact_score": 9,
                        "silver_impact_score": 4
                    }
                }
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();

        let parsed = AnthropicClient::response_tool_analysis(&res).unwrap().unwrap();
        let analysis = parsed.validate_and_into_analysis().unwrap();
        assert_eq!(analysis.gold_impact_score, 9);
        assert_eq!(analysis.silver_impact_score, 4);
    }

    #[test]
    fn joins_text_blocks() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "text", "text": "1}"}
            ]
        }))
        .unwrap();
        assert_eq!(AnthropicClient::response_text(&res), "{\"a\":\n1}");
        assert!(AnthropicClient::response_tool_analysis(&res).unwrap().is_none());
    }

    #[test]
    fn tool_schema_requires_every_field() {
        let tools = AnthropicClient::tools();
        let required = tools[0].input_schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 5);
    }
}
