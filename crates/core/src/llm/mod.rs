pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod json;

use crate::config::Settings;
use crate::domain::analysis::{EnrichmentRequest, EventAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
        }
    }
}

/// Turns a released data point into analysis text. Any non-conforming model
/// output is an error; nothing is partially trusted.
#[async_trait::async_trait]
pub trait EnrichmentClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn analyze(&self, request: &EnrichmentRequest) -> anyhow::Result<EventAnalysis>;
}

pub fn client_from_settings(settings: &Settings) -> anyhow::Result<Box<dyn EnrichmentClient>> {
    match settings.enrichment_provider.as_str() {
        "gemini" => Ok(Box::new(gemini::GeminiClient::from_settings(settings)?)),
        "anthropic" => Ok(Box::new(anthropic::AnthropicClient::from_settings(settings)?)),
        other => anyhow::bail!("unsupported ENRICHMENT_PROVIDER {other:?} (expected gemini or anthropic)"),
    }
}

pub(crate) fn output_language() -> String {
    std::env::var("ENRICHMENT_LANGUAGE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Hinglish".to_string())
}

/// Shared analyst prompt; both providers send the same task.
pub(crate) fn analysis_prompt(request: &EnrichmentRequest, language: &str) -> String {
    let input = serde_json::to_string_pretty(request).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are an expert financial analyst specializing in the commodities market, with a deep \
understanding of how economic indicators affect Gold (XAU/USD) and Silver (XAG/USD).\n\n\
Analyze the following just-released economic data point. Respond ONLY with a single JSON object, \
no markdown and no text outside the JSON.\n\n\
Input Data:\n{input}\n\n\
Required JSON Output Structure:\n\
{{\n\
  \"summary\": \"1-2 sentence explanation of what this indicator is, in {language}.\",\n\
  \"analysis\": \"Short comparison of actual against forecast and what it means, in {language}.\",\n\
  \"impact_on_commodities\": \"Likely short-term impact on Gold and Silver with the reasoning (USD, central bank policy, etc.), in {language}.\",\n\
  \"gold_impact_score\": <integer 1-10>,\n\
  \"silver_impact_score\": <integer 1-10>\n\
}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_canonical_fields() {
        let request = EnrichmentRequest {
            country: "US".to_string(),
            event_name: "CPI".to_string(),
            actual: Some(3.1),
            forecast: Some(3.0),
            previous: None,
        };
        let prompt = analysis_prompt(&request, "English");
        assert!(prompt.contains("\"eventName\": \"CPI\""));
        assert!(prompt.contains("\"previous\": null"));
        assert!(prompt.contains("in English."));
        assert!(prompt.contains("gold_impact_score"));
    }
}
