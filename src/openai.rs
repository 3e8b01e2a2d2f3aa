// 🌐 OpenAI Backend - hosted classification via chat completions
//
// One blocking HTTP request per batch. The model is asked for a JSON array
// of account group codes, one per entry, in the order submitted.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::classifier::ClassificationBackend;
use crate::config::OpenAiConfig;
use crate::entities::LedgerDescriptor;
use crate::error::{ClassifyError, GlCodeError, Result};

// ============================================================================
// BACKEND
// ============================================================================

/// Chat completion backend.
pub struct OpenAiBackend {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GlCodeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Build the request body for a batch.
    pub fn build_request(&self, batch: &[LedgerDescriptor], instructions: &str) -> ChatRequest {
        let entries = batch
            .iter()
            .map(LedgerDescriptor::describe)
            .collect::<Vec<_>>()
            .join("\n");

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: instructions.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Classify these entries (return an array of account group codes only):\n{}",
                        entries
                    ),
                },
            ],
            temperature: self.config.temperature,
        }
    }
}

impl ClassificationBackend for OpenAiBackend {
    fn classify_remote(
        &self,
        batch: &[LedgerDescriptor],
        instructions: &str,
    ) -> std::result::Result<Vec<String>, ClassifyError> {
        let request = self.build_request(batch, instructions);

        debug!(
            "Sending {} entries to {} (model {})",
            batch.len(),
            self.endpoint(),
            self.config.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(ClassifyError::Transport(format!(
                "classification API error {}: {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| ClassifyError::MalformedResponse(format!("failed to parse response: {}", e)))?;

        let content = body
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| ClassifyError::MalformedResponse("response has no content".to_string()))?;

        parse_code_list(content)
    }
}

/// Parse the model output as a JSON array of codes. A surrounding Markdown
/// code fence is tolerated.
pub fn parse_code_list(content: &str) -> std::result::Result<Vec<String>, ClassifyError> {
    let mut text = content.trim();
    if let Some(stripped) = text.strip_prefix("```") {
        let stripped = stripped.strip_prefix("json").unwrap_or(stripped);
        text = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }

    serde_json::from_str::<Vec<String>>(text)
        .map_err(|e| ClassifyError::MalformedResponse(format!("{}: {}", e, content)))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> OpenAiBackend {
        OpenAiBackend::new(OpenAiConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "http://127.0.0.1:9/v1/".to_string(),
            temperature: 0.1,
            timeout_secs: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_plain_array() {
        assert_eq!(
            parse_code_list(r#"["REVO", "CASH"]"#).unwrap(),
            vec!["REVO".to_string(), "CASH".to_string()]
        );
    }

    #[test]
    fn test_parse_fenced_array() {
        let content = "```json\n[\"PPEA\"]\n```";
        assert_eq!(parse_code_list(content).unwrap(), vec!["PPEA".to_string()]);
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_code_list("The codes are REVO and CASH").unwrap_err();
        assert!(matches!(err, ClassifyError::MalformedResponse(_)));

        assert!(parse_code_list(r#"{"codes": ["REVO"]}"#).is_err());
    }

    #[test]
    fn test_request_body() {
        let backend = backend();
        let batch = vec![
            LedgerDescriptor::new("Sales Accounts", "Direct Income", "Sales-Domestic"),
            LedgerDescriptor::new("Bank Accounts", "Current Assets", "HDFC"),
        ];

        let request = backend.build_request(&batch, "INSTRUCTIONS");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "INSTRUCTIONS");
        assert_eq!(
            json["messages"][1]["content"],
            "Classify these entries (return an array of account group codes only):\n\
             Entry: Primary Group: Sales Accounts, Parent Group: Direct Income, Name: Sales-Domestic\n\
             Entry: Primary Group: Bank Accounts, Parent Group: Current Assets, Name: HDFC"
        );
        assert_eq!(backend.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        let backend = backend();
        let batch = vec![LedgerDescriptor::new("Sales Accounts", "Direct Income", "Sales")];

        let err = backend.classify_remote(&batch, "INSTRUCTIONS").unwrap_err();
        assert!(matches!(err, ClassifyError::Transport(_)));
    }
}
