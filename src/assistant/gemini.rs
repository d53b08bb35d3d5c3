//! Google Gemini API backend for the support assistant
//!
//! Thin blocking wrapper around the Gemini generateContent endpoint. The
//! session history is resent on every call; the API itself is stateless.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{ChatBackend, ChatError};
use crate::conversation::{ConversationTurn, Speaker};

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Error bodies are cut to this many characters before logging
const MAX_ERROR_BODY: usize = 200;

pub const SUPPORT_PERSONA: &str = "You are a mental health support assistant. You provide empathy, comfort, and coping strategies for emotional well-being.";

/// Sampling parameters sent as `generationConfig`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

/// Gemini content-filter thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmThreshold {
    BlockNone,
    BlockMediumAndAbove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: HarmThreshold,
}

impl SafetySetting {
    fn new(category: &str, threshold: HarmThreshold) -> Self {
        Self {
            category: category.to_string(),
            threshold,
        }
    }

    /// Harassment is let through; hate, sexual and dangerous content are
    /// blocked from medium severity up.
    pub fn support_defaults() -> Vec<Self> {
        vec![
            Self::new("HARM_CATEGORY_HARASSMENT", HarmThreshold::BlockNone),
            Self::new("HARM_CATEGORY_HATE_SPEECH", HarmThreshold::BlockMediumAndAbove),
            Self::new("HARM_CATEGORY_SEXUALLY_EXPLICIT", HarmThreshold::BlockMediumAndAbove),
            Self::new("HARM_CATEGORY_DANGEROUS_CONTENT", HarmThreshold::BlockMediumAndAbove),
        ]
    }
}

// -- Request types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: &'a GenerationSettings,
    safety_settings: &'a [SafetySetting],
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

// -- Response types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// Gemini-backed [`ChatBackend`]
pub struct GeminiBackend {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    persona: String,
    generation: GenerationSettings,
    safety: Vec<SafetySetting>,
}

impl GeminiBackend {
    pub fn new(api_key: &str) -> Result<Self, ChatError> {
        if api_key.trim().is_empty() {
            return Err(ChatError::Fatal("Gemini API key is required".to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ChatError::Fatal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            persona: SUPPORT_PERSONA.to_string(),
            generation: GenerationSettings::default(),
            safety: SafetySetting::support_defaults(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_persona(mut self, persona: &str) -> Self {
        self.persona = persona.to_string();
        self
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request_body(
        persona: &str,
        history: &[ConversationTurn],
        user_text: &str,
        generation: &GenerationSettings,
        safety: &[SafetySetting],
    ) -> Result<serde_json::Value, ChatError> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| {
                let role = match turn.speaker {
                    Speaker::User => "user",
                    Speaker::Assistant => "model",
                };
                Content::text(Some(role), &turn.text)
            })
            .collect();
        contents.push(Content::text(Some("user"), user_text));

        let request = GenerateContentRequest {
            system_instruction: Content::text(None, persona),
            contents,
            generation_config: generation,
            safety_settings: safety,
        };
        serde_json::to_value(&request)
            .map_err(|e| ChatError::Fatal(format!("Failed to encode Gemini request: {}", e)))
    }

    /// Concatenated text of the first candidate
    pub fn extract_reply(response: &GenerateContentResponse) -> Result<String, ChatError> {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(ChatError::Fatal(format!("Prompt blocked: {}", reason)));
        }

        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| ChatError::Fatal("Gemini response contained no candidates".to_string()))?;

        let text: String = candidate
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("UNKNOWN");
            return Err(ChatError::Fatal(format!(
                "Gemini returned no text (finish reason {})",
                reason
            )));
        }

        Ok(text)
    }

    /// Sort an HTTP failure into transient or fatal
    pub fn classify_failure(status: StatusCode, body: &str) -> ChatError {
        let (api_status, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => (envelope.error.status, truncate(&envelope.error.message).to_string()),
            Err(_) => (String::new(), truncate(body).to_string()),
        };

        let detail = if api_status.is_empty() {
            format!("{}: {}", status, message)
        } else {
            format!("{} {}: {}", status, api_status, message)
        };

        let overloaded = status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::SERVICE_UNAVAILABLE
            || api_status == "RESOURCE_EXHAUSTED"
            || api_status == "UNAVAILABLE";

        if overloaded {
            ChatError::Transient(detail)
        } else {
            ChatError::Fatal(detail)
        }
    }
}

impl ChatBackend for GeminiBackend {
    fn generate(&self, history: &[ConversationTurn], user_text: &str) -> Result<String, ChatError> {
        let url = format!("{}/{}:generateContent", GEMINI_ENDPOINT, self.model);
        let body = Self::build_request_body(
            &self.persona,
            history,
            user_text,
            &self.generation,
            &self.safety,
        )?;

        info!(
            "Gemini request: model={}, history={} turns, prompt={} chars",
            self.model,
            history.len(),
            user_text.len()
        );

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(
                "x-goog-api-key",
                HeaderValue::from_str(&self.api_key)
                    .map_err(|e| ChatError::Fatal(format!("Invalid API key header: {}", e)))?,
            )
            .json(&body)
            .send()
            .map_err(|e| ChatError::Fatal(format!("Gemini API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().unwrap_or_default();
            return Err(Self::classify_failure(status, &error_body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| ChatError::Fatal(format!("Failed to parse Gemini response: {}", e)))?;

        let reply = Self::extract_reply(&parsed)?;
        debug!("Gemini reply: {} chars", reply.len());
        Ok(reply)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_body_maps_roles() {
        let history = vec![
            ConversationTurn::user("I can't sleep"),
            ConversationTurn::assistant("That sounds exhausting."),
        ];
        let body = GeminiBackend::build_request_body(
            SUPPORT_PERSONA,
            &history,
            "It's been a week",
            &GenerationSettings::default(),
            &SafetySetting::support_defaults(),
        )
        .unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], SUPPORT_PERSONA);
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["role"], "user");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "It's been a week");
    }

    #[test]
    fn test_build_request_body_generation_and_safety() {
        let body = GeminiBackend::build_request_body(
            SUPPORT_PERSONA,
            &[],
            "hi",
            &GenerationSettings::default(),
            &SafetySetting::support_defaults(),
        )
        .unwrap();

        let config = &body["generationConfig"];
        assert_eq!(config["topK"], 64);
        assert_eq!(config["maxOutputTokens"], 8192);
        assert_eq!(config["responseMimeType"], "text/plain");
        assert!((config["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let safety = body["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert_eq!(safety[0]["category"], "HARM_CATEGORY_HARASSMENT");
        assert_eq!(safety[0]["threshold"], "BLOCK_NONE");
        assert_eq!(safety[1]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn test_extract_reply_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "I'm here. "}, {"text": "Tell me more."}]
                },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let reply = GeminiBackend::extract_reply(&response).unwrap();
        assert_eq!(reply, "I'm here. Tell me more.");
    }

    #[test]
    fn test_extract_reply_blocked_prompt() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();

        let err = GeminiBackend::extract_reply(&response).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_extract_reply_safety_stop_without_text() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();

        let err = GeminiBackend::extract_reply(&response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_classify_quota_exhausted_is_transient() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = GeminiBackend::classify_failure(StatusCode::TOO_MANY_REQUESTS, body);
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_overloaded_is_transient() {
        let err = GeminiBackend::classify_failure(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_bad_request_is_fatal() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = GeminiBackend::classify_failure(StatusCode::BAD_REQUEST, body);
        assert!(!err.is_transient());
        assert!(err.to_string().contains("INVALID_ARGUMENT"));
    }

    #[test]
    fn test_classify_truncates_plain_body() {
        let body = "x".repeat(1000);
        let err = GeminiBackend::classify_failure(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(err.to_string().len() < 300);
    }

    #[test]
    fn test_classify_truncates_json_message() {
        let body = format!(
            r#"{{"error":{{"code":400,"message":"{}","status":"INVALID_ARGUMENT"}}}}"#,
            "y".repeat(1000)
        );
        let err = GeminiBackend::classify_failure(StatusCode::BAD_REQUEST, &body);
        let text = err.to_string();
        assert!(text.contains("INVALID_ARGUMENT"));
        assert!(text.len() < 300);
        assert_eq!(text.matches('y').count(), MAX_ERROR_BODY);
    }

    #[test]
    fn test_new_empty_api_key() {
        assert!(GeminiBackend::new("  ").is_err());
    }

    #[test]
    fn test_new_valid_api_key() {
        let backend = GeminiBackend::new("test-key-123").unwrap();
        assert_eq!(backend.model(), DEFAULT_MODEL);
    }
}
