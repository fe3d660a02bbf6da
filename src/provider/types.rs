use futures_core::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user prompt. Never empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Result<Self, RequestError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("invalid generation config: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response blocked by safety filter: {0}")]
    SafetyBlocked(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl RequestError {
    /// Stable identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "empty_prompt",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Transport(_) => "transport",
            Self::SafetyBlocked(_) => "safety_blocked",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmCategory {
    Harassment,
    HateSpeech,
    SexuallyExplicit,
    DangerousContent,
}

impl HarmCategory {
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Harassment => "HARM_CATEGORY_HARASSMENT",
            Self::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            Self::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            Self::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
        }
    }
}

/// Lowest harm probability that gets blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockThreshold {
    None,
    Low,
    Medium,
    High,
}

impl BlockThreshold {
    pub fn api_name(self) -> &'static str {
        match self {
            Self::None => "BLOCK_NONE",
            Self::Low => "BLOCK_LOW_AND_ABOVE",
            Self::Medium => "BLOCK_MEDIUM_AND_ABOVE",
            Self::High => "BLOCK_ONLY_HIGH",
        }
    }
}

/// Sampling options and safety thresholds, passed through to the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    #[serde(rename = "safety")]
    pub safety_thresholds: BTreeMap<HarmCategory, BlockThreshold>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let safety_thresholds = [
            HarmCategory::Harassment,
            HarmCategory::HateSpeech,
            HarmCategory::SexuallyExplicit,
            HarmCategory::DangerousContent,
        ]
        .into_iter()
        .map(|c| (c, BlockThreshold::Medium))
        .collect();

        Self {
            temperature: Some(0.9),
            top_k: Some(1),
            top_p: Some(1.0),
            max_output_tokens: Some(2048),
            safety_thresholds,
        }
    }
}

impl GenerationConfig {
    /// Check numeric ranges. Nothing else is interpreted.
    pub fn validate(&self) -> Result<(), RequestError> {
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(RequestError::InvalidConfig(format!(
                    "temperature must be within 0..=1, got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(RequestError::InvalidConfig(format!(
                    "top_p must be within 0..=1, got {p}"
                )));
            }
        }
        if self.top_k == Some(0) {
            return Err(RequestError::InvalidConfig("top_k must be at least 1".into()));
        }
        if self.max_output_tokens == Some(0) {
            return Err(RequestError::InvalidConfig(
                "max_output_tokens must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Request/response client for a text-generation endpoint.
///
/// One call is one round-trip. Implementations keep no conversation state
/// and never retry.
pub trait PromptClient {
    fn name(&self) -> &'static str;

    fn send(&self, prompt: Prompt, config: &GenerationConfig) -> BoxFuture<'static, Result<String, RequestError>>;
}
