use super::{GenerationConfig, Prompt, PromptClient, RequestError};
use futures_core::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/";

#[derive(Debug, Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    api_key: String,
    api_base: Url,
    model: String,
}

impl GoogleClient {
    pub fn with_base(
        http: reqwest::Client,
        api_key: String,
        model: String,
        api_base: &str,
    ) -> anyhow::Result<Self> {
        let mut api_base = Url::parse(api_base)?;
        // Url::join drops the last path segment unless it ends with '/'.
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            http,
            api_key,
            api_base,
            model,
        })
    }

    fn build_url(&self) -> Result<Url, RequestError> {
        // Docs: https://ai.google.dev/api/rest/v1beta/models/generateContent
        let mut url = self
            .api_base
            .join(&format!("v1beta/models/{}:generateContent", self.model))
            .map_err(|e| RequestError::Transport(format!("invalid endpoint url: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }
}

impl PromptClient for GoogleClient {
    fn name(&self) -> &'static str {
        "google"
    }

    fn send(&self, prompt: Prompt, config: &GenerationConfig) -> BoxFuture<'static, Result<String, RequestError>> {
        let this = self.clone();
        let config = config.clone();

        Box::pin(async move {
            config.validate()?;
            let url = this.build_url()?;
            let body = GenerateContentRequest::new(&prompt, &config);

            tracing::debug!(model = %this.model, chars = prompt.as_str().len(), "sending generateContent");

            let resp = this
                .http
                .post(url)
                .headers(Self::headers())
                .json(&body)
                .send()
                .await
                .map_err(|e| RequestError::Transport(format!("failed to reach Gemini: {e}")))?;

            let status = resp.status();
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| RequestError::Transport(format!("failed to read response body: {e}")))?;

            if !status.is_success() {
                return Err(RequestError::Transport(format!(
                    "Gemini API error: HTTP {status}: {}",
                    String::from_utf8_lossy(&bytes)
                )));
            }

            let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
                .map_err(|e| RequestError::MalformedResponse(format!("failed to parse JSON: {e}")))?;
            extract_text(parsed)
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: WireGenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    fn new(prompt: &Prompt, config: &GenerationConfig) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.as_str().to_string()),
                }],
            }],
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                top_k: config.top_k,
                top_p: config.top_p,
                max_output_tokens: config.max_output_tokens,
            },
            safety_settings: config
                .safety_thresholds
                .iter()
                .map(|(category, threshold)| SafetySetting {
                    category: category.api_name(),
                    threshold: threshold.api_name(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(r: GenerateContentResponse) -> Result<String, RequestError> {
    if let Some(reason) = r.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(RequestError::SafetyBlocked(format!("prompt blocked: {reason}")));
    }

    let Some(cand) = r.candidates.into_iter().next() else {
        return Err(RequestError::MalformedResponse("no candidates".into()));
    };

    // Concatenate all text parts of the first candidate.
    let mut out = String::new();
    for p in cand.content.into_iter().flat_map(|c| c.parts) {
        if let Some(t) = p.text {
            out.push_str(&t);
        }
    }

    if out.is_empty() {
        return match cand.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => Err(
                RequestError::SafetyBlocked(format!("candidate finished with {reason}")),
            ),
            _ => Err(RequestError::MalformedResponse("candidate has no text".into())),
        };
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/v1beta/models/gemini-1.0-pro:generateContent";

    fn client(server: &MockServer) -> GoogleClient {
        GoogleClient::with_base(
            reqwest::Client::new(),
            "test-key".to_string(),
            "gemini-1.0-pro".to_string(),
            &server.uri(),
        )
        .unwrap()
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        }))
    }

    #[tokio::test]
    async fn sends_prompt_and_config_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }],
                "generationConfig": { "topK": 1, "maxOutputTokens": 2048 },
                "safetySettings": [
                    { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" }
                ]
            })))
            .respond_with(text_response("Hi **there**"))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server)
            .send(Prompt::new("hello").unwrap(), &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "Hi **there**");
    }

    #[tokio::test]
    async fn concatenates_text_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "ab" }, { "text": "cd" }] } }]
            })))
            .mount(&server)
            .await;

        let text = client(&server)
            .send(Prompt::new("x").unwrap(), &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "abcd");
    }

    #[tokio::test]
    async fn http_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .send(Prompt::new("x").unwrap(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport() {
        let server = MockServer::start().await;
        let c = client(&server);
        drop(server);

        let err = c
            .send(Prompt::new("x").unwrap(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }

    #[tokio::test]
    async fn prompt_block_reason_is_safety_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .send(Prompt::new("x").unwrap(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::SafetyBlocked(_)));
    }

    #[tokio::test]
    async fn safety_finish_without_text_is_safety_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "finishReason": "SAFETY" }]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .send(Prompt::new("x").unwrap(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "safety_blocked");
    }

    #[tokio::test]
    async fn unexpected_payloads_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let c = client(&server);
        let cfg = GenerationConfig::default();
        let first = c.send(Prompt::new("x").unwrap(), &cfg).await.unwrap_err();
        let second = c.send(Prompt::new("x").unwrap(), &cfg).await.unwrap_err();
        assert!(matches!(first, RequestError::MalformedResponse(_)));
        assert!(matches!(second, RequestError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn invalid_config_never_reaches_the_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(text_response("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let cfg = GenerationConfig {
            temperature: Some(3.0),
            ..Default::default()
        };
        let err = client(&server)
            .send(Prompt::new("x").unwrap(), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidConfig(_)));
    }
}
