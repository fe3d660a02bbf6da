use super::{GenerationConfig, Prompt, PromptClient, RequestError};
use futures_core::future::BoxFuture;
use std::time::Duration;

/// Offline client that echoes the prompt back after a short delay.
#[derive(Debug, Default, Clone)]
pub struct StubClient {
    latency: Duration,
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(120),
        }
    }
}

impl PromptClient for StubClient {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn send(&self, prompt: Prompt, config: &GenerationConfig) -> BoxFuture<'static, Result<String, RequestError>> {
        let latency = self.latency;
        let checked = config.validate();

        Box::pin(async move {
            checked?;
            tokio::time::sleep(latency).await;
            Ok(format!(
                "**[stub client]***You said: {prompt}*(No request was sent to Gemini.)"
            ))
        })
    }
}
