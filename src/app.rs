use crate::config::{self, Config};
use crate::format::{Glyph, MarkupReader};
use crate::provider::{self, PromptClient};
use crate::render::RenderState;
use crate::store::ConversationStore;
use anyhow::Context;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

pub const DEFAULT_MODEL: &str = "gemini-1.0-pro";
pub const DEFAULT_PROVIDER: &str = "google";

/// Effective settings after CLI flags, config file and defaults are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub model: String,
    pub provider: String,
    pub tick_interval: Duration,
}

impl Settings {
    pub fn resolve(
        model: Option<String>,
        provider: Option<String>,
        tick_ms: Option<u64>,
        cfg: Option<&Config>,
    ) -> Self {
        let model = model
            .or_else(|| cfg.and_then(|c| c.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let provider = provider
            .or_else(|| cfg.and_then(|c| c.provider.clone()))
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        let tick_ms = tick_ms.unwrap_or_else(|| {
            cfg.map(|c| c.render.tick_interval_ms)
                .unwrap_or_else(|| config::RenderConfig::default().tick_interval_ms)
        });

        Self {
            model,
            provider,
            tick_interval: Duration::from_millis(tick_ms),
        }
    }
}

pub fn build_client(
    http: &reqwest::Client,
    cfg: Option<&Config>,
    settings: &Settings,
) -> anyhow::Result<Arc<dyn PromptClient + Send + Sync>> {
    match settings.provider.as_str() {
        "google" => {
            #[cfg(feature = "google")]
            {
                let api_key = std::env::var("GEMINI_API_KEY")
                    .ok()
                    .or_else(|| cfg.and_then(|c| c.api_key.clone()))
                    .context("missing API key (set GEMINI_API_KEY or api_key in config.toml)")?;

                let api_base = std::env::var("GEMINI_BASE_URL")
                    .ok()
                    .or_else(|| cfg.and_then(|c| c.api_base.clone()))
                    .unwrap_or_else(|| provider::google::DEFAULT_API_BASE.to_string());

                let client = provider::google::GoogleClient::with_base(
                    http.clone(),
                    api_key,
                    settings.model.clone(),
                    &api_base,
                )
                .with_context(|| format!("invalid API base URL: {api_base}"))?;
                Ok(Arc::new(client))
            }
            #[cfg(not(feature = "google"))]
            {
                let _ = http;
                let _ = cfg;
                anyhow::bail!("google client is not enabled in this build")
            }
        }
        "stub" => Ok(Arc::new(provider::stub::StubClient::new())),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

pub fn build_store(
    http: &reqwest::Client,
    cfg: Option<&Config>,
    settings: &Settings,
) -> anyhow::Result<ConversationStore> {
    let client = build_client(http, cfg, settings)?;
    let generation = cfg.map(|c| c.generation.clone()).unwrap_or_default();
    ConversationStore::new(client, generation, settings.tick_interval)
        .context("invalid [generation] settings")
}

/// Submit one prompt and print the answer to `out` as it is revealed.
pub async fn run_once(
    store: &ConversationStore,
    prompt: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut updates = WatchStream::new(store.subscribe());
    let handle = store
        .submit(Some(prompt))
        .context("No prompt provided. Try: gemini-chat \"Hello\" or `gemini-chat tui`")?;

    let mut printer = AnsiPrinter::default();
    let mut shown = 0;
    while let Some(state) = updates.next().await {
        if let Some(fresh) = state.rendered_answer.get(shown..) {
            printer.write(fresh, out)?;
            shown = state.rendered_answer.len();
        }
        if state.result_ready && state.render != RenderState::Revealing {
            break;
        }
    }
    handle.await.context("submission task panicked")?;
    printer.finish(out)?;

    if store.history().is_empty() {
        anyhow::bail!("request failed (see log output above)");
    }
    Ok(())
}

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Turns revealed markup into terminal text: emphasis is bold, breaks are newlines.
#[derive(Debug, Default)]
struct AnsiPrinter {
    reader: MarkupReader,
    bold: bool,
    glyphs: Vec<Glyph>,
}

impl AnsiPrinter {
    fn write(&mut self, markup: &str, out: &mut impl Write) -> std::io::Result<()> {
        for ch in markup.chars() {
            self.reader.push(ch, &mut self.glyphs);
        }
        self.drain(out)?;
        out.flush()
    }

    fn finish(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        self.reader.finish(&mut self.glyphs);
        self.drain(out)?;
        if self.bold {
            out.write_all(RESET.as_bytes())?;
            self.bold = false;
        }
        writeln!(out)?;
        out.flush()
    }

    fn drain(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        let mut buf = String::new();
        for glyph in self.glyphs.drain(..) {
            match glyph {
                Glyph::Char { ch, emphasized } => {
                    if emphasized != self.bold {
                        buf.push_str(if emphasized { BOLD } else { RESET });
                        self.bold = emphasized;
                    }
                    buf.push(ch);
                }
                Glyph::LineBreak => {
                    if self.bold {
                        buf.push_str(RESET);
                        self.bold = false;
                    }
                    buf.push('\n');
                }
            }
        }
        out.write_all(buf.as_bytes())
    }
}
