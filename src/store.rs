//! Session state for one chat, and the submit/reset operations that drive it.

use crate::format;
use crate::provider::{GenerationConfig, Prompt, PromptClient, RequestError};
use crate::render::{self, RenderState, RenderTick};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shown in place of an answer when a request fails for any reason.
pub const FALLBACK_ANSWER: &str = "An error occurred. Please try again.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub input: String,
    pub recent_prompt: String,
    pub history: Vec<Prompt>,
    pub rendered_answer: String,
    /// True while a request is in flight. Reveal progress is tracked by
    /// `render`, not by this flag.
    pub busy: bool,
    pub result_ready: bool,
    pub render: RenderState,
}

/// Handle to one chat session. Clones share the same session.
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn PromptClient + Send + Sync>,
    generation: GenerationConfig,
    tick_interval: Duration,
    state: watch::Sender<SessionState>,
    // Bumped by every submit and reset. Work tagged with an older value is stale.
    epoch: AtomicU64,
}

impl ConversationStore {
    pub fn new(
        client: Arc<dyn PromptClient + Send + Sync>,
        generation: GenerationConfig,
        tick_interval: Duration,
    ) -> Result<Self, RequestError> {
        generation.validate()?;
        let (state, _) = watch::channel(SessionState::default());
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                generation,
                tick_interval,
                state,
                epoch: AtomicU64::new(0),
            }),
        })
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn history(&self) -> Vec<Prompt> {
        self.inner.state.borrow().history.clone()
    }

    pub fn rendered_answer(&self) -> String {
        self.inner.state.borrow().rendered_answer.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.state.borrow().busy
    }

    pub fn render_state(&self) -> RenderState {
        self.inner.state.borrow().render
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.state.send_modify(|s| s.input = text);
    }

    pub fn reset_input(&self) {
        self.inner.state.send_if_modified(|s| {
            if s.input.is_empty() {
                return false;
            }
            s.input.clear();
            true
        });
    }

    /// Start a new session: every field back to its initial value, history
    /// included. Pending work from earlier submissions is discarded.
    pub fn reset(&self) {
        self.inner.state.send_modify(|s| {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            *s = SessionState::default();
        });
    }

    /// Submit `prompt_override`, or the current input if the override is
    /// absent or blank.
    ///
    /// Returns `None` without touching any state when there is nothing to
    /// send. Otherwise the request runs on a spawned task; the handle resolves
    /// once the answer has been fully revealed, has failed, or was superseded.
    pub fn submit(&self, prompt_override: Option<&str>) -> Option<JoinHandle<()>> {
        let mut dispatch = None;
        self.inner.state.send_if_modified(|s| {
            let text = match prompt_override {
                Some(p) if !p.trim().is_empty() => p.to_string(),
                _ => s.input.clone(),
            };
            let Ok(prompt) = Prompt::new(text) else {
                return false;
            };

            let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            s.busy = true;
            s.rendered_answer.clear();
            s.result_ready = false;
            s.render = RenderState::Idle;
            dispatch = Some((epoch, prompt));
            true
        });

        let (epoch, prompt) = dispatch?;
        tracing::debug!(epoch, client = self.inner.client.name(), "dispatching prompt");

        let request = self.inner.client.send(prompt.clone(), &self.inner.generation);
        let store = self.clone();
        Some(tokio::spawn(async move {
            let result = request.await;
            store.conclude(epoch, prompt, result).await;
        }))
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    async fn conclude(&self, epoch: u64, prompt: Prompt, result: Result<String, RequestError>) {
        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "prompt request failed");
                self.inner.state.send_if_modified(|s| {
                    if !self.is_current(epoch) {
                        return false;
                    }
                    s.rendered_answer = FALLBACK_ANSWER.to_string();
                    s.busy = false;
                    s.result_ready = true;
                    s.input.clear();
                    true
                });
                return;
            }
        };

        let ticks = render::plan(&format::format_response(&raw), self.inner.tick_interval);
        let total = ticks.len();

        let accepted = self.inner.state.send_if_modified(|s| {
            if !self.is_current(epoch) {
                return false;
            }
            s.history.push(prompt.clone());
            s.recent_prompt = prompt.to_string();
            s.busy = false;
            s.result_ready = true;
            s.input.clear();
            s.render = if total == 0 {
                RenderState::Complete
            } else {
                RenderState::Revealing
            };
            true
        });
        if !accepted {
            tracing::debug!(epoch, "discarding response for superseded submission");
            return;
        }

        render::reveal(ticks, |tick| self.apply_tick(epoch, tick, total)).await;
    }

    /// Append one revealed character. Returns `false` if `epoch` is stale, in
    /// which case nothing changes.
    fn apply_tick(&self, epoch: u64, tick: &RenderTick, total: usize) -> bool {
        let mut current = true;
        self.inner.state.send_if_modified(|s| {
            if !self.is_current(epoch) {
                current = false;
                return false;
            }
            s.rendered_answer.push(tick.unit);
            if tick.index + 1 >= total {
                s.render = RenderState::Complete;
            }
            true
        });
        current
    }
}
