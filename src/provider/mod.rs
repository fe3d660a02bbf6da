mod types;

#[cfg(feature = "google")]
pub mod google;
pub mod stub;

pub use types::{BlockThreshold, GenerationConfig, HarmCategory, Prompt, PromptClient, RequestError};
