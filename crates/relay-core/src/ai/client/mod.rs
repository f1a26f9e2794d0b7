//! LLM client
//!
//! - `AiClientConfig` - endpoint, model and wire format
//! - `AiClient` - reqwest implementation of `LanguageModel`

mod config;
mod core;

pub use config::AiClientConfig;
pub use self::core::AiClient;
