//! LLM providers for natural-language explanations.
//!
//! # Feature Flag
//!
//! The [`TextGenerator`] trait is always available. The OpenAI provider
//! needs the `ai` feature (on by default).
//!
//! ```toml
//! # Disable the HTTP client for a smaller binary
//! lex-fairness = { version = "0.1", default-features = false }
//! ```

mod provider;
pub use provider::{ChatPrompt, TextGenerator};

#[cfg(feature = "ai")]
mod openai;

#[cfg(feature = "ai")]
pub use openai::{API_KEY_ENV, OpenAiConfig, OpenAiConfigBuilder, OpenAiProvider};
