//! Text generation trait for LLM-backed explanations.
//!
//! [`TextGenerator`] is the seam between prompt assembly in
//! [`crate::narrative`] and whichever chat model answers it. The crate ships
//! an OpenAI implementation behind the `ai` feature; tests and offline use
//! plug in their own.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A chat prompt made of one system message and one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Trait for chat models that turn a prompt into text.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow usage across threads.
pub trait TextGenerator: Send + Sync {
    /// Send `prompt` to the model and return its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the reply holds no text.
    fn generate(&self, prompt: &ChatPrompt) -> Result<String>;

    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Model used by this provider, if it exposes one.
    fn model(&self) -> Option<&str> {
        None
    }
}
