pub mod intent;
pub mod keyword;
pub mod providers;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{Intent, Slot, Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String>;
}

/// What a classifier may look at besides the utterance itself.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierContext<'a> {
    pub stage: Stage,
    /// Slots as last presented, in presentation order.
    pub presented: &'a [Slot],
    /// Earlier user utterances, oldest first, excluding the current one.
    pub recent: &'a [String],
    pub now: NaiveDateTime,
}

/// Maps an utterance to an intent. Implementations never fail: anything
/// they cannot make sense of comes back as `IntentKind::Unknown`.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &str, ctx: &ClassifierContext<'_>) -> Intent;
}
