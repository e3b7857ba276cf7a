use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use serde::Deserialize;

use super::{ClassifierContext, IntentClassifier, LlmProvider, Message};
use crate::errors::ClassificationFailure;
use crate::models::{Intent, IntentKind, SlotRef, TimeRange};

const SYSTEM_PROMPT: &str = r#"You are the intent classifier for an appointment booking assistant. Classify the user's latest message using the conversation stage and the slots currently shown.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "intent": "request_availability|select_slot|confirm|cancel|unknown",
  "range_start": "YYYY-MM-DD HH:MM or null",
  "range_end": "YYYY-MM-DD HH:MM or null",
  "slot_index": 1,
  "slot_time": "HH:MM or null"
}

Intent rules:
- "request_availability": the user wants to book or see free times. Fill range_start/range_end only when the user gave a concrete day AND time window; otherwise leave both null.
- "select_slot": the user picks one of the shown slots, by its number (slot_index, 1-based) or by its start time (slot_time).
- "confirm": the user agrees to book the selected slot (yes, ok, book it).
- "cancel": the user wants to stop, go back, or abandon the booking.
- "unknown": anything else.
"#;

/// Shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct RawIntent {
    intent: IntentKind,
    #[serde(default)]
    range_start: Option<String>,
    #[serde(default)]
    range_end: Option<String>,
    #[serde(default)]
    slot_index: Option<usize>,
    #[serde(default)]
    slot_time: Option<String>,
}

impl RawIntent {
    fn into_intent(self) -> Intent {
        let mut intent = Intent::new(self.intent);

        let start = self.range_start.as_deref().and_then(parse_datetime);
        let end = self.range_end.as_deref().and_then(parse_datetime);
        if let (Some(start), Some(end)) = (start, end) {
            intent = intent.with_range(TimeRange::new(start, end));
        }

        if let Some(index) = self.slot_index {
            intent = intent.with_slot_ref(SlotRef::Index(index));
        } else if let Some(time) = self.slot_time.as_deref().and_then(parse_time) {
            intent = intent.with_slot_ref(SlotRef::StartTime(time));
        }

        intent
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Classifier backed by a chat model. Provider errors and unparseable
/// replies both come back as `Unknown`.
pub struct LlmIntentClassifier {
    llm: Box<dyn LlmProvider>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Box<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, utterance: &str, ctx: &ClassifierContext<'_>) -> Intent {
        let mut messages: Vec<Message> = ctx
            .recent
            .iter()
            .map(|content| Message {
                role: "user".to_string(),
                content: content.clone(),
            })
            .collect();
        messages.push(Message {
            role: "user".to_string(),
            content: utterance.to_string(),
        });

        let system = format!("{SYSTEM_PROMPT}\n{}", describe_context(ctx));

        let response = match self.llm.chat(&system, &messages).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "intent provider failed, treating as unknown");
                return Intent::unknown();
            }
        };

        match parse_intent_response(&response) {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse intent, treating as unknown");
                Intent::unknown()
            }
        }
    }
}

fn describe_context(ctx: &ClassifierContext<'_>) -> String {
    let mut lines = vec![
        format!("Current time: {}", ctx.now.format("%A %Y-%m-%d %H:%M")),
        format!("Conversation stage: {}", ctx.stage.as_str()),
    ];
    if ctx.presented.is_empty() {
        lines.push("Slots currently shown: none".to_string());
    } else {
        lines.push("Slots currently shown:".to_string());
        for (i, slot) in ctx.presented.iter().enumerate() {
            lines.push(format!(
                "{}. {} ({})",
                i + 1,
                slot.formatted(),
                slot.start.format("%Y-%m-%d %H:%M")
            ));
        }
    }
    lines.join("\n")
}

fn parse_intent_response(response: &str) -> Result<Intent, ClassificationFailure> {
    if let Ok(raw) = serde_json::from_str::<RawIntent>(response) {
        return Ok(raw.into_intent());
    }

    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(raw) = serde_json::from_str::<RawIntent>(cleaned) {
        return Ok(raw.into_intent());
    }

    // Last resort: the outermost {...} in a chatty reply
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(raw) = serde_json::from_str::<RawIntent>(&cleaned[start..=end]) {
                return Ok(raw.into_intent());
            }
        }
    }

    Err(ClassificationFailure(format!(
        "no intent JSON in model reply: {}",
        response.chars().take(120).collect::<String>()
    )))
}
