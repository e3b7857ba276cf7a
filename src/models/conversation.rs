use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// How many user utterances are kept as classifier context.
pub const RECENT_UTTERANCE_LIMIT: usize = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    AwaitingDateRange,
    PresentingSlots,
    AwaitingConfirmation,
    Completed,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::AwaitingDateRange => "awaiting_date_range",
            Stage::PresentingSlots => "presenting_slots",
            Stage::AwaitingConfirmation => "awaiting_confirmation",
            Stage::Completed => "completed",
            Stage::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub conversation_id: String,
    pub stage: Stage,
    /// Slot ids in the order they were last presented.
    #[serde(default)]
    pub candidate_slot_ids: Vec<String>,
    #[serde(default)]
    pub selected_slot_id: Option<String>,
    #[serde(default)]
    pub turn: u64,
    #[serde(default)]
    pub recent_utterances: Vec<String>,
    pub updated_at: NaiveDateTime,
}

impl ConversationState {
    pub fn new(conversation_id: &str, now: NaiveDateTime) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            stage: Stage::Idle,
            candidate_slot_ids: vec![],
            selected_slot_id: None,
            turn: 0,
            recent_utterances: vec![],
            updated_at: now,
        }
    }

    pub fn remember_utterance(&mut self, utterance: &str) {
        self.recent_utterances.push(utterance.to_string());
        if self.recent_utterances.len() > RECENT_UTTERANCE_LIMIT {
            let overflow = self.recent_utterances.len() - RECENT_UTTERANCE_LIMIT;
            self.recent_utterances.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-06-16 08:00", "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Cancelled.is_terminal());
        assert!(!Stage::AwaitingConfirmation.is_terminal());
        assert!(!Stage::Idle.is_terminal());
    }

    #[test]
    fn test_recent_utterances_are_capped() {
        let mut state = ConversationState::new("c-1", now());
        for i in 0..10 {
            state.remember_utterance(&format!("msg {i}"));
        }
        assert_eq!(state.recent_utterances.len(), RECENT_UTTERANCE_LIMIT);
        assert_eq!(state.recent_utterances[0], "msg 4");
        assert_eq!(state.recent_utterances.last().unwrap(), "msg 9");
    }
}
