use serde::{Deserialize, Serialize};

use super::{Slot, Stage};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AskedForRange,
    PresentedSlots,
    NoSlotsAvailable,
    HeldSlot,
    Booked,
    ReleasedHold,
    Cancelled,
    NotUnderstood,
    OutOfStage,
    Failed,
}

/// What one turn produced, as handed back to the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots_shown: Option<Vec<Slot>>,
    pub action: Action,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn new(action: Action, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            slots_shown: None,
            action,
            stage,
            appointment_id: None,
            error: None,
        }
    }

    pub fn with_slots(mut self, slots: Vec<Slot>) -> Self {
        self.slots_shown = Some(slots);
        self
    }

    pub fn with_appointment(mut self, appointment_id: &str) -> Self {
        self.appointment_id = Some(appointment_id.to_string());
        self
    }

    pub fn with_error(mut self, code: &str) -> Self {
        self.error = Some(code.to_string());
        self
    }
}
