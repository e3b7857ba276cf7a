use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::TimeRange;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    RequestAvailability,
    SelectSlot,
    Confirm,
    Cancel,
    Unknown,
}

/// A reference to one of the slots last shown to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotRef {
    /// 1-based position in the presented list.
    Index(usize),
    StartTime(NaiveTime),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentParams {
    pub range: Option<TimeRange>,
    pub slot_ref: Option<SlotRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    #[serde(default)]
    pub params: IntentParams,
}

impl Intent {
    pub fn new(kind: IntentKind) -> Self {
        Self {
            kind,
            params: IntentParams::default(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(IntentKind::Unknown)
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.params.range = Some(range);
        self
    }

    pub fn with_slot_ref(mut self, slot_ref: SlotRef) -> Self {
        self.params.slot_ref = Some(slot_ref);
        self
    }
}
