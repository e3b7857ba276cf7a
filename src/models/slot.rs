use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: SlotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
}

impl Slot {
    /// Half-open overlap test against `[start, end)`.
    pub fn overlaps(&self, start: &NaiveDateTime, end: &NaiveDateTime) -> bool {
        self.start < *end && self.end > *start
    }

    pub fn formatted(&self) -> String {
        self.start.format("%A, %B %d at %I:%M %p").to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Held,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Free => "free",
            SlotStatus::Held => "held",
            SlotStatus::Booked => "booked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "held" => SlotStatus::Held,
            "booked" => SlotStatus::Booked,
            _ => SlotStatus::Free,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn slot(start: &str, end: &str) -> Slot {
        Slot {
            id: "s-1".to_string(),
            start: dt(start),
            end: dt(end),
            status: SlotStatus::Free,
            holder: None,
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let s = slot("2025-06-16 09:00", "2025-06-16 10:00");
        assert!(s.overlaps(&dt("2025-06-16 09:30"), &dt("2025-06-16 11:00")));
        assert!(s.overlaps(&dt("2025-06-16 08:00"), &dt("2025-06-16 09:01")));
        assert!(!s.overlaps(&dt("2025-06-16 10:00"), &dt("2025-06-16 11:00")));
        assert!(!s.overlaps(&dt("2025-06-16 08:00"), &dt("2025-06-16 09:00")));
    }

    #[test]
    fn test_formatted() {
        let s = slot("2025-06-16 14:00", "2025-06-16 15:00");
        assert_eq!(s.formatted(), "Monday, June 16 at 02:00 PM");
    }

    #[test]
    fn test_empty_range() {
        assert!(TimeRange::new(dt("2025-06-16 10:00"), dt("2025-06-16 10:00")).is_empty());
        assert!(TimeRange::new(dt("2025-06-16 11:00"), dt("2025-06-16 10:00")).is_empty());
        assert!(!TimeRange::new(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).is_empty());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(SlotStatus::parse("held"), SlotStatus::Held);
        assert_eq!(SlotStatus::parse("booked"), SlotStatus::Booked);
        assert_eq!(SlotStatus::parse("free"), SlotStatus::Free);
    }
}
