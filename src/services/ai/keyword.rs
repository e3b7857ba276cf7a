use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use super::{ClassifierContext, IntentClassifier};
use crate::models::{Intent, IntentKind, SlotRef, Stage, TimeRange};

const CANCEL_PHRASES: &[&str] = &[
    "cancel",
    "never mind",
    "nevermind",
    "forget it",
    "stop",
    "abort",
    "start over",
];

const CONFIRM_PHRASES: &[&str] = &[
    "confirm",
    "yes",
    "yep",
    "yeah",
    "sure",
    "ok",
    "okay",
    "sounds good",
    "that works",
    "book it",
];

/// A confirm phrase next to any of these is not a confirmation
/// ("not sure", "ok but ...", "don't book it").
const HEDGE_WORDS: &[&str] = &[
    "not", "no", "don", "dont", "never", "cannot", "but", "maybe", "unsure", "wait", "hmm",
];

const BOOKING_WORDS: &[&str] = &[
    "book",
    "schedule",
    "appointment",
    "meeting",
    "available",
    "availability",
    "free",
    "slots",
    "times",
    "open",
    "show",
    "call",
    "consultation",
    "interview",
    "demo",
];

const ORDINALS: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("mon", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("tue", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("wed", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("thu", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("fri", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

/// Rule-based classifier. Deterministic for a given utterance, stage and
/// clock, which also makes it the default when no model is configured.
pub struct KeywordClassifier {
    open_hour: u32,
    close_hour: u32,
}

impl KeywordClassifier {
    pub fn new(open_hour: u32, close_hour: u32) -> Self {
        Self {
            open_hour,
            close_hour,
        }
    }

    pub fn classify_text(&self, utterance: &str, stage: Stage, now: NaiveDateTime) -> Intent {
        let text = utterance.trim().to_lowercase();
        let tokens = tokenize(&text);
        if tokens.is_empty() {
            return Intent::unknown();
        }

        if has_any_phrase(&tokens, CANCEL_PHRASES)
            || (stage == Stage::AwaitingConfirmation && has_any_phrase(&tokens, &["no", "nope"]))
        {
            return Intent::new(IntentKind::Cancel);
        }

        if has_any_phrase(&tokens, CONFIRM_PHRASES) && !has_any_phrase(&tokens, HEDGE_WORDS) {
            return Intent::new(IntentKind::Confirm);
        }

        let times = find_times(&tokens);
        let date = find_date(&tokens, now.date());

        if matches!(stage, Stage::PresentingSlots | Stage::AwaitingConfirmation) && date.is_none() {
            if let [time] = times.as_slice() {
                return Intent::new(IntentKind::SelectSlot).with_slot_ref(SlotRef::StartTime(*time));
            }
            if let Some(index) = find_index(&tokens) {
                return Intent::new(IntentKind::SelectSlot).with_slot_ref(SlotRef::Index(index));
            }
        }

        let asks_for_booking = tokens.iter().any(|t| BOOKING_WORDS.contains(&t.as_str()));
        let window = find_window(&tokens, &times);
        let answering_range = stage == Stage::AwaitingDateRange;

        let range = match (date, window) {
            (Some(DateHint::Week(monday)), _) => self.week_range(monday),
            (Some(DateHint::Day(day)), Some((start, end))) => Some(day_range(day, start, end)),
            (Some(DateHint::Day(day)), None) if answering_range => self.business_day(day),
            (Some(DateHint::Day(_)), None) => None,
            (None, Some((start, end))) if answering_range || asks_for_booking => {
                let day = if start > now.time() {
                    now.date()
                } else {
                    now.date() + Duration::days(1)
                };
                Some(day_range(day, start, end))
            }
            (None, _) => None,
        };

        if asks_for_booking || range.is_some() || date.is_some() {
            let intent = Intent::new(IntentKind::RequestAvailability);
            return match range {
                Some(range) => intent.with_range(range),
                None => intent,
            };
        }

        Intent::unknown()
    }

    fn business_day(&self, day: NaiveDate) -> Option<TimeRange> {
        let start = day.and_hms_opt(self.open_hour, 0, 0)?;
        let end = day.and_hms_opt(self.close_hour, 0, 0)?;
        Some(TimeRange::new(start, end))
    }

    fn week_range(&self, monday: NaiveDate) -> Option<TimeRange> {
        let start = monday.and_hms_opt(self.open_hour, 0, 0)?;
        let end = (monday + Duration::days(4)).and_hms_opt(self.close_hour, 0, 0)?;
        Some(TimeRange::new(start, end))
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, utterance: &str, ctx: &ClassifierContext<'_>) -> Intent {
        self.classify_text(utterance, ctx.stage, ctx.now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateHint {
    Day(NaiveDate),
    /// Monday of the week meant.
    Week(NaiveDate),
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == ':' || c == '#' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-word phrase match; "ok" must not hit "book".
fn has_phrase(tokens: &[String], phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    tokens
        .windows(words.len())
        .any(|w| w.iter().zip(&words).all(|(t, p)| t == p))
}

fn has_any_phrase(tokens: &[String], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| has_phrase(tokens, p))
}

fn find_date(tokens: &[String], today: NaiveDate) -> Option<DateHint> {
    if has_phrase(tokens, "next week") {
        let days_to_monday = 7 - today.weekday().num_days_from_monday() as i64;
        return Some(DateHint::Week(today + Duration::days(days_to_monday)));
    }

    for token in tokens {
        match token.as_str() {
            "today" => return Some(DateHint::Day(today)),
            "tomorrow" => return Some(DateHint::Day(today + Duration::days(1))),
            _ => {}
        }
        if let Some((_, weekday)) = WEEKDAYS.iter().find(|(name, _)| *name == token.as_str()) {
            let mut ahead = weekday.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64;
            if ahead <= 0 {
                ahead += 7;
            }
            return Some(DateHint::Day(today + Duration::days(ahead)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
            return Some(DateHint::Day(date));
        }
    }
    None
}

/// Clock times with an am/pm marker or a colon. Bare numbers are left
/// alone so they can be read as list positions.
fn find_times(tokens: &[String]) -> Vec<NaiveTime> {
    let mut times = vec![];
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1).map(String::as_str);
        for part in token.split('-').filter(|p| !p.is_empty()) {
            if let Some(t) = parse_clock(part, next) {
                times.push(t);
            }
        }
    }
    times
}

fn parse_clock(token: &str, next: Option<&str>) -> Option<NaiveTime> {
    let (body, meridiem) = if let Some(b) = token.strip_suffix("am") {
        (b, Some(false))
    } else if let Some(b) = token.strip_suffix("pm") {
        (b, Some(true))
    } else {
        match next {
            Some("am") => (token, Some(false)),
            Some("pm") => (token, Some(true)),
            _ => (token, None),
        }
    };

    let (hour, minute) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        None if meridiem.is_some() => (body.parse::<u32>().ok()?, 0),
        None => return None,
    };

    let hour = match meridiem {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (pm, hour) {
                (false, 12) => 0,
                (true, 12) => 12,
                (true, h) => h + 12,
                (false, h) => h,
            }
        }
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn find_window(tokens: &[String], times: &[NaiveTime]) -> Option<(NaiveTime, NaiveTime)> {
    match times {
        [start, end, ..] if start < end => return Some((*start, *end)),
        [start, ..] => {
            let (end, wrapped) = start.overflowing_add_signed(Duration::hours(1));
            let end = if wrapped != 0 {
                NaiveTime::from_hms_opt(23, 59, 59)?
            } else {
                end
            };
            return Some((*start, end));
        }
        [] => {}
    }

    let hm = |h| NaiveTime::from_hms_opt(h, 0, 0);
    for token in tokens {
        match token.as_str() {
            "morning" => return Some((hm(9)?, hm(12)?)),
            "afternoon" => return Some((hm(12)?, hm(17)?)),
            "evening" => return Some((hm(17)?, hm(20)?)),
            _ => {}
        }
    }
    None
}

fn find_index(tokens: &[String]) -> Option<usize> {
    if let [only] = tokens {
        if let Ok(n) = only.trim_start_matches('#').parse::<usize>() {
            return Some(n);
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if let Some(n) = token.strip_prefix('#').and_then(|n| n.parse().ok()) {
            return Some(n);
        }
        if matches!(token.as_str(), "slot" | "number" | "option") {
            if let Some(n) = tokens.get(i + 1).and_then(|n| n.parse().ok()) {
                return Some(n);
            }
        }
        if let Some(pos) = ORDINALS.iter().position(|o| *o == token.as_str()) {
            return Some(pos + 1);
        }
    }
    None
}

fn day_range(day: NaiveDate, start: NaiveTime, end: NaiveTime) -> TimeRange {
    TimeRange::new(day.and_time(start), day.and_time(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-06-16 is a Monday
    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-06-16 08:00", "%Y-%m-%d %H:%M").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn classify(text: &str, stage: Stage) -> Intent {
        KeywordClassifier::new(9, 17).classify_text(text, stage, now())
    }

    #[test]
    fn test_booking_with_day_only_has_no_range() {
        let intent = classify("book a meeting tomorrow", Stage::Idle);
        assert_eq!(intent.kind, IntentKind::RequestAvailability);
        assert!(intent.params.range.is_none());
    }

    #[test]
    fn test_day_and_time_of_day_gives_range() {
        let intent = classify("book a meeting tomorrow afternoon", Stage::Idle);
        assert_eq!(
            intent.params.range,
            Some(TimeRange::new(dt("2025-06-17 12:00"), dt("2025-06-17 17:00")))
        );
    }

    #[test]
    fn test_day_answer_while_awaiting_range_uses_business_day() {
        let intent = classify("tomorrow", Stage::AwaitingDateRange);
        assert_eq!(intent.kind, IntentKind::RequestAvailability);
        assert_eq!(
            intent.params.range,
            Some(TimeRange::new(dt("2025-06-17 09:00"), dt("2025-06-17 17:00")))
        );
    }

    #[test]
    fn test_explicit_window() {
        let intent = classify("friday between 2pm and 4:30pm", Stage::AwaitingDateRange);
        assert_eq!(
            intent.params.range,
            Some(TimeRange::new(dt("2025-06-20 14:00"), dt("2025-06-20 16:30")))
        );
    }

    #[test]
    fn test_weekday_today_means_next_week() {
        let intent = classify("schedule a call monday morning", Stage::Idle);
        assert_eq!(
            intent.params.range,
            Some(TimeRange::new(dt("2025-06-23 09:00"), dt("2025-06-23 12:00")))
        );
    }

    #[test]
    fn test_next_week() {
        let intent = classify("any free slots next week?", Stage::Idle);
        assert_eq!(
            intent.params.range,
            Some(TimeRange::new(dt("2025-06-23 09:00"), dt("2025-06-27 17:00")))
        );
    }

    #[test]
    fn test_iso_date_with_single_time() {
        let intent = classify("book 2025-07-01 at 10am", Stage::Idle);
        assert_eq!(
            intent.params.range,
            Some(TimeRange::new(dt("2025-07-01 10:00"), dt("2025-07-01 11:00")))
        );
    }

    #[test]
    fn test_time_without_day_picks_next_occurrence() {
        let later = classify("book at 3pm", Stage::Idle);
        assert_eq!(
            later.params.range,
            Some(TimeRange::new(dt("2025-06-16 15:00"), dt("2025-06-16 16:00")))
        );
        let earlier = classify("book at 7am", Stage::Idle);
        assert_eq!(
            earlier.params.range,
            Some(TimeRange::new(dt("2025-06-17 07:00"), dt("2025-06-17 08:00")))
        );
    }

    #[test]
    fn test_selection_by_number() {
        for text in ["2", "#2", "slot 2", "number 2", "the second one"] {
            let intent = classify(text, Stage::PresentingSlots);
            assert_eq!(intent.kind, IntentKind::SelectSlot, "{text}");
            assert_eq!(intent.params.slot_ref, Some(SlotRef::Index(2)), "{text}");
        }
    }

    #[test]
    fn test_selection_by_time() {
        let intent = classify("the 2:30pm one", Stage::PresentingSlots);
        assert_eq!(
            intent.params.slot_ref,
            Some(SlotRef::StartTime(NaiveTime::from_hms_opt(14, 30, 0).unwrap()))
        );
    }

    #[test]
    fn test_number_outside_selection_is_unknown() {
        assert_eq!(classify("2", Stage::Idle).kind, IntentKind::Unknown);
    }

    #[test]
    fn test_confirm_words_are_whole_words() {
        assert_eq!(classify("yes", Stage::AwaitingConfirmation).kind, IntentKind::Confirm);
        assert_eq!(classify("Sounds good!", Stage::AwaitingConfirmation).kind, IntentKind::Confirm);
        // "book" contains "ok" but is a booking request
        assert_eq!(classify("book", Stage::Idle).kind, IntentKind::RequestAvailability);
    }

    #[test]
    fn test_hedged_confirm_is_not_a_confirmation() {
        for text in ["hmm, I'm not sure", "not sure", "I don't know, ok?", "maybe, yes"] {
            assert_eq!(
                classify(text, Stage::AwaitingConfirmation).kind,
                IntentKind::Unknown,
                "{text}"
            );
        }
        let intent = classify("ok but show me other times", Stage::AwaitingConfirmation);
        assert_ne!(intent.kind, IntentKind::Confirm);
        assert_eq!(classify("yes please, book it", Stage::AwaitingConfirmation).kind, IntentKind::Confirm);
    }

    #[test]
    fn test_cancel() {
        assert_eq!(classify("cancel that", Stage::PresentingSlots).kind, IntentKind::Cancel);
        assert_eq!(classify("never mind", Stage::Idle).kind, IntentKind::Cancel);
        assert_eq!(classify("no", Stage::AwaitingConfirmation).kind, IntentKind::Cancel);
        assert_eq!(classify("no", Stage::Idle).kind, IntentKind::Unknown);
    }

    #[test]
    fn test_gibberish_is_unknown() {
        assert_eq!(classify("what's the weather", Stage::Idle).kind, IntentKind::Unknown);
        assert_eq!(classify("   ", Stage::Idle).kind, IntentKind::Unknown);
    }
}
