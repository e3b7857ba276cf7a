use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::Utc;

use crate::errors::BookingError;
use crate::models::{
    Action, ConversationState, Intent, IntentKind, Response, Slot, SlotRef, SlotStatus, Stage,
    TimeRange,
};
use crate::services::ai::{ClassifierContext, IntentClassifier};
use crate::services::availability::AvailabilityStore;
use crate::services::conversation::ConversationStore;

type TurnLock = Arc<tokio::sync::Mutex<()>>;

/// Drives one conversation turn at a time: classify, transition, commit.
///
/// Turns for the same conversation id are serialized; turns for different
/// ids run in parallel and only meet at the availability store.
pub struct Orchestrator {
    availability: Arc<AvailabilityStore>,
    conversations: Arc<dyn ConversationStore>,
    classifier: Box<dyn IntentClassifier>,
    max_slots_shown: usize,
    turn_locks: Mutex<HashMap<String, TurnLock>>,
}

impl Orchestrator {
    pub fn new(
        availability: Arc<AvailabilityStore>,
        conversations: Arc<dyn ConversationStore>,
        classifier: Box<dyn IntentClassifier>,
        max_slots_shown: usize,
    ) -> Self {
        Self {
            availability,
            conversations,
            classifier,
            max_slots_shown: max_slots_shown.max(1),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The single entry point for a user message. Only a failure to read
    /// or write conversation state is returned as an error; everything
    /// else becomes a `Response`.
    pub async fn handle_turn(
        &self,
        conversation_id: &str,
        utterance: &str,
    ) -> anyhow::Result<Response> {
        let lock = self.turn_lock(conversation_id)?;
        let result = {
            let _turn = lock.lock().await;
            self.run_turn(conversation_id, utterance).await
        };
        self.forget_turn_lock(conversation_id, &lock);
        result
    }

    async fn run_turn(&self, conversation_id: &str, utterance: &str) -> anyhow::Result<Response> {
        let now = Utc::now().naive_utc();
        let state = self.conversations.get(conversation_id)?;

        let presented = self.presented_slots(&state);
        let intent = {
            let ctx = ClassifierContext {
                stage: state.stage,
                presented: &presented,
                recent: &state.recent_utterances,
                now,
            };
            self.classifier.classify(utterance, &ctx).await
        };

        tracing::info!(
            conversation_id,
            stage = state.stage.as_str(),
            intent = ?intent.kind,
            "processing turn"
        );

        let (mut next, response) = self.transition(&state, &intent, &presented);
        next.turn = state.turn + 1;
        next.updated_at = now;
        next.remember_utterance(utterance);

        self.conversations.put(conversation_id, &next)?;

        if next.stage != state.stage {
            tracing::info!(
                conversation_id,
                from = state.stage.as_str(),
                to = next.stage.as_str(),
                action = ?response.action,
                "stage changed"
            );
        }
        Ok(response)
    }

    fn turn_lock(&self, conversation_id: &str) -> anyhow::Result<TurnLock> {
        let mut locks = self
            .turn_locks
            .lock()
            .map_err(|_| anyhow!("turn lock registry poisoned"))?;
        Ok(Arc::clone(locks.entry(conversation_id.to_string()).or_default()))
    }

    /// Drops the registry entry once no other turn is waiting on it.
    fn forget_turn_lock(&self, conversation_id: &str, lock: &TurnLock) {
        if let Ok(mut locks) = self.turn_locks.lock() {
            let idle = locks
                .get(conversation_id)
                .is_some_and(|l| Arc::ptr_eq(l, lock) && Arc::strong_count(l) == 2);
            if idle {
                locks.remove(conversation_id);
            }
        }
    }

    fn presented_slots(&self, state: &ConversationState) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(state.candidate_slot_ids.len());
        for id in &state.candidate_slot_ids {
            match self.availability.get(id) {
                Ok(Some(slot)) => slots.push(slot),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, slot_id = %id, "failed to load presented slot");
                }
            }
        }
        slots
    }

    /// Computes the full next state for one intent. Store side effects
    /// happen here and nowhere else.
    fn transition(
        &self,
        state: &ConversationState,
        intent: &Intent,
        presented: &[Slot],
    ) -> (ConversationState, Response) {
        match (state.stage, intent.kind) {
            (_, IntentKind::Unknown) => (
                state.clone(),
                Response::new(
                    Action::NotUnderstood,
                    state.stage,
                    format!("Sorry, I didn't catch that. {}", stage_hint(state.stage)),
                ),
            ),

            (Stage::Idle | Stage::AwaitingDateRange, IntentKind::RequestAvailability) => {
                match intent.params.range {
                    Some(range) => self.present_availability(state, &range),
                    None => {
                        let mut next = state.clone();
                        next.stage = Stage::AwaitingDateRange;
                        (
                            next,
                            Response::new(
                                Action::AskedForRange,
                                Stage::AwaitingDateRange,
                                "Sure! What day and time range works for you? For example \
                                 'tomorrow afternoon' or 'Friday between 2pm and 4pm'.",
                            ),
                        )
                    }
                }
            }

            (Stage::PresentingSlots | Stage::AwaitingConfirmation, IntentKind::SelectSlot) => {
                self.select_slot(state, intent, presented)
            }

            (Stage::AwaitingConfirmation, IntentKind::Confirm) => {
                self.confirm_selection(state, presented)
            }

            (Stage::AwaitingConfirmation, IntentKind::Cancel) => {
                if let Err(e) = self.release_selection(state) {
                    return self.failure(state, e);
                }
                let mut next = state.clone();
                next.stage = Stage::Idle;
                next.candidate_slot_ids.clear();
                next.selected_slot_id = None;
                (
                    next,
                    Response::new(
                        Action::ReleasedHold,
                        Stage::Idle,
                        "No problem, I've released that slot. Let me know if you'd like to look \
                         at other times.",
                    ),
                )
            }

            (stage, IntentKind::Cancel) if !stage.is_terminal() => {
                if let Err(e) = self.release_selection(state) {
                    return self.failure(state, e);
                }
                let mut next = state.clone();
                next.stage = Stage::Cancelled;
                next.candidate_slot_ids.clear();
                next.selected_slot_id = None;
                (
                    next,
                    Response::new(
                        Action::Cancelled,
                        Stage::Cancelled,
                        "Okay, I've cancelled this booking request. Message me any time to \
                         start again.",
                    ),
                )
            }

            (stage, kind) => {
                tracing::debug!(stage = stage.as_str(), intent = ?kind, "intent rejected for stage");
                (
                    state.clone(),
                    Response::new(Action::OutOfStage, stage, stage_hint(stage)),
                )
            }
        }
    }

    fn present_availability(
        &self,
        state: &ConversationState,
        range: &TimeRange,
    ) -> (ConversationState, Response) {
        let slots = match self.availability.query_available(range) {
            Ok(slots) => slots,
            Err(e) => return self.failure(state, e),
        };

        if slots.is_empty() {
            return (
                state.clone(),
                Response::new(
                    Action::NoSlotsAvailable,
                    state.stage,
                    format!(
                        "I couldn't find any free slots between {} and {}. Try another day or time.",
                        range.start.format("%A, %B %d %I:%M %p"),
                        range.end.format("%A, %B %d %I:%M %p"),
                    ),
                ),
            );
        }

        let shown: Vec<Slot> = slots.into_iter().take(self.max_slots_shown).collect();

        let mut message = String::from("I found some available time slots for you:\n\n");
        for (i, slot) in shown.iter().enumerate() {
            message.push_str(&format!("{}. {}\n", i + 1, slot.formatted()));
        }
        message.push_str("\nPlease select a slot by typing its number (e.g., '1' for the first slot).");

        let mut next = state.clone();
        next.stage = Stage::PresentingSlots;
        next.candidate_slot_ids = shown.iter().map(|s| s.id.clone()).collect();
        next.selected_slot_id = None;

        (
            next,
            Response::new(Action::PresentedSlots, Stage::PresentingSlots, message).with_slots(shown),
        )
    }

    fn select_slot(
        &self,
        state: &ConversationState,
        intent: &Intent,
        presented: &[Slot],
    ) -> (ConversationState, Response) {
        let slot_id = match resolve_reference(state, intent.params.slot_ref, presented) {
            Ok(id) => id,
            Err(e) => return self.failure(state, e),
        };

        let still_held = presented.iter().any(|s| {
            s.id == slot_id
                && s.status == SlotStatus::Held
                && s.holder.as_deref() == Some(state.conversation_id.as_str())
        });
        if still_held && state.selected_slot_id.as_deref() == Some(slot_id.as_str()) {
            let label = describe(presented, &slot_id);
            return (
                state.clone(),
                Response::new(
                    Action::HeldSlot,
                    state.stage,
                    format!("You already have {label} on hold. Reply 'yes' to confirm it."),
                ),
            );
        }

        let held = match self.availability.hold(&slot_id, &state.conversation_id) {
            Ok(slot) => slot,
            Err(e) => return self.failure(state, e),
        };

        if let Some(previous) = state.selected_slot_id.as_ref().filter(|p| **p != held.id) {
            if let Err(e) = self.availability.release(previous, &state.conversation_id) {
                tracing::warn!(
                    conversation_id = %state.conversation_id,
                    slot_id = %previous,
                    error = %e,
                    "failed to release previous hold"
                );
            }
        }

        let mut next = state.clone();
        next.stage = Stage::AwaitingConfirmation;
        next.selected_slot_id = Some(held.id.clone());

        (
            next,
            Response::new(
                Action::HeldSlot,
                Stage::AwaitingConfirmation,
                format!(
                    "Perfect! You've selected: {}\n\nWould you like to confirm this booking? \
                     Reply 'yes' to confirm or 'cancel' to go back.",
                    held.formatted()
                ),
            ),
        )
    }

    fn confirm_selection(
        &self,
        state: &ConversationState,
        presented: &[Slot],
    ) -> (ConversationState, Response) {
        let Some(slot_id) = state.selected_slot_id.as_deref() else {
            return self.failure(state, BookingError::NotHeld("no slot selected".to_string()));
        };

        let appointment = match self.availability.confirm(slot_id, &state.conversation_id) {
            Ok(a) => a,
            Err(e) => return self.failure(state, e),
        };

        let mut next = state.clone();
        next.stage = Stage::Completed;
        next.candidate_slot_ids.clear();
        next.selected_slot_id = None;

        (
            next,
            Response::new(
                Action::Booked,
                Stage::Completed,
                format!(
                    "Booking confirmed! Your appointment is scheduled for {}. Appointment ID: {}",
                    describe(presented, slot_id),
                    appointment.id
                ),
            )
            .with_appointment(&appointment.id),
        )
    }

    /// Gives up this conversation's hold, if it has one. A hold that has
    /// already lapsed counts as released.
    fn release_selection(&self, state: &ConversationState) -> Result<(), BookingError> {
        let Some(slot_id) = &state.selected_slot_id else {
            return Ok(());
        };
        match self.availability.release(slot_id, &state.conversation_id) {
            Ok(()) | Err(BookingError::NotHeld(_) | BookingError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn failure(&self, state: &ConversationState, error: BookingError) -> (ConversationState, Response) {
        if error.is_retryable() {
            tracing::info!(conversation_id = %state.conversation_id, error = %error, "turn rejected");
        } else {
            tracing::error!(conversation_id = %state.conversation_id, error = %error, "availability store failure");
        }

        let message = match &error {
            BookingError::InvalidRange { .. } => {
                "That time range doesn't look right: the start has to be before the end.".to_string()
            }
            BookingError::SlotUnavailable(_) => {
                "Sorry, that slot was just taken. Please pick another one from the list.".to_string()
            }
            BookingError::NotHeld(_) | BookingError::NotFound(_) => {
                "That slot is no longer held for you. Please pick a slot again.".to_string()
            }
            BookingError::StaleReference(_) => format!(
                "I couldn't match that to one of the slots I showed you. Reply with a number from 1 to {}.",
                state.candidate_slot_ids.len()
            ),
            BookingError::Conflict(_) => "That time clashes with another slot.".to_string(),
            BookingError::Database(_) | BookingError::LockPoisoned => {
                "Sorry, I'm having trouble reaching the calendar right now. Please try again in a moment."
                    .to_string()
            }
        };

        (
            state.clone(),
            Response::new(Action::Failed, state.stage, message).with_error(error.code()),
        )
    }
}

/// Binds a slot reference to the list last shown to this conversation,
/// never to a fresh query.
fn resolve_reference(
    state: &ConversationState,
    slot_ref: Option<SlotRef>,
    presented: &[Slot],
) -> Result<String, BookingError> {
    match slot_ref {
        Some(SlotRef::Index(n)) => n
            .checked_sub(1)
            .and_then(|i| state.candidate_slot_ids.get(i))
            .cloned()
            .ok_or_else(|| {
                BookingError::StaleReference(format!(
                    "no slot #{n} among {} shown",
                    state.candidate_slot_ids.len()
                ))
            }),
        Some(SlotRef::StartTime(time)) => {
            let matches: Vec<&Slot> = presented
                .iter()
                .filter(|s| s.start.time() == time && state.candidate_slot_ids.contains(&s.id))
                .collect();
            match matches.as_slice() {
                [slot] => Ok(slot.id.clone()),
                [] => Err(BookingError::StaleReference(format!(
                    "no shown slot starts at {}",
                    time.format("%H:%M")
                ))),
                _ => Err(BookingError::StaleReference(format!(
                    "{} shown slots start at {}",
                    matches.len(),
                    time.format("%H:%M")
                ))),
            }
        }
        None => Err(BookingError::StaleReference("no slot reference given".to_string())),
    }
}

fn describe(presented: &[Slot], slot_id: &str) -> String {
    presented
        .iter()
        .find(|s| s.id == slot_id)
        .map(Slot::formatted)
        .unwrap_or_else(|| "your selected slot".to_string())
}

fn stage_hint(stage: Stage) -> &'static str {
    match stage {
        Stage::Idle => {
            "I can help you book an appointment. Try something like 'book a meeting tomorrow \
             afternoon' or 'check availability next week'."
        }
        Stage::AwaitingDateRange => {
            "Which day and time range should I look at? For example 'tomorrow morning'."
        }
        Stage::PresentingSlots => {
            "Please pick one of the slots above by its number, or say 'cancel' to stop."
        }
        Stage::AwaitingConfirmation => {
            "Reply 'yes' to confirm your slot, pick a different one, or say 'cancel' to go back."
        }
        Stage::Completed | Stage::Cancelled => {
            "This conversation is finished. Start a new conversation to book another appointment."
        }
    }
}
