use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::anyhow;
use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::ConversationState;

/// One state record per conversation id. Records are replaced whole;
/// there is no partial update.
pub trait ConversationStore: Send + Sync {
    /// Returns the stored record, or a fresh Idle one if there is none yet.
    /// The fresh record is not persisted until `put`.
    fn get(&self, conversation_id: &str) -> anyhow::Result<ConversationState>;

    fn put(&self, conversation_id: &str, state: &ConversationState) -> anyhow::Result<()>;

    /// Drops Completed or Cancelled records last touched at or before `before`.
    fn purge_finished(&self, before: &NaiveDateTime) -> anyhow::Result<usize>;
}

pub struct SqliteConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

impl ConversationStore for SqliteConversationStore {
    fn get(&self, conversation_id: &str) -> anyhow::Result<ConversationState> {
        let db = self.db.lock().map_err(|_| anyhow!("database lock poisoned"))?;
        Ok(queries::get_conversation(&db, conversation_id)?
            .unwrap_or_else(|| ConversationState::new(conversation_id, Utc::now().naive_utc())))
    }

    fn put(&self, conversation_id: &str, state: &ConversationState) -> anyhow::Result<()> {
        anyhow::ensure!(
            state.conversation_id == conversation_id,
            "state for {} written under {conversation_id}",
            state.conversation_id
        );
        let db = self.db.lock().map_err(|_| anyhow!("database lock poisoned"))?;
        queries::save_conversation(&db, state)
    }

    fn purge_finished(&self, before: &NaiveDateTime) -> anyhow::Result<usize> {
        let db = self.db.lock().map_err(|_| anyhow!("database lock poisoned"))?;
        queries::delete_finished_conversations(&db, before)
    }
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, conversation_id: &str) -> anyhow::Result<ConversationState> {
        let states = self.states.read().map_err(|_| anyhow!("state lock poisoned"))?;
        Ok(states
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| ConversationState::new(conversation_id, Utc::now().naive_utc())))
    }

    fn put(&self, conversation_id: &str, state: &ConversationState) -> anyhow::Result<()> {
        anyhow::ensure!(
            state.conversation_id == conversation_id,
            "state for {} written under {conversation_id}",
            state.conversation_id
        );
        let mut states = self.states.write().map_err(|_| anyhow!("state lock poisoned"))?;
        states.insert(conversation_id.to_string(), state.clone());
        Ok(())
    }

    fn purge_finished(&self, before: &NaiveDateTime) -> anyhow::Result<usize> {
        let mut states = self.states.write().map_err(|_| anyhow!("state lock poisoned"))?;
        let initial = states.len();
        states.retain(|_, s| !(s.stage.is_terminal() && s.updated_at <= *before));
        Ok(initial - states.len())
    }
}
