use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Appointment, AppointmentDetails, AppointmentStatus, ConversationState, Slot, SlotStatus, Stage,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ── Slots ──

const SLOT_COLUMNS: &str = "id, start_at, end_at, status, holder";

fn parse_slot_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Slot> {
    let start: String = row.get(offset + 1)?;
    let end: String = row.get(offset + 2)?;
    let status: String = row.get(offset + 3)?;
    Ok(Slot {
        id: row.get(offset)?,
        start: parse_ts(offset + 1, &start)?,
        end: parse_ts(offset + 2, &end)?,
        status: SlotStatus::parse(&status),
        holder: row.get(offset + 4)?,
    })
}

pub fn insert_slot(conn: &Connection, slot: &Slot) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO slots (id, start_at, end_at, status, holder) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            slot.id,
            ts(&slot.start),
            ts(&slot.end),
            slot.status.as_str(),
            slot.holder,
        ],
    )?;
    Ok(())
}

pub fn get_slot(conn: &Connection, id: &str) -> rusqlite::Result<Option<Slot>> {
    conn.query_row(
        &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1"),
        params![id],
        |row| parse_slot_row(row, 0),
    )
    .optional()
}

/// Slots of any status overlapping `[start, end)`.
pub fn overlapping_slots(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> rusqlite::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE start_at < ?2 AND end_at > ?1 ORDER BY start_at ASC"
    ))?;
    let rows = stmt.query_map(params![ts(start), ts(end)], |row| parse_slot_row(row, 0))?;
    rows.collect()
}

pub fn free_slots_in_range(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> rusqlite::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots
         WHERE status = 'free' AND start_at < ?2 AND end_at > ?1
         ORDER BY start_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![ts(start), ts(end)], |row| parse_slot_row(row, 0))?;
    rows.collect()
}

/// Free → Held in one statement. Returns the number of rows changed,
/// so zero means someone else got there first.
pub fn hold_slot(
    conn: &Connection,
    id: &str,
    holder: &str,
    now: &NaiveDateTime,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE slots SET status = 'held', holder = ?2, held_at = ?3
         WHERE id = ?1 AND status = 'free'",
        params![id, holder, ts(now)],
    )
}

pub fn release_slot(conn: &Connection, id: &str, holder: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE slots SET status = 'free', holder = NULL, held_at = NULL
         WHERE id = ?1 AND status = 'held' AND holder = ?2",
        params![id, holder],
    )
}

pub fn book_slot(conn: &Connection, id: &str, holder: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE slots SET status = 'booked', held_at = NULL
         WHERE id = ?1 AND status = 'held' AND holder = ?2",
        params![id, holder],
    )
}

pub fn free_booked_slot(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE slots SET status = 'free', holder = NULL, held_at = NULL
         WHERE id = ?1 AND status = 'booked'",
        params![id],
    )
}

pub fn release_holds_before(conn: &Connection, cutoff: &NaiveDateTime) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE slots SET status = 'free', holder = NULL, held_at = NULL
         WHERE status = 'held' AND held_at <= ?1",
        params![ts(cutoff)],
    )
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "a.id, a.slot_id, a.requester, a.created_at, a.status";

fn parse_appointment_row(row: &rusqlite::Row) -> rusqlite::Result<Appointment> {
    let created_at: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Appointment {
        id: row.get(0)?,
        slot_id: row.get(1)?,
        requester: row.get(2)?,
        created_at: parse_ts(3, &created_at)?,
        status: AppointmentStatus::parse(&status),
    })
}

pub fn insert_appointment(conn: &Connection, appointment: &Appointment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, slot_id, requester, created_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            appointment.id,
            appointment.slot_id,
            appointment.requester,
            ts(&appointment.created_at),
            appointment.status.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> rusqlite::Result<Option<Appointment>> {
    conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1"),
        params![id],
        parse_appointment_row,
    )
    .optional()
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(count > 0)
}

fn parse_details_row(row: &rusqlite::Row) -> rusqlite::Result<AppointmentDetails> {
    Ok(AppointmentDetails {
        appointment: parse_appointment_row(row)?,
        slot: parse_slot_row(row, 5)?,
    })
}

pub fn get_appointment_details(
    conn: &Connection,
    id: &str,
) -> rusqlite::Result<Option<AppointmentDetails>> {
    conn.query_row(
        &format!(
            "SELECT {APPOINTMENT_COLUMNS}, s.id, s.start_at, s.end_at, s.status, s.holder
             FROM appointments a JOIN slots s ON s.id = a.slot_id WHERE a.id = ?1"
        ),
        params![id],
        parse_details_row,
    )
    .optional()
}

pub fn list_appointment_details(conn: &Connection) -> rusqlite::Result<Vec<AppointmentDetails>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS}, s.id, s.start_at, s.end_at, s.status, s.holder
         FROM appointments a JOIN slots s ON s.id = a.slot_id
         ORDER BY s.start_at ASC"
    ))?;
    let rows = stmt.query_map([], parse_details_row)?;
    rows.collect()
}

// ── Conversations ──

pub fn get_conversation(conn: &Connection, id: &str) -> anyhow::Result<Option<ConversationState>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT state FROM conversations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn save_conversation(conn: &Connection, state: &ConversationState) -> anyhow::Result<()> {
    let json = serde_json::to_string(state)?;
    conn.execute(
        "INSERT INTO conversations (id, state, stage, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           state = excluded.state,
           stage = excluded.stage,
           updated_at = excluded.updated_at",
        params![
            state.conversation_id,
            json,
            state.stage.as_str(),
            ts(&state.updated_at),
        ],
    )?;
    Ok(())
}

pub fn delete_finished_conversations(
    conn: &Connection,
    before: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM conversations WHERE stage IN (?1, ?2) AND updated_at <= ?3",
        params![
            Stage::Completed.as_str(),
            Stage::Cancelled.as_str(),
            ts(before)
        ],
    )?;
    Ok(count)
}
