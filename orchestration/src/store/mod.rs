//! Persistence adapter — idempotent read/write of participant, session,
//! turn and message state over SQLite.
//!
//! Writes are scoped to a single (participant, session, cycle) key and rely
//! on UNIQUE constraints plus INSERT OR IGNORE rather than explicit locking,
//! so they are safe under client retries.

mod schema;

use std::path::Path;
use std::str::FromStr;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::condition::{
    Condition, CycleIndex, DomainError, MessageRole, OpinionScore, SessionKey, TaskOrder,
};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool: {0}")]
    Pool(String),

    #[error("sql: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(#[from] DomainError),

    #[error("participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("initial opinion already recorded as {existing}, refusing to overwrite with {attempted}")]
    OpinionConflict { existing: i32, attempted: i32 },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A participant row.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub condition: Condition,
    pub task_order: TaskOrder,
    pub created_at: String,
    pub finished_at: Option<String>,
}

/// A session row.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub participant_id: String,
    pub session_key: SessionKey,
    pub ordinal: u8,
    pub topic: String,
    pub initial_opinion: Option<OpinionScore>,
    pub cycle: u8,
    pub completed_at: Option<String>,
}

/// A message row.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub participant_id: String,
    pub session_key: SessionKey,
    pub cycle: CycleIndex,
    pub role: MessageRole,
    pub content: String,
    pub latency_ms: u64,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub fallback_used: bool,
}

/// SQLite-backed study store with r2d2 connection pooling.
#[derive(Clone)]
pub struct StudyStore {
    pool: Pool<SqliteConnectionManager>,
}

impl StudyStore {
    /// Open (or create) the store at a file path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests. Pool size 1 so every handle sees the same
    /// database.
    pub fn in_memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }

    // =========================================================================
    // Participants
    // =========================================================================

    /// Create a participant with a fresh id. Condition and task order are
    /// immutable thereafter.
    pub fn create_participant(
        &self,
        condition: Condition,
        task_order: TaskOrder,
    ) -> StoreResult<Participant> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO participants (id, condition, task_order) VALUES (?1, ?2, ?3)",
            params![id, condition.as_str(), task_order.as_str()],
        )?;
        drop(conn);
        self.get_participant(&id)?
            .ok_or(StoreError::ParticipantNotFound(id))
    }

    /// Look up a participant by id.
    pub fn get_participant(&self, id: &str) -> StoreResult<Option<Participant>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, condition, task_order, created_at, finished_at
                 FROM participants WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, condition, task_order, created_at, finished_at)) => Ok(Some(Participant {
                id,
                condition: Condition::from_str(&condition)?,
                task_order: TaskOrder::from_str(&task_order)?,
                created_at,
                finished_at,
            })),
        }
    }

    /// Mark a participant as finished with the experiment. Already finished
    /// is a no-op.
    pub fn mark_finished(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE participants SET finished_at = ?2
             WHERE id = ?1 AND finished_at IS NULL",
            params![id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Fetch the session, creating it on first access. Ordinal and topic are
    /// derived from the participant's task order at creation time.
    pub fn get_or_create_session(
        &self,
        participant: &Participant,
        key: SessionKey,
    ) -> StoreResult<SessionRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO sessions (participant_id, session_key, ordinal, topic)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                participant.id,
                key.as_str(),
                participant.task_order.ordinal_of(key),
                participant.task_order.topic_of(key),
            ],
        )?;
        drop(conn);
        self.get_session(&participant.id, key)?
            .ok_or_else(|| StoreError::ParticipantNotFound(participant.id.clone()))
    }

    /// Look up a session row.
    pub fn get_session(
        &self,
        participant_id: &str,
        key: SessionKey,
    ) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT ordinal, topic, initial_opinion, cycle, completed_at
                 FROM sessions WHERE participant_id = ?1 AND session_key = ?2",
                params![participant_id, key.as_str()],
                |row| {
                    Ok((
                        row.get::<_, u8>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i32>>(2)?,
                        row.get::<_, u8>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((ordinal, topic, opinion, cycle, completed_at)) => {
                let initial_opinion = opinion.map(OpinionScore::new).transpose()?;
                Ok(Some(SessionRecord {
                    participant_id: participant_id.to_string(),
                    session_key: key,
                    ordinal,
                    topic,
                    initial_opinion,
                    cycle,
                    completed_at,
                }))
            }
        }
    }

    /// Record the T0 opinion for a session. Immutable once set: recording the
    /// identical value again is a no-op, a different value is a conflict.
    pub fn record_initial_opinion(
        &self,
        participant_id: &str,
        key: SessionKey,
        score: OpinionScore,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let existing: Option<i32> = conn
            .query_row(
                "SELECT initial_opinion FROM sessions
                 WHERE participant_id = ?1 AND session_key = ?2",
                params![participant_id, key.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        match existing {
            Some(v) if v == score.value() => Ok(()),
            Some(v) => Err(StoreError::OpinionConflict {
                existing: v,
                attempted: score.value(),
            }),
            None => {
                conn.execute(
                    "UPDATE sessions SET initial_opinion = ?3
                     WHERE participant_id = ?1 AND session_key = ?2",
                    params![participant_id, key.as_str(), score.value()],
                )?;
                Ok(())
            }
        }
    }

    /// Advance the session's cycle counter (monotonic, never decreases).
    pub fn record_cycle(
        &self,
        participant_id: &str,
        key: SessionKey,
        cycle: CycleIndex,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sessions SET cycle = MAX(cycle, ?3)
             WHERE participant_id = ?1 AND session_key = ?2",
            params![participant_id, key.as_str(), cycle.get()],
        )?;
        Ok(())
    }

    /// Stamp the session's completion timestamp (first write wins).
    pub fn complete_session(&self, participant_id: &str, key: SessionKey) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sessions SET completed_at = ?3
             WHERE participant_id = ?1 AND session_key = ?2 AND completed_at IS NULL",
            params![participant_id, key.as_str(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Turns and messages
    // =========================================================================

    /// Record the turn for a cycle. Safe to repeat: the first write wins.
    pub fn upsert_turn(
        &self,
        participant_id: &str,
        key: SessionKey,
        cycle: CycleIndex,
        user_message: &str,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO turns (participant_id, session_key, cycle, user_message)
             VALUES (?1, ?2, ?3, ?4)",
            params![participant_id, key.as_str(), cycle.get(), user_message],
        )?;
        Ok(())
    }

    /// Append a message. Safe to repeat for the same logical row: the UNIQUE
    /// key on (participant, session, cycle, role) makes duplicates no-ops.
    pub fn insert_message(&self, message: &MessageRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO messages
                 (participant_id, session_key, cycle, role, content,
                  latency_ms, tokens_in, tokens_out, fallback_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.participant_id,
                message.session_key.as_str(),
                message.cycle.get(),
                message.role.as_str(),
                message.content,
                message.latency_ms as i64,
                message.tokens_in,
                message.tokens_out,
                message.fallback_used as i32,
            ],
        )?;
        Ok(())
    }

    /// All messages for one cycle, agents first in slot order, then the user.
    pub fn messages_for_cycle(
        &self,
        participant_id: &str,
        key: SessionKey,
        cycle: CycleIndex,
    ) -> StoreResult<Vec<MessageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, latency_ms, tokens_in, tokens_out, fallback_used
             FROM messages
             WHERE participant_id = ?1 AND session_key = ?2 AND cycle = ?3
             ORDER BY role ASC",
        )?;
        let rows = stmt.query_map(params![participant_id, key.as_str(), cycle.get()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, Option<u32>>(4)?,
                row.get::<_, i32>(5)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, latency_ms, tokens_in, tokens_out, fallback_used) = row?;
            messages.push(MessageRecord {
                participant_id: participant_id.to_string(),
                session_key: key,
                cycle,
                role: MessageRole::from_str(&role)?,
                content,
                latency_ms: latency_ms as u64,
                tokens_in,
                tokens_out,
                fallback_used: fallback_used != 0,
            });
        }
        Ok(messages)
    }

    /// Conversation history before a cycle, in chat order (the user's message
    /// first within each cycle, then the agents in slot order).
    pub fn prior_messages(
        &self,
        participant_id: &str,
        key: SessionKey,
        before: CycleIndex,
    ) -> StoreResult<Vec<MessageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT cycle, role, content, latency_ms, tokens_in, tokens_out, fallback_used
             FROM messages
             WHERE participant_id = ?1 AND session_key = ?2 AND cycle < ?3
             ORDER BY cycle ASC,
                      CASE role WHEN 'user' THEN 0 ELSE 1 END ASC,
                      role ASC",
        )?;
        let rows = stmt.query_map(params![participant_id, key.as_str(), before.get()], |row| {
            Ok((
                row.get::<_, u8>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<u32>>(4)?,
                row.get::<_, Option<u32>>(5)?,
                row.get::<_, i32>(6)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (cycle, role, content, latency_ms, tokens_in, tokens_out, fallback_used) = row?;
            messages.push(MessageRecord {
                participant_id: participant_id.to_string(),
                session_key: key,
                cycle: CycleIndex::new(cycle)?,
                role: MessageRole::from_str(&role)?,
                content,
                latency_ms: latency_ms as u64,
                tokens_in,
                tokens_out,
                fallback_used: fallback_used != 0,
            });
        }
        Ok(messages)
    }

    /// Highest cycle whose three agent messages all exist, if any. This is
    /// the sequencing anchor: cycle k may only run once this returns k-1.
    pub fn last_response_index(
        &self,
        participant_id: &str,
        key: SessionKey,
    ) -> StoreResult<Option<CycleIndex>> {
        let conn = self.conn()?;
        let max: Option<u8> = conn.query_row(
            "SELECT MAX(cycle) FROM (
                 SELECT cycle FROM messages
                 WHERE participant_id = ?1 AND session_key = ?2 AND role != 'user'
                 GROUP BY cycle HAVING COUNT(*) >= 3
             )",
            params![participant_id, key.as_str()],
            |row| row.get(0),
        )?;
        Ok(max.map(CycleIndex::new).transpose()?)
    }
}
