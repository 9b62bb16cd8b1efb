//! SQLite schema for the study store.
//!
//! The UNIQUE keys are the idempotency mechanism: turns and messages are
//! written with INSERT OR IGNORE, so re-running a cycle after a partial
//! failure never duplicates rows.

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS participants (
    id TEXT PRIMARY KEY,
    condition TEXT NOT NULL,
    task_order TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    participant_id TEXT NOT NULL,
    session_key TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    topic TEXT NOT NULL,
    initial_opinion INTEGER,
    cycle INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (participant_id, session_key),
    FOREIGN KEY (participant_id) REFERENCES participants(id)
);

CREATE TABLE IF NOT EXISTS turns (
    participant_id TEXT NOT NULL,
    session_key TEXT NOT NULL,
    cycle INTEGER NOT NULL,
    user_message TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (participant_id, session_key, cycle),
    FOREIGN KEY (participant_id, session_key)
        REFERENCES sessions(participant_id, session_key)
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    participant_id TEXT NOT NULL,
    session_key TEXT NOT NULL,
    cycle INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    latency_ms INTEGER NOT NULL DEFAULT 0,
    tokens_in INTEGER,
    tokens_out INTEGER,
    fallback_used INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (participant_id, session_key, cycle, role)
);

CREATE INDEX IF NOT EXISTS idx_messages_session
    ON messages(participant_id, session_key, cycle);

CREATE INDEX IF NOT EXISTS idx_turns_session
    ON turns(participant_id, session_key);
";
