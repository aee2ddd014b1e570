//! SQL schema for the Cercle SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per user; status mutates only through the reconciliation engine.
CREATE TABLE IF NOT EXISTS verification_subjects (
    user_id        TEXT PRIMARY KEY,
    applicant_id   TEXT NOT NULL UNIQUE,  -- externally issued, immutable
    status         TEXT NOT NULL,         -- 'pending' | 'approved' | 'rejected'
    review_status  TEXT,
    review_detail  TEXT,                  -- JSON payload of the last applied event
    reject_reason  TEXT,
    last_event_id  TEXT,                  -- idempotency marker (CAS guard)
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    approved_at    TEXT,
    rejected_at    TEXT
);

-- One row per contribution; amount is fixed at creation.
CREATE TABLE IF NOT EXISTS payment_subjects (
    payment_id    TEXT PRIMARY KEY,
    intent_id     TEXT NOT NULL UNIQUE,   -- externally issued, immutable
    circle_id     TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    amount_minor  INTEGER NOT NULL CHECK (amount_minor > 0),
    status        TEXT NOT NULL,          -- 'pending' | 'succeeded' | 'failed' | 'refunded'
    last_event_id TEXT,                   -- idempotency marker (CAS guard)
    receipt_url   TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    confirmed_at  TEXT
);

-- Strictly append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS audit_log (
    entry_id   TEXT PRIMARY KEY,
    user_id    TEXT,                      -- NULL for subject-less system events
    action     TEXT NOT NULL,
    detail     TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS payment_subjects_user_idx ON payment_subjects(user_id);
CREATE INDEX IF NOT EXISTS audit_log_user_idx        ON audit_log(user_id);
CREATE INDEX IF NOT EXISTS audit_log_action_idx      ON audit_log(action);

PRAGMA user_version = 1;
";
