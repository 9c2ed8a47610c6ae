//! SQL schema for the pipeline's SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
///
/// Timestamps are fixed-width RFC 3339 UTC strings, so lexical order is
/// chronological order.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS cases (
    case_id             TEXT PRIMARY KEY,
    number              TEXT NOT NULL UNIQUE,
    unit_id             TEXT NOT NULL,
    unit_abbreviation   TEXT NOT NULL,
    access_link         TEXT NOT NULL,
    status              TEXT NOT NULL,   -- PENDING | IN_PROGRESS | SUCCESS | FAILURE
    classification      INTEGER,         -- NULL until analysed
    analysed_at         TEXT,
    classifier_metadata TEXT,            -- JSON verdict
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

-- Documents are written once and never updated.
CREATE TABLE IF NOT EXISTS documents (
    document_id INTEGER PRIMARY KEY AUTOINCREMENT,
    number      TEXT NOT NULL UNIQUE,
    case_id     TEXT NOT NULL REFERENCES cases(case_id),
    kind        TEXT NOT NULL,
    unit        TEXT NOT NULL,
    access_link TEXT NOT NULL,
    mime_type   TEXT NOT NULL,
    text        TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_by_case ON documents(case_id, document_id);

CREATE TABLE IF NOT EXISTS retirement_cases (
    retirement_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id         TEXT NOT NULL UNIQUE REFERENCES cases(case_id),
    requester_id    TEXT NOT NULL,
    birth_date      TEXT NOT NULL,   -- YYYY-MM-DD
    request_date    TEXT NOT NULL,   -- YYYY-MM-DD
    invalidity      INTEGER NOT NULL,
    judicial        INTEGER NOT NULL,
    priority        INTEGER NOT NULL,
    score           INTEGER NOT NULL,
    status          TEXT NOT NULL,
    analyst_id      INTEGER,
    last_analyst_id INTEGER,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Strictly append-only.
CREATE TABLE IF NOT EXISTS status_history (
    history_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    retirement_id   INTEGER NOT NULL REFERENCES retirement_cases(retirement_id),
    previous_status TEXT,            -- NULL on the seed row
    new_status      TEXT NOT NULL,
    user_id         INTEGER,
    note            TEXT,
    changed_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS status_history_by_case
    ON status_history(retirement_id, history_id);

CREATE TABLE IF NOT EXISTS jobs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    kind         TEXT NOT NULL,
    args         TEXT NOT NULL,
    unique_key   TEXT,
    state        TEXT NOT NULL,   -- available | running | retryable | completed | cancelled | discarded
    attempt      INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    scheduled_at TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    attempted_at TEXT,
    finalized_at TEXT,
    last_error   TEXT
);

CREATE INDEX IF NOT EXISTS jobs_due    ON jobs(state, scheduled_at);
CREATE INDEX IF NOT EXISTS jobs_unique ON jobs(unique_key, created_at);

CREATE TABLE IF NOT EXISTS cache_entries (
    key        TEXT PRIMARY KEY,
    value      BLOB NOT NULL,
    expires_at TEXT              -- NULL = never
);
";
