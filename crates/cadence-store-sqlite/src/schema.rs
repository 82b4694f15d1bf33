//! SQL schema for the Cadence SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS campaigns (
    campaign_id        TEXT PRIMARY KEY,
    name               TEXT NOT NULL UNIQUE,
    description        TEXT,
    start_date         TEXT NOT NULL,   -- YYYY-MM-DD
    total_days         INTEGER NOT NULL CHECK (total_days BETWEEN 1 AND 90),
    am_time            TEXT NOT NULL,   -- HH:MM local
    pm_time            TEXT NOT NULL,   -- HH:MM local
    fallback_image_url TEXT,
    status             TEXT NOT NULL DEFAULT 'draft',
    is_active          INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

-- At most one campaign carries the active flag.
CREATE UNIQUE INDEX IF NOT EXISTS campaigns_single_active_idx
    ON campaigns(is_active) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS posts (
    post_id         TEXT PRIMARY KEY,
    campaign_id     TEXT NOT NULL REFERENCES campaigns(campaign_id) ON DELETE CASCADE,
    day             INTEGER NOT NULL CHECK (day >= 1),
    slot            TEXT NOT NULL,          -- 'am' | 'pm'
    cycle           INTEGER NOT NULL DEFAULT 1 CHECK (cycle >= 1),
    target_audience TEXT NOT NULL,
    body            TEXT NOT NULL,
    media_urls      TEXT NOT NULL DEFAULT '[]',
    media_alt       TEXT,
    use_og_fallback INTEGER NOT NULL DEFAULT 1,
    time_label      TEXT NOT NULL,
    scheduled_local TEXT NOT NULL,          -- RFC 3339 with the reference offset
    scheduled_utc   TEXT NOT NULL,          -- fixed-width RFC 3339 UTC; sorts as text
    source          TEXT,
    status          TEXT NOT NULL DEFAULT 'draft',
    external_id     TEXT,
    error           TEXT,
    posted_at       TEXT,
    claim_token     TEXT,                   -- held by a running publish
    claimed_at      TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (campaign_id, day, slot, cycle),
    CHECK  ((status = 'posted') = (posted_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS posts_due_idx
    ON posts(campaign_id, slot, status, scheduled_utc);

PRAGMA user_version = 1;
";
