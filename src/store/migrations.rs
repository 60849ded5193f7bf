pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS votes_latest (
    award_id TEXT NOT NULL,
    nominee_id TEXT NOT NULL,
    vote_count INTEGER NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (award_id, nominee_id)
);
CREATE INDEX IF NOT EXISTS idx_votes_latest_award
    ON votes_latest(award_id);

CREATE TABLE IF NOT EXISTS votes_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    award_id TEXT NOT NULL,
    nominee_id TEXT NOT NULL,
    vote_count INTEGER NOT NULL,
    fetched_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_votes_history_award
    ON votes_history(award_id);
CREATE INDEX IF NOT EXISTS idx_votes_history_award_nominee
    ON votes_history(award_id, nominee_id);
CREATE INDEX IF NOT EXISTS idx_votes_history_fetched
    ON votes_history(fetched_at);

CREATE TABLE IF NOT EXISTS subscribers (
    endpoint TEXT PRIMARY KEY,
    p256dh TEXT,
    auth TEXT
);

CREATE TABLE IF NOT EXISTS preferences (
    endpoint TEXT PRIMARY KEY,
    nominee_filter TEXT NOT NULL,
    summary_interval INTEGER NOT NULL DEFAULT 900,
    updated_at TEXT NOT NULL,
    FOREIGN KEY(endpoint) REFERENCES subscribers(endpoint)
);
"#;
