pub mod migrations;
pub mod subscriptions;

pub use subscriptions::{
    Preference, SubscriberCredentials, SubscriptionError, SubscriptionStore, ValidationError,
};

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::NomineeKey;
use crate::fetcher::VoteSnapshot;
use crate::store::migrations::BASE_MIGRATION;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored value failed to decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed preparing storage directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteObservation {
    pub award_id: String,
    pub nominee_id: String,
    pub vote_count: u64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub award_id: Option<String>,
    pub nominee_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Latest + history vote tables. `votes_latest` holds exactly one row per
/// (award, nominee), overwritten each cycle; `votes_history` is append-only.
pub struct VoteStore {
    conn: Connection,
}

impl VoteStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    /// Persists one fetch cycle: latest upsert and history append are applied
    /// in a single transaction so a reader never sees one without the other.
    pub fn record_snapshot(
        &mut self,
        snapshot: &VoteSnapshot,
        observed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let observed_at = observed_at.to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                r#"
INSERT INTO votes_latest (award_id, nominee_id, vote_count, fetched_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(award_id, nominee_id) DO UPDATE SET
    vote_count = excluded.vote_count,
    fetched_at = excluded.fetched_at
"#,
            )?;
            let mut append = tx.prepare(
                r#"
INSERT INTO votes_history (award_id, nominee_id, vote_count, fetched_at)
VALUES (?1, ?2, ?3, ?4)
"#,
            )?;
            for (award_id, nominees) in &snapshot.awards {
                for (nominee_id, count) in nominees {
                    upsert.execute(params![award_id, nominee_id, *count as i64, observed_at])?;
                    append.execute(params![award_id, nominee_id, *count as i64, observed_at])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn latest_votes(&self) -> Result<BTreeMap<NomineeKey, u64>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT award_id, nominee_id, vote_count FROM votes_latest")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                NomineeKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                row.get::<_, i64>(2)? as u64,
            ))
        })?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (key, count) = row?;
            out.insert(key, count);
        }
        Ok(out)
    }

    /// Latest counts for one award in first-insert order. The upsert never
    /// changes a row's rowid, so this is the payload order of the first fetch
    /// that saw each nominee, which is what stable tie-breaking needs.
    pub fn latest_for_award(&self, award_id: &str) -> Result<Vec<(String, u64)>, StorageError> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT nominee_id, vote_count
FROM votes_latest
WHERE award_id = ?1
ORDER BY rowid ASC
"#,
        )?;
        let rows = stmt.query_map(params![award_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn query_history(&self, query: &HistoryQuery) -> Result<Vec<VoteObservation>, StorageError> {
        let mut sql = String::from(
            "SELECT award_id, nominee_id, vote_count, fetched_at FROM votes_history",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut bind: Vec<String> = Vec::new();

        if let Some(award_id) = &query.award_id {
            clauses.push("award_id = ?");
            bind.push(award_id.clone());
        }
        if let Some(nominee_id) = &query.nominee_id {
            clauses.push("nominee_id = ?");
            bind.push(nominee_id.clone());
        }
        if let Some(since) = &query.since {
            clauses.push("fetched_at >= ?");
            bind.push(since.to_rfc3339());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY fetched_at ASC, id ASC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(1)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind.iter()), row_to_observation)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn row_to_observation(row: &rusqlite::Row<'_>) -> rusqlite::Result<VoteObservation> {
    let fetched_at_raw: String = row.get(3)?;
    let observed_at = DateTime::parse_from_rfc3339(&fetched_at_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(VoteObservation {
        award_id: row.get(0)?,
        nominee_id: row.get(1)?,
        vote_count: row.get::<_, i64>(2)? as u64,
        observed_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{HistoryQuery, VoteStore};
    use crate::catalog::NomineeKey;
    use crate::fetcher::VoteSnapshot;

    fn snapshot(entries: &[(&str, &str, u64)]) -> VoteSnapshot {
        let mut snap = VoteSnapshot::default();
        for (award, nominee, count) in entries {
            snap.awards
                .entry(award.to_string())
                .or_default()
                .push((nominee.to_string(), *count));
        }
        snap
    }

    #[test]
    fn snapshot_lands_in_latest_and_history_together() {
        let mut store = VoteStore::open_in_memory().expect("open store");
        let now = Utc::now();
        store
            .record_snapshot(&snapshot(&[("12", "88", 100), ("12", "89", 90)]), now)
            .expect("record");

        let latest = store.latest_votes().expect("latest");
        assert_eq!(latest.get(&NomineeKey::new("12", "88")), Some(&100));

        let history = store.query_history(&HistoryQuery::default()).expect("history");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn latest_is_overwritten_while_history_appends() {
        let mut store = VoteStore::open_in_memory().expect("open store");
        let t0 = Utc::now();
        store
            .record_snapshot(&snapshot(&[("12", "88", 100)]), t0)
            .expect("record");
        store
            .record_snapshot(&snapshot(&[("12", "88", 140)]), t0 + Duration::seconds(10))
            .expect("record");

        let latest = store.latest_votes().expect("latest");
        assert_eq!(latest.get(&NomineeKey::new("12", "88")), Some(&140));

        let history = store
            .query_history(&HistoryQuery {
                award_id: Some("12".to_string()),
                nominee_id: Some("88".to_string()),
                ..Default::default()
            })
            .expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].vote_count, 100);
        assert_eq!(history[1].vote_count, 140);
        assert!(history[0].observed_at < history[1].observed_at);
    }

    #[test]
    fn history_since_filter_excludes_older_rows() {
        let mut store = VoteStore::open_in_memory().expect("open store");
        let t0 = Utc::now();
        store
            .record_snapshot(&snapshot(&[("3", "7", 10)]), t0)
            .expect("record");
        store
            .record_snapshot(&snapshot(&[("3", "7", 20)]), t0 + Duration::seconds(60))
            .expect("record");

        let history = store
            .query_history(&HistoryQuery {
                since: Some(t0 + Duration::seconds(30)),
                ..Default::default()
            })
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].vote_count, 20);
    }

    #[test]
    fn latest_for_award_preserves_first_seen_order() {
        let mut store = VoteStore::open_in_memory().expect("open store");
        let t0 = Utc::now();
        store
            .record_snapshot(&snapshot(&[("12", "88", 100), ("12", "89", 90)]), t0)
            .expect("record");
        // Second cycle flips the counts; insertion order must not change.
        store
            .record_snapshot(
                &snapshot(&[("12", "88", 100), ("12", "89", 200)]),
                t0 + Duration::seconds(10),
            )
            .expect("record");

        let latest = store.latest_for_award("12").expect("latest");
        assert_eq!(latest[0].0, "88");
        assert_eq!(latest[1], ("89".to_string(), 200));
    }

    #[test]
    fn history_limit_caps_result_size() {
        let mut store = VoteStore::open_in_memory().expect("open store");
        let t0 = Utc::now();
        for i in 0..5 {
            store
                .record_snapshot(
                    &snapshot(&[("3", "7", i * 10)]),
                    t0 + Duration::seconds(i as i64),
                )
                .expect("record");
        }
        let history = store
            .query_history(&HistoryQuery {
                limit: Some(2),
                ..Default::default()
            })
            .expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].vote_count, 0);
    }
}
