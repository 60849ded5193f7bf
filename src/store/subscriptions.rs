use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::NomineeKey;
use crate::store::migrations::BASE_MIGRATION;
use crate::store::StorageError;

pub const MIN_SUMMARY_INTERVAL_SECS: u64 = 900;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("subscription is missing an endpoint")]
    MissingEndpoint,
    #[error("summary interval must be at least {min_secs} seconds")]
    SummaryIntervalTooShort { min_secs: u64 },
    #[error("filter entry `{0}` is not a valid (award, nominee) pair")]
    InvalidFilterEntry(String),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for SubscriptionError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(error))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberCredentials {
    pub endpoint: String,
    #[serde(default)]
    pub p256dh: String,
    #[serde(default)]
    pub auth: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub nominee_filter: Vec<NomineeKey>,
    pub summary_interval_secs: u64,
}

/// Subscriber and per-subscriber preference rows, sharing the vote store's
/// SQLite file. Preferences without a surviving subscriber row are invisible
/// to the notification loop, not eagerly deleted.
pub struct SubscriptionStore {
    conn: Connection,
}

impl SubscriptionStore {
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

    pub fn subscribe(&self, credentials: &SubscriberCredentials) -> Result<(), SubscriptionError> {
        if credentials.endpoint.trim().is_empty() {
            return Err(ValidationError::MissingEndpoint.into());
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO subscribers (endpoint, p256dh, auth) VALUES (?1, ?2, ?3)",
            params![
                credentials.endpoint,
                credentials.p256dh,
                credentials.auth
            ],
        )?;
        Ok(())
    }

    /// Removes the subscriber and its preference row. Also the cascade path
    /// for permanent delivery failures.
    pub fn unsubscribe(&self, endpoint: &str) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM preferences WHERE endpoint = ?1", params![endpoint])?;
        self.conn
            .execute("DELETE FROM subscribers WHERE endpoint = ?1", params![endpoint])?;
        Ok(())
    }

    /// `min_interval_secs` is the deployment's configured floor; intervals
    /// below it are rejected, not clamped.
    pub fn set_preferences(
        &self,
        endpoint: &str,
        filter: &[NomineeKey],
        summary_interval_secs: u64,
        min_interval_secs: u64,
    ) -> Result<(), SubscriptionError> {
        if endpoint.trim().is_empty() {
            return Err(ValidationError::MissingEndpoint.into());
        }
        if summary_interval_secs < min_interval_secs {
            return Err(ValidationError::SummaryIntervalTooShort {
                min_secs: min_interval_secs,
            }
            .into());
        }
        for entry in filter {
            if entry.award_id.trim().is_empty() || entry.nominee_id.trim().is_empty() {
                return Err(ValidationError::InvalidFilterEntry(entry.to_string()).into());
            }
        }

        let filter_json = serde_json::to_string(filter).map_err(StorageError::Decode)?;
        self.conn.execute(
            r#"
INSERT OR REPLACE INTO preferences (endpoint, nominee_filter, summary_interval, updated_at)
VALUES (?1, ?2, ?3, ?4)
"#,
            params![
                endpoint,
                filter_json,
                summary_interval_secs as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_preferences(&self, endpoint: &str) -> Result<Option<Preference>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT nominee_filter, summary_interval FROM preferences WHERE endpoint = ?1",
                params![endpoint],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        let Some((filter_json, interval)) = row else {
            return Ok(None);
        };
        Ok(Some(Preference {
            nominee_filter: serde_json::from_str(&filter_json)?,
            summary_interval_secs: interval.max(0) as u64,
        }))
    }

    /// Preferences of subscribers that still have a subscriber row, keyed by
    /// endpoint (inner join semantics).
    pub fn get_active_preferences(&self) -> Result<BTreeMap<String, Preference>, StorageError> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT p.endpoint, p.nominee_filter, p.summary_interval
FROM preferences p
INNER JOIN subscribers s ON p.endpoint = s.endpoint
"#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (endpoint, filter_json, interval) = row?;
            out.insert(
                endpoint,
                Preference {
                    nominee_filter: serde_json::from_str(&filter_json)?,
                    summary_interval_secs: interval.max(0) as u64,
                },
            );
        }
        Ok(out)
    }

    pub fn credentials(
        &self,
        endpoint: &str,
    ) -> Result<Option<SubscriberCredentials>, StorageError> {
        self.conn
            .query_row(
                "SELECT endpoint, p256dh, auth FROM subscribers WHERE endpoint = ?1",
                params![endpoint],
                |row| {
                    Ok(SubscriberCredentials {
                        endpoint: row.get(0)?,
                        p256dh: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        auth: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        SubscriberCredentials, SubscriptionError, SubscriptionStore, ValidationError,
        MIN_SUMMARY_INTERVAL_SECS,
    };
    use crate::catalog::NomineeKey;

    fn credentials(endpoint: &str) -> SubscriberCredentials {
        SubscriberCredentials {
            endpoint: endpoint.to_string(),
            p256dh: "key".to_string(),
            auth: "auth".to_string(),
        }
    }

    #[test]
    fn subscribe_rejects_missing_endpoint() {
        let store = SubscriptionStore::open_in_memory().expect("open store");
        let result = store.subscribe(&credentials("  "));
        assert!(matches!(
            result,
            Err(SubscriptionError::Validation(
                ValidationError::MissingEndpoint
            ))
        ));
    }

    #[test]
    fn preferences_reject_short_interval_and_bad_filter() {
        let store = SubscriptionStore::open_in_memory().expect("open store");
        store.subscribe(&credentials("ep-1")).expect("subscribe");

        let filter = vec![NomineeKey::new("12", "88")];
        assert!(matches!(
            store.set_preferences("ep-1", &filter, 600, MIN_SUMMARY_INTERVAL_SECS),
            Err(SubscriptionError::Validation(
                ValidationError::SummaryIntervalTooShort { min_secs: 900 }
            ))
        ));

        let bad = vec![NomineeKey::new("12", "")];
        assert!(matches!(
            store.set_preferences("ep-1", &bad, 900, MIN_SUMMARY_INTERVAL_SECS),
            Err(SubscriptionError::Validation(
                ValidationError::InvalidFilterEntry(_)
            ))
        ));

        store
            .set_preferences("ep-1", &filter, 900, MIN_SUMMARY_INTERVAL_SECS)
            .expect("valid preferences");
        let stored = store
            .get_preferences("ep-1")
            .expect("query")
            .expect("row exists");
        assert_eq!(stored.nominee_filter, filter);
        assert_eq!(stored.summary_interval_secs, 900);
    }

    #[test]
    fn configured_floor_governs_interval_validation() {
        let store = SubscriptionStore::open_in_memory().expect("open store");
        store.subscribe(&credentials("ep-1")).expect("subscribe");
        let filter = vec![NomineeKey::new("12", "88")];

        // A deployment with a 300s floor accepts what the default rejects.
        store
            .set_preferences("ep-1", &filter, 600, 300)
            .expect("600s is above a 300s floor");
        let stored = store
            .get_preferences("ep-1")
            .expect("query")
            .expect("row exists");
        assert_eq!(stored.summary_interval_secs, 600);

        assert!(matches!(
            store.set_preferences("ep-1", &filter, 200, 300),
            Err(SubscriptionError::Validation(
                ValidationError::SummaryIntervalTooShort { min_secs: 300 }
            ))
        ));
    }

    #[test]
    fn active_preferences_require_a_subscriber_row() {
        let store = SubscriptionStore::open_in_memory().expect("open store");
        store.subscribe(&credentials("ep-1")).expect("subscribe");
        store.subscribe(&credentials("ep-2")).expect("subscribe");
        let filter = vec![NomineeKey::new("12", "88")];
        store
            .set_preferences("ep-1", &filter, 900, MIN_SUMMARY_INTERVAL_SECS)
            .expect("preferences");
        store
            .set_preferences("ep-2", &filter, 900, MIN_SUMMARY_INTERVAL_SECS)
            .expect("preferences");

        store.unsubscribe("ep-2").expect("unsubscribe");

        let active = store.get_active_preferences().expect("active");
        assert!(active.contains_key("ep-1"));
        assert!(!active.contains_key("ep-2"));
    }

    #[test]
    fn unsubscribe_cascades_to_preferences() {
        let store = SubscriptionStore::open_in_memory().expect("open store");
        store.subscribe(&credentials("ep-1")).expect("subscribe");
        store
            .set_preferences("ep-1", &[NomineeKey::new("1", "2")], 1800, MIN_SUMMARY_INTERVAL_SECS)
            .expect("preferences");

        store.unsubscribe("ep-1").expect("unsubscribe");
        assert!(store.credentials("ep-1").expect("query").is_none());
        assert!(store.get_preferences("ep-1").expect("query").is_none());
    }

    #[test]
    fn preference_upsert_replaces_previous_row() {
        let store = SubscriptionStore::open_in_memory().expect("open store");
        store.subscribe(&credentials("ep-1")).expect("subscribe");
        store
            .set_preferences("ep-1", &[NomineeKey::new("1", "2")], 900, MIN_SUMMARY_INTERVAL_SECS)
            .expect("preferences");
        store
            .set_preferences("ep-1", &[NomineeKey::new("3", "4")], 1800, MIN_SUMMARY_INTERVAL_SECS)
            .expect("preferences");

        let stored = store
            .get_preferences("ep-1")
            .expect("query")
            .expect("row exists");
        assert_eq!(stored.nominee_filter, vec![NomineeKey::new("3", "4")]);
        assert_eq!(stored.summary_interval_secs, 1800);
    }
}
