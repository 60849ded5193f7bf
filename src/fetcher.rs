use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::NomineeKey;
use crate::config::ApiConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("vote API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("vote API reported failure")]
    Unsuccessful,
    #[error("malformed vote payload: {0}")]
    Malformed(String),
}

/// One consistent observation of every tracked nominee's count, keyed by
/// award. Nominee order within an award is the payload encounter order; the
/// ranking engine relies on it for stable tie-breaks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteSnapshot {
    pub awards: BTreeMap<String, Vec<(String, u64)>>,
}

impl VoteSnapshot {
    pub fn is_empty(&self) -> bool {
        self.awards.is_empty()
    }

    pub fn nominee_count(&self) -> usize {
        self.awards.values().map(Vec::len).sum()
    }

    pub fn count(&self, key: &NomineeKey) -> Option<u64> {
        self.awards
            .get(&key.award_id)?
            .iter()
            .find(|(id, _)| *id == key.nominee_id)
            .map(|(_, count)| *count)
    }

    pub fn flatten(&self) -> BTreeMap<NomineeKey, u64> {
        let mut out = BTreeMap::new();
        for (award_id, nominees) in &self.awards {
            for (nominee_id, count) in nominees {
                out.insert(NomineeKey::new(award_id.clone(), nominee_id.clone()), *count);
            }
        }
        out
    }
}

pub struct VoteFetcher {
    client: Client,
    url: String,
    origin: String,
}

impl VoteFetcher {
    pub fn new(api: &ApiConfig, fetch_ids: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("vote-sentinel/0.1")
            .timeout(Duration::from_secs(api.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(api.timeout_secs.max(1).min(6)))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}?m=get-vote&lstId={}", api.vote_url, fetch_ids),
            origin: api.origin.clone(),
        })
    }

    /// Idempotent read of the external vote endpoint. Persistence is the
    /// caller's job, so a failed fetch can be retried next cycle without
    /// leaving partial state behind.
    pub async fn fetch(&self) -> Result<VoteSnapshot, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header("Origin", &self.origin)
            .header("Referer", format!("{}/", self.origin))
            .send()
            .await?;
        let payload: Value = response.error_for_status()?.json().await?;
        parse_snapshot(&payload)
    }
}

/// Normalizes `{Success, Data: [{a, m, list: [{v}]}]}` into typed counts.
/// Ids and counts arrive as either JSON strings or numbers; both are parsed
/// once here and never re-parsed downstream. Entries without a vote list
/// count as zero.
pub fn parse_snapshot(payload: &Value) -> Result<VoteSnapshot, FetchError> {
    if payload.get("Success").and_then(Value::as_bool) != Some(true) {
        return Err(FetchError::Unsuccessful);
    }

    let entries = payload
        .get("Data")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("missing Data array".to_string()))?;

    let mut snapshot = VoteSnapshot::default();
    for entry in entries {
        let award_id = id_text(entry.get("a"))
            .ok_or_else(|| FetchError::Malformed("entry missing award id".to_string()))?;
        let nominee_id = id_text(entry.get("m"))
            .ok_or_else(|| FetchError::Malformed("entry missing nominee id".to_string()))?;
        let count = match entry.get("list").and_then(Value::as_array) {
            Some(list) if !list.is_empty() => count_value(list[0].get("v"))?,
            _ => 0,
        };
        snapshot
            .awards
            .entry(award_id)
            .or_default()
            .push((nominee_id, count));
    }
    Ok(snapshot)
}

fn id_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_value(value: Option<&Value>) -> Result<u64, FetchError> {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| FetchError::Malformed(format!("negative vote count: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .replace(',', "")
            .parse::<u64>()
            .map_err(|_| FetchError::Malformed(format!("unparseable vote count: {s:?}"))),
        other => Err(FetchError::Malformed(format!(
            "unexpected vote count value: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_snapshot, FetchError};
    use crate::catalog::NomineeKey;

    #[test]
    fn parses_mixed_string_and_numeric_fields() {
        let payload = json!({
            "Success": true,
            "Data": [
                {"a": 12, "m": "88", "list": [{"v": "1,204"}]},
                {"a": "12", "m": 89, "list": [{"v": 950}]}
            ]
        });
        let snapshot = parse_snapshot(&payload).expect("payload should parse");
        assert_eq!(snapshot.count(&NomineeKey::new("12", "88")), Some(1204));
        assert_eq!(snapshot.count(&NomineeKey::new("12", "89")), Some(950));
        assert_eq!(snapshot.awards["12"][0].0, "88");
    }

    #[test]
    fn missing_vote_list_defaults_to_zero() {
        let payload = json!({
            "Success": true,
            "Data": [
                {"a": "3", "m": "7"},
                {"a": "3", "m": "8", "list": []}
            ]
        });
        let snapshot = parse_snapshot(&payload).expect("payload should parse");
        assert_eq!(snapshot.count(&NomineeKey::new("3", "7")), Some(0));
        assert_eq!(snapshot.count(&NomineeKey::new("3", "8")), Some(0));
    }

    #[test]
    fn failure_flag_is_rejected() {
        let payload = json!({"Success": false, "Data": []});
        assert!(matches!(
            parse_snapshot(&payload),
            Err(FetchError::Unsuccessful)
        ));
        assert!(matches!(
            parse_snapshot(&json!({"Data": []})),
            Err(FetchError::Unsuccessful)
        ));
    }

    #[test]
    fn unparseable_count_is_malformed() {
        let payload = json!({
            "Success": true,
            "Data": [{"a": "3", "m": "7", "list": [{"v": "n/a"}]}]
        });
        assert!(matches!(
            parse_snapshot(&payload),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn missing_data_array_is_malformed() {
        assert!(matches!(
            parse_snapshot(&json!({"Success": true})),
            Err(FetchError::Malformed(_))
        ));
    }
}
