use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::fetcher::VoteFetcher;
use crate::notify::transport::endpoint_preview;
use crate::notify::{evaluate_recipient, DeliveryOutcome, Dispatcher, RecipientState};
use crate::store::{StorageError, SubscriptionStore, VoteStore};

/// Runs the poll loop and the notification loop as independent tasks. The
/// SQLite file is the only shared resource; each task owns its own
/// connections and the notification loop exclusively owns recipient state.
pub async fn run(config: Config, catalog: Catalog, cycles: Option<u64>) -> Result<()> {
    let poll = tokio::spawn(run_poll_loop(config.clone(), catalog.clone(), cycles));
    let notify = tokio::spawn(run_notify_loop(config, catalog, cycles));
    let (poll_result, notify_result) = tokio::try_join!(poll, notify)?;
    poll_result?;
    notify_result?;
    Ok(())
}

/// Fetch-and-persist on a fixed cadence. Fetch or storage failures are
/// logged and the loop moves on to the next tick; nothing here is fatal.
pub async fn run_poll_loop(config: Config, catalog: Catalog, cycles: Option<u64>) -> Result<()> {
    let fetcher = VoteFetcher::new(&config.api, &catalog.fetch_ids())?;
    let mut store = VoteStore::open(&config.resolved_db_path())?;
    let mut ticker = interval(Duration::from_secs(config.poll.interval_secs.max(1)));

    let mut completed: u64 = 0;
    loop {
        ticker.tick().await;
        match fetcher.fetch().await {
            Ok(snapshot) if !snapshot.is_empty() => {
                match store.record_snapshot(&snapshot, Utc::now()) {
                    Ok(()) => info!(
                        nominees = snapshot.nominee_count(),
                        "persisted vote snapshot"
                    ),
                    Err(err) => warn!("failed persisting vote snapshot: {err}"),
                }
            }
            Ok(_) => warn!("vote API returned an empty snapshot"),
            Err(err) => warn!("vote fetch failed: {err}"),
        }
        completed += 1;
        if let Some(limit) = cycles {
            if completed >= limit {
                break;
            }
        }
    }
    Ok(())
}

pub async fn run_notify_loop(config: Config, catalog: Catalog, cycles: Option<u64>) -> Result<()> {
    let db_path = config.resolved_db_path();
    let mut votes = VoteStore::open(&db_path)?;
    let mut subs = SubscriptionStore::open(&db_path)?;
    let dispatcher = Dispatcher::from_config(&config.push);
    let mut states: BTreeMap<String, RecipientState> = BTreeMap::new();
    let mut ticker = interval(Duration::from_secs(config.notify.interval_secs.max(1)));

    let mut completed: u64 = 0;
    loop {
        ticker.tick().await;
        if let Err(err) =
            run_notify_cycle(&mut votes, &mut subs, &dispatcher, &catalog, &mut states).await
        {
            warn!("notification cycle failed: {err}");
        }
        completed += 1;
        if let Some(limit) = cycles {
            if completed >= limit {
                break;
            }
        }
    }
    Ok(())
}

/// One pass over all active recipients against a single consistent read of
/// the latest votes. Failures inside one recipient's processing are logged
/// and never abort the rest of the cycle.
pub async fn run_notify_cycle(
    votes: &mut VoteStore,
    subs: &mut SubscriptionStore,
    dispatcher: &Dispatcher,
    catalog: &Catalog,
    states: &mut BTreeMap<String, RecipientState>,
) -> Result<(), StorageError> {
    let all_preferences = subs.get_active_preferences()?;
    // Recipients that unsubscribed (or were pruned) since the last cycle.
    states.retain(|endpoint, _| all_preferences.contains_key(endpoint));
    if all_preferences.is_empty() {
        return Ok(());
    }

    let current_votes = votes.latest_votes()?;
    if current_votes.is_empty() {
        return Ok(());
    }
    let now = Utc::now();

    for (endpoint, prefs) in &all_preferences {
        if prefs.nominee_filter.is_empty() {
            continue;
        }
        let state = states
            .entry(endpoint.clone())
            .or_insert_with(|| RecipientState::new(now));
        let events = evaluate_recipient(
            state,
            &prefs.nominee_filter,
            prefs.summary_interval_secs,
            catalog,
            &current_votes,
            now,
        );
        if events.is_empty() {
            continue;
        }

        let credentials = match subs.credentials(endpoint) {
            Ok(Some(credentials)) => credentials,
            Ok(None) => continue,
            Err(err) => {
                warn!(
                    "failed loading credentials for {}: {err}",
                    endpoint_preview(endpoint)
                );
                continue;
            }
        };

        for event in &events {
            match dispatcher.dispatch(event, catalog, &credentials).await {
                DeliveryOutcome::Delivered => {}
                DeliveryOutcome::TransientFailure(reason) => {
                    warn!(
                        "push to {} failed transiently: {reason}",
                        endpoint_preview(endpoint)
                    );
                }
                DeliveryOutcome::PermanentFailure(reason) => {
                    info!(
                        "removing dead subscription {}: {reason}",
                        endpoint_preview(endpoint)
                    );
                    if let Err(err) = subs.unsubscribe(endpoint) {
                        warn!(
                            "failed removing subscription {}: {err}",
                            endpoint_preview(endpoint)
                        );
                    }
                    break;
                }
            }
        }
    }

    Ok(())
}
