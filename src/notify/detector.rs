use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::catalog::{Catalog, NomineeKey};
use crate::notify::ChangeEvent;

/// Per-recipient diff baseline, owned exclusively by the notification loop.
/// Lost on restart; the first cycle after (re)creation only seeds the
/// baseline and never emits.
#[derive(Debug, Clone)]
pub struct RecipientState {
    pub prev_votes: BTreeMap<NomineeKey, u64>,
    pub last_summary_at: DateTime<Utc>,
}

impl RecipientState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            prev_votes: BTreeMap::new(),
            last_summary_at: now,
        }
    }
}

pub fn milestone_step(vote_count: u64) -> u64 {
    if vote_count <= 10_000 {
        1_000
    } else if vote_count <= 50_000 {
        5_000
    } else if vote_count <= 200_000 {
        10_000
    } else if vote_count <= 1_000_000 {
        50_000
    } else {
        100_000
    }
}

/// The highest newly crossed threshold, or None. The step is taken from the
/// NEW count, so at most one value comes back per cycle no matter how many
/// thresholds were jumped. Decreasing counts never fire.
pub fn crossed_milestone(prev: u64, curr: u64) -> Option<u64> {
    if prev >= curr {
        return None;
    }
    let step = milestone_step(curr);
    let prev_floor = (prev / step) * step;
    let curr_floor = (curr / step) * step;
    (curr_floor > prev_floor).then_some(curr_floor)
}

/// One detection cycle for one recipient, implementing the diff state
/// machine: cold-start seeding, per-award grouping, periodic race summary,
/// rank-change detection, milestone detection, then the unconditional
/// baseline advance. Events come back in emission order: summary first, rank
/// events in ascending new rank, milestones in filter order.
pub fn evaluate_recipient(
    state: &mut RecipientState,
    filter: &[NomineeKey],
    summary_interval_secs: u64,
    catalog: &Catalog,
    current_votes: &BTreeMap<NomineeKey, u64>,
    now: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let tracked: Vec<NomineeKey> = filter
        .iter()
        .filter(|key| catalog.contains(key) && current_votes.contains_key(key))
        .cloned()
        .collect();
    if tracked.is_empty() {
        return Vec::new();
    }

    if state.prev_votes.is_empty() {
        seed_baseline(state, &tracked, current_votes);
        return Vec::new();
    }

    let mut by_award: BTreeMap<&str, Vec<&NomineeKey>> = BTreeMap::new();
    for key in &tracked {
        by_award.entry(key.award_id.as_str()).or_default().push(key);
    }

    let mut events = Vec::new();
    for group in by_award.values() {
        let curr_ranking = rank_group(group, |key| current_votes.get(key).copied().unwrap_or(0));
        // Restricted to nominees with a known baseline; anything that first
        // appeared this cycle has no previous rank to compare against.
        let known: Vec<&NomineeKey> = group
            .iter()
            .copied()
            .filter(|key| state.prev_votes.contains_key(*key))
            .collect();
        let prev_ranking = rank_group(&known, |key| state.prev_votes.get(key).copied().unwrap_or(0));

        let summary_due =
            (now - state.last_summary_at).num_seconds() >= summary_interval_secs as i64;
        if summary_due && curr_ranking.len() >= 2 {
            let (leader, leader_votes) = &curr_ranking[0];
            let (_, runner_up_votes) = &curr_ranking[1];
            events.push(ChangeEvent::RaceSummary {
                award_id: leader.award_id.clone(),
                leader: (*leader).clone(),
                leader_votes: *leader_votes,
                runner_up_gap: leader_votes.saturating_sub(*runner_up_votes),
            });
            // Advanced on emission, not on delivery; a failed push is not
            // retried until the next interval elapses.
            state.last_summary_at = now;
        }

        for (rank_index, (key, _)) in curr_ranking.iter().enumerate() {
            let Some(prev_index) = prev_ranking.iter().position(|(k, _)| k == key) else {
                continue;
            };
            if rank_index < prev_index {
                let event = if rank_index == 0 {
                    ChangeEvent::NewLeader {
                        nominee: (*key).clone(),
                        rank: 1,
                    }
                } else {
                    ChangeEvent::RankUp {
                        nominee: (*key).clone(),
                        rank: rank_index + 1,
                    }
                };
                events.push(event);
            }
        }

        for key in group {
            let Some(prev) = state.prev_votes.get(*key).copied() else {
                continue;
            };
            let curr = current_votes.get(*key).copied().unwrap_or(0);
            if let Some(value) = crossed_milestone(prev, curr) {
                events.push(ChangeEvent::Milestone {
                    nominee: (*key).clone(),
                    value,
                });
            }
        }
    }

    seed_baseline(state, &tracked, current_votes);
    events
}

fn seed_baseline(
    state: &mut RecipientState,
    tracked: &[NomineeKey],
    current_votes: &BTreeMap<NomineeKey, u64>,
) {
    state.prev_votes = tracked
        .iter()
        .map(|key| (key.clone(), current_votes.get(key).copied().unwrap_or(0)))
        .collect();
}

fn rank_group<'a>(
    group: &[&'a NomineeKey],
    votes_of: impl Fn(&NomineeKey) -> u64,
) -> Vec<(&'a NomineeKey, u64)> {
    let mut ranked: Vec<(&NomineeKey, u64)> =
        group.iter().map(|key| (*key, votes_of(key))).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}
