use serde::Serialize;

use crate::catalog::Catalog;

/// Stable descending sort by count; ties keep the input encounter order,
/// which upstream is the order nominees appeared in the fetch payload.
pub fn rank(votes: &[(String, u64)]) -> Vec<(String, u64)> {
    let mut ranked = votes.to_vec();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborGap {
    pub nominee_id: String,
    pub votes: u64,
    /// Oriented so the value is always non-negative: votes needed to overtake
    /// the neighbor above, or the lead held over the neighbor below.
    pub gap: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapRecord {
    /// 1-based position in the descending ranking.
    pub rank: usize,
    pub total_nominees: usize,
    pub votes: u64,
    pub above: Option<NeighborGap>,
    pub below: Option<NeighborGap>,
    pub gap_to_leader: u64,
}

pub fn gaps(ranking: &[(String, u64)], target_id: &str) -> Option<GapRecord> {
    let position = ranking.iter().position(|(id, _)| id == target_id)?;
    let votes = ranking[position].1;

    let above = position.checked_sub(1).map(|idx| {
        let (id, above_votes) = &ranking[idx];
        NeighborGap {
            nominee_id: id.clone(),
            votes: *above_votes,
            gap: above_votes.saturating_sub(votes),
        }
    });
    let below = ranking.get(position + 1).map(|(id, below_votes)| NeighborGap {
        nominee_id: id.clone(),
        votes: *below_votes,
        gap: votes.saturating_sub(*below_votes),
    });

    Some(GapRecord {
        rank: position + 1,
        total_nominees: ranking.len(),
        votes,
        above,
        below,
        gap_to_leader: ranking[0].1.saturating_sub(votes),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingRow {
    pub rank: usize,
    pub nominee_id: String,
    pub display_name: String,
    pub votes: u64,
    pub gap_to_leader: u64,
}

/// Full per-award leaderboard joined with catalog names, for the CLI command
/// and the ranking endpoint.
pub fn ranking_table(
    catalog: &Catalog,
    award_id: &str,
    latest: &[(String, u64)],
) -> Vec<RankingRow> {
    let ranked = rank(latest);
    let leader_votes = ranked.first().map(|(_, v)| *v).unwrap_or_default();
    ranked
        .into_iter()
        .enumerate()
        .map(|(idx, (nominee_id, votes))| {
            let display_name = catalog
                .award(award_id)
                .and_then(|award| {
                    award
                        .nominees
                        .iter()
                        .find(|n| n.nominee_id == nominee_id)
                        .map(|n| n.display_name.clone())
                })
                .unwrap_or_else(|| nominee_id.clone());
            RankingRow {
                rank: idx + 1,
                nominee_id,
                display_name,
                votes,
                gap_to_leader: leader_votes.saturating_sub(votes),
            }
        })
        .collect()
}
