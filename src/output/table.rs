use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::catalog::Catalog;
use crate::ranking::{GapRecord, RankingRow};
use crate::store::VoteObservation;

pub fn render_ranking_table(rows: &[RankingRow]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Rank", "Nominee", "Votes", "Behind Leader"]);

    for row in rows {
        let rank_cell = if row.rank == 1 {
            Cell::new(row.rank).fg(Color::Green)
        } else {
            Cell::new(row.rank)
        };
        table.add_row(Row::from(vec![
            rank_cell,
            Cell::new(&row.display_name),
            Cell::new(row.votes),
            Cell::new(if row.gap_to_leader == 0 {
                "-".to_string()
            } else {
                row.gap_to_leader.to_string()
            }),
        ]));
    }
    table.to_string()
}

pub fn render_gaps_table(record: &GapRecord) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Position", "Votes", "To Overtake", "Lead Below", "Behind Leader"]);

    table.add_row(vec![
        format!("{}/{}", record.rank, record.total_nominees),
        record.votes.to_string(),
        record
            .above
            .as_ref()
            .map(|g| g.gap.to_string())
            .unwrap_or_else(|| "-".to_string()),
        record
            .below
            .as_ref()
            .map(|g| g.gap.to_string())
            .unwrap_or_else(|| "-".to_string()),
        record.gap_to_leader.to_string(),
    ]);
    table.to_string()
}

pub fn render_history_table(observations: &[VoteObservation]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Observed At", "Award", "Nominee", "Votes"]);

    for obs in observations {
        table.add_row(vec![
            obs.observed_at.to_rfc3339(),
            obs.award_id.clone(),
            obs.nominee_id.clone(),
            obs.vote_count.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_categories_table(catalog: &Catalog) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Award ID", "Award", "Nominees"]);

    for (award_id, award) in &catalog.awards {
        table.add_row(vec![
            award_id.clone(),
            award.award_name.clone(),
            award.nominees.len().to_string(),
        ]);
    }
    table.to_string()
}
