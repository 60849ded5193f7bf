pub mod detector;
pub mod dispatcher;
pub mod transport;

pub use detector::{evaluate_recipient, RecipientState};
pub use dispatcher::{Dispatcher, PushMessage};
pub use transport::{DeliveryOutcome, PushTransport, StdoutTransport, WebPushTransport};

use serde::Serialize;

use crate::catalog::NomineeKey;

/// Typed outcome of diffing one recipient's tracked nominees against the
/// previous cycle. Ranks are 1-based for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    RaceSummary {
        award_id: String,
        leader: NomineeKey,
        leader_votes: u64,
        runner_up_gap: u64,
    },
    NewLeader {
        nominee: NomineeKey,
        rank: usize,
    },
    RankUp {
        nominee: NomineeKey,
        rank: usize,
    },
    Milestone {
        nominee: NomineeKey,
        value: u64,
    },
}
