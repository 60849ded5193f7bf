use serde::Serialize;

use crate::catalog::{Catalog, NomineeKey};
use crate::config::{PushConfig, PushMode};
use crate::notify::transport::{
    DeliveryOutcome, PushTransport, StdoutTransport, WebPushTransport,
};
use crate::notify::ChangeEvent;
use crate::store::SubscriberCredentials;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub image: String,
}

pub struct Dispatcher {
    transport: Box<dyn PushTransport>,
}

impl Dispatcher {
    pub fn new(transport: Box<dyn PushTransport>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &PushConfig) -> Self {
        let transport: Box<dyn PushTransport> = match config.mode {
            PushMode::Stdout => Box::new(StdoutTransport),
            PushMode::WebPush => Box::new(WebPushTransport::new(config)),
        };
        Self::new(transport)
    }

    /// One delivery attempt per (event, recipient); no retry here. The
    /// returned outcome drives the caller's pruning decision.
    pub async fn dispatch(
        &self,
        event: &ChangeEvent,
        catalog: &Catalog,
        recipient: &SubscriberCredentials,
    ) -> DeliveryOutcome {
        let message = render_event(event, catalog);
        self.transport.deliver(&message, recipient).await
    }
}

pub fn render_event(event: &ChangeEvent, catalog: &Catalog) -> PushMessage {
    match event {
        ChangeEvent::RaceSummary {
            award_id,
            leader,
            leader_votes,
            runner_up_gap,
        } => {
            let award_name = catalog.award_name(award_id).unwrap_or(award_id).to_string();
            let (name, image) = nominee_display(catalog, leader);
            PushMessage {
                title: format!("Race update - {award_name}"),
                body: format!(
                    "Leader: {name}\nTotal votes: {}\nLead: {} votes",
                    group_digits(*leader_votes),
                    group_digits(*runner_up_gap)
                ),
                icon: image.clone(),
                image,
            }
        }
        ChangeEvent::NewLeader { nominee, .. } => {
            let award_name = award_display(catalog, nominee);
            let (name, image) = nominee_display(catalog, nominee);
            PushMessage {
                title: format!("New leader - {award_name}"),
                body: format!(
                    "{name} just took the #1 spot in {award_name}. The race is on!"
                ),
                icon: image.clone(),
                image,
            }
        }
        ChangeEvent::RankUp { nominee, rank } => {
            let award_name = award_display(catalog, nominee);
            let (name, image) = nominee_display(catalog, nominee);
            PushMessage {
                title: format!("Ranking change - {award_name}"),
                body: format!("{name} climbed to #{rank} in {award_name}. Vote now!"),
                icon: image.clone(),
                image,
            }
        }
        ChangeEvent::Milestone { nominee, value } => {
            let award_name = award_display(catalog, nominee);
            let (name, image) = nominee_display(catalog, nominee);
            PushMessage {
                title: format!("Congratulations {name}"),
                body: format!(
                    "{} votes reached in {award_name}. Keep it going!",
                    format_milestone(*value)
                ),
                icon: image.clone(),
                image,
            }
        }
    }
}

/// `1_500_000 -> "1.5M"`, `10_000 -> "10K"`, below a thousand the raw value.
pub fn format_milestone(value: u64) -> String {
    if value >= 1_000_000 {
        let millions = value as f64 / 1_000_000.0;
        if (millions - millions.trunc()).abs() < f64::EPSILON {
            format!("{}M", millions as u64)
        } else {
            format!("{millions:.1}M")
        }
    } else if value >= 1_000 {
        format!("{}K", value / 1_000)
    } else {
        value.to_string()
    }
}

pub fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn nominee_display(catalog: &Catalog, key: &NomineeKey) -> (String, String) {
    match catalog.nominee(key) {
        Some(nominee) => (nominee.display_name.clone(), nominee.image_ref.clone()),
        None => (key.to_string(), String::new()),
    }
}

fn award_display(catalog: &Catalog, key: &NomineeKey) -> String {
    catalog
        .award_name(&key.award_id)
        .unwrap_or(key.award_id.as_str())
        .to_string()
}
