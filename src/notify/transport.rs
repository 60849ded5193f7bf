use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::PushConfig;
use crate::notify::dispatcher::PushMessage;
use crate::store::SubscriberCredentials;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Recipient stays subscribed; the failure is logged and the event is
    /// not retried within the cycle.
    TransientFailure(String),
    /// Endpoint is gone for good; the caller cascades deletion of the
    /// subscriber and its preferences.
    PermanentFailure(String),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        message: &PushMessage,
        recipient: &SubscriberCredentials,
    ) -> DeliveryOutcome;
}

pub struct StdoutTransport;

#[async_trait]
impl PushTransport for StdoutTransport {
    async fn deliver(
        &self,
        message: &PushMessage,
        recipient: &SubscriberCredentials,
    ) -> DeliveryOutcome {
        println!(
            "[push -> {}] {} | {}",
            endpoint_preview(&recipient.endpoint),
            message.title,
            message.body.replace('\n', " / ")
        );
        DeliveryOutcome::Delivered
    }
}

pub struct WebPushTransport {
    client: Client,
    ttl_secs: u64,
}

impl WebPushTransport {
    pub fn new(config: &PushConfig) -> Self {
        let client = Client::builder()
            .user_agent("vote-sentinel/0.1")
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .expect("failed to build push HTTP client");
        Self {
            client,
            ttl_secs: config.ttl_secs,
        }
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        message: &PushMessage,
        recipient: &SubscriberCredentials,
    ) -> DeliveryOutcome {
        let response = self
            .client
            .post(&recipient.endpoint)
            .header("TTL", self.ttl_secs)
            .json(message)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    DeliveryOutcome::Delivered
                } else if matches!(
                    status,
                    StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::GONE
                ) {
                    DeliveryOutcome::PermanentFailure(format!("endpoint returned {status}"))
                } else {
                    DeliveryOutcome::TransientFailure(format!("endpoint returned {status}"))
                }
            }
            Err(err) => DeliveryOutcome::TransientFailure(err.to_string()),
        }
    }
}

pub fn endpoint_preview(endpoint: &str) -> String {
    endpoint.chars().take(24).collect()
}
