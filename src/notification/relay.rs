use async_trait::async_trait;

use crate::config::RelayTarget;
use crate::errors::RelayError;
use crate::models::message::DecisionMessage;

/// Message attribute the relay's subscriber routes on.
pub const WEBHOOK_URL_ATTRIBUTE: &str = "WebhookURL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttribute {
    pub name: String,
    pub data_type: String,
    pub string_value: String,
}

impl MessageAttribute {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: "String".into(),
            string_value: value.into(),
        }
    }
}

/// Fire-and-forget publish sink for composed messages.
#[async_trait]
pub trait RelayPublisher: Send + Sync {
    /// Publish `body` to `topic`; returns the relay's message id.
    async fn publish(
        &self,
        topic: &str,
        body: &str,
        attributes: &[MessageAttribute],
    ) -> Result<String, RelayError>;
}

pub fn routing_attributes(target: &RelayTarget) -> Vec<MessageAttribute> {
    vec![MessageAttribute::string(
        WEBHOOK_URL_ATTRIBUTE,
        target.webhook_url.clone(),
    )]
}

/// Serialize `message` and hand it to the relay in a single publish call.
pub async fn publish_message(
    publisher: &dyn RelayPublisher,
    target: &RelayTarget,
    message: &DecisionMessage,
) -> Result<String, RelayError> {
    let body = serde_json::to_string(message)
        .map_err(|e| anyhow::anyhow!("message serialize error: {}", e))?;
    let attributes = routing_attributes(target);

    let message_id = publisher
        .publish(&target.topic_arn, &body, &attributes)
        .await?;

    tracing::info!(
        topic = %target.topic_arn,
        message_id = %message_id,
        bytes = body.len(),
        "published approval message to relay"
    );
    Ok(message_id)
}
