//! Inbound event envelopes.
//!
//! Approval notifications reach the relay through SNS, either as a Lambda
//! invocation event (`Records[].Sns.Message`) or as an SNS HTTP(S)
//! subscription delivery (`Type` / `Message` at the top level).

use serde::Deserialize;

use crate::errors::RelayError;
use crate::models::notification::ApprovalNotification;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Lambda(LambdaEvent),
    Http(HttpDelivery),
}

#[derive(Debug, Deserialize)]
struct LambdaEvent {
    #[serde(rename = "Records")]
    records: Vec<LambdaRecord>,
}

#[derive(Debug, Deserialize)]
struct LambdaRecord {
    #[serde(rename = "Sns")]
    sns: LambdaSnsPayload,
}

#[derive(Debug, Deserialize)]
struct LambdaSnsPayload {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HttpDelivery {
    #[serde(rename = "Type")]
    kind: String,
    message: String,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    topic_arn: Option<String>,
    #[serde(rename = "SubscribeURL", default)]
    subscribe_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeliveryOrigin {
    #[serde(rename = "TopicArn", default)]
    topic_arn: Option<String>,
}

/// Top-level `TopicArn` of an SNS HTTP delivery, if the body carries one.
pub fn delivery_topic_arn(raw: &str) -> Option<String> {
    serde_json::from_str::<DeliveryOrigin>(raw)
        .ok()
        .and_then(|origin| origin.topic_arn)
}

/// What an inbound event asks the relay to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Notification(ApprovalNotification),
    /// SNS wants the HTTP endpoint to confirm its subscription.
    SubscriptionConfirmation {
        subscribe_url: String,
        topic_arn: Option<String>,
    },
    /// Anything else SNS may send (e.g. `UnsubscribeConfirmation`).
    Ignored { kind: String },
}

pub fn decode_event(raw: &str) -> Result<Delivery, RelayError> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| RelayError::malformed(format!("unrecognised event envelope: {}", e)))?;

    match envelope {
        Envelope::Lambda(event) => {
            let record = event
                .records
                .into_iter()
                .next()
                .ok_or_else(|| RelayError::malformed("event contains no SNS records"))?;
            ApprovalNotification::from_message(&record.sns.message).map(Delivery::Notification)
        }
        Envelope::Http(delivery) => match delivery.kind.as_str() {
            "Notification" => {
                tracing::debug!(
                    message_id = delivery.message_id.as_deref().unwrap_or("-"),
                    "decoding SNS HTTP notification"
                );
                ApprovalNotification::from_message(&delivery.message).map(Delivery::Notification)
            }
            "SubscriptionConfirmation" => {
                let subscribe_url = delivery.subscribe_url.ok_or_else(|| {
                    RelayError::malformed("SubscriptionConfirmation without SubscribeURL")
                })?;
                Ok(Delivery::SubscriptionConfirmation {
                    subscribe_url,
                    topic_arn: delivery.topic_arn,
                })
            }
            other => Ok(Delivery::Ignored {
                kind: other.to_string(),
            }),
        },
    }
}
