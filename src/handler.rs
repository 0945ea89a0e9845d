//! One relay invocation: decode, diff, compose, publish.

use std::sync::Arc;

use tracing::Instrument;

use crate::config::RelayTarget;
use crate::delta::{self, StackLookup};
use crate::errors::RelayError;
use crate::models::event::{decode_event, Delivery};
use crate::models::message::DecisionMessage;
use crate::models::notification::ApprovalNotification;
use crate::notification::relay::{self, RelayPublisher};
use crate::notification::slack;

/// Result of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published { message_id: String },
    /// SNS asked for subscription confirmation; the caller decides how.
    ConfirmationRequested { subscribe_url: String },
    Ignored { kind: String },
}

#[derive(Clone)]
pub struct ApprovalRelay {
    lookup: Arc<dyn StackLookup>,
    publisher: Arc<dyn RelayPublisher>,
    target: RelayTarget,
}

impl ApprovalRelay {
    pub fn new(
        lookup: Arc<dyn StackLookup>,
        publisher: Arc<dyn RelayPublisher>,
        target: RelayTarget,
    ) -> Self {
        Self {
            lookup,
            publisher,
            target,
        }
    }

    pub fn target(&self) -> &RelayTarget {
        &self.target
    }

    /// Build the message for `notification` without publishing it.
    pub async fn render(
        &self,
        notification: &ApprovalNotification,
    ) -> Result<DecisionMessage, RelayError> {
        let change_set = notification.change_set_ref()?;
        let summary = delta::fetch_delta(self.lookup.as_ref(), &change_set).await?;
        slack::build_message(notification, &summary)
    }

    /// Render and publish; the message is complete before the single publish.
    pub async fn relay(&self, notification: &ApprovalNotification) -> Result<String, RelayError> {
        let a = &notification.approval;
        tracing::info!(
            pipeline = %a.pipeline_name,
            stage = %a.stage_name,
            action = %a.action_name,
            "relaying pending approval"
        );

        let message = self.render(notification).await?;
        relay::publish_message(self.publisher.as_ref(), &self.target, &message).await
    }

    /// Decode a raw SNS event (Lambda or HTTP shape) and act on it.
    pub async fn handle_event(&self, raw: &str) -> Result<Outcome, RelayError> {
        let span = tracing::info_span!("invocation", id = %uuid::Uuid::new_v4());
        self.dispatch(raw).instrument(span).await
    }

    async fn dispatch(&self, raw: &str) -> Result<Outcome, RelayError> {
        match decode_event(raw)? {
            Delivery::Notification(notification) => {
                let message_id = self.relay(&notification).await?;
                Ok(Outcome::Published { message_id })
            }
            Delivery::SubscriptionConfirmation {
                subscribe_url,
                topic_arn,
            } => {
                tracing::info!(
                    topic = topic_arn.as_deref().unwrap_or("-"),
                    "SNS subscription confirmation requested"
                );
                Ok(Outcome::ConfirmationRequested { subscribe_url })
            }
            Delivery::Ignored { kind } => {
                tracing::debug!(kind = %kind, "ignoring SNS delivery");
                Ok(Outcome::Ignored { kind })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Parameter;
    use crate::notification::relay::MessageAttribute;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedLookup;

    #[async_trait]
    impl StackLookup for FixedLookup {
        async fn describe_stack_parameters(&self, _: &str) -> Result<Vec<Parameter>, RelayError> {
            Ok(vec![Parameter::new("A", "1"), Parameter::new("B", "2")])
        }

        async fn describe_change_set_parameters(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<Parameter>, RelayError> {
            Ok(vec![
                Parameter::new("A", "1"),
                Parameter::new("B", "3"),
                Parameter::new("C", "4"),
            ])
        }
    }

    struct MissingStack;

    #[async_trait]
    impl StackLookup for MissingStack {
        async fn describe_stack_parameters(&self, name: &str) -> Result<Vec<Parameter>, RelayError> {
            Err(RelayError::Lookup(format!("stack {} does not exist", name)))
        }

        async fn describe_change_set_parameters(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<Parameter>, RelayError> {
            unreachable!("change set is only read after the stack")
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        calls: Mutex<Vec<(String, String, Vec<MessageAttribute>)>>,
    }

    #[async_trait]
    impl RelayPublisher for RecordingPublisher {
        async fn publish(
            &self,
            topic: &str,
            body: &str,
            attributes: &[MessageAttribute],
        ) -> Result<String, RelayError> {
            self.calls
                .lock()
                .unwrap()
                .push((topic.into(), body.into(), attributes.to_vec()));
            Ok("msg-1".into())
        }
    }

    fn target() -> RelayTarget {
        RelayTarget {
            topic_arn: "arn:aws:sns:us-east-1:1:relay".into(),
            webhook_url: "https://hooks.slack.com/services/T/B/X".into(),
        }
    }

    fn event(custom_data: &str) -> String {
        let message = serde_json::json!({
            "region": "us-east-1",
            "consoleLink": "https://console",
            "approval": {
                "pipelineName": "web-cd",
                "stageName": "Production",
                "actionName": "Approve",
                "token": "tok",
                "approvalReviewLink": "https://review",
                "customData": custom_data,
            }
        });
        serde_json::json!({ "Records": [{ "Sns": { "Message": message.to_string() } }] })
            .to_string()
    }

    #[tokio::test]
    async fn test_successful_run_publishes_once() {
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = ApprovalRelay::new(Arc::new(FixedLookup), publisher.clone(), target());

        let outcome = relay
            .handle_event(&event(r#"{"StackName":"web","ChangeSetName":"cs"}"#))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Published {
                message_id: "msg-1".into()
            }
        );

        let calls = publisher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (topic, body, attributes) = &calls[0];
        assert_eq!(topic, "arn:aws:sns:us-east-1:1:relay");
        assert_eq!(attributes[0].name, "WebhookURL");
        assert_eq!(attributes[0].string_value, "https://hooks.slack.com/services/T/B/X");

        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        let attachments = body["attachments"].as_array().unwrap();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0]["title"], "Stack Parameters Delta");
        assert_eq!(attachments[1]["callback_id"], "codepipeline-approval-action");
    }

    #[tokio::test]
    async fn test_missing_stack_name_never_publishes() {
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = ApprovalRelay::new(Arc::new(FixedLookup), publisher.clone(), target());

        let err = relay
            .handle_event(&event(r#"{"ChangeSetName":"cs"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedInput(_)));
        assert!(publisher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_never_publishes() {
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = ApprovalRelay::new(Arc::new(MissingStack), publisher.clone(), target());

        let err = relay
            .handle_event(&event(r#"{"StackName":"web","ChangeSetName":"cs"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Lookup(_)));
        assert!(publisher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_is_passed_back() {
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = ApprovalRelay::new(Arc::new(FixedLookup), publisher.clone(), target());

        let raw = r#"{"Type":"SubscriptionConfirmation","Message":"m","SubscribeURL":"https://sns.us-east-1.amazonaws.com/?Action=ConfirmSubscription"}"#;
        let outcome = relay.handle_event(raw).await.unwrap();
        assert!(matches!(outcome, Outcome::ConfirmationRequested { .. }));
        assert!(publisher.calls.lock().unwrap().is_empty());
    }
}
