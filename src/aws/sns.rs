use async_trait::async_trait;
use serde::Deserialize;

use super::{action_result, QueryClient};
use crate::config::AwsConfig;
use crate::errors::RelayError;
use crate::notification::relay::{MessageAttribute, RelayPublisher};

const SERVICE: &str = "sns";
const API_VERSION: &str = "2010-03-31";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PublishResult {
    message_id: String,
}

/// SNS `Publish` over the Query API.
#[derive(Clone)]
pub struct SnsClient {
    client: QueryClient,
}

impl SnsClient {
    pub fn new(config: &AwsConfig) -> Result<Self, RelayError> {
        let client = QueryClient::new(config, SERVICE, API_VERSION)?;
        Ok(Self { client })
    }
}

/// Flatten a publish call into Query API form parameters.
pub(crate) fn publish_params(
    topic: &str,
    body: &str,
    attributes: &[MessageAttribute],
) -> Vec<(String, String)> {
    let mut params = vec![
        ("TopicArn".to_string(), topic.to_string()),
        ("Message".to_string(), body.to_string()),
    ];
    for (i, attr) in attributes.iter().enumerate() {
        let prefix = format!("MessageAttributes.entry.{}", i + 1);
        params.push((format!("{}.Name", prefix), attr.name.clone()));
        params.push((format!("{}.Value.DataType", prefix), attr.data_type.clone()));
        params.push((format!("{}.Value.StringValue", prefix), attr.string_value.clone()));
    }
    params
}

#[async_trait]
impl RelayPublisher for SnsClient {
    async fn publish(
        &self,
        topic: &str,
        body: &str,
        attributes: &[MessageAttribute],
    ) -> Result<String, RelayError> {
        let params = publish_params(topic, body, attributes);
        let response = self.client.call("Publish", &params).await.map_err(|e| {
            tracing::warn!(topic, error = %e, "SNS publish failed");
            RelayError::Publish(e.to_string())
        })?;

        let result: PublishResult = action_result(SERVICE, "Publish", response)
            .map_err(|e| RelayError::Publish(e.to_string()))?;
        Ok(result.message_id)
    }
}
