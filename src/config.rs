use std::fmt;

use crate::errors::RelayError;

pub const WEBHOOK_URL_VAR: &str = "PIPELINE_SLACK_WEBHOOK_URL";
pub const RELAY_TOPIC_VAR: &str = "SLACK_MESSAGE_RELAY_TOPIC_ARN";
pub const SOURCE_TOPIC_VAR: &str = "APPROVAL_NOTIFICATION_TOPIC_ARN";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_PORT: u16 = 8080;

/// Process configuration.
///
/// AWS credentials are read from static environment variables only; instance
/// and task role credentials are not fetched.
#[derive(Debug, Clone)]
pub struct Config {
    pub relay: RelayTarget,
    pub aws: AwsConfig,
    /// Topic that publishes approval notifications. `serve` only accepts
    /// deliveries whose `TopicArn` matches it.
    pub source_topic_arn: Option<String>,
    /// Port for `serve`. Set via RELAY_PORT. Default: 8080.
    pub port: u16,
}

/// Where composed messages go: the relay topic and the webhook its
/// subscriber forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    pub topic_arn: String,
    pub webhook_url: String,
}

#[derive(Clone)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Overrides the regional service endpoints (local stacks, tests).
    pub endpoint_url: Option<String>,
}

// Credentials stay out of logs.
impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

pub fn load() -> Result<Config, RelayError> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build the configuration from an arbitrary variable source.
pub fn from_lookup<F>(get: F) -> Result<Config, RelayError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &str| {
        get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RelayError::Config(format!("{} must be set", key)))
    };

    let relay = RelayTarget {
        webhook_url: required(WEBHOOK_URL_VAR)?,
        topic_arn: required(RELAY_TOPIC_VAR)?,
    };

    let region = get("AWS_REGION")
        .or_else(|| get("AWS_DEFAULT_REGION"))
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.into());

    let credential = |key: &str| {
        required(key).map_err(|_| {
            RelayError::Config(format!(
                "{} must be set (static credentials are required; instance and task roles are not supported)",
                key
            ))
        })
    };

    let aws = AwsConfig {
        region,
        access_key_id: credential("AWS_ACCESS_KEY_ID")?,
        secret_access_key: credential("AWS_SECRET_ACCESS_KEY")?,
        session_token: get("AWS_SESSION_TOKEN").filter(|t| !t.is_empty()),
        endpoint_url: get("AWS_ENDPOINT_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty()),
    };

    let port = match get("RELAY_PORT") {
        Some(raw) => raw
            .parse()
            .map_err(|_| RelayError::Config(format!("RELAY_PORT is not a port: {}", raw)))?,
        None => DEFAULT_PORT,
    };

    let source_topic_arn = get(SOURCE_TOPIC_VAR)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(Config {
        relay,
        aws,
        source_topic_arn,
        port,
    })
}

impl Config {
    /// The source topic, which `serve` cannot run without.
    pub fn require_source_topic(&self) -> Result<&str, RelayError> {
        self.source_topic_arn.as_deref().ok_or_else(|| {
            RelayError::Config(format!(
                "{} must be set to accept SNS HTTP deliveries",
                SOURCE_TOPIC_VAR
            ))
        })
    }
}
