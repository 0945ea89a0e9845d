//! Minimal clients for the two AWS Query APIs the relay talks to.
//!
//! Both CloudFormation and SNS accept form-encoded `Action=...` POSTs and,
//! with `ContentType=JSON`, answer in JSON instead of XML.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use thiserror::Error;

use crate::config::AwsConfig;

pub mod cloudformation;
pub mod sigv4;
pub mod sns;

#[derive(Debug, Error)]
pub enum AwsError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {code}: {message}")]
    Service {
        service: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    #[error("{service} returned an unreadable response: {detail}")]
    Decode { service: &'static str, detail: String },

    #[error("{service} request could not be signed: {source}")]
    Signing {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AwsError {
    /// The AWS error code (`ValidationError`, `ChangeSetNotFound`, ...), if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::Service { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Error")]
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Signed form-POST client bound to one AWS service.
#[derive(Clone)]
pub(crate) struct QueryClient {
    http: reqwest::Client,
    endpoint: String,
    service: &'static str,
    version: &'static str,
    config: AwsConfig,
}

/// Regional endpoint for `service`, honouring `AWS_ENDPOINT_URL`.
pub fn service_endpoint(config: &AwsConfig, service: &str) -> String {
    if let Some(ref endpoint) = config.endpoint_url {
        return format!("{}/", endpoint.trim_end_matches('/'));
    }
    let suffix = if config.region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    };
    format!("https://{}.{}.{}/", service, config.region, suffix)
}

impl QueryClient {
    pub(crate) fn new(
        config: &AwsConfig,
        service: &'static str,
        version: &'static str,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("approval-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: service_endpoint(config, service),
            service,
            version,
            config: config.clone(),
        })
    }

    /// POST `Action=<action>` with `params` and return the parsed JSON body.
    pub(crate) async fn call(
        &self,
        action: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value, AwsError> {
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.append_pair("Action", action);
            form.append_pair("Version", self.version);
            form.append_pair("ContentType", "JSON");
            for (k, v) in params {
                form.append_pair(k, v);
            }
            form.finish()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        sigv4::sign_request(
            "POST",
            &self.endpoint,
            &mut headers,
            body.as_bytes(),
            sigv4::SigningCredentials {
                access_key: &self.config.access_key_id,
                secret_key: &self.config.secret_access_key,
                session_token: self.config.session_token.as_deref(),
            },
            &self.config.region,
            self.service,
            chrono::Utc::now(),
        )
        .map_err(|source| AwsError::Signing {
            service: self.service,
            source,
        })?;

        tracing::debug!(service = self.service, action, endpoint = %self.endpoint, "calling AWS");

        let resp = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| AwsError::Transport {
                service: self.service,
                source,
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|source| AwsError::Transport {
            service: self.service,
            source,
        })?;

        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(env) => (env.error.code, env.error.message),
                Err(_) => (String::from("Unknown"), text),
            };
            return Err(AwsError::Service {
                service: self.service,
                status: status.as_u16(),
                code,
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| AwsError::Decode {
            service: self.service,
            detail: e.to_string(),
        })
    }
}

/// Walk `<Action>Response.<Action>Result` and deserialize the result body.
pub(crate) fn action_result<T>(
    service: &'static str,
    action: &str,
    mut body: serde_json::Value,
) -> Result<T, AwsError>
where
    T: serde::de::DeserializeOwned,
{
    let result = body
        .get_mut(format!("{}Response", action))
        .and_then(|r| r.get_mut(format!("{}Result", action)))
        .map(serde_json::Value::take)
        .ok_or_else(|| AwsError::Decode {
            service,
            detail: format!("missing {}Response.{}Result", action, action),
        })?;

    serde_json::from_value(result).map_err(|e| AwsError::Decode {
        service,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws(region: &str, endpoint: Option<&str>) -> AwsConfig {
        AwsConfig {
            region: region.into(),
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
            endpoint_url: endpoint.map(String::from),
        }
    }

    #[test]
    fn test_service_endpoint() {
        assert_eq!(
            service_endpoint(&aws("eu-west-1", None), "sns"),
            "https://sns.eu-west-1.amazonaws.com/"
        );
        assert_eq!(
            service_endpoint(&aws("cn-north-1", None), "cloudformation"),
            "https://cloudformation.cn-north-1.amazonaws.com.cn/"
        );
        assert_eq!(
            service_endpoint(&aws("us-east-1", Some("http://localhost:4566")), "sns"),
            "http://localhost:4566/"
        );
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct PublishResult {
        message_id: String,
    }

    #[test]
    fn test_action_result_unwraps_envelope() {
        let body = serde_json::json!({
            "PublishResponse": {
                "PublishResult": { "MessageId": "abc" },
                "ResponseMetadata": { "RequestId": "r" }
            }
        });
        let result: PublishResult = action_result("sns", "Publish", body).unwrap();
        assert_eq!(result.message_id, "abc");
    }

    #[test]
    fn test_action_result_missing_envelope() {
        let err = action_result::<PublishResult>("sns", "Publish", serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, AwsError::Decode { .. }));
    }
}
