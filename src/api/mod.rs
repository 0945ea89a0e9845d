use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::errors::RelayError;
use crate::handler::{ApprovalRelay, Outcome};
use crate::models::event::delivery_topic_arn;

/// Shared state for the SNS HTTP endpoint.
pub struct AppState {
    pub relay: ApprovalRelay,
    pub http: reqwest::Client,
    /// Deliveries from any other topic are refused before decoding.
    pub source_topic_arn: String,
    /// Extra origin accepted for SubscribeURL (the `AWS_ENDPOINT_URL` override).
    pub endpoint_override: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/notifications", post(receive_notification))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// SNS posts with `text/plain`, so the body is taken as a raw string.
async fn receive_notification(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<impl IntoResponse, RelayError> {
    check_source_topic(&body, &state.source_topic_arn).map_err(|e| {
        tracing::warn!(code = e.code(), error = %e, "rejected SNS delivery");
        e
    })?;

    let outcome = state.relay.handle_event(&body).await.map_err(|e| {
        tracing::warn!(code = e.code(), error = %e, "approval relay invocation failed");
        e
    })?;

    let response = match outcome {
        Outcome::Published { message_id } => {
            json!({ "status": "published", "message_id": message_id })
        }
        Outcome::ConfirmationRequested { subscribe_url } => {
            confirm_subscription(
                &state.http,
                &subscribe_url,
                state.endpoint_override.as_deref(),
            )
            .await?;
            json!({ "status": "subscribed" })
        }
        Outcome::Ignored { kind } => json!({ "status": "ignored", "type": kind }),
    };
    Ok((StatusCode::OK, Json(response)))
}

/// Every delivery must name the configured source topic.
pub fn check_source_topic(raw: &str, expected: &str) -> Result<(), RelayError> {
    match delivery_topic_arn(raw) {
        Some(ref topic) if topic == expected => Ok(()),
        Some(topic) => Err(RelayError::UntrustedSource(format!(
            "delivery from unexpected topic {}",
            topic
        ))),
        None => Err(RelayError::UntrustedSource(
            "delivery does not name its TopicArn".into(),
        )),
    }
}

/// Only AWS-hosted SNS endpoints (or the configured override) are fetched.
pub fn is_trusted_subscribe_url(subscribe_url: &str, endpoint_override: Option<&str>) -> bool {
    if let Some(origin) = endpoint_override {
        if let Some(rest) = subscribe_url.strip_prefix(origin) {
            if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
                return true;
            }
        }
    }
    let Ok(parsed) = url::Url::parse(subscribe_url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    parsed.scheme() == "https"
        && host.starts_with("sns.")
        && (host.ends_with(".amazonaws.com") || host.ends_with(".amazonaws.com.cn"))
}

pub async fn confirm_subscription(
    http: &reqwest::Client,
    subscribe_url: &str,
    endpoint_override: Option<&str>,
) -> Result<(), RelayError> {
    if !is_trusted_subscribe_url(subscribe_url, endpoint_override) {
        return Err(RelayError::malformed(format!(
            "refusing to confirm subscription via untrusted URL {}",
            subscribe_url
        )));
    }

    let resp = http
        .get(subscribe_url)
        .send()
        .await
        .map_err(|e| RelayError::Internal(anyhow::anyhow!("subscription confirmation failed: {}", e)))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RelayError::Internal(anyhow::anyhow!(
            "subscription confirmation returned status={}, body={}",
            status,
            body
        )));
    }

    tracing::info!("Confirmed SNS subscription");
    Ok(())
}
