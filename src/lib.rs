//! Approval relay library crate, exposed for integration testing.
//!
//! Turns CodePipeline manual-approval notifications into Slack messages with
//! a stack parameter delta and Approve / Reject buttons, and publishes them to
//! an SNS relay topic.

pub mod api;
pub mod aws;
pub mod config;
pub mod delta;
pub mod errors;
pub mod handler;
pub mod models;
pub mod notification;

use std::sync::Arc;

use aws::cloudformation::CloudFormationClient;
use aws::sns::SnsClient;
use errors::RelayError;
use handler::ApprovalRelay;

/// Wire the AWS-backed lookup and publisher into a relay.
pub fn build_relay(cfg: &config::Config) -> Result<ApprovalRelay, RelayError> {
    let lookup = CloudFormationClient::new(&cfg.aws)?;
    let publisher = SnsClient::new(&cfg.aws)?;
    Ok(ApprovalRelay::new(
        Arc::new(lookup),
        Arc::new(publisher),
        cfg.relay.clone(),
    ))
}
