//! Slack attachments for a pending CodePipeline approval.

use crate::delta::DeltaSummary;
use crate::errors::RelayError;
use crate::models::message::{
    ActionAttachment, ActionButton, Confirmation, Decision, DecisionMessage, DecisionPayload,
    DeltaAttachment,
};
use crate::models::notification::ApprovalNotification;

/// Routes button clicks to the CodePipeline approval handler.
pub const APPROVAL_CALLBACK_ID: &str = "codepipeline-approval-action";

const DELTA_TITLE: &str = "Stack Parameters Delta";
const ACTION_COLOR: &str = "#FF8400";
const ACTION_TEXT: &str = "Manual approval required to trigger *ExecuteChangeSet*";
const DECISION_BUTTON_NAME: &str = "decision";

// Approving executes the change set against production.
const APPROVE_CONFIRMATION: Confirmation = Confirmation {
    title: "Production Deploy Approval",
    text: "Are you sure you want to approve this CloudFormation change set for the production stack? Approval will trigger an immediate update to the production stack!",
    ok_text: "Deploy",
    dismiss_text: "Cancel",
};

pub fn parameters_delta_attachment(summary: &DeltaSummary) -> DeltaAttachment {
    DeltaAttachment {
        title: DELTA_TITLE.to_string(),
        footer: format!("Excludes {} unchanged parameters", summary.unchanged_count),
        mrkdwn_in: vec!["text"],
        text: summary.text(),
    }
}

pub fn decision_payload(notification: &ApprovalNotification, value: Decision) -> DecisionPayload {
    let a = &notification.approval;
    DecisionPayload {
        pipeline_name: a.pipeline_name.clone(),
        stage_name: a.stage_name.clone(),
        action_name: a.action_name.clone(),
        token: a.token.clone(),
        value,
    }
}

fn encode_payload(payload: &DecisionPayload) -> Result<String, RelayError> {
    serde_json::to_string(payload)
        .map_err(|e| RelayError::Internal(anyhow::anyhow!("decision payload serialize error: {}", e)))
}

pub fn approval_action_attachment(
    notification: &ApprovalNotification,
) -> Result<ActionAttachment, RelayError> {
    notification.validate()?;
    let a = &notification.approval;

    let approve = ActionButton {
        kind: "button",
        style: Some("primary"),
        name: DECISION_BUTTON_NAME,
        text: "Approve",
        value: encode_payload(&decision_payload(notification, Decision::Approved))?,
        confirm: Some(APPROVE_CONFIRMATION),
    };
    let reject = ActionButton {
        kind: "button",
        style: None,
        name: DECISION_BUTTON_NAME,
        text: "Reject",
        value: encode_payload(&decision_payload(notification, Decision::Rejected))?,
        confirm: None,
    };

    Ok(ActionAttachment {
        fallback: format!("{} {}: {}", a.pipeline_name, a.stage_name, a.action_name),
        color: ACTION_COLOR,
        author_name: a.pipeline_name.clone(),
        author_link: notification.console_link.clone(),
        title: format!("{}: {}", a.stage_name, a.action_name),
        title_link: a.approval_review_link.clone(),
        text: ACTION_TEXT,
        footer: notification.region.clone(),
        mrkdwn_in: vec!["text"],
        callback_id: APPROVAL_CALLBACK_ID,
        actions: vec![approve, reject],
    })
}

/// Compose the full message: delta block first, action block second.
pub fn build_message(
    notification: &ApprovalNotification,
    summary: &DeltaSummary,
) -> Result<DecisionMessage, RelayError> {
    Ok(DecisionMessage {
        attachments: (
            parameters_delta_attachment(summary),
            approval_action_attachment(notification)?,
        ),
    })
}
