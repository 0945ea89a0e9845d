use serde::{Deserialize, Serialize};

/// The Slack message relayed for a pending approval.
///
/// Serializes as `{ "attachments": [delta, action] }`; the tuple keeps the
/// two blocks in that order.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionMessage {
    pub attachments: (DeltaAttachment, ActionAttachment),
}

#[derive(Debug, Clone, Serialize)]
pub struct DeltaAttachment {
    pub title: String,
    pub footer: String,
    pub mrkdwn_in: Vec<&'static str>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionAttachment {
    pub fallback: String,
    pub color: &'static str,
    pub author_name: String,
    pub author_link: String,
    pub title: String,
    pub title_link: String,
    pub text: &'static str,
    pub footer: String,
    pub mrkdwn_in: Vec<&'static str>,
    pub callback_id: &'static str,
    pub actions: Vec<ActionButton>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionButton {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<&'static str>,
    pub name: &'static str,
    pub text: &'static str,
    /// A serialized [`DecisionPayload`].
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm: Option<Confirmation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub title: &'static str,
    pub text: &'static str,
    pub ok_text: &'static str,
    pub dismiss_text: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

/// Everything CodePipeline's PutApprovalResult needs, handed back verbatim by
/// whoever handles the button click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPayload {
    pub pipeline_name: String,
    pub stage_name: String,
    pub action_name: String,
    pub token: String,
    pub value: Decision,
}
