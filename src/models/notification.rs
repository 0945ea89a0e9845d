use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// A CodePipeline manual-approval notification, as carried in the SNS message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalNotification {
    pub approval: ApprovalDetails,
    pub console_link: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDetails {
    pub pipeline_name: String,
    pub stage_name: String,
    pub action_name: String,
    /// Opaque approval token; forwarded unmodified.
    pub token: String,
    pub approval_review_link: String,
    /// JSON-encoded string naming the stack and change set under review.
    pub custom_data: String,
}

/// The decoded `customData` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeSetRef {
    pub stack_name: String,
    pub change_set_name: String,
}

impl ApprovalNotification {
    /// Parse the notification JSON embedded in an SNS message.
    pub fn from_message(raw: &str) -> Result<Self, RelayError> {
        let notification: Self = serde_json::from_str(raw)
            .map_err(|e| RelayError::malformed(format!("invalid approval notification: {}", e)))?;
        notification.validate()?;
        Ok(notification)
    }

    /// Reject notifications whose identifying fields are present but empty.
    pub fn validate(&self) -> Result<(), RelayError> {
        let a = &self.approval;
        let required = [
            ("approval.pipelineName", &a.pipeline_name),
            ("approval.stageName", &a.stage_name),
            ("approval.actionName", &a.action_name),
            ("approval.token", &a.token),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(RelayError::malformed(format!("{} is empty", field)));
            }
        }
        Ok(())
    }

    /// Decode `approval.customData` into the stack / change set it refers to.
    pub fn change_set_ref(&self) -> Result<ChangeSetRef, RelayError> {
        let reference: ChangeSetRef = serde_json::from_str(&self.approval.custom_data)
            .map_err(|e| RelayError::malformed(format!("invalid customData: {}", e)))?;
        if reference.stack_name.is_empty() || reference.change_set_name.is_empty() {
            return Err(RelayError::malformed(
                "customData must name both StackName and ChangeSetName",
            ));
        }
        Ok(reference)
    }
}
