use async_trait::async_trait;
use serde::Deserialize;

use super::{action_result, AwsError, QueryClient};
use crate::config::AwsConfig;
use crate::delta::{Parameter, StackLookup};
use crate::errors::RelayError;

const SERVICE: &str = "cloudformation";
const API_VERSION: &str = "2010-05-15";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksResult {
    #[serde(default)]
    stacks: Option<Vec<StackDescription>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackDescription {
    #[serde(default)]
    parameters: Option<Vec<Parameter>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeChangeSetResult {
    #[serde(default)]
    parameters: Option<Vec<Parameter>>,
}

/// CloudFormation `DescribeStacks` / `DescribeChangeSet` over the Query API.
#[derive(Clone)]
pub struct CloudFormationClient {
    client: QueryClient,
}

impl CloudFormationClient {
    pub fn new(config: &AwsConfig) -> Result<Self, RelayError> {
        let client = QueryClient::new(config, SERVICE, API_VERSION)?;
        Ok(Self { client })
    }
}

fn lookup_error(what: &str, err: AwsError) -> RelayError {
    tracing::warn!(error = %err, code = err.code().unwrap_or("-"), "{} lookup failed", what);
    RelayError::Lookup(format!("{}: {}", what, err))
}

#[async_trait]
impl StackLookup for CloudFormationClient {
    async fn describe_stack_parameters(
        &self,
        stack_name: &str,
    ) -> Result<Vec<Parameter>, RelayError> {
        let what = format!("stack {}", stack_name);
        let body = self
            .client
            .call("DescribeStacks", &[("StackName".into(), stack_name.into())])
            .await
            .map_err(|e| lookup_error(&what, e))?;

        let result: DescribeStacksResult =
            action_result(SERVICE, "DescribeStacks", body).map_err(|e| lookup_error(&what, e))?;

        let stack = result
            .stacks
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::Lookup(format!("{} does not exist", what)))?;

        Ok(stack.parameters.unwrap_or_default())
    }

    async fn describe_change_set_parameters(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<Vec<Parameter>, RelayError> {
        let what = format!("change set {} of stack {}", change_set_name, stack_name);
        let body = self
            .client
            .call(
                "DescribeChangeSet",
                &[
                    ("ChangeSetName".into(), change_set_name.into()),
                    ("StackName".into(), stack_name.into()),
                ],
            )
            .await
            .map_err(|e| lookup_error(&what, e))?;

        let result: DescribeChangeSetResult = action_result(SERVICE, "DescribeChangeSet", body)
            .map_err(|e| lookup_error(&what, e))?;

        Ok(result.parameters.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::ParameterSnapshot;

    #[test]
    fn test_stack_without_parameters_decodes() {
        let body = serde_json::json!({
            "DescribeStacksResponse": {
                "DescribeStacksResult": {
                    "Stacks": [{ "StackName": "web", "Parameters": null }]
                }
            }
        });
        let result: DescribeStacksResult = action_result(SERVICE, "DescribeStacks", body).unwrap();
        let stacks = result.stacks.unwrap();
        assert_eq!(stacks.len(), 1);
        assert!(stacks[0].parameters.is_none());
    }

    #[test]
    fn test_change_set_parameters_decode() {
        let body = serde_json::json!({
            "DescribeChangeSetResponse": {
                "DescribeChangeSetResult": {
                    "ChangeSetName": "web-cs",
                    "Parameters": [
                        { "ParameterKey": "ImageTag", "ParameterValue": "v2" },
                        { "ParameterKey": "Env", "UsePreviousValue": true }
                    ]
                }
            }
        });
        let result: DescribeChangeSetResult =
            action_result(SERVICE, "DescribeChangeSet", body).unwrap();
        assert_eq!(
            result.parameters.unwrap(),
            vec![Parameter::new("ImageTag", "v2"), Parameter::previous("Env")]
        );
    }

    #[test]
    fn test_reused_change_set_value_is_not_a_delta() {
        let stack = serde_json::json!({
            "DescribeStacksResponse": {
                "DescribeStacksResult": {
                    "Stacks": [{
                        "StackName": "web",
                        "Parameters": [{ "ParameterKey": "Env", "ParameterValue": "production" }]
                    }]
                }
            }
        });
        let change_set = serde_json::json!({
            "DescribeChangeSetResponse": {
                "DescribeChangeSetResult": {
                    "Parameters": [{ "ParameterKey": "Env", "UsePreviousValue": true }]
                }
            }
        });
        let stacks: DescribeStacksResult = action_result(SERVICE, "DescribeStacks", stack).unwrap();
        let current = stacks.stacks.unwrap().remove(0).parameters.unwrap();
        let proposed = action_result::<DescribeChangeSetResult>(
            SERVICE,
            "DescribeChangeSet",
            change_set,
        )
        .unwrap()
        .parameters
        .unwrap();

        let summary = ParameterSnapshot::from_parameters(&current, &proposed).summarize();
        assert!(summary.lines().is_empty());
        assert_eq!(summary.unchanged_count, 1);
    }
}
