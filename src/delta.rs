//! Stack parameter delta.
//!
//! Compares the parameters a stack is currently deployed with against the
//! parameters a pending change set would apply, and renders the differences
//! for the approval message.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::RelayError;
use crate::models::notification::ChangeSetRef;

/// Placeholder for the side of a delta that has no value.
pub const NONE_MARKER: &str = "(none)";
pub const ARROW: &str = "→";

/// A `{ParameterKey, ParameterValue}` pair as CloudFormation reports it.
///
/// Change sets list a parameter that keeps its deployed value as
/// `UsePreviousValue: true` with no `ParameterValue`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    pub parameter_key: String,
    #[serde(default)]
    pub parameter_value: String,
    #[serde(default)]
    pub use_previous_value: bool,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter_key: key.into(),
            parameter_value: value.into(),
            use_previous_value: false,
        }
    }

    /// A change-set entry that keeps whatever the stack currently holds.
    pub fn previous(key: impl Into<String>) -> Self {
        Self {
            parameter_key: key.into(),
            parameter_value: String::new(),
            use_previous_value: true,
        }
    }
}

/// Read-only view of the stack description service.
#[async_trait]
pub trait StackLookup: Send + Sync {
    /// Parameters the named stack is currently deployed with.
    async fn describe_stack_parameters(&self, stack_name: &str)
        -> Result<Vec<Parameter>, RelayError>;

    /// Parameters the named change set would apply to `stack_name`.
    async fn describe_change_set_parameters(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<Vec<Parameter>, RelayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEntry {
    pub key: String,
    pub current: Option<String>,
    pub proposed: Option<String>,
}

/// Current and proposed values per parameter key, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ParameterSnapshot {
    entries: Vec<ParameterEntry>,
    index: HashMap<String, usize>,
}

impl ParameterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current values are scanned before proposed ones, which fixes the order.
    pub fn from_parameters(current: &[Parameter], proposed: &[Parameter]) -> Self {
        let mut snapshot = Self::new();
        for p in current {
            snapshot.record_current(&p.parameter_key, &p.parameter_value);
        }
        for p in proposed {
            if p.use_previous_value {
                snapshot.keep_current(&p.parameter_key);
            } else {
                snapshot.record_proposed(&p.parameter_key, &p.parameter_value);
            }
        }
        snapshot
    }

    pub fn record_current(&mut self, key: &str, value: &str) {
        self.entry_mut(key).current = Some(value.to_string());
    }

    pub fn record_proposed(&mut self, key: &str, value: &str) {
        self.entry_mut(key).proposed = Some(value.to_string());
    }

    /// The proposed value is whatever is currently deployed.
    pub fn keep_current(&mut self, key: &str) {
        let entry = self.entry_mut(key);
        entry.proposed = entry.current.clone();
    }

    fn entry_mut(&mut self, key: &str) -> &mut ParameterEntry {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.entries.push(ParameterEntry {
                    key: key.to_string(),
                    current: None,
                    proposed: None,
                });
                let idx = self.entries.len() - 1;
                self.index.insert(key.to_string(), idx);
                idx
            }
        };
        &mut self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterEntry> {
        self.entries.iter()
    }

    /// Classify every key; unchanged keys are counted, not listed.
    pub fn summarize(&self) -> DeltaSummary {
        let deltas: Vec<ParameterDelta> =
            self.entries.iter().filter_map(ParameterDelta::classify).collect();
        DeltaSummary {
            unchanged_count: self.entries.len() - deltas.len(),
            deltas,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterDelta {
    Added { key: String, proposed: String },
    Removed { key: String, current: String },
    Changed {
        key: String,
        current: String,
        proposed: String,
    },
}

impl ParameterDelta {
    /// `None` for an unchanged parameter.
    pub fn classify(entry: &ParameterEntry) -> Option<Self> {
        let key = entry.key.clone();
        match (&entry.current, &entry.proposed) {
            (None, Some(proposed)) => Some(Self::Added {
                key,
                proposed: proposed.clone(),
            }),
            (Some(current), None) => Some(Self::Removed {
                key,
                current: current.clone(),
            }),
            (Some(current), Some(proposed)) if current != proposed => Some(Self::Changed {
                key,
                current: current.clone(),
                proposed: proposed.clone(),
            }),
            _ => None,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Changed { key, .. } => key,
        }
    }

    fn sides(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Self::Added { proposed, .. } => (None, Some(proposed.as_str())),
            Self::Removed { current, .. } => (Some(current.as_str()), None),
            Self::Changed {
                current, proposed, ..
            } => (Some(current.as_str()), Some(proposed.as_str())),
        }
    }

    /// Slack mrkdwn form: bold key, values in code spans.
    pub fn to_mrkdwn(&self) -> String {
        let side = |v: Option<&str>| match v {
            Some(v) => format!("`{}`", escape_mrkdwn(v).replace('`', CODE_SPAN_BACKTICK)),
            None => NONE_MARKER.to_string(),
        };
        let (before, after) = self.sides();
        format!(
            "*{}*: {} {} {}",
            escape_mrkdwn(self.key()),
            side(before),
            ARROW,
            side(after)
        )
    }
}

impl fmt::Display for ParameterDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (before, after) = self.sides();
        write!(
            f,
            "{}: {} {} {}",
            self.key(),
            before.unwrap_or(NONE_MARKER),
            ARROW,
            after.unwrap_or(NONE_MARKER)
        )
    }
}

/// Stands in for a backtick inside a code span, which Slack cannot escape.
const CODE_SPAN_BACKTICK: &str = "\u{02CB}";

/// Slack treats `&`, `<` and `>` as control characters in message text.
fn escape_mrkdwn(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaSummary {
    pub deltas: Vec<ParameterDelta>,
    pub unchanged_count: usize,
}

impl DeltaSummary {
    pub fn total_keys(&self) -> usize {
        self.deltas.len() + self.unchanged_count
    }

    /// Plain-text lines, one per changed parameter.
    pub fn lines(&self) -> Vec<String> {
        self.deltas.iter().map(ToString::to_string).collect()
    }

    /// The delta block body: mrkdwn lines joined by newlines.
    pub fn text(&self) -> String {
        self.deltas
            .iter()
            .map(ParameterDelta::to_mrkdwn)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Look up both parameter sets for the referenced change set and diff them.
pub async fn fetch_delta(
    lookup: &dyn StackLookup,
    change_set: &ChangeSetRef,
) -> Result<DeltaSummary, RelayError> {
    let current = lookup
        .describe_stack_parameters(&change_set.stack_name)
        .await?;
    let proposed = lookup
        .describe_change_set_parameters(&change_set.stack_name, &change_set.change_set_name)
        .await?;

    let summary = ParameterSnapshot::from_parameters(&current, &proposed).summarize();
    tracing::debug!(
        stack = %change_set.stack_name,
        change_set = %change_set.change_set_name,
        changed = summary.deltas.len(),
        unchanged = summary.unchanged_count,
        "computed stack parameter delta"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<Parameter> {
        pairs.iter().map(|(k, v)| Parameter::new(*k, *v)).collect()
    }

    #[test]
    fn test_added_changed_unchanged() {
        let current = params(&[("A", "1"), ("B", "2")]);
        let proposed = params(&[("A", "1"), ("B", "3"), ("C", "4")]);

        let summary = ParameterSnapshot::from_parameters(&current, &proposed).summarize();
        assert_eq!(summary.lines(), vec!["B: 2 → 3", "C: (none) → 4"]);
        assert_eq!(summary.unchanged_count, 1);
    }

    #[test]
    fn test_removed_key_is_not_dropped() {
        let current = params(&[("Retired", "yes"), ("Keep", "1")]);
        let proposed = params(&[("Keep", "1")]);

        let summary = ParameterSnapshot::from_parameters(&current, &proposed).summarize();
        assert_eq!(summary.lines(), vec!["Retired: yes → (none)"]);
        assert_eq!(
            summary.deltas[0],
            ParameterDelta::Removed {
                key: "Retired".into(),
                current: "yes".into()
            }
        );
    }

    #[test]
    fn test_identical_sets_have_no_deltas() {
        let set = params(&[("A", "1"), ("B", "2"), ("C", "3")]);
        let summary = ParameterSnapshot::from_parameters(&set, &set).summarize();
        assert!(summary.deltas.is_empty());
        assert_eq!(summary.unchanged_count, 3);
        assert_eq!(summary.text(), "");
    }

    #[test]
    fn test_empty_sets() {
        let snapshot = ParameterSnapshot::from_parameters(&[], &[]);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.summarize(), DeltaSummary::default());
    }

    #[test]
    fn test_counts_always_add_up() {
        let cases: Vec<(Vec<Parameter>, Vec<Parameter>)> = vec![
            (params(&[("A", "1")]), params(&[])),
            (params(&[]), params(&[("A", "1"), ("B", "2")])),
            (
                params(&[("A", "1"), ("B", "2"), ("C", "3")]),
                params(&[("C", "3"), ("B", "x"), ("D", "4")]),
            ),
            (params(&[("A", "")]), params(&[("A", "")])),
        ];
        for (current, proposed) in cases {
            let snapshot = ParameterSnapshot::from_parameters(&current, &proposed);
            let summary = snapshot.summarize();
            assert_eq!(summary.total_keys(), snapshot.len());
            assert_eq!(summary.unchanged_count + summary.deltas.len(), snapshot.len());
        }
    }

    #[test]
    fn test_order_follows_current_then_proposed() {
        let current = params(&[("Z", "1"), ("M", "1")]);
        let proposed = params(&[("A", "2"), ("M", "2"), ("Z", "2")]);
        let snapshot = ParameterSnapshot::from_parameters(&current, &proposed);
        let keys: Vec<&str> = snapshot.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["Z", "M", "A"]);
    }

    #[test]
    fn test_empty_string_differs_from_absent() {
        let current = params(&[("Suffix", "")]);
        let summary = ParameterSnapshot::from_parameters(&current, &[]).summarize();
        assert_eq!(summary.lines(), vec!["Suffix:  → (none)"]);
    }

    #[test]
    fn test_mrkdwn_rendering() {
        let current = params(&[("ImageTag", "v1"), ("Old", "x")]);
        let proposed = params(&[("ImageTag", "v2"), ("New", "<y>")]);
        let summary = ParameterSnapshot::from_parameters(&current, &proposed).summarize();
        assert_eq!(
            summary.text(),
            "*ImageTag*: `v1` → `v2`\n*Old*: `x` → (none)\n*New*: (none) → `&lt;y&gt;`"
        );
    }

    #[test]
    fn test_use_previous_value_is_unchanged() {
        let current = params(&[("Env", "production"), ("Tag", "v1")]);
        let proposed = vec![Parameter::previous("Env"), Parameter::new("Tag", "v2")];

        let summary = ParameterSnapshot::from_parameters(&current, &proposed).summarize();
        assert_eq!(summary.lines(), vec!["Tag: v1 → v2"]);
        assert_eq!(summary.unchanged_count, 1);
    }

    #[test]
    fn test_use_previous_value_without_deployed_value() {
        let proposed = vec![Parameter::previous("Ghost")];
        let snapshot = ParameterSnapshot::from_parameters(&[], &proposed);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.summarize().deltas.is_empty());
    }

    #[test]
    fn test_backticks_do_not_break_code_spans() {
        let current = params(&[("Cmd", "echo `date`")]);
        let proposed = params(&[("Cmd", "date")]);
        let summary = ParameterSnapshot::from_parameters(&current, &proposed).summarize();
        assert_eq!(summary.text(), "*Cmd*: `echo \u{02CB}date\u{02CB}` → `date`");
        assert_eq!(summary.lines(), vec!["Cmd: echo `date` → date"]);
    }

    struct FixedLookup {
        stack: Vec<Parameter>,
        change_set: Vec<Parameter>,
    }

    #[async_trait]
    impl StackLookup for FixedLookup {
        async fn describe_stack_parameters(&self, _: &str) -> Result<Vec<Parameter>, RelayError> {
            Ok(self.stack.clone())
        }

        async fn describe_change_set_parameters(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<Parameter>, RelayError> {
            Ok(self.change_set.clone())
        }
    }

    #[test]
    fn test_fetch_delta_uses_both_lookups() {
        let lookup = FixedLookup {
            stack: params(&[("A", "1")]),
            change_set: params(&[("A", "2")]),
        };
        let reference = ChangeSetRef {
            stack_name: "web".into(),
            change_set_name: "web-cs".into(),
        };
        let summary = tokio_test::block_on(fetch_delta(&lookup, &reference)).unwrap();
        assert_eq!(summary.lines(), vec!["A: 1 → 2"]);
    }

    #[test]
    fn test_fetch_delta_reused_value_from_change_set() {
        let lookup = FixedLookup {
            stack: params(&[("Env", "production")]),
            change_set: vec![Parameter::previous("Env")],
        };
        let reference = ChangeSetRef {
            stack_name: "web".into(),
            change_set_name: "web-cs".into(),
        };
        let summary = tokio_test::block_on(fetch_delta(&lookup, &reference)).unwrap();
        assert!(summary.deltas.is_empty());
        assert_eq!(summary.unchanged_count, 1);
    }
}
