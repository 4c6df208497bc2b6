use serde::Serialize;

use super::rules::Violation;

/// Published by the monitor loop.
///
/// Violations are reported once when a rule starts failing and again only
/// after it has recovered in between.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "eventType")]
#[serde(rename_all = "camelCase")]
pub enum SafetyEvent {
    Warning(Violation),
    Critical(Violation),
    #[serde(rename_all = "camelCase")]
    PollSkipped { reason: String },
}

impl SafetyEvent {
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            SafetyEvent::Warning(v) | SafetyEvent::Critical(v) => Some(v),
            SafetyEvent::PollSkipped { .. } => None,
        }
    }
}
