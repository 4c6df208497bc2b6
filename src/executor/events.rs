use serde::Serialize;

use super::states::AbortReason;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionStartedEvent {
    pub mission: String,
    pub waypoints: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointStartedEvent {
    pub mission: String,
    pub waypoint: usize,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointReachedEvent {
    pub mission: String,
    pub waypoint: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionCompletedEvent {
    pub mission: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionFailedEvent {
    pub mission: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionAbortedEvent {
    pub mission: String,
    pub reason: AbortReason,
}

/// Progress report published by the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "eventType")]
#[serde(rename_all = "camelCase")]
pub enum MissionEvent {
    MissionStarted(MissionStartedEvent),
    WaypointStarted(WaypointStartedEvent),
    WaypointReached(WaypointReachedEvent),
    MissionCompleted(MissionCompletedEvent),
    MissionFailed(MissionFailedEvent),
    MissionAborted(MissionAbortedEvent),
}
