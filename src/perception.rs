//! Boundary to the vision collaborator.
//!
//! No detector lives in this crate; the executor only consumes whatever
//! implements [`Perception`] when a waypoint asks for visual confirmation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub timestamp: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub distance: f64,
    pub direction: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingResult {
    pub position: Position,
    pub velocity: Velocity,
    pub confidence: f64,
}

#[async_trait]
pub trait Perception: Send + Sync {
    /// Latest frame from the vehicle camera, if one is available.
    async fn current_frame(&self) -> Option<VideoFrame>;

    async fn detect_objects(&self, frame: &VideoFrame) -> Vec<DetectedObject>;

    async fn detect_obstacles(&self, frame: &VideoFrame) -> Vec<Obstacle>;

    async fn track_object(&self, object: &DetectedObject) -> Option<TrackingResult>;
}
