use std::fmt;

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl Direction {
    fn keyword(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Forward => "forward",
            Direction::Back => "back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl FlipDirection {
    fn code(&self) -> char {
        match self {
            FlipDirection::Left => 'l',
            FlipDirection::Right => 'r',
            FlipDirection::Forward => 'f',
            FlipDirection::Back => 'b',
        }
    }
}

/// Primitive instruction understood by the vehicle.
///
/// Distances are centimetres, speeds centimetres per second and angles
/// degrees, matching the text SDK the link speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleCommand {
    /// SDK-mode handshake sent once per session.
    Enable,
    Takeoff,
    Land,
    Move { direction: Direction, distance: u32 },
    RotateClockwise(u32),
    RotateCounterClockwise(u32),
    Flip(FlipDirection),
    Emergency,
    GoTo { x: i32, y: i32, z: i32, speed: u32 },
    Curve {
        first: (i32, i32, i32),
        second: (i32, i32, i32),
        speed: u32,
    },
    SetSpeed(u32),
    SetWifi { ssid: String, password: String },
    CapturePhoto,
    StartVideo,
    StopVideo,
    QueryTelemetry,
}

impl VehicleCommand {
    /// First token of the encoded frame.
    pub fn keyword(&self) -> &'static str {
        match self {
            VehicleCommand::Enable => "command",
            VehicleCommand::Takeoff => "takeoff",
            VehicleCommand::Land => "land",
            VehicleCommand::Move { direction, .. } => direction.keyword(),
            VehicleCommand::RotateClockwise(_) => "cw",
            VehicleCommand::RotateCounterClockwise(_) => "ccw",
            VehicleCommand::Flip(_) => "flip",
            VehicleCommand::Emergency => "emergency",
            VehicleCommand::GoTo { .. } => "go",
            VehicleCommand::Curve { .. } => "curve",
            VehicleCommand::SetSpeed(_) => "speed",
            VehicleCommand::SetWifi { .. } => "wifi",
            VehicleCommand::CapturePhoto => "photo",
            VehicleCommand::StartVideo => "streamon",
            VehicleCommand::StopVideo => "streamoff",
            VehicleCommand::QueryTelemetry => "telemetry?",
        }
    }

    /// Queries answer with data instead of `ok`.
    pub fn is_query(&self) -> bool {
        matches!(self, VehicleCommand::QueryTelemetry)
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VehicleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.keyword();
        match self {
            VehicleCommand::Move { distance, .. } => write!(f, "{} {}", keyword, distance),
            VehicleCommand::RotateClockwise(deg) | VehicleCommand::RotateCounterClockwise(deg) => {
                write!(f, "{} {}", keyword, deg)
            }
            VehicleCommand::Flip(direction) => write!(f, "{} {}", keyword, direction.code()),
            VehicleCommand::GoTo { x, y, z, speed } => {
                write!(f, "{} {} {} {} {}", keyword, x, y, z, speed)
            }
            VehicleCommand::Curve {
                first: (x1, y1, z1),
                second: (x2, y2, z2),
                speed,
            } => write!(
                f,
                "{} {} {} {} {} {} {} {}",
                keyword, x1, y1, z1, x2, y2, z2, speed
            ),
            VehicleCommand::SetSpeed(speed) => write!(f, "{} {}", keyword, speed),
            VehicleCommand::SetWifi { ssid, password } => {
                write!(f, "{} {} {}", keyword, ssid, password)
            }
            _ => f.write_str(keyword),
        }
    }
}

/// Reply to a single command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub message: String,
}

impl CommandResponse {
    /// Decode the reply frame received for `command`.
    pub fn from_frame(command: &VehicleCommand, frame: &[u8]) -> Result<Self, LinkError> {
        let text = std::str::from_utf8(frame)
            .map_err(|_| LinkError::InvalidResponse(format!("{} bytes of non-text", frame.len())))?
            .trim();

        if text.is_empty() {
            return Err(LinkError::InvalidResponse("empty reply".to_string()));
        }
        if text.starts_with("error") {
            return Err(LinkError::Rejected(text.to_string()));
        }
        if command.is_query() || text.eq_ignore_ascii_case("ok") {
            Ok(Self {
                message: text.to_string(),
            })
        } else {
            Err(LinkError::InvalidResponse(text.to_string()))
        }
    }
}
