//! JSON message shapes at the transport boundary.
//!
//! Inbound messages are objects tagged by `"cmd"`; outbound ones are
//! tagged by `"type"`:
//!
//! ```text
//! → {"cmd":"drive","forward":true}
//! → {"cmd":"speed","motorA":80,"motorB":60}
//! → {"cmd":"servoAngle","angle":120}
//! ← {"type":"ack","msg":"drive forward"}
//! ← {"type":"status","data":{"temperature":21.4,...}}
//! ← {"type":"error","error":"unknown command"}
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::sensors::Telemetry;

/// Longest inbound message accepted, in bytes.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Inbound {
    Drive {
        forward: bool,
    },
    RotateLeft,
    RotateRight,
    /// Raw values; clamped to 0-100 on dispatch.
    #[serde(rename_all = "camelCase")]
    Speed {
        motor_a: i64,
        motor_b: i64,
    },
    Stop,
    Brake,
    /// Raw value; clamped to 0-180 on dispatch.
    ServoAngle {
        angle: i64,
    },
    RequestStatus,
    /// Ends the session (host binary only).
    Quit,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    Ack { msg: String },
    Error { error: String },
    Status { data: StatusData },
}

impl Outbound {
    pub fn ack(msg: impl Into<String>) -> Self {
        Self::Ack { msg: msg.into() }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }

    /// Status stamped with the current UTC time.
    pub fn status(t: &Telemetry) -> Self {
        Self::status_at(t, Utc::now())
    }

    pub fn status_at(t: &Telemetry, at: DateTime<Utc>) -> Self {
        Self::Status {
            data: StatusData::new(t, at),
        }
    }

    /// Serialise to one line of JSON.
    pub fn to_json(&self) -> String {
        // Only strings and finite-or-null floats: serialisation cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"type":"error","error":"encode"}"#))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusData {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    /// `OK` or the space-joined disagreeing quantities.
    pub warning: String,
    /// `[primary, secondary]` health.
    pub sensors: [&'static str; 2],
    pub phase: &'static str,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
}

fn two_decimals(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl StatusData {
    pub fn new(t: &Telemetry, at: DateTime<Utc>) -> Self {
        Self {
            temperature: two_decimals(t.temperature_c),
            humidity: two_decimals(t.humidity_pct),
            pressure: two_decimals(t.pressure_hpa),
            warning: t.disagreement.to_string(),
            sensors: [t.sensors[0].as_str(), t.sensors[1].as_str()],
            phase: t.phase.as_str(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
