//! Message dispatcher.
//!
//! Decodes one inbound text message, routes it onto the right actuator
//! queue and produces the reply. Never blocks: commands are only queued,
//! and status comes from the telemetry snapshot.

use crate::app::commands::MotionCommand;
use crate::app::runtime::Robot;
use crate::rpc::messages::{Inbound, MAX_MESSAGE_LEN, Outbound};
use crate::sensors::Telemetry;

/// What the dispatcher needs from the robot; mocked in tests.
pub trait CommandSink {
    fn enqueue_motion(&self, cmd: MotionCommand) -> bool;
    fn enqueue_servo(&self, angle: u8) -> bool;
    fn read_telemetry(&self) -> Telemetry;
}

impl CommandSink for Robot {
    fn enqueue_motion(&self, cmd: MotionCommand) -> bool {
        Robot::enqueue_motion(self, cmd)
    }

    fn enqueue_servo(&self, angle: u8) -> bool {
        Robot::enqueue_servo(self, angle)
    }

    fn read_telemetry(&self) -> Telemetry {
        Robot::read_telemetry(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Reply(Outbound),
    /// The peer asked to end the session.
    Quit,
}

pub fn dispatch<S: CommandSink + ?Sized>(sink: &S, text: &str) -> Dispatch {
    if text.len() > MAX_MESSAGE_LEN {
        return Dispatch::Reply(Outbound::error("message too large"));
    }
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Dispatch::Reply(Outbound::error("invalid json")),
    };
    if !value.get("cmd").is_some_and(serde_json::Value::is_string) {
        return Dispatch::Reply(Outbound::error("missing cmd"));
    }
    let msg: Inbound = match serde_json::from_value(value) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("RPC: bad arguments: {}", e);
            return Dispatch::Reply(Outbound::error("invalid arguments"));
        }
    };

    let (cmd, ack) = match msg {
        Inbound::Drive { forward } => (
            MotionCommand::Drive { forward },
            if forward { "drive forward" } else { "drive reverse" },
        ),
        Inbound::RotateLeft => (MotionCommand::RotateLeft, "rotate left"),
        Inbound::RotateRight => (MotionCommand::RotateRight, "rotate right"),
        Inbound::Speed { motor_a, motor_b } => (
            MotionCommand::Speed {
                motor_a: clamp_u8(motor_a, 100),
                motor_b: clamp_u8(motor_b, 100),
            },
            "speed",
        ),
        Inbound::Stop => (MotionCommand::Stop, "stop"),
        Inbound::Brake => (MotionCommand::Brake, "brake"),
        Inbound::ServoAngle { angle } => {
            let angle = clamp_u8(angle, 180);
            return Dispatch::Reply(if sink.enqueue_servo(angle) {
                Outbound::ack(format!("servo {angle}"))
            } else {
                Outbound::error("shutting down")
            });
        }
        Inbound::RequestStatus => return Dispatch::Reply(Outbound::status(&sink.read_telemetry())),
        Inbound::Quit => return Dispatch::Quit,
        Inbound::Unknown => return Dispatch::Reply(Outbound::error("unknown command")),
    };

    Dispatch::Reply(if sink.enqueue_motion(cmd) {
        Outbound::ack(ack)
    } else {
        Outbound::error("shutting down")
    })
}

fn clamp_u8(v: i64, max: u8) -> u8 {
    v.clamp(0, i64::from(max)) as u8
}
