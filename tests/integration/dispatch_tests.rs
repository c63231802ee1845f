//! JSON dispatcher: routing, clamping and error replies.

use tankbot::app::commands::MotionCommand;
use tankbot::rpc::dispatch::{Dispatch, dispatch};
use tankbot::rpc::messages::{MAX_MESSAGE_LEN, Outbound};

use crate::mock_hw::MockSink;

fn reply(sink: &MockSink, text: &str) -> Outbound {
    match dispatch(sink, text) {
        Dispatch::Reply(out) => out,
        Dispatch::Quit => panic!("unexpected quit for {text}"),
    }
}

#[test]
fn motion_commands_are_queued_and_acked() {
    let sink = MockSink::default();
    assert_eq!(reply(&sink, r#"{"cmd":"drive","forward":true}"#), Outbound::ack("drive forward"));
    assert_eq!(reply(&sink, r#"{"cmd":"drive","forward":false}"#), Outbound::ack("drive reverse"));
    assert_eq!(reply(&sink, r#"{"cmd":"rotateLeft"}"#), Outbound::ack("rotate left"));
    assert_eq!(reply(&sink, r#"{"cmd":"rotateRight"}"#), Outbound::ack("rotate right"));
    assert_eq!(reply(&sink, r#"{"cmd":"brake"}"#), Outbound::ack("brake"));
    assert_eq!(reply(&sink, r#"{"cmd":"stop"}"#), Outbound::ack("stop"));

    assert_eq!(
        *sink.motion.lock().unwrap(),
        vec![
            MotionCommand::Drive { forward: true },
            MotionCommand::Drive { forward: false },
            MotionCommand::RotateLeft,
            MotionCommand::RotateRight,
            MotionCommand::Brake,
            MotionCommand::Stop,
        ]
    );
}

#[test]
fn speed_and_angle_are_clamped() {
    let sink = MockSink::default();
    assert_eq!(
        reply(&sink, r#"{"cmd":"speed","motorA":150,"motorB":-5}"#),
        Outbound::ack("speed")
    );
    assert_eq!(reply(&sink, r#"{"cmd":"servoAngle","angle":500}"#), Outbound::ack("servo 180"));
    assert_eq!(reply(&sink, r#"{"cmd":"servoAngle","angle":-30}"#), Outbound::ack("servo 0"));

    assert_eq!(
        *sink.motion.lock().unwrap(),
        vec![MotionCommand::Speed { motor_a: 100, motor_b: 0 }]
    );
    assert_eq!(*sink.servo.lock().unwrap(), vec![180, 0]);
}

#[test]
fn status_reports_the_telemetry_snapshot() {
    let sink = MockSink::default();
    let json = reply(&sink, r#"{"cmd":"requestStatus"}"#).to_json();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["type"], "status");
    assert_eq!(v["data"]["temperature"], 21.5);
    assert_eq!(v["data"]["humidity"], 40.25);
    assert_eq!(v["data"]["pressure"], 1009.0);
    assert_eq!(v["data"]["warning"], "OK");
    assert_eq!(v["data"]["sensors"][0], "up");
    assert_eq!(v["data"]["sensors"][1], "absent");
    let stamp = v["data"]["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok(), "{stamp}");
    assert!(sink.motion.lock().unwrap().is_empty());
}

#[test]
fn malformed_messages_get_error_replies() {
    let sink = MockSink::default();
    let cases = [
        ("not json", "invalid json"),
        (r#"{"forward":true}"#, "missing cmd"),
        (r#"{"cmd":7}"#, "missing cmd"),
        (r#"{"cmd":"dance"}"#, "unknown command"),
        (r#"{"cmd":"drive"}"#, "invalid arguments"),
        (r#"{"cmd":"speed","motorA":"fast","motorB":1}"#, "invalid arguments"),
    ];
    for (text, err) in cases {
        assert_eq!(reply(&sink, text), Outbound::error(err), "{text}");
    }
    assert!(sink.motion.lock().unwrap().is_empty());
    assert!(sink.servo.lock().unwrap().is_empty());
}

#[test]
fn oversized_message_is_rejected_before_parsing() {
    let sink = MockSink::default();
    let text = format!(r#"{{"cmd":"stop","pad":"{}"}}"#, "x".repeat(MAX_MESSAGE_LEN));
    assert_eq!(reply(&sink, &text), Outbound::error("message too large"));
    assert!(sink.motion.lock().unwrap().is_empty());
}

#[test]
fn quit_ends_the_session() {
    let sink = MockSink::default();
    assert_eq!(dispatch(&sink, r#"{"cmd":"quit"}"#), Dispatch::Quit);
}

#[test]
fn closed_queues_report_shutting_down() {
    let sink = MockSink {
        closed: true,
        ..MockSink::default()
    };
    assert_eq!(reply(&sink, r#"{"cmd":"stop"}"#), Outbound::error("shutting down"));
    assert_eq!(
        reply(&sink, r#"{"cmd":"servoAngle","angle":90}"#),
        Outbound::error("shutting down")
    );
    // Status stays available while shutting down.
    assert!(matches!(reply(&sink, r#"{"cmd":"requestStatus"}"#), Outbound::Status { .. }));
}
