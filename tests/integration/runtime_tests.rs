//! Robot runtime: ordering, telemetry and shutdown across the three loops.

use std::time::{Duration, Instant};

use tankbot::adapters::sim::{SimPin, SimPwm, SimSensor};
use tankbot::app::commands::{Command, MotionCommand, ServoCommand};
use tankbot::app::ports::NullLogSink;
use tankbot::app::runtime::Robot;
use tankbot::config::{MotionConfig, SensorConfig, ServoConfig};
use tankbot::drivers::motion::{MotionController, MotorPinSet};
use tankbot::drivers::servo::{AngleOutcome, ServoController};
use tankbot::error::Error;
use tankbot::sensors::fusion::RawReading;
use tankbot::sensors::{SensorPhase, SensorsController};

use crate::mock_hw::{MockMotion, MockServo, MotionCall, RecordingLog};

fn fast_sensors() -> SensorsController<SimSensor, RecordingLog> {
    let cfg = SensorConfig {
        calibration_samples: 2,
        calibration_interval_ms: 5,
        poll_interval_ms: 5,
        ..SensorConfig::default()
    };
    let r = RawReading {
        temperature_c: 23.0,
        humidity_pct: 48.0,
        pressure_hpa: 1011.0,
    };
    SensorsController::new(&cfg, Some(SimSensor::new(r)), Some(SimSensor::new(r)), RecordingLog::new())
}

/// Poll `f` until it holds or two seconds pass.
fn eventually(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn motion_commands_apply_in_order_then_dispose() {
    let motion = MockMotion::new();
    let servo = MockServo::new();
    let mut robot = Robot::spawn(motion.clone(), servo.clone(), fast_sensors(), true).unwrap();

    let cmds = [
        MotionCommand::Speed { motor_a: 40, motor_b: 60 },
        MotionCommand::Drive { forward: true },
        MotionCommand::RotateLeft,
        MotionCommand::Brake,
        MotionCommand::Stop,
    ];
    for cmd in cmds {
        assert!(robot.enqueue_motion(cmd));
    }
    assert!(eventually(|| motion.history().len() == cmds.len()));

    robot.shutdown();
    assert_eq!(
        motion.history(),
        vec![
            MotionCall::Speed(40, 60),
            MotionCall::Drive(true),
            MotionCall::RotateLeft,
            MotionCall::Brake,
            MotionCall::Stop,
            MotionCall::Dispose,
        ]
    );
    assert!(servo.log.lock().unwrap().disposed);
}

#[test]
fn concurrent_producers_keep_per_producer_order() {
    let motion = MockMotion::new();
    let mut robot = Robot::spawn(motion.clone(), MockServo::new(), fast_sensors(), true).unwrap();

    let producers: Vec<_> = (0..4u8)
        .map(|p| {
            let tx = robot.motion_sender();
            std::thread::spawn(move || {
                for i in 0..25u8 {
                    tx.push(MotionCommand::Speed { motor_a: p, motor_b: i });
                }
            })
        })
        .collect();
    for h in producers {
        h.join().unwrap();
    }
    assert!(eventually(|| motion.history().len() == 100));
    robot.shutdown();

    for p in 0..4u8 {
        let seen: Vec<u8> = motion
            .history()
            .iter()
            .filter_map(|c| match c {
                MotionCall::Speed(a, b) if *a == p => Some(*b),
                _ => None,
            })
            .collect();
        assert_eq!(seen, (0..25).collect::<Vec<u8>>());
    }
}

#[test]
fn servo_angles_reach_a_started_servo() {
    let servo = MockServo::new();
    let mut robot = Robot::spawn(MockMotion::new(), servo.clone(), fast_sensors(), true).unwrap();
    robot.enqueue_servo(30);
    robot.enqueue_servo(200);
    assert!(eventually(|| servo.log.lock().unwrap().outcomes.len() == 2));
    robot.shutdown();

    let log = servo.log.lock().unwrap();
    assert!(log.started);
    assert_eq!(log.outcomes, vec![AngleOutcome::Applied(30), AngleOutcome::Applied(180)]);
}

#[test]
fn tagged_commands_route_to_their_queue() {
    let motion = MockMotion::new();
    let servo = MockServo::new();
    let mut robot = Robot::spawn(motion.clone(), servo.clone(), fast_sensors(), true).unwrap();
    let cmds = [
        Command::Servo(ServoCommand::SetAngle { degrees: 120 }),
        Command::Motion(MotionCommand::Brake),
    ];
    for cmd in cmds {
        assert!(robot.enqueue(cmd));
    }
    assert!(robot.enqueue(MotionCommand::Stop));
    assert!(eventually(|| motion.history().len() == 2 && servo.log.lock().unwrap().outcomes.len() == 1));
    robot.shutdown();

    assert_eq!(motion.history()[..2], [MotionCall::Brake, MotionCall::Stop]);
    assert_eq!(servo.log.lock().unwrap().outcomes, vec![AngleOutcome::Applied(120)]);
}

#[test]
fn servo_without_autostart_rejects_angles() {
    let servo = MockServo::new();
    let mut robot = Robot::spawn(MockMotion::new(), servo.clone(), fast_sensors(), false).unwrap();
    robot.enqueue_servo(45);
    assert!(eventually(|| servo.log.lock().unwrap().outcomes.len() == 1));
    robot.shutdown();
    assert_eq!(servo.log.lock().unwrap().outcomes, vec![AngleOutcome::NotRunning]);
}

#[test]
fn servo_start_failure_aborts_spawn() {
    let motion = MockMotion::new();
    let r = Robot::spawn(motion.clone(), MockServo::failing_start(), fast_sensors(), true);
    assert!(matches!(r, Err(Error::HardwareInit(_))));
    assert!(motion.history().is_empty());
}

#[test]
fn telemetry_fills_after_calibration() {
    let mut robot = Robot::spawn(MockMotion::new(), MockServo::new(), fast_sensors(), true).unwrap();
    assert!(eventually(|| robot.read_telemetry().phase == SensorPhase::Steady
        && robot.read_telemetry().temperature_c > 0.0));
    let t = robot.read_telemetry();
    assert!((t.temperature_c - 23.0).abs() < 1e-9);
    assert!(!t.disagreement.any());
    robot.shutdown();
}

#[test]
fn shutdown_is_prompt_idempotent_and_closes_queues() {
    let cfg = SensorConfig {
        calibration_interval_ms: 60_000,
        ..SensorConfig::default()
    };
    let sensors = SensorsController::new(&cfg, Some(SimSensor::new(RawReading::default())), None, NullLogSink);
    let mut robot = Robot::spawn(MockMotion::new(), MockServo::new(), sensors, true).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    robot.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2), "sensor wait must observe shutdown");
    assert!(!robot.is_running());
    robot.shutdown();
    assert!(!robot.enqueue_motion(MotionCommand::Stop));
    assert!(!robot.enqueue_servo(90));
}

#[test]
fn real_controllers_are_disposed_on_shutdown() {
    let cfg = MotionConfig {
        pwm_frequency_hz: 200,
        ..MotionConfig::default()
    };
    let pins = |n: [u32; 3]| MotorPinSet {
        in1: SimPin::new(n[0]),
        in2: SimPin::new(n[1]),
        pwm: SimPin::new(n[2]),
    };
    let a = pins([27, 17, 4]);
    let b = pins([24, 22, 23]);
    let a_pwm = a.pwm.probe();
    let stby = SimPin::new(25);
    let stby_probe = stby.probe();
    let motion = MotionController::new(&cfg, a, b, Some(stby)).unwrap();

    let pwm = SimPwm::new(u16::MAX);
    let servo_probe = pwm.probe();
    let servo = ServoController::new(pwm, &ServoConfig::default()).unwrap();

    let mut robot = Robot::spawn(motion, servo, fast_sensors(), true).unwrap();
    robot.enqueue_motion(MotionCommand::Drive { forward: true });
    robot.enqueue_servo(0);
    assert!(eventually(|| a_pwm.rising_edges() > 0));

    robot.shutdown();
    assert!(a_pwm.is_released());
    assert!(!a_pwm.is_high());
    assert!(stby_probe.is_released() && !stby_probe.is_high());
    assert!(servo_probe.is_released());
    assert_eq!(servo_probe.duty(), 0);
}
