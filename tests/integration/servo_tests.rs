//! ServoController against a simulated hardware PWM channel.

use tankbot::adapters::sim::SimPwm;
use tankbot::app::commands::ServoCommand;
use tankbot::app::ports::ServoPort;
use tankbot::config::ServoConfig;
use tankbot::drivers::servo::{AngleOutcome, ServoController};
use tankbot::error::Error;

#[test]
fn full_lifecycle() {
    let pwm = SimPwm::new(u16::MAX);
    let probe = pwm.probe();
    let mut servo = ServoController::new(pwm, &ServoConfig::default()).unwrap();

    assert_eq!(servo.apply(ServoCommand::SetAngle { degrees: 10 }), AngleOutcome::NotRunning);
    assert_eq!(servo.angle(), 90);

    servo.start().unwrap();
    // 1.5 ms of a 20 ms frame.
    assert_eq!(probe.duty(), (1500u64 * u64::from(u16::MAX) / 20_000) as u16);

    assert_eq!(servo.apply(ServoCommand::SetAngle { degrees: 250 }), AngleOutcome::Applied(180));
    assert_eq!(probe.duty(), (2000u64 * u64::from(u16::MAX) / 20_000) as u16);

    servo.stop();
    assert!(!servo.is_running());
    assert_eq!(probe.duty(), 0);
    assert_eq!(servo.set_angle(45), AngleOutcome::NotRunning);
    assert_eq!(servo.angle(), 180);

    servo.start().unwrap();
    assert_eq!(probe.duty(), (2000u64 * u64::from(u16::MAX) / 20_000) as u16);

    drop(servo);
    assert!(probe.is_released());
}

#[test]
fn custom_pulse_range() {
    let cfg = ServoConfig {
        min_pulse_us: 500,
        max_pulse_us: 2500,
        initial_angle: 0,
        ..ServoConfig::default()
    };
    let servo = ServoController::new(SimPwm::new(20_000), &cfg).unwrap();
    assert_eq!(servo.pulse_width_us(0), 500);
    assert_eq!(servo.pulse_width_us(45), 1000);
    assert_eq!(servo.pulse_width_us(180), 2500);
    assert_eq!(servo.angle(), 0);
}

#[test]
fn start_failure_is_hardware_init() {
    let pwm = SimPwm::new(1000);
    let probe = pwm.probe();
    probe.set_failing(true);
    let mut servo = ServoController::new(pwm, &ServoConfig::default()).unwrap();
    assert!(matches!(servo.start(), Err(Error::HardwareInit(_))));
    assert!(!servo.is_running());

    probe.set_failing(false);
    servo.start().unwrap();
    assert!(servo.is_running());
}

#[test]
fn missing_timing_source_is_fatal() {
    assert!(matches!(
        ServoController::new(SimPwm::new(0), &ServoConfig::default()),
        Err(Error::HardwareInit(_))
    ));
}
