//! MotionController and PwmChannel against simulated pins.

use std::time::Duration;

use tankbot::adapters::sim::{SimPin, SimPinProbe};
use tankbot::app::commands::MotionCommand;
use tankbot::app::ports::MotionPort;
use tankbot::config::MotionConfig;
use tankbot::drivers::motion::{Direction, MotionController, MotorPinSet};
use tankbot::drivers::soft_pwm::PwmChannel;

struct Probes {
    in1: SimPinProbe,
    in2: SimPinProbe,
    pwm: SimPinProbe,
}

fn motor(pins: [u32; 3]) -> (MotorPinSet<SimPin>, Probes) {
    let set = MotorPinSet {
        in1: SimPin::new(pins[0]),
        in2: SimPin::new(pins[1]),
        pwm: SimPin::new(pins[2]),
    };
    let probes = Probes {
        in1: set.in1.probe(),
        in2: set.in2.probe(),
        pwm: set.pwm.probe(),
    };
    (set, probes)
}

fn controller(standby: bool) -> (MotionController<SimPin>, Probes, Probes) {
    let cfg = MotionConfig {
        pwm_frequency_hz: 100,
        ..MotionConfig::default()
    };
    let (a, pa) = motor([27, 17, 4]);
    let (b, pb) = motor([24, 22, 23]);
    let stby = standby.then(|| SimPin::new(25));
    (MotionController::new(&cfg, a, b, stby).unwrap(), pa, pb)
}

#[test]
fn brake_zeroes_duty_and_asserts_all_direction_pins() {
    let (mut ctrl, a, b) = controller(true);
    ctrl.speed(90, 90);
    ctrl.drive(true);
    ctrl.brake();

    let s = ctrl.snapshot();
    assert_eq!(s.motor_a.duty, 0.0);
    assert_eq!(s.motor_b.duty, 0.0);
    for p in [&a, &b] {
        assert!(p.in1.is_high() && p.in2.is_high());
    }
}

#[test]
fn direction_pins_never_both_high_outside_brake() {
    let (mut ctrl, a, b) = controller(false);
    let cmds = [
        MotionCommand::Drive { forward: true },
        MotionCommand::Drive { forward: false },
        MotionCommand::RotateLeft,
        MotionCommand::RotateRight,
        MotionCommand::Speed { motor_a: 20, motor_b: 80 },
        MotionCommand::Stop,
        MotionCommand::Drive { forward: true },
    ];
    for cmd in cmds {
        ctrl.apply(cmd);
        for p in [&a, &b] {
            assert!(!(p.in1.is_high() && p.in2.is_high()), "{:?} left both pins high", cmd);
        }
    }
    assert_eq!(ctrl.snapshot().cruise_percent, (20, 80));
}

#[test]
fn failed_lowering_write_skips_the_raise_and_holds_zero_duty() {
    let (mut ctrl, a, b) = controller(false);
    ctrl.drive(true);
    assert!(a.in2.is_high());

    a.in2.set_failing(true);
    ctrl.drive(false);
    assert!(!(a.in1.is_high() && a.in2.is_high()), "motor A left both pins high");
    assert!(!a.in1.is_high());
    let s = ctrl.snapshot();
    assert_eq!(s.motor_a.duty, 0.0);
    assert_eq!(s.motor_a.direction, Direction::Forward);
    // Motor B is unaffected.
    assert!(b.in1.is_high() && !b.in2.is_high());
    assert!((s.motor_b.duty - 0.7).abs() < 1e-9);

    a.in2.set_failing(false);
    ctrl.drive(false);
    assert!(a.in1.is_high() && !a.in2.is_high());
    let s = ctrl.snapshot();
    assert_eq!(s.motor_a.direction, Direction::Reverse);
    assert!((s.motor_a.duty - 0.7).abs() < 1e-9);
}

#[test]
fn leaving_brake_lowers_before_raising() {
    let (mut ctrl, a, _) = controller(false);
    ctrl.brake();
    let writes_before = a.in2.writes();
    ctrl.drive(false);
    // Reverse: IN2 low first, then IN1 (already high) stays high.
    assert!(a.in1.is_high());
    assert!(!a.in2.is_high());
    assert_eq!(a.in2.writes(), writes_before + 1);
    assert_eq!(ctrl.snapshot().motor_a.direction, Direction::Reverse);
}

#[test]
fn pwm_pins_toggle_while_driving() {
    let (mut ctrl, a, b) = controller(false);
    ctrl.speed(50, 50);
    ctrl.drive(true);
    std::thread::sleep(Duration::from_millis(80));
    assert!(a.pwm.rising_edges() >= 2);
    assert!(b.pwm.rising_edges() >= 2);

    ctrl.stop();
    std::thread::sleep(Duration::from_millis(30));
    let edges = a.pwm.rising_edges();
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(a.pwm.rising_edges(), edges, "zero duty must not pulse");
}

#[test]
fn drop_disposes_and_releases_pins() {
    let (ctrl, a, b) = controller(true);
    drop(ctrl);
    for p in [&a, &b] {
        assert!(p.in1.is_released() && p.in2.is_released() && p.pwm.is_released());
        assert!(!p.pwm.is_high());
    }
}

#[test]
fn pwm_duty_change_applies_and_stop_joins() {
    let pin = SimPin::new(12);
    let probe = pin.probe();
    let mut ch = PwmChannel::new("it-pwm", pin, 50, 0.0);
    ch.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(probe.rising_edges(), 0);

    ch.set_duty(0.5);
    std::thread::sleep(Duration::from_millis(120));
    assert!(probe.rising_edges() >= 2);
    assert_eq!(ch.timing().on_ms, 10);

    ch.stop();
    assert!(!ch.is_running());
    assert!(!probe.is_high());
}
