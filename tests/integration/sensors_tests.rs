//! SensorsController state machine, fusion and log rate limiting, plus the
//! BME280 driver against a register-file bus.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tankbot::adapters::sim::{SimSensor, SimSensorProbe};
use tankbot::app::ports::{EnvSensor, NullLogSink};
use tankbot::config::SensorConfig;
use tankbot::error::SensorError;
use tankbot::sensors::bme280::{Bme280, CHIP_ID};
use tankbot::sensors::fusion::{RawReading, ReadingSource};
use tankbot::sensors::{SensorHealth, SensorPhase, SensorsController};

use crate::mock_hw::{RecordingLog, RegisterBus};

fn reading(t: f64, h: f64, p: f64) -> RawReading {
    RawReading {
        temperature_c: t,
        humidity_pct: h,
        pressure_hpa: p,
    }
}

fn config(samples: u32) -> SensorConfig {
    SensorConfig {
        calibration_samples: samples,
        ..SensorConfig::default()
    }
}

struct Pair {
    ctrl: SensorsController<SimSensor, RecordingLog>,
    a: SimSensorProbe,
    b: SimSensorProbe,
    log: RecordingLog,
}

fn pair(samples: u32, a: RawReading, b: RawReading) -> Pair {
    let sa = SimSensor::new(a);
    let sb = SimSensor::new(b);
    let (pa, pb) = (sa.probe(), sb.probe());
    let log = RecordingLog::new();
    Pair {
        ctrl: SensorsController::new(&config(samples), Some(sa), Some(sb), log.clone()),
        a: pa,
        b: pb,
        log,
    }
}

/// Drive the FSM out of Idle and through calibration.
fn settle(ctrl: &mut SensorsController<SimSensor, RecordingLog>, samples: u32) {
    for _ in 0..=samples {
        ctrl.poll();
    }
    assert_eq!(ctrl.phase(), SensorPhase::Steady);
}

#[test]
fn calibration_discards_exactly_the_configured_reads() {
    let mut p = pair(10, reading(20.0, 40.0, 1000.0), reading(20.0, 40.0, 1000.0));

    p.ctrl.poll(); // Idle -> Calibrating
    for i in 1..=10 {
        p.ctrl.poll();
        assert_eq!(p.a.reads(), i);
        let avg = p.ctrl.get_averages();
        assert_eq!(
            (avg.temperature_c, avg.humidity_pct, avg.pressure_hpa),
            (0.0, 0.0, 0.0),
            "nothing may reach the buffers during calibration"
        );
    }
    assert_eq!(p.ctrl.phase(), SensorPhase::Steady);
    assert_eq!(p.log.count(), 0);

    p.ctrl.poll();
    assert_eq!(p.a.reads(), 11);
    assert!((p.ctrl.get_averages().temperature_c - 20.0).abs() < 1e-9);
}

#[test]
fn dual_sensor_mean_with_disagreement_warning() {
    let mut p = pair(0, reading(20.0, 40.0, 1000.0), reading(21.5, 41.0, 1000.5));
    settle(&mut p.ctrl, 0);
    p.ctrl.poll();

    let t = p.ctrl.telemetry_handle().telemetry();
    assert!((t.temperature_c - 20.75).abs() < 1e-9);
    assert!(t.disagreement.temperature);
    assert!(!t.disagreement.humidity && !t.disagreement.pressure);
    assert_eq!(t.disagreement.to_string(), "Temp");
}

#[test]
fn wider_threshold_means_no_warning() {
    let cfg = SensorConfig {
        calibration_samples: 0,
        temperature_threshold_c: 2.0,
        ..SensorConfig::default()
    };
    let mut ctrl = SensorsController::new(
        &cfg,
        Some(SimSensor::new(reading(20.0, 40.0, 1000.0))),
        Some(SimSensor::new(reading(21.5, 40.0, 1000.0))),
        NullLogSink,
    );
    ctrl.poll();
    ctrl.poll();
    let t = ctrl.telemetry_handle().telemetry();
    assert!((t.temperature_c - 20.75).abs() < 1e-9);
    assert!(!t.disagreement.any());
}

#[test]
fn failed_sensor_falls_back_without_warning_and_recovers() {
    let mut p = pair(0, reading(22.0, 50.0, 1013.0), reading(30.0, 50.0, 1013.0));
    settle(&mut p.ctrl, 0);
    p.b.fail();
    p.ctrl.poll();

    let sample = p.ctrl.last_sample().copied().unwrap();
    assert!((sample.fused.temperature_c - 22.0).abs() < 1e-9);
    assert!(!sample.disagreement.any());
    let t = p.ctrl.telemetry_handle().telemetry();
    assert_eq!(t.sensors, [SensorHealth::Up, SensorHealth::Down]);

    // Retried on every poll, never disabled.
    p.b.set(reading(22.5, 50.0, 1013.0));
    p.ctrl.poll();
    assert_eq!(p.b.reads(), 2);
    let t = p.ctrl.telemetry_handle().telemetry();
    assert_eq!(t.sensors, [SensorHealth::Up, SensorHealth::Up]);
    assert_eq!(
        p.ctrl.last_sample().map(|s| s.fused.source),
        Some(ReadingSource::Both)
    );
}

#[test]
fn both_failing_pushes_the_held_average() {
    let mut p = pair(0, reading(10.0, 40.0, 1000.0), reading(10.0, 40.0, 1000.0));
    settle(&mut p.ctrl, 0);
    for _ in 0..5 {
        p.ctrl.poll();
    }
    p.a.set(reading(20.0, 40.0, 1000.0));
    p.b.set(reading(20.0, 40.0, 1000.0));
    for _ in 0..5 {
        p.ctrl.poll();
    }
    assert!((p.ctrl.get_averages().temperature_c - 15.0).abs() < 1e-9);

    p.a.fail();
    p.b.fail();
    p.ctrl.poll();
    // Window: 10.0 x4, 20.0 x5, held 15.0.
    let avg = p.ctrl.get_averages();
    assert!((avg.temperature_c - 15.5).abs() < 1e-9);
    assert!((avg.pressure_hpa - 1000.0).abs() < 1e-9);
    assert_eq!(avg.source, ReadingSource::Averaged);
    assert_eq!(
        p.ctrl.last_sample().map(|s| s.fused.source),
        Some(ReadingSource::History)
    );

    p.ctrl.poll();
    // Window: 10.0 x3, 20.0 x5, 15.0, 15.5.
    assert!((p.ctrl.get_averages().temperature_c - 16.05).abs() < 1e-9);
}

#[test]
fn absent_sensor_runs_single_sensor_mode() {
    let mut ctrl = SensorsController::new(
        &config(0),
        None,
        Some(SimSensor::new(reading(18.0, 30.0, 990.0))),
        NullLogSink,
    );
    ctrl.poll();
    ctrl.poll();
    let t = ctrl.telemetry_handle().telemetry();
    assert_eq!(t.sensors, [SensorHealth::Absent, SensorHealth::Up]);
    assert!((t.humidity_pct - 30.0).abs() < 1e-9);
}

#[test]
fn rolling_average_keeps_last_ten() {
    let mut p = pair(0, reading(0.0, 0.0, 0.0), reading(0.0, 0.0, 0.0));
    settle(&mut p.ctrl, 0);
    for v in 1..=13 {
        let r = reading(f64::from(v), 0.0, 0.0);
        p.a.set(r);
        p.b.set(r);
        p.ctrl.poll();
    }
    // Mean of 4..=13.
    assert!((p.ctrl.get_averages().temperature_c - 8.5).abs() < 1e-9);
}

#[test]
fn log_is_rate_limited() {
    let mut p = pair(0, reading(20.0, 40.0, 1000.0), reading(20.0, 40.0, 1000.0));
    let t0 = Instant::now();
    p.ctrl.poll_at(t0);

    // 200 ms cadence over 12 s: records at 0, 5 s and 10 s.
    for i in 0..=60u64 {
        p.ctrl.poll_at(t0 + Duration::from_millis(200 * i));
    }
    assert_eq!(p.log.count(), 3);
}

#[test]
fn log_failure_does_not_stop_polling() {
    let log = RecordingLog::failing();
    let mut ctrl = SensorsController::new(
        &SensorConfig {
            log_interval_ms: 0,
            ..config(0)
        },
        Some(SimSensor::new(reading(20.0, 40.0, 1000.0))),
        None,
        log.clone(),
    );
    for _ in 0..4 {
        ctrl.poll();
    }
    assert_eq!(log.count(), 3);
    assert!((ctrl.get_averages().temperature_c - 20.0).abs() < 1e-9);
}

#[test]
fn averages_readable_from_another_thread() {
    let mut p = pair(0, reading(20.0, 40.0, 1000.0), reading(20.0, 40.0, 1000.0));
    let handle = p.ctrl.telemetry_handle();
    let reader = std::thread::spawn(move || {
        let mut last = 0.0;
        for _ in 0..200 {
            last = handle.averages().temperature_c;
        }
        last
    });
    for _ in 0..200 {
        p.ctrl.poll();
    }
    let seen = reader.join().unwrap();
    assert!(seen == 0.0 || (seen - 20.0).abs() < 1e-9);
}

// ── BME280 ────────────────────────────────────────────────────

const ADDR: u8 = 0x76;

/// Datasheet trimming values (temperature + pressure), zero humidity trim.
fn bme_bus() -> RegisterBus {
    let mut bus = RegisterBus::with_device(ADDR);
    bus.set(ADDR, 0xD0, &[CHIP_ID]);
    let words: [u16; 12] = [
        27504,
        26435,
        (-1000i16) as u16,
        36477,
        (-10685i16) as u16,
        3024,
        2855,
        140,
        (-7i16) as u16,
        15500,
        (-14600i16) as u16,
        6000,
    ];
    let mut calib = Vec::new();
    for w in words {
        calib.extend_from_slice(&w.to_le_bytes());
    }
    bus.set(ADDR, 0x88, &calib);
    // adc_P = 415148, adc_T = 519888
    bus.set(ADDR, 0xF7, &[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x00, 0x00]);
    bus
}

#[test]
fn bme280_initialises_and_compensates() {
    let mut sensor = Bme280::new(bme_bus(), ADDR).unwrap();
    assert_eq!(sensor.calibration().t1, 27504);
    assert_eq!(sensor.calibration().p9, 6000);

    let r = sensor.read().unwrap();
    assert!((r.temperature_c - 25.08).abs() < 0.01, "T = {}", r.temperature_c);
    assert!((r.pressure_hpa - 1006.53).abs() < 0.05, "P = {}", r.pressure_hpa);
    assert!((0.0..=100.0).contains(&r.humidity_pct));
}

#[test]
fn bme280_writes_humidity_control_before_measurement_control() {
    let mut bus = bme_bus();
    let _sensor = Bme280::new(&mut bus, ADDR).unwrap();
    drop(_sensor);
    let regs: Vec<u8> = bus.writes.iter().map(|w| w.1).collect();
    assert_eq!(regs, vec![0xF2, 0xF5, 0xF4]);
    assert_eq!(bus.regs[&ADDR][0xF4], 0x27);
    assert_eq!(bus.regs[&ADDR][0xF2], 0x01);
}

#[test]
fn bme280_rejects_wrong_chip_and_missing_device() {
    let mut bus = bme_bus();
    bus.set(ADDR, 0xD0, &[0x58]);
    assert!(matches!(
        Bme280::new(bus, ADDR),
        Err(SensorError::UnexpectedChipId(0x58))
    ));
    assert!(matches!(
        Bme280::new(bme_bus(), 0x77),
        Err(SensorError::NotDetected)
    ));
}

#[test]
fn bme280_read_failure_is_bus_error() {
    let bus = bme_bus();
    let fail = bus.fail_reads.clone();
    let mut sensor = Bme280::new(bus, ADDR).unwrap();
    fail.store(true, Ordering::Relaxed);
    assert_eq!(sensor.read(), Err(SensorError::Bus));
}

#[test]
fn bme280_skipped_conversion_is_unavailable() {
    let mut bus = bme_bus();
    bus.set(ADDR, 0xFA, &[0x80, 0x00, 0x00]);
    let mut sensor = Bme280::new(bus, ADDR).unwrap();
    assert_eq!(sensor.read(), Err(SensorError::Unavailable));
}
