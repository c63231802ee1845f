//! Tankbot host binary.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  sim: SimPin · SimPwm · SimSensor                            │
//! │  sysfs: SysfsGpio · SysfsPwm · Bme280<LinuxI2c>              │
//! │  CsvSensorLog / LogSensorSink · JsonConfigFile               │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ Robot: motion loop · servo loop · sensor loop          │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  stdin (one JSON message per line) ─▶ dispatch ─▶ stdout     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status is broadcast on stdout every `telemetry_interval_ms`; logs go to
//! stderr. EOF or `{"cmd":"quit"}` shuts the robot down.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{select, tick, unbounded};
use log::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tankbot::adapters::config_file::JsonConfigFile;
use tankbot::adapters::linux_i2c::LinuxI2c;
use tankbot::adapters::log_sink::{CsvSensorLog, LogSensorSink};
use tankbot::adapters::sim::{SimPin, SimPwm, SimSensor};
use tankbot::adapters::sysfs::{SysfsGpio, SysfsPwm};
use tankbot::app::ports::{ConfigPort, SensorLogSink};
use tankbot::app::runtime::Robot;
use tankbot::config::{Backend, MotorPins, RobotConfig, SensorConfig};
use tankbot::drivers::motion::{MotionController, MotorPinSet};
use tankbot::drivers::servo::ServoController;
use tankbot::rpc::dispatch::{Dispatch, dispatch};
use tankbot::rpc::messages::Outbound;
use tankbot::sensors::SensorsController;
use tankbot::sensors::bme280::Bme280;
use tankbot::sensors::fusion::RawReading;

#[derive(Parser)]
#[command(name = "tankbot")]
#[command(version, about = "Tank robot actuation and telemetry core", long_about = None)]
struct Args {
    /// JSON configuration file (defaults are used if absent)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Hardware back-end, overriding the config file
    #[arg(short, long, value_name = "sim|sysfs")]
    backend: Option<Backend>,

    /// Log level for the tankbot crate (RUST_LOG wins when unset)
    #[arg(long, env = "TANKBOT_LOG_LEVEL")]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(lvl) => EnvFilter::try_new(format!("tankbot={lvl}")).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tankbot=info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn sensor_log(cfg: &SensorConfig) -> Box<dyn SensorLogSink + Send> {
    match cfg.log_path.as_deref() {
        Some(path) => match CsvSensorLog::open(path) {
            Ok(csv) => Box::new(csv),
            Err(e) => {
                warn!("SENSOR: cannot open {} ({}), logging to console", path, e);
                Box::new(LogSensorSink::new())
            }
        },
        None => Box::new(LogSensorSink::new()),
    }
}

// ── Back-ends ─────────────────────────────────────────────────

fn build_sim(cfg: &RobotConfig) -> Result<Robot> {
    let pins = |p: &MotorPins| MotorPinSet {
        in1: SimPin::new(p.in1),
        in2: SimPin::new(p.in2),
        pwm: SimPin::new(p.pwm),
    };
    let m = &cfg.motion;
    let motion = MotionController::new(m, pins(&m.motor_a), pins(&m.motor_b), m.standby_pin.map(SimPin::new))
        .context("motion controller")?;
    let servo = ServoController::new(SimPwm::new(u16::MAX), &cfg.servo).context("servo controller")?;

    let primary = SimSensor::new(RawReading {
        temperature_c: 22.0,
        humidity_pct: 45.0,
        pressure_hpa: 1013.25,
    });
    let secondary = cfg.sensors.secondary_address.map(|_| {
        SimSensor::new(RawReading {
            temperature_c: 22.4,
            humidity_pct: 46.5,
            pressure_hpa: 1012.9,
        })
    });
    let sensors = SensorsController::new(&cfg.sensors, Some(primary), secondary, sensor_log(&cfg.sensors));

    Robot::spawn(motion, servo, sensors, cfg.servo.autostart).context("runtime")
}

fn build_sysfs(cfg: &RobotConfig) -> Result<Robot> {
    let gpio = |n: u32| SysfsGpio::open(n).with_context(|| format!("GPIO{n}"));
    let pins = |p: &MotorPins| -> Result<MotorPinSet<SysfsGpio>> {
        Ok(MotorPinSet {
            in1: gpio(p.in1)?,
            in2: gpio(p.in2)?,
            pwm: gpio(p.pwm)?,
        })
    };
    let m = &cfg.motion;
    let standby = m.standby_pin.map(gpio).transpose()?;
    let motion = MotionController::new(m, pins(&m.motor_a)?, pins(&m.motor_b)?, standby).context("motion controller")?;

    let s = &cfg.servo;
    let pwm = SysfsPwm::open(s.pwm_chip, s.pwm_channel, s.frequency_hz).context("servo PWM")?;
    let servo = ServoController::new(pwm, s).context("servo controller")?;

    let n = &cfg.sensors;
    let open = |addr: u8| -> Option<Bme280<LinuxI2c>> {
        let bus = LinuxI2c::open(n.i2c_bus)
            .map_err(|e| warn!("BME280 @0x{:02x}: {}", addr, e))
            .ok()?;
        Bme280::new(bus, addr)
            .map_err(|e| warn!("BME280 @0x{:02x}: {}", addr, e))
            .ok()
    };
    let primary = open(n.primary_address);
    let secondary = n.secondary_address.and_then(open);
    let sensors = SensorsController::new(n, primary, secondary, sensor_log(n));

    Robot::spawn(motion, servo, sensors, s.autostart).context("runtime")
}

// ── Main ──────────────────────────────────────────────────────

enum Input {
    Line(String),
    Eof,
    Tick,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    info!("Tankbot v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => JsonConfigFile::new(path)
            .load()
            .with_context(|| format!("loading {}", path.display()))?,
        None => RobotConfig::default(),
    };
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let mut robot = match config.backend {
        Backend::Sim => build_sim(&config)?,
        Backend::Sysfs => build_sysfs(&config)?,
    };
    info!("Backend {:?} up, reading commands from stdin", config.backend);

    let (line_tx, line_rx) = unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("spawning stdin reader")?;

    let ticker = tick(Duration::from_millis(u64::from(config.telemetry_interval_ms)));
    let mut out = std::io::stdout().lock();

    loop {
        let input = select! {
            recv(line_rx) -> line => line.map_or(Input::Eof, Input::Line),
            recv(ticker) -> _ => Input::Tick,
        };
        match input {
            Input::Line(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match dispatch(&robot, line) {
                    Dispatch::Reply(reply) => writeln!(out, "{}", reply.to_json())?,
                    Dispatch::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }
            Input::Tick => writeln!(out, "{}", Outbound::status(&robot.read_telemetry()).to_json())?,
            Input::Eof => {
                info!("stdin closed");
                break;
            }
        }
    }

    robot.shutdown();
    Ok(())
}
