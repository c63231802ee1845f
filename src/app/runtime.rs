//! Robot runtime: three execution contexts around the controllers.
//!
//! ```text
//!  enqueue_motion ──▶ [motion queue] ──▶ motion loop ──▶ MotionPort
//!  enqueue_servo  ──▶ [servo queue]  ──▶ servo loop  ──▶ ServoPort
//!                                       sensor loop ──▶ SensorsController::poll
//!  read_telemetry ◀────────────── TelemetryHandle ◀──────────┘
//! ```
//!
//! Each loop owns its controller outright. On shutdown every loop observes
//! the signal at its next wait, disposes its controller and exits;
//! [`Robot::shutdown`] returns once all three have been joined.

use std::thread::JoinHandle;

use crate::app::channel::{CommandChannel, CommandSender, ShutdownSignal};
use crate::app::commands::{Command, MotionCommand, ServoCommand};
use crate::app::ports::{EnvSensor, MotionPort, SensorLogSink, ServoPort};
use crate::drivers::servo::AngleOutcome;
use crate::drivers::task_pin::{self, TaskPriority};
use crate::error::Result;
use crate::sensors::{SensorsController, Telemetry, TelemetryHandle};

pub struct Robot {
    motion_tx: CommandSender<MotionCommand>,
    servo_tx: CommandSender<ServoCommand>,
    telemetry: TelemetryHandle,
    shutdown: ShutdownSignal,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Robot {
    /// Start the servo (when `servo_autostart`) and spawn the three loops.
    ///
    /// A servo that cannot start, or a loop that cannot be spawned, is a
    /// `HardwareInit`/`Spawn` error; loops already running are shut down
    /// before it is returned.
    pub fn spawn<M, V, S, L>(
        mut motion: M,
        mut servo: V,
        mut sensors: SensorsController<S, L>,
        servo_autostart: bool,
    ) -> Result<Self>
    where
        M: MotionPort + Send + 'static,
        V: ServoPort + Send + 'static,
        S: EnvSensor + Send + 'static,
        L: SensorLogSink + Send + 'static,
    {
        if servo_autostart {
            servo.start()?;
        }

        let (motion_tx, motion_rx) = CommandChannel::new::<MotionCommand>();
        let (servo_tx, servo_rx) = CommandChannel::new::<ServoCommand>();
        let shutdown = ShutdownSignal::new();

        let mut robot = Self {
            motion_tx,
            servo_tx,
            telemetry: sensors.telemetry_handle(),
            shutdown: shutdown.clone(),
            workers: Vec::with_capacity(3),
        };

        let cancel = shutdown.clone();
        robot.add_worker("motion-loop", move || {
            while let Ok(cmd) = motion_rx.take(&cancel) {
                log::debug!("motion-loop: {:?}", cmd);
                motion.apply(cmd);
            }
            motion.dispose();
        })?;

        let cancel = shutdown.clone();
        robot.add_worker("servo-loop", move || {
            while let Ok(cmd) = servo_rx.take(&cancel) {
                match servo.apply(cmd) {
                    AngleOutcome::Applied(deg) => log::debug!("servo-loop: {}°", deg),
                    other => log::debug!("servo-loop: {:?} -> {:?}", cmd, other),
                }
            }
            servo.dispose();
        })?;

        let cancel = shutdown;
        robot.add_worker("sensor-loop", move || {
            while !cancel.is_raised() {
                sensors.poll();
                if cancel.wait_timeout(sensors.next_poll_delay()) {
                    break;
                }
            }
            sensors.dispose();
        })?;

        log::info!("Robot: running");
        Ok(robot)
    }

    fn add_worker<F>(&mut self, name: &'static str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match task_pin::spawn_task(name, TaskPriority::Normal, f) {
            Ok(handle) => {
                self.workers.push((name, handle));
                Ok(())
            }
            Err(e) => {
                self.shutdown();
                Err(e)
            }
        }
    }

    /// Route a command onto its actuator's queue. Never blocks.
    pub fn enqueue(&self, cmd: impl Into<Command>) -> bool {
        match cmd.into() {
            Command::Motion(cmd) => self.motion_tx.push(cmd),
            Command::Servo(cmd) => self.servo_tx.push(cmd),
        }
    }

    /// Queue a drive-train command. Never blocks.
    ///
    /// `false` once the robot has shut down.
    pub fn enqueue_motion(&self, cmd: MotionCommand) -> bool {
        self.motion_tx.push(cmd)
    }

    /// Queue a servo angle. Never blocks; values above 180 are clamped by
    /// the controller.
    pub fn enqueue_servo(&self, angle: u8) -> bool {
        self.servo_tx.push(ServoCommand::SetAngle { degrees: angle })
    }

    /// Extra producer for the motion queue.
    pub fn motion_sender(&self) -> CommandSender<MotionCommand> {
        self.motion_tx.clone()
    }

    /// Non-blocking sensor snapshot.
    pub fn read_telemetry(&self) -> Telemetry {
        self.telemetry.telemetry()
    }

    pub fn telemetry_handle(&self) -> TelemetryHandle {
        self.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Raise the shutdown signal and wait for every loop to dispose its
    /// controller. Idempotent.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        log::info!("Robot: shutting down");
        self.shutdown.raise();
        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Robot: '{}' panicked", name);
            }
        }
        log::info!("Robot: stopped");
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.shutdown();
    }
}
