//! Adapters: concrete implementations of the port and HAL traits.
//!
//! | Adapter       | Implements                   | Connects to                 |
//! |---------------|------------------------------|-----------------------------|
//! | `sim`         | OutputPin, SetDutyCycle      | in-memory state + probes    |
//! |               | EnvSensor                    |                             |
//! | `sysfs`       | OutputPin                    | /sys/class/gpio             |
//! |               | SetDutyCycle                 | /sys/class/pwm              |
//! | `linux_i2c`   | I2c                          | /dev/i2c-N (I2C_RDWR)       |
//! | `log_sink`    | SensorLogSink                | CSV file / log facade       |
//! | `config_file` | ConfigPort                   | JSON file                   |

pub mod config_file;
pub mod linux_i2c;
pub mod log_sink;
pub mod sim;
pub mod sysfs;
