//! Bosch BME280 temperature/humidity/pressure sensor over I²C.
//!
//! Runs in normal mode with x1 oversampling on every channel and the IIR
//! filter off. Raw ADC values are compensated with the datasheet's
//! double-precision formulas using the per-device trimming parameters
//! read once at construction.
//!
//! Generic over `embedded_hal::i2c::I2c`, so the same driver runs on
//! `/dev/i2c-N` and against an in-memory register file in tests.

use embedded_hal::i2c::I2c;

use crate::app::ports::EnvSensor;
use crate::error::SensorError;
use crate::sensors::fusion::RawReading;

pub const CHIP_ID: u8 = 0x60;

const REG_CALIB_00: u8 = 0x88;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIB_26: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7;

/// Humidity oversampling x1.
const CTRL_HUM_X1: u8 = 0x01;
/// Temperature x1, pressure x1, normal mode.
const CTRL_MEAS_NORMAL_X1: u8 = 0x27;
/// t_standby 0.5 ms, filter off.
const CONFIG_DEFAULT: u8 = 0x00;

/// Temperature ADC value reported while no conversion has completed.
const ADC_SKIPPED: i32 = 0x80000;

/// Factory trimming parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Decode the 0x88..=0xA1 and 0xE1..=0xE7 register blocks.
    pub fn from_registers(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);
        Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            h1: tp[25],
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        }
    }

    /// Returns `(°C, t_fine)`.
    pub fn compensate_temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let d = adc / 131_072.0 - t1 / 8192.0;
        let var2 = d * d * f64::from(self.t3);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Pressure in Pa.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524_288.0 + f64::from(self.p2) * var1) / 524_288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return 0.0;
        }
        let mut p = 1_048_576.0 - f64::from(adc_p);
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f64::from(self.p9) * p * p / 2_147_483_648.0;
        let var2 = p * f64::from(self.p8) / 32768.0;
        p + (var1 + var2 + f64::from(self.p7)) / 16.0
    }

    /// Relative humidity in %, clamped to 0..=100.
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let mut h = t_fine - 76800.0;
        h = (f64::from(adc_h) - (f64::from(self.h4) * 64.0 + f64::from(self.h5) / 16384.0 * h))
            * (f64::from(self.h2) / 65536.0
                * (1.0
                    + f64::from(self.h6) / 67_108_864.0 * h * (1.0 + f64::from(self.h3) / 67_108_864.0 * h)));
        h *= 1.0 - f64::from(self.h1) * h / 524_288.0;
        h.clamp(0.0, 100.0)
    }
}

/// Raw 20/20/16-bit ADC values from one burst read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAdc {
    pub pressure: i32,
    pub temperature: i32,
    pub humidity: i32,
}

impl RawAdc {
    pub fn from_burst(d: &[u8; 8]) -> Self {
        let adc20 = |msb: u8, lsb: u8, xlsb: u8| (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4);
        Self {
            pressure: adc20(d[0], d[1], d[2]),
            temperature: adc20(d[3], d[4], d[5]),
            humidity: (i32::from(d[6]) << 8) | i32::from(d[7]),
        }
    }
}

pub struct Bme280<I> {
    i2c: I,
    address: u8,
    calibration: Calibration,
}

impl<I: I2c> Bme280<I> {
    /// Probe the chip id, read trimming parameters and start normal mode.
    pub fn new(mut i2c: I, address: u8) -> Result<Self, SensorError> {
        let mut id = [0u8; 1];
        i2c.write_read(address, &[REG_CHIP_ID], &mut id)
            .map_err(|_| SensorError::NotDetected)?;
        if id[0] != CHIP_ID {
            return Err(SensorError::UnexpectedChipId(id[0]));
        }

        let mut tp = [0u8; 26];
        let mut h = [0u8; 7];
        i2c.write_read(address, &[REG_CALIB_00], &mut tp)
            .map_err(|_| SensorError::Bus)?;
        i2c.write_read(address, &[REG_CALIB_26], &mut h)
            .map_err(|_| SensorError::Bus)?;

        // ctrl_hum only latches on the following ctrl_meas write.
        for (reg, value) in [
            (REG_CTRL_HUM, CTRL_HUM_X1),
            (REG_CONFIG, CONFIG_DEFAULT),
            (REG_CTRL_MEAS, CTRL_MEAS_NORMAL_X1),
        ] {
            i2c.write(address, &[reg, value]).map_err(|_| SensorError::Bus)?;
        }

        log::info!("BME280 @0x{:02x}: ready", address);
        Ok(Self {
            i2c,
            address,
            calibration: Calibration::from_registers(&tp, &h),
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn read_raw(&mut self) -> Result<RawAdc, SensorError> {
        let mut burst = [0u8; 8];
        self.i2c
            .write_read(self.address, &[REG_DATA], &mut burst)
            .map_err(|_| SensorError::Bus)?;
        Ok(RawAdc::from_burst(&burst))
    }
}

impl<I: I2c> EnvSensor for Bme280<I> {
    fn read(&mut self) -> Result<RawReading, SensorError> {
        let adc = self.read_raw()?;
        if adc.temperature == ADC_SKIPPED {
            return Err(SensorError::Unavailable);
        }
        let cal = &self.calibration;
        let (temperature_c, t_fine) = cal.compensate_temperature(adc.temperature);
        Ok(RawReading {
            temperature_c,
            humidity_pct: cal.compensate_humidity(adc.humidity, t_fine),
            pressure_hpa: cal.compensate_pressure(adc.pressure, t_fine) / 100.0,
        })
    }
}
