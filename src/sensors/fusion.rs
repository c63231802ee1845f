//! Dual-sensor consensus.
//!
//! Each poll yields at most one reading per physical sensor. The fused
//! value follows a simple rule:
//!
//! | primary | secondary | fused value            | disagreement check |
//! |---------|-----------|------------------------|--------------------|
//! | some    | some      | mean of both           | yes                |
//! | some    | none      | primary                | no                 |
//! | none    | some      | secondary              | no                 |
//! | none    | none      | current buffer average | no                 |
//!
//! A disagreement is a warning flag, never a failure.

use core::fmt;

/// One set of environmental values, from a sensor or fused.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
}

impl RawReading {
    fn mean(a: &Self, b: &Self) -> Self {
        Self {
            temperature_c: (a.temperature_c + b.temperature_c) / 2.0,
            humidity_pct: (a.humidity_pct + b.humidity_pct) / 2.0,
            pressure_hpa: (a.pressure_hpa + b.pressure_hpa) / 2.0,
        }
    }

    fn abs_diff(a: &Self, b: &Self) -> Self {
        Self {
            temperature_c: (a.temperature_c - b.temperature_c).abs(),
            humidity_pct: (a.humidity_pct - b.humidity_pct).abs(),
            pressure_hpa: (a.pressure_hpa - b.pressure_hpa).abs(),
        }
    }
}

/// Which physical sensor a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorId {
    Primary,
    Secondary,
}

/// Provenance of a fused or averaged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    /// Mean of both sensors.
    Both,
    /// Only one sensor reported this poll.
    Single(SensorId),
    /// Neither reported; the buffer average was held.
    History,
    /// Rolling averages over the buffers.
    Averaged,
}

/// A fused value plus where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub source: ReadingSource,
}

impl SensorReading {
    pub fn from_raw(raw: RawReading, source: ReadingSource) -> Self {
        Self {
            temperature_c: raw.temperature_c,
            humidity_pct: raw.humidity_pct,
            pressure_hpa: raw.pressure_hpa,
            source,
        }
    }

    pub fn raw(&self) -> RawReading {
        RawReading {
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            pressure_hpa: self.pressure_hpa,
        }
    }
}

/// Per-quantity absolute-difference limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature_c: 1.0,
            humidity_pct: 10.0,
            pressure_hpa: 2.0,
        }
    }
}

/// Quantities whose sensors disagreed beyond their threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disagreement {
    pub temperature: bool,
    pub humidity: bool,
    pub pressure: bool,
}

impl Disagreement {
    pub const NONE: Self = Self {
        temperature: false,
        humidity: false,
        pressure: false,
    };

    pub fn any(&self) -> bool {
        self.temperature || self.humidity || self.pressure
    }
}

/// `OK`, or the space-joined list of `Temp`, `Hum`, `Press`.
impl fmt::Display for Disagreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.any() {
            return f.write_str("OK");
        }
        let tags = [
            (self.temperature, "Temp"),
            (self.humidity, "Hum"),
            (self.pressure, "Press"),
        ];
        let mut first = true;
        for (_, tag) in tags.iter().filter(|(set, _)| *set) {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(tag)?;
            first = false;
        }
        Ok(())
    }
}

/// Outcome of one consensus round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedSample {
    pub fused: SensorReading,
    pub primary: Option<RawReading>,
    pub secondary: Option<RawReading>,
    /// Absolute differences; zero unless both sensors reported.
    pub diff: RawReading,
    pub disagreement: Disagreement,
}

/// Apply the consensus rule to one poll's worth of readings.
///
/// `held` is the current buffer average, used only when neither sensor
/// reported.
pub fn fuse(
    primary: Option<RawReading>,
    secondary: Option<RawReading>,
    thresholds: &Thresholds,
    held: RawReading,
) -> FusedSample {
    let (fused, diff, disagreement) = match (&primary, &secondary) {
        (Some(a), Some(b)) => {
            let diff = RawReading::abs_diff(a, b);
            let flags = Disagreement {
                temperature: diff.temperature_c > thresholds.temperature_c,
                humidity: diff.humidity_pct > thresholds.humidity_pct,
                pressure: diff.pressure_hpa > thresholds.pressure_hpa,
            };
            let fused = SensorReading::from_raw(RawReading::mean(a, b), ReadingSource::Both);
            (fused, diff, flags)
        }
        (Some(a), None) => (
            SensorReading::from_raw(*a, ReadingSource::Single(SensorId::Primary)),
            RawReading::default(),
            Disagreement::NONE,
        ),
        (None, Some(b)) => (
            SensorReading::from_raw(*b, ReadingSource::Single(SensorId::Secondary)),
            RawReading::default(),
            Disagreement::NONE,
        ),
        (None, None) => (
            SensorReading::from_raw(held, ReadingSource::History),
            RawReading::default(),
            Disagreement::NONE,
        ),
    };

    FusedSample {
        fused,
        primary,
        secondary,
        diff,
        disagreement,
    }
}

// ---------------------------------------------------------------------------
// Log record
// ---------------------------------------------------------------------------

/// Column header for [`SensorLogRecord::to_csv_line`].
pub const CSV_HEADER: &str = "Timestamp,Temp1,Temp2,Hum1,Hum2,Press1,Press2,\
TempDiff,HumDiff,PressDiff,TempAvg,HumAvg,PressAvg,Warning";

/// One rate-limited log line worth of sensor state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorLogRecord {
    pub primary: Option<RawReading>,
    pub secondary: Option<RawReading>,
    pub diff: RawReading,
    pub fused: RawReading,
    pub disagreement: Disagreement,
}

impl From<&FusedSample> for SensorLogRecord {
    fn from(s: &FusedSample) -> Self {
        Self {
            primary: s.primary,
            secondary: s.secondary,
            diff: s.diff,
            fused: s.fused.raw(),
            disagreement: s.disagreement,
        }
    }
}

impl SensorLogRecord {
    /// Render as one CSV line (no trailing newline). A sensor that did not
    /// report leaves its cells empty.
    pub fn to_csv_line(&self, timestamp: &str) -> String {
        fn cell(v: Option<f64>) -> String {
            v.map(|x| format!("{x:.2}")).unwrap_or_default()
        }
        let (p, s) = (self.primary, self.secondary);
        format!(
            "{},{},{},{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{}",
            timestamp,
            cell(p.map(|r| r.temperature_c)),
            cell(s.map(|r| r.temperature_c)),
            cell(p.map(|r| r.humidity_pct)),
            cell(s.map(|r| r.humidity_pct)),
            cell(p.map(|r| r.pressure_hpa)),
            cell(s.map(|r| r.pressure_hpa)),
            self.diff.temperature_c,
            self.diff.humidity_pct,
            self.diff.pressure_hpa,
            self.fused.temperature_c,
            self.fused.humidity_pct,
            self.fused.pressure_hpa,
            self.disagreement,
        )
    }
}
