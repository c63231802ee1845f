//! Fixed-capacity rolling buffer for one sensed quantity.
//!
//! Backed by a `heapless::HistoryBuffer`, so the oldest sample is
//! overwritten once the buffer is full and no allocation ever happens on
//! the polling path.

use heapless::HistoryBuffer;

/// Samples kept per quantity.
pub const SENSOR_BUFFER_CAPACITY: usize = 10;

/// Rolling window of the last `N` fused values.
#[derive(Debug)]
pub struct SensorBuffer<const N: usize = SENSOR_BUFFER_CAPACITY> {
    samples: HistoryBuffer<f64, N>,
}

impl<const N: usize> SensorBuffer<N> {
    pub fn new() -> Self {
        Self {
            samples: HistoryBuffer::new(),
        }
    }

    /// Append a sample, evicting the oldest once full.
    pub fn push(&mut self, value: f64) {
        self.samples.write(value);
    }

    /// Mean of the retained samples; `0.0` when empty.
    pub fn average(&self) -> f64 {
        let window = self.samples.as_slice();
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f64>() / window.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for SensorBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
