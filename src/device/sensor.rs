use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A temperature / humidity / pressure / gas sensor such as a BME680
///
/// `begin` probes the device once; `perform_reading` latches a new sample
/// that the getters then report.
pub trait EnvironmentalSensor: Send {
    fn begin(&mut self) -> bool;

    fn perform_reading(&mut self) -> bool;

    /// Degrees Celsius
    fn temperature(&self) -> f32;

    /// Relative humidity in percent
    fn humidity(&self) -> f32;

    /// Hectopascal
    fn pressure(&self) -> f32;

    /// Kiloohm
    fn gas_resistance(&self) -> f32;
}

/// One latched sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub gas_resistance: f32,
}

impl SensorReading {
    /// Takes a fresh sample, or `None` if the sensor did not produce one
    pub fn take<S: EnvironmentalSensor + ?Sized>(sensor: &mut S) -> Option<Self> {
        if !sensor.perform_reading() {
            return None;
        }
        Some(Self {
            temperature: sensor.temperature(),
            humidity: sensor.humidity(),
            pressure: sensor.pressure(),
            gas_resistance: sensor.gas_resistance(),
        })
    }
}

/// Sensor producing plausible indoor values around a fixed baseline
#[derive(Debug)]
pub struct SimulatedSensor {
    rng: StdRng,
    baseline: SensorReading,
    latched: SensorReading,
    started: bool,
}

impl SimulatedSensor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Reproducible readings for a given seed
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let baseline = SensorReading {
            temperature: 24.5,
            humidity: 45.0,
            pressure: 1013.25,
            gas_resistance: 120.0,
        };
        Self {
            rng,
            baseline,
            latched: SensorReading::default(),
            started: false,
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentalSensor for SimulatedSensor {
    fn begin(&mut self) -> bool {
        self.started = true;
        true
    }

    fn perform_reading(&mut self) -> bool {
        if !self.started {
            return false;
        }
        let base = self.baseline;
        self.latched = SensorReading {
            temperature: base.temperature + self.rng.random_range(-0.5..0.5),
            humidity: base.humidity + self.rng.random_range(-2.0..2.0),
            pressure: base.pressure + self.rng.random_range(-1.5..1.5),
            gas_resistance: base.gas_resistance + self.rng.random_range(-10.0..10.0),
        };
        true
    }

    fn temperature(&self) -> f32 {
        self.latched.temperature
    }

    fn humidity(&self) -> f32 {
        self.latched.humidity
    }

    fn pressure(&self) -> f32 {
        self.latched.pressure
    }

    fn gas_resistance(&self) -> f32 {
        self.latched.gas_resistance
    }
}
