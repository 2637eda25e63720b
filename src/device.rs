//! Optional board peripherals
//!
//! A run can take an environmental reading before each group's payload is
//! rendered and mirror its progress on a status display. Both are
//! write/read-only collaborators with no error channel of their own.

pub mod display;
pub mod sensor;

pub use display::{DisplayZone, Indicator, LogDisplay, StatusDisplay};
pub use sensor::{EnvironmentalSensor, SensorReading, SimulatedSensor};
