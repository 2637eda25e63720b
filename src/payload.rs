//! Publish payload templates
//!
//! Payloads are JSON documents that may embed runtime values through a
//! small fixed set of placeholders. Any other brace is plain text, so JSON
//! objects need no escaping:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{thing_name}` | the configured thing name |
//! | `{temperature}` | °C, two decimals |
//! | `{humidity}` | %RH, two decimals |
//! | `{pressure}` | hPa, two decimals |
//! | `{gas_resistance}` | kΩ, two decimals |
//!
//! Sensor placeholders render as `null` when no reading was taken.

use crate::device::SensorReading;
use crate::error::Result;
use crate::scratch::ScratchLease;
use serde::{Deserialize, Serialize};

/// Values available to a template
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadValues<'a> {
    pub thing_name: &'a str,
    pub reading: Option<SensorReading>,
}

#[derive(Debug, Clone, Copy)]
enum Placeholder {
    ThingName,
    Temperature,
    Humidity,
    Pressure,
    GasResistance,
}

const PLACEHOLDERS: [(&str, Placeholder); 5] = [
    ("{thing_name}", Placeholder::ThingName),
    ("{temperature}", Placeholder::Temperature),
    ("{humidity}", Placeholder::Humidity),
    ("{pressure}", Placeholder::Pressure),
    ("{gas_resistance}", Placeholder::GasResistance),
];

/// A payload with optional placeholders
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadTemplate(String);

impl PayloadTemplate {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn uses_sensor(&self) -> bool {
        PLACEHOLDERS
            .iter()
            .filter(|(_, p)| !matches!(p, Placeholder::ThingName))
            .any(|(token, _)| self.0.contains(token))
    }

    /// Renders the template into a scratch lease
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::BufferOverflow` if the rendered payload does not
    /// fit the lease
    pub fn render_into(&self, lease: &mut ScratchLease<'_>, values: &PayloadValues<'_>) -> Result<()> {
        let mut rest = self.0.as_str();
        while let Some(open) = rest.find('{') {
            lease.push_bytes(rest[..open].as_bytes())?;
            rest = &rest[open..];
            let Some((token, placeholder)) = PLACEHOLDERS
                .iter()
                .find(|(token, _)| rest.starts_with(token))
            else {
                lease.push_bytes(b"{")?;
                rest = &rest[1..];
                continue;
            };
            render_value(lease, *placeholder, values)?;
            rest = &rest[token.len()..];
        }
        lease.push_bytes(rest.as_bytes())
    }
}

impl From<&str> for PayloadTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

fn render_value(
    lease: &mut ScratchLease<'_>,
    placeholder: Placeholder,
    values: &PayloadValues<'_>,
) -> Result<()> {
    let measurement = match placeholder {
        Placeholder::ThingName => return lease.push_bytes(values.thing_name.as_bytes()),
        Placeholder::Temperature => values.reading.map(|r| r.temperature),
        Placeholder::Humidity => values.reading.map(|r| r.humidity),
        Placeholder::Pressure => values.reading.map(|r| r.pressure),
        Placeholder::GasResistance => values.reading.map(|r| r.gas_resistance),
    };
    match measurement {
        Some(value) => lease.write_args(format_args!("{value:.2}")),
        None => lease.push_bytes(b"null"),
    }
}
