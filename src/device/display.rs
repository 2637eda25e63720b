use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Segment areas of a status panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DisplayZone {
    Main,
    Temperature,
    Humidity,
    Version,
}

/// On/off icons of a status panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Indicator {
    Network,
    Broker,
    Exchange,
    Error,
}

/// A write-only status panel
///
/// Calls are fire-and-forget; a panel that cannot show something simply
/// does not.
pub trait StatusDisplay: Send {
    fn init(&mut self);

    fn print_text(&mut self, zone: DisplayZone, text: &str);

    fn print_number(&mut self, zone: DisplayZone, value: i64);

    fn set_symbol(&mut self, indicator: Indicator, on: bool);

    fn set_blink(&mut self, enabled: bool);
}

/// Panel that renders to the log and remembers what it shows
#[derive(Debug, Default)]
pub struct LogDisplay {
    zones: BTreeMap<DisplayZone, String>,
    symbols: BTreeSet<Indicator>,
    blinking: bool,
}

impl LogDisplay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(&self, zone: DisplayZone) -> Option<&str> {
        self.zones.get(&zone).map(String::as_str)
    }

    #[must_use]
    pub fn is_lit(&self, indicator: Indicator) -> bool {
        self.symbols.contains(&indicator)
    }

    #[must_use]
    pub fn is_blinking(&self) -> bool {
        self.blinking
    }
}

impl StatusDisplay for LogDisplay {
    fn init(&mut self) {
        self.zones.clear();
        self.symbols.clear();
        self.blinking = false;
    }

    fn print_text(&mut self, zone: DisplayZone, text: &str) {
        info!(target: "display", zone = ?zone, "{text}");
        self.zones.insert(zone, text.to_string());
    }

    fn print_number(&mut self, zone: DisplayZone, value: i64) {
        self.print_text(zone, &value.to_string());
    }

    fn set_symbol(&mut self, indicator: Indicator, on: bool) {
        if on {
            self.symbols.insert(indicator);
        } else {
            self.symbols.remove(&indicator);
        }
    }

    fn set_blink(&mut self, enabled: bool) {
        self.blinking = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zones_and_symbols() {
        let mut display = LogDisplay::new();
        display.init();
        display.print_text(DisplayZone::Main, "CONN");
        display.print_number(DisplayZone::Temperature, 25);
        display.set_symbol(Indicator::Network, true);
        display.set_blink(true);

        assert_eq!(display.text(DisplayZone::Main), Some("CONN"));
        assert_eq!(display.text(DisplayZone::Temperature), Some("25"));
        assert!(display.is_lit(Indicator::Network));
        assert!(display.is_blinking());

        display.set_symbol(Indicator::Network, false);
        assert!(!display.is_lit(Indicator::Network));

        display.init();
        assert_eq!(display.text(DisplayZone::Main), None);
        assert!(!display.is_blinking());
    }
}
