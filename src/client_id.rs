//! Client identifier generation
//!
//! Brokers of this kind disconnect an existing client when another one
//! connects with the same identifier, so unless an identifier is configured
//! one is derived from a 96-bit value: the host's unique machine id when it
//! is readable, random words otherwise. The value is rendered as three
//! upper-case 8-digit hex groups, e.g. `0A1B2C3D-4E5F6071-8293A4B5`.

use crate::constants::limits::MAX_CLIENT_ID_LENGTH;
use crate::error::{ProbeError, Result};
use rand::Rng;
use std::path::PathBuf;
use tracing::debug;

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Source of the 96-bit value a client identifier is derived from
pub trait ClientIdSource {
    /// Returns three 32-bit words
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot produce a value
    fn words(&self) -> Result<[u32; 3]>;
}

/// The host's unique machine id
#[derive(Debug, Clone)]
pub struct MachineUid {
    paths: Vec<PathBuf>,
}

impl MachineUid {
    #[must_use]
    pub fn new() -> Self {
        Self {
            paths: MACHINE_ID_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Reads the id from a specific file instead of the system locations
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
        }
    }
}

impl Default for MachineUid {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientIdSource for MachineUid {
    fn words(&self) -> Result<[u32; 3]> {
        for path in &self.paths {
            match std::fs::read_to_string(path) {
                Ok(contents) => return parse_machine_id(contents.trim()),
                Err(e) => debug!(path = %path.display(), error = %e, "machine id not readable"),
            }
        }
        Err(ProbeError::Config("No machine id available".to_string()))
    }
}

/// Uses the first 24 hex digits of a machine id
fn parse_machine_id(id: &str) -> Result<[u32; 3]> {
    let invalid = || ProbeError::Config(format!("Malformed machine id: {id}"));
    if id.len() < 24 || !id.is_char_boundary(24) {
        return Err(invalid());
    }
    let mut words = [0u32; 3];
    for (i, word) in words.iter_mut().enumerate() {
        *word = u32::from_str_radix(&id[i * 8..(i + 1) * 8], 16).map_err(|_| invalid())?;
    }
    Ok(words)
}

/// Fresh random words from the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomWords;

impl ClientIdSource for RandomWords {
    fn words(&self) -> Result<[u32; 3]> {
        let mut rng = rand::rng();
        Ok([rng.random(), rng.random(), rng.random()])
    }
}

/// A fixed value, for reproducible identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWords(pub [u32; 3]);

impl ClientIdSource for FixedWords {
    fn words(&self) -> Result<[u32; 3]> {
        Ok(self.0)
    }
}

/// Formats three words as `XXXXXXXX-XXXXXXXX-XXXXXXXX`
#[must_use]
pub fn format_client_id(words: [u32; 3]) -> String {
    format!("{:08X}-{:08X}-{:08X}", words[0], words[1], words[2])
}

/// Picks the client identifier for a session
///
/// A configured identifier wins. Otherwise the first source that yields a
/// value is formatted; when none does, random words are used.
///
/// # Errors
///
/// Returns `ProbeError::Config` if the configured identifier is empty or
/// longer than the broker accepts
pub fn resolve_client_id(
    configured: Option<&str>,
    sources: &[&dyn ClientIdSource],
) -> Result<String> {
    if let Some(id) = configured {
        if id.is_empty() || id.len() > MAX_CLIENT_ID_LENGTH {
            return Err(ProbeError::Config(format!(
                "Client id must be 1..={MAX_CLIENT_ID_LENGTH} bytes, got {}",
                id.len()
            )));
        }
        return Ok(id.to_string());
    }
    for source in sources {
        match source.words() {
            Ok(words) => return Ok(format_client_id(words)),
            Err(e) => debug!(error = %e, "client id source unavailable"),
        }
    }
    RandomWords.words().map(format_client_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn is_client_id_shape(id: &str) -> bool {
        let groups: Vec<&str> = id.split('-').collect();
        groups.len() == 3
            && groups.iter().all(|g| {
                g.len() == 8
                    && g.chars()
                        .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
            })
    }

    #[test]
    fn test_format_pads_and_uppercases() {
        assert_eq!(
            format_client_id([0x1, 0xabcdef, 0xFFFF_FFFF]),
            "00000001-00ABCDEF-FFFFFFFF"
        );
    }

    #[test]
    fn test_configured_id_wins() {
        let id = resolve_client_id(Some("Nuvoton Client"), &[&FixedWords([1, 2, 3])]).unwrap();
        assert_eq!(id, "Nuvoton Client");
    }

    #[test]
    fn test_configured_id_length_checked() {
        assert!(resolve_client_id(Some(""), &[]).is_err());
        let long = "x".repeat(MAX_CLIENT_ID_LENGTH + 1);
        assert!(resolve_client_id(Some(&long), &[]).is_err());
    }

    #[test]
    fn test_first_available_source_used() {
        let missing = MachineUid::from_path("/nonexistent/machine-id");
        let id = resolve_client_id(None, &[&missing, &FixedWords([7, 8, 9])]).unwrap();
        assert_eq!(id, "00000007-00000008-00000009");
    }

    #[test]
    fn test_falls_back_to_random() {
        let missing = MachineUid::from_path("/nonexistent/machine-id");
        let id = resolve_client_id(None, &[&missing]).unwrap();
        assert!(is_client_id_shape(&id));
    }

    #[test]
    fn test_machine_id_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0123456789abcdef0123456789abcdef").unwrap();
        let source = MachineUid::from_path(file.path());
        assert_eq!(source.words().unwrap(), [0x0123_4567, 0x89ab_cdef, 0x0123_4567]);
        assert_eq!(
            resolve_client_id(None, &[&source]).unwrap(),
            "01234567-89ABCDEF-01234567"
        );
    }

    #[test]
    fn test_malformed_machine_id() {
        assert!(parse_machine_id("short").is_err());
        assert!(parse_machine_id("zzzzzzzz0000000000000000").is_err());
    }

    proptest! {
        #[test]
        fn prop_format_is_deterministic(a: u32, b: u32, c: u32) {
            let first = resolve_client_id(None, &[&FixedWords([a, b, c])]).unwrap();
            let second = resolve_client_id(None, &[&FixedWords([a, b, c])]).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert!(is_client_id_shape(&first));
        }

        #[test]
        fn prop_format_round_trips_words(a: u32, b: u32, c: u32) {
            let id = format_client_id([a, b, c]);
            let words: Vec<u32> = id
                .split('-')
                .map(|g| u32::from_str_radix(g, 16).unwrap())
                .collect();
            prop_assert_eq!(words, vec![a, b, c]);
        }
    }
}
