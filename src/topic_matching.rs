//! Topic name and topic filter handling
//!
//! Matching follows MQTT 3.1.1 section 4.7: `+` matches exactly one level,
//! `#` matches the parent level and everything below it, and a filter that
//! starts with a wildcard never matches a topic starting with `$` (such as
//! the `$aws/things/...` shadow topics).

use crate::error::{ProbeError, Result};

/// Matches a topic name against a topic filter
///
/// Invalid topics or filters never match.
///
/// # Examples
/// ```
/// # use iot_probe::topic_matching::matches;
/// assert!(matches("Nuvoton/Mbed/D001", "Nuvoton/Mbed/+"));
/// assert!(matches("$aws/things/dev/shadow/get/accepted", "$aws/things/dev/shadow/get/#"));
/// assert!(!matches("$aws/things/dev/shadow/get", "#"));
/// ```
#[must_use]
pub fn matches(topic: &str, filter: &str) -> bool {
    if !is_valid_topic(topic) || !is_valid_filter(filter) {
        return false;
    }
    if topic.starts_with('$') && filter.starts_with(['+', '#']) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    for filter_level in filter.split('/') {
        if filter_level == "#" {
            return true;
        }
        match topic_levels.next() {
            Some(level) if filter_level == "+" || filter_level == level => {}
            _ => return false,
        }
    }
    topic_levels.next().is_none()
}

/// A topic name is what PUBLISH carries: non-empty, no wildcards
#[must_use]
pub fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= usize::from(u16::MAX)
        && !topic.contains(['+', '#', '\0'])
}

/// A topic filter may use `+` as a whole level and `#` as the last level
#[must_use]
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.len() > usize::from(u16::MAX) || filter.contains('\0') {
        return false;
    }
    let level_count = filter.split('/').count();
    filter.split('/').enumerate().all(|(index, level)| match level {
        "#" => index + 1 == level_count,
        "+" => true,
        other => !other.contains(['+', '#']),
    })
}

/// # Errors
/// Returns `ProbeError::InvalidTopicName` if the topic is not a valid topic name
pub fn validate_topic(topic: &str) -> Result<()> {
    if is_valid_topic(topic) {
        Ok(())
    } else {
        Err(ProbeError::InvalidTopicName(topic.to_string()))
    }
}

/// # Errors
/// Returns `ProbeError::InvalidTopicFilter` if the filter is malformed
pub fn validate_filter(filter: &str) -> Result<()> {
    if is_valid_filter(filter) {
        Ok(())
    } else {
        Err(ProbeError::InvalidTopicFilter(filter.to_string()))
    }
}
