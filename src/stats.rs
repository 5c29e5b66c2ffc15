//! Stats read-back
//!
//! Turns the two-line CSV answer of `show stat` into the fixed set of
//! statistics the control plane expects.

use std::collections::{BTreeMap, HashMap};

use crate::constants::{HEALTH_MAPPING, HEALTH_UNKNOWN, STATS_MAPPING};

pub type Stats = BTreeMap<String, String>;

/// Health value for a raw `check_status` token
pub fn map_health(raw: &str) -> &'static str {
    HEALTH_MAPPING
        .iter()
        .find(|(token, _)| *token == raw)
        .map(|(_, health)| *health)
        .unwrap_or(HEALTH_UNKNOWN)
}

/// Parse header + values. Fewer than two lines yields an empty map; columns
/// missing from the answer map to an empty string.
pub fn parse_stats(raw: &str) -> Stats {
    let mut lines = raw.lines();
    let (Some(header), Some(values)) = (lines.next(), lines.next()) else {
        return Stats::new();
    };

    let mut columns: HashMap<&str, &str> = header
        .split(',')
        .map(|name| name.trim_matches(|c| c == '#' || c == ' '))
        .zip(values.split(',').map(str::trim))
        .collect();

    let health = columns.get("check_status").map(|raw| map_health(raw));
    if let Some(health) = health {
        columns.insert("check_status", health);
    }

    STATS_MAPPING
        .iter()
        .map(|(name, column)| {
            let value = columns.get(column).copied().unwrap_or_default();
            (name.to_string(), value.to_string())
        })
        .collect()
}

/// True when the answer carries a header and a non-empty value line
pub fn has_values(raw: &str) -> bool {
    let mut lines = raw.lines();
    lines.next().is_some() && lines.next().is_some_and(|l| !l.trim().is_empty())
}
