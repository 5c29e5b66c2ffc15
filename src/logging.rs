//! Logging module
//!
//! env_logger with one-line JSON records, to stderr or appended to a file.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Parse log level string to LevelFilter
fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Initialize logging system
///
/// Records go to stderr so command output on stdout stays parseable, or to
/// `log_file` when one is given.
pub fn init_logging(log_level_str: &str, log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let payload = build_json_payload(
                &chrono::Utc::now().to_rfc3339(),
                &record.level().to_string(),
                &record.args().to_string(),
                record.module_path().unwrap_or(record.target()),
                "log",
                json!({}),
            );
            writeln!(buf, "{}", payload)
        })
        .filter_level(parse_log_level(log_level_str));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Cannot create log directory: {}", parent.display())
                })?;
            }
            let target = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file: {}", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(target)));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    builder.try_init()?;
    Ok(())
}

fn build_json_payload(
    timestamp: &str,
    level: &str,
    message: &str,
    module: &str,
    event: &str,
    fields: Value,
) -> Value {
    json!({
        "timestamp": timestamp,
        "level": level,
        "message": message,
        "module": module,
        "event": event,
        "fields": fields
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_log_payload_uses_stable_keys() {
        let payload = build_json_payload(
            "2026-01-01T00:00:00Z",
            "DEBUG",
            "Adding backend web",
            "hacfg::config_model",
            "log",
            serde_json::json!({"device": "lb1"}),
        );

        assert_eq!(payload["timestamp"], "2026-01-01T00:00:00Z");
        assert_eq!(payload["level"], "DEBUG");
        assert_eq!(payload["message"], "Adding backend web");
        assert_eq!(payload["module"], "hacfg::config_model");
        assert_eq!(payload["event"], "log");
        assert_eq!(payload["fields"]["device"], "lb1");
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_log_level("verbose"), LevelFilter::Info);
    }
}
