use anyhow::{bail, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::driver::validate_device;
use crate::settings::Settings;

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub config_path: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub device_count: usize,
}

impl CheckReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn to_plain_text(&self, verbose: bool) -> String {
        let mut lines = vec![
            "hacfg check".to_string(),
            format!(
                "  result: {}",
                if self.has_errors() { "FAILED" } else { "OK" }
            ),
            format!("  devices: {}", self.device_count),
            format!("  warnings: {}", self.warnings.len()),
        ];

        if verbose {
            lines.push(format!("  config: {}", self.config_path));

            if self.errors.is_empty() {
                lines.push("  errors: none".to_string());
            } else {
                lines.push(format!("  errors: {}", self.errors.len()));
                for error in &self.errors {
                    lines.push(format!("    - {}", error));
                }
            }

            if self.warnings.is_empty() {
                lines.push("  warning_details: none".to_string());
            } else {
                lines.push("  warning_details:".to_string());
                for warning in &self.warnings {
                    lines.push(format!("    - {}", warning));
                }
            }
        }

        lines.join("\n")
    }
}

/// Findings that do not make the settings unusable
fn collect_warnings(settings: &Settings) -> Vec<String> {
    let mut warnings = Vec::new();

    if settings.devices.is_empty() {
        warnings.push("no devices configured".to_string());
    }

    for device in &settings.devices {
        if let Err(e) = validate_device(device) {
            warnings.push(format!("device {}: {}", device.name, e.message()));
        }
    }

    if !settings.ssh.key_path.exists() {
        warnings.push(format!(
            "ssh key not found: {}",
            settings.ssh.key_path.display()
        ));
    }

    if settings.instance.create_command.is_some() && settings.instance.image_id.trim().is_empty() {
        warnings.push("instance.image_id is empty but instance.create_command is set".to_string());
    }

    warnings
}

pub async fn run_check(config_path: Option<PathBuf>) -> Result<CheckReport> {
    let path = Settings::resolve_config_path(config_path.as_deref())?;

    if !path.exists() {
        bail!("Settings file not found: {}", path.display());
    }

    let (errors, warnings, device_count) = match Settings::load_from_file(&path).await {
        Ok(settings) => (Vec::new(), collect_warnings(&settings), settings.devices.len()),
        Err(e) => (vec![format!("{:#}", e)], Vec::new(), 0),
    };

    Ok(CheckReport {
        config_path: path.display().to_string(),
        errors,
        warnings,
        device_count,
    })
}

pub async fn run_and_print(
    config_path: Option<PathBuf>,
    strict: bool,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let report = run_check(config_path).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.to_plain_text(verbose));
    }

    if report.has_errors() || (strict && report.has_warnings()) {
        bail!("static check failed")
    }

    Ok(())
}
