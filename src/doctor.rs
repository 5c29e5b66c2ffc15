use anyhow::{bail, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::domain::Device;
use crate::driver::validate_device;
use crate::settings::Settings;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    Ok,
    Warn,
    Critical,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorCheck {
    pub name: String,
    pub level: CheckLevel,
    pub summary: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
}

fn render_operator_message(
    what_happened: &str,
    why_likely: &str,
    do_this_now: &str,
) -> Vec<String> {
    vec![
        format!("  what_happened: {}", what_happened),
        format!("  why_likely: {}", why_likely),
        format!("  do_this_now: {}", do_this_now),
    ]
}

impl DoctorReport {
    pub fn has_critical_failure(&self) -> bool {
        self.checks
            .iter()
            .any(|check| check.level == CheckLevel::Critical)
    }

    pub fn to_plain_text(&self, verbose: bool) -> String {
        let mut lines = Vec::new();
        let critical_count = self
            .checks
            .iter()
            .filter(|check| check.level == CheckLevel::Critical)
            .count();
        let warn_count = self
            .checks
            .iter()
            .filter(|check| check.level == CheckLevel::Warn)
            .count();
        let overall = if critical_count > 0 {
            "FAILED"
        } else if warn_count > 0 {
            "WARN"
        } else {
            "OK"
        };

        lines.push("hacfg doctor".to_string());
        lines.push(format!("  overall: {}", overall));
        lines.push(format!("  critical: {}", critical_count));
        lines.push(format!("  warnings: {}", warn_count));

        if !verbose {
            if critical_count > 0 {
                lines.extend(render_operator_message(
                    "device diagnostics found critical failures",
                    "settings are unreadable or a device cannot be reached over SSH",
                    "run 'hacfg doctor --verbose' and fix critical checks before 'hacfg apply'",
                ));
            } else if warn_count > 0 {
                lines.extend(render_operator_message(
                    "device diagnostics found warnings",
                    "a device lacks management info or the SSH key is missing",
                    "inspect details with 'hacfg doctor --verbose'",
                ));
            } else {
                lines.push("  next: run 'hacfg apply'".to_string());
            }

            return lines.join("\n");
        }

        for check in &self.checks {
            lines.push(format!(
                "  - [{}] {}: {}",
                check.level.label(),
                check.name,
                check.summary
            ));
            if let Some(hint) = &check.hint {
                lines.push(format!("    hint: {}", hint));
            }
        }

        lines.join("\n")
    }
}

impl CheckLevel {
    fn label(&self) -> &'static str {
        match self {
            CheckLevel::Ok => "OK",
            CheckLevel::Warn => "WARN",
            CheckLevel::Critical => "CRITICAL",
        }
    }
}

pub async fn run_doctor(config_path: Option<PathBuf>) -> DoctorReport {
    let mut checks = Vec::new();

    let resolved_config = match Settings::resolve_config_path(config_path.as_deref()) {
        Ok(path) => path,
        Err(err) => {
            checks.push(DoctorCheck {
                name: "settings".to_string(),
                level: CheckLevel::Critical,
                summary: format!("cannot resolve settings path: {}", err),
                hint: Some("Provide a settings path with '--config <FILE>'".to_string()),
            });
            return DoctorReport { checks };
        }
    };

    if !resolved_config.exists() {
        checks.push(DoctorCheck {
            name: "settings".to_string(),
            level: CheckLevel::Critical,
            summary: format!("settings file not found: {}", resolved_config.display()),
            hint: Some(format!(
                "Create a settings file at {} or pass '--config <FILE>'",
                resolved_config.display()
            )),
        });
        return DoctorReport { checks };
    }

    let settings = match Settings::load_from_file(&resolved_config).await {
        Ok(settings) => {
            checks.push(DoctorCheck {
                name: "settings".to_string(),
                level: CheckLevel::Ok,
                summary: format!("loaded {}", resolved_config.display()),
                hint: None,
            });
            settings
        }
        Err(err) => {
            checks.push(DoctorCheck {
                name: "settings".to_string(),
                level: CheckLevel::Critical,
                summary: format!("failed to load settings: {:#}", err),
                hint: Some("Fix YAML syntax and field values in the settings file".to_string()),
            });
            return DoctorReport { checks };
        }
    };

    checks.push(check_ssh_key(&settings));
    if settings.devices.is_empty() {
        checks.push(DoctorCheck {
            name: "devices".to_string(),
            level: CheckLevel::Warn,
            summary: "no devices configured".to_string(),
            hint: Some("Add devices with a management address to the settings file".to_string()),
        });
    }
    for device in &settings.devices {
        checks.push(check_device(device, &settings).await);
    }

    DoctorReport { checks }
}

pub async fn run_and_print(config_path: Option<PathBuf>, json: bool, verbose: bool) -> Result<()> {
    let report = run_doctor(config_path).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.to_plain_text(verbose));
    }

    if report.has_critical_failure() {
        bail!("doctor found critical issues")
    }

    Ok(())
}

fn check_ssh_key(settings: &Settings) -> DoctorCheck {
    let key_path = &settings.ssh.key_path;
    if key_path.exists() {
        DoctorCheck {
            name: "ssh_key".to_string(),
            level: CheckLevel::Ok,
            summary: format!("{} present", key_path.display()),
            hint: None,
        }
    } else {
        DoctorCheck {
            name: "ssh_key".to_string(),
            level: CheckLevel::Warn,
            summary: format!("{} not found", key_path.display()),
            hint: Some("Set 'ssh.key_path' to the keypair used by the appliances".to_string()),
        }
    }
}

async fn check_device(device: &Device, settings: &Settings) -> DoctorCheck {
    let name = format!("device:{}", device.name);

    let address = match validate_device(device) {
        Ok(management) => management.address.clone().unwrap_or_default(),
        Err(err) => {
            return DoctorCheck {
                name,
                level: CheckLevel::Warn,
                summary: err.message().to_string(),
                hint: Some("Add 'management.address' for this device".to_string()),
            }
        }
    };

    let target = format!("{}:{}", address, settings.ssh.port);
    let timeout = Duration::from_secs(settings.ssh.connect_timeout_secs);
    match tokio::time::timeout(timeout, TcpStream::connect(&target)).await {
        Ok(Ok(_)) => DoctorCheck {
            name,
            level: CheckLevel::Ok,
            summary: format!("{} is reachable", target),
            hint: None,
        },
        Ok(Err(err)) => DoctorCheck {
            name,
            level: CheckLevel::Critical,
            summary: format!("cannot connect to {}: {}", target, err),
            hint: Some(namespace_hint(device)),
        },
        Err(_) => DoctorCheck {
            name,
            level: CheckLevel::Critical,
            summary: format!("connection to {} timed out", target),
            hint: Some(namespace_hint(device)),
        },
    }
}

fn namespace_hint(device: &Device) -> String {
    match device.management.as_ref().and_then(|m| m.namespace.as_deref()) {
        Some(ns) => format!(
            "Management network lives in namespace {}; run doctor inside it ('ip netns exec {} hacfg doctor')",
            ns, ns
        ),
        None => "Check the management address, SSH port and firewall".to_string(),
    }
}
