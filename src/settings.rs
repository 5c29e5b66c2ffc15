//! Settings file management module
//!
//! Handles YAML settings parsing, validation, and default values: where the
//! live HAProxy config lives on devices, how to reach them over SSH, which
//! image to boot for new appliances, and the known devices.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::{
    get_home_config_path, get_system_config_path, DEFAULT_FLAVOR_NAME, DEFAULT_KEYPAIR,
    DEFAULT_SSH_KEY_PATH, DEFAULT_SSH_PORT, DEFAULT_SSH_USER, REMOTE_CONFIG_PATH,
    REMOTE_PID_PATH, REMOTE_STAGING_PATH, SSH_CONNECT_TIMEOUT_SECS, STATS_SOCKET_PATH,
};
use crate::domain::Device;

/// SSH access to appliances
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshSettings {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Private key used for ssh/scp
    #[serde(default = "default_ssh_key_path")]
    pub key_path: PathBuf,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            key_path: default_ssh_key_path(),
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Appliance instance to boot on `create_device`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSettings {
    /// Image with HAProxy installed
    #[serde(default)]
    pub image_id: String,

    #[serde(default = "default_flavor_name")]
    pub flavor_name: String,

    #[serde(default = "default_keypair")]
    pub keypair: String,

    /// Shell hook that boots an instance and prints its management info as JSON
    #[serde(default)]
    pub create_command: Option<String>,

    /// Shell hook that removes the instance named by `HACFG_INSTANCE_ID`
    #[serde(default)]
    pub delete_command: Option<String>,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            image_id: String::new(),
            flavor_name: default_flavor_name(),
            keypair: default_keypair(),
            create_command: None,
            delete_command: None,
        }
    }
}

/// Complete settings structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Live HAProxy config on the device
    #[serde(default = "default_remote_config_path")]
    pub remote_config_path: String,

    /// Where a candidate config is pushed before validation
    #[serde(default = "default_remote_staging_path")]
    pub remote_staging_path: String,

    #[serde(default = "default_remote_pid_path")]
    pub remote_pid_path: String,

    #[serde(default = "default_stats_socket_path")]
    pub stats_socket_path: String,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub instance: InstanceSettings,

    /// Known appliances, addressed by name from the CLI
    #[serde(default)]
    pub devices: Vec<Device>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_remote_config_path() -> String {
    REMOTE_CONFIG_PATH.to_string()
}

fn default_remote_staging_path() -> String {
    REMOTE_STAGING_PATH.to_string()
}

fn default_remote_pid_path() -> String {
    REMOTE_PID_PATH.to_string()
}

fn default_stats_socket_path() -> String {
    STATS_SOCKET_PATH.to_string()
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

fn default_ssh_key_path() -> PathBuf {
    PathBuf::from(DEFAULT_SSH_KEY_PATH)
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_connect_timeout_secs() -> u64 {
    SSH_CONNECT_TIMEOUT_SECS
}

fn default_flavor_name() -> String {
    DEFAULT_FLAVOR_NAME.to_string()
}

fn default_keypair() -> String {
    DEFAULT_KEYPAIR.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            remote_config_path: default_remote_config_path(),
            remote_staging_path: default_remote_staging_path(),
            remote_pid_path: default_remote_pid_path(),
            stats_socket_path: default_stats_socket_path(),
            ssh: SshSettings::default(),
            instance: InstanceSettings::default(),
            devices: Vec::new(),
        }
    }
}

impl Settings {
    /// Resolve settings file path
    ///
    /// Priority:
    /// 1. Path specified via CLI argument
    /// 2. $HOME/.hacfg/config.yaml
    /// 3. /etc/hacfg/config.yaml
    pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli_path {
            return Ok(path.to_path_buf());
        }

        let home_path = get_home_config_path();
        if home_path.exists() {
            return Ok(home_path);
        }

        let system_path = get_system_config_path();
        if system_path.exists() {
            return Ok(system_path);
        }

        Ok(home_path)
    }

    /// Load settings from file
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read settings file: {}", path.display()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Settings file parsing failed: {}", path.display()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the resolved path, defaults if no file exists
    pub async fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(cli_path)?;
        if cli_path.is_none() && !path.exists() {
            log::debug!("No settings file found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_file(&path).await
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("remote_config_path", &self.remote_config_path),
            ("remote_staging_path", &self.remote_staging_path),
            ("remote_pid_path", &self.remote_pid_path),
            ("stats_socket_path", &self.stats_socket_path),
        ] {
            if !value.starts_with('/') {
                bail!("{} must be an absolute path, got '{}'", field, value);
            }
        }

        if self.remote_config_path == self.remote_staging_path {
            bail!("remote_staging_path must differ from remote_config_path");
        }

        if self.ssh.user.trim().is_empty() {
            bail!("ssh.user cannot be empty");
        }

        if self.ssh.port == 0 {
            bail!("ssh.port cannot be 0");
        }

        if self.ssh.connect_timeout_secs == 0 {
            bail!("ssh.connect_timeout_secs must be greater than 0");
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                bail!("Every device needs a name");
            }
            if !seen.insert(device.name.as_str()) {
                bail!("Duplicate device configuration: {}", device.name);
            }
        }

        Ok(())
    }

    pub fn device(&self, name: &str) -> Result<&Device> {
        self.devices
            .iter()
            .find(|d| d.name == name)
            .with_context(|| format!("No device named '{}' in settings", name))
    }

    /// Generate default settings file template
    pub fn default_template() -> String {
        r#"# minimal settings (recommended)
# Add only the fields you want to override from defaults.

ssh:
  key_path: "/root/.ssh/haproxy-keypair.pem"
devices:
  - name: "lb1"
    management:
      address: "10.0.0.2"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_settings_applies_defaults() {
        let yaml = r#"
devices:
  - name: lb1
    management:
      address: 10.0.0.2
"#;

        let settings: Settings = serde_yaml::from_str(yaml).expect("settings should parse");

        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.remote_config_path, "/etc/haproxy/haproxy.cfg");
        assert_eq!(settings.remote_staging_path, "/tmp/haproxy.cfg.remote");
        assert_eq!(settings.stats_socket_path, "/var/run/haproxy.sock");
        assert_eq!(settings.ssh.user, "root");
        assert_eq!(settings.ssh.port, 22);
        assert_eq!(settings.instance.flavor_name, "m1.tiny");
        assert_eq!(
            settings.devices[0]
                .management
                .as_ref()
                .and_then(|m| m.address.as_deref()),
            Some("10.0.0.2")
        );
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn validate_rejects_relative_paths_and_duplicate_devices() {
        let mut settings = Settings::default();
        settings.remote_config_path = "haproxy.cfg".to_string();
        assert!(settings.validate().is_err());

        let yaml = r#"
devices:
  - name: lb1
  - name: lb1
"#;
        let settings: Settings = serde_yaml::from_str(yaml).expect("settings should parse");
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate device"));
    }

    #[test]
    fn default_template_is_valid_settings() {
        let settings: Settings =
            serde_yaml::from_str(&Settings::default_template()).expect("template should parse");
        settings.validate().expect("template should validate");
        assert!(settings.device("lb1").is_ok());
        assert!(settings.device("lb2").is_err());
    }

    #[tokio::test]
    async fn load_from_file_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "log_level: debug\nssh:\n  port: 2222").expect("write settings");

        let settings = Settings::load_from_file(file.path())
            .await
            .expect("settings should load");
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.ssh.port, 2222);
        assert_eq!(settings.ssh.user, "root");
    }
}
