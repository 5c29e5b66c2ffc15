//! Configuration manager module
//!
//! One fetch → parse → edit → deploy cycle against a device. The session owns
//! its `HaproxyConfig` and a local temp file; both are released on every exit
//! path, and the candidate is only pushed when the edits succeeded.

use anyhow::Result;
use log::{debug, error, info};
use std::fs;
use tempfile::NamedTempFile;

use crate::config_model::HaproxyConfig;
use crate::error::{LbError, ResultExt};
use crate::settings::Settings;
use crate::transport::DeviceTransport;

/// An open session on one device
pub struct ConfigManager<'a> {
    transport: &'a dyn DeviceTransport,
    settings: &'a Settings,
    local: NamedTempFile,
    config: HaproxyConfig,
}

impl<'a> ConfigManager<'a> {
    /// Fetch and parse the live configuration.
    pub fn open(transport: &'a dyn DeviceTransport, settings: &'a Settings) -> Result<Self> {
        let local = NamedTempFile::new().context_config("Cannot create local temp file")?;

        debug!(
            "Fetching configuration from {}",
            settings.remote_config_path
        );
        if let Err(e) = transport.get_file(&settings.remote_config_path, local.path()) {
            error!("Could not fetch configuration from the device: {}", e);
            return Err(LbError::Config(
                "Could not fetch configuration from the device".to_string(),
            )
            .into());
        }

        let text = fs::read_to_string(local.path())
            .context_config("Cannot read fetched configuration")?;
        let config = HaproxyConfig::parse(&text, &settings.stats_socket_path);

        Ok(Self {
            transport,
            settings,
            local,
            config,
        })
    }

    pub fn config(&self) -> &HaproxyConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut HaproxyConfig {
        &mut self.config
    }

    /// Push, validate and install the edited configuration.
    ///
    /// An invalid candidate stays in the staging path; the live file is not
    /// touched. A failed restart is logged only: the new file is in place and
    /// HAProxy picks it up on its next start.
    pub fn deploy(self) -> Result<()> {
        let staging = &self.settings.remote_staging_path;
        let live = &self.settings.remote_config_path;

        debug!("Writing configuration to {}", self.local.path().display());
        fs::write(self.local.path(), self.config.render())
            .context_config("Cannot write local configuration")?;

        debug!("Deploying configuration");
        if let Err(e) = self.transport.put_file(self.local.path(), staging) {
            error!("Could not put configuration on the device: {}", e);
            return Err(
                LbError::Config("Could not put configuration on the device".to_string()).into(),
            );
        }

        if !self.transport.validate_config(staging) {
            error!("HAProxy config file is invalid");
            return Err(LbError::Config("HAProxy config file is invalid".to_string()).into());
        }

        let output = self
            .transport
            .run_command(&format!("sudo mv {} {}", staging, live))?;
        if !output.success() {
            let msg = format!(
                "Could not install configuration on the device: {}",
                output.stderr.trim()
            );
            error!("{}", msg);
            return Err(LbError::Config(msg).into());
        }

        match self.transport.restart_service() {
            Ok(()) => info!("Configuration deployed to {}", live),
            Err(e) => error!("Failed to restart HAProxy: {}", e),
        }
        Ok(())
    }
}

/// Run `edit` inside a session and deploy only if it succeeded.
///
/// On error nothing is pushed; the temp file is removed when the session
/// drops.
pub fn with_config<T, F>(
    transport: &dyn DeviceTransport,
    settings: &Settings,
    edit: F,
) -> Result<T>
where
    F: FnOnce(&mut HaproxyConfig) -> Result<T>,
{
    let mut session = ConfigManager::open(transport, settings)?;
    let value = edit(session.config_mut())?;
    session.deploy()?;
    Ok(value)
}
