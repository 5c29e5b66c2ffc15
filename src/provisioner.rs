//! Command hook provisioner
//!
//! Boots and tears down appliance instances by running operator supplied
//! shell commands. Request fields are passed as `HACFG_*` environment
//! variables; the create hook prints the new instance's management info as
//! JSON on stdout.

use anyhow::{bail, Context, Result};
use log::{debug, error};
use std::process::Command;

use crate::domain::ManagementInfo;
use crate::driver::{InstanceRequest, Provisioner};
use crate::settings::InstanceSettings;

pub struct HookProvisioner {
    create_command: Option<String>,
    delete_command: Option<String>,
}

impl HookProvisioner {
    /// `None` when no hook is configured.
    pub fn from_settings(instance: &InstanceSettings) -> Option<Self> {
        if instance.create_command.is_none() && instance.delete_command.is_none() {
            return None;
        }
        Some(Self {
            create_command: instance.create_command.clone(),
            delete_command: instance.delete_command.clone(),
        })
    }

    fn run(&self, hook: &str, script: Option<&str>, env: &[(&str, &str)]) -> Result<String> {
        let Some(script) = script else {
            bail!("No {} command configured under 'instance'", hook);
        };
        debug!("Running {} hook: {}", hook, script);

        let output = Command::new("sh")
            .arg("-c")
            .arg(script)
            .envs(env.iter().copied())
            .output()
            .with_context(|| format!("Failed to run {} hook", hook))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} hook failed: {}", hook, stderr.trim());
            bail!(
                "{} hook exited with {}: {}",
                hook,
                output.status,
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Provisioner for HookProvisioner {
    fn create_instance(&self, request: &InstanceRequest) -> Result<ManagementInfo> {
        let env = [
            ("HACFG_INSTANCE_NAME", request.name.as_str()),
            ("HACFG_IMAGE_ID", request.image_id.as_str()),
            ("HACFG_FLAVOR_NAME", request.flavor_name.as_str()),
            ("HACFG_KEYPAIR", request.keypair.as_str()),
            ("HACFG_SUBNET_ID", request.subnet_id.as_deref().unwrap_or("")),
            ("HACFG_TENANT_ID", request.tenant_id.as_deref().unwrap_or("")),
        ];
        let stdout = self.run("create_command", self.create_command.as_deref(), &env)?;
        serde_json::from_str(stdout.trim())
            .context("create_command must print the instance management info as JSON")
    }

    fn delete_instance(&self, tenant_id: Option<&str>, instance_id: &str) -> Result<()> {
        let env = [
            ("HACFG_INSTANCE_ID", instance_id),
            ("HACFG_TENANT_ID", tenant_id.unwrap_or("")),
        ];
        self.run("delete_command", self.delete_command.as_deref(), &env)?;
        Ok(())
    }
}
