//! Device management transport
//!
//! The engine talks to a HAProxy appliance only through `DeviceTransport`.
//! `SshTransport` is the production implementation: scp for files, ssh for
//! commands, optionally wrapped in `ip netns exec` when the management
//! network lives in a namespace.

use anyhow::{anyhow, bail, Result};
use log::{debug, error};
use std::path::Path;
use std::process::Command;

use crate::domain::ManagementInfo;
use crate::error::ResultExt;
use crate::settings::{Settings, SshSettings};

/// Exit status and captured output of a device command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Which proxy/server the stats query targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsScope {
    Backend { backend_id: String },
    Server { backend_id: String, server_id: String },
}

impl StatsScope {
    /// `show stat <iid> <type> <sid>` arguments
    pub fn show_stat_command(&self) -> String {
        match self {
            StatsScope::Backend { backend_id } => format!("show stat {} 2 -1", backend_id),
            StatsScope::Server {
                backend_id,
                server_id,
            } => format!("show stat {} 4 {}", backend_id, server_id),
        }
    }
}

pub trait DeviceTransport {
    /// Copy `remote_path` on the device to `local_path`
    fn get_file(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Copy `local_path` to `remote_path` on the device
    fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Ask HAProxy whether the file at `remote_path` is a valid config
    fn validate_config(&self, remote_path: &str) -> bool;

    fn restart_service(&self) -> Result<()>;

    fn run_command(&self, command: &str) -> Result<CommandOutput>;

    /// Raw two-line CSV answer of the stats socket
    fn query_stats(&self, scope: &StatsScope) -> Result<CommandOutput>;
}

/// Opens a transport for a device's management endpoint
pub trait Connector {
    fn connect(&self, management: &ManagementInfo) -> Result<Box<dyn DeviceTransport>>;
}

/// Transport over the system `ssh`/`scp` binaries
#[derive(Debug, Clone)]
pub struct SshTransport {
    address: String,
    namespace: Option<String>,
    ssh: SshSettings,
    remote_config_path: String,
    remote_pid_path: String,
    stats_socket_path: String,
}

impl SshTransport {
    pub fn new(management: &ManagementInfo, settings: &Settings) -> Result<Self> {
        let address = management
            .address
            .clone()
            .ok_or_else(|| anyhow!("management address is not set"))?;
        debug!("Instantiating SSH transport for device {}", address);

        Ok(Self {
            address,
            namespace: management.namespace.clone(),
            ssh: settings.ssh.clone(),
            remote_config_path: settings.remote_config_path.clone(),
            remote_pid_path: settings.remote_pid_path.clone(),
            stats_socket_path: settings.stats_socket_path.clone(),
        })
    }

    fn ssh_options(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.ssh.key_path.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.ssh.connect_timeout_secs),
        ]
    }

    fn target(&self) -> String {
        format!("{}@{}", self.ssh.user, self.address)
    }

    /// Build the local command, wrapped in the management namespace if any.
    fn local_command(&self, program: &str, args: Vec<String>) -> Command {
        match &self.namespace {
            Some(ns) => {
                let mut cmd = Command::new("ip");
                cmd.args(["netns", "exec", ns.as_str(), program]).args(args);
                cmd
            }
            None => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        }
    }

    fn execute(&self, mut command: Command) -> Result<CommandOutput> {
        debug!("Executing {:?}", command);
        let program = command.get_program().to_string_lossy().into_owned();
        let output = command
            .output()
            .context_device(&format!("Failed to execute {} for {}", program, self.address))?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn execute_checked(&self, command: Command) -> Result<CommandOutput> {
        let output = self.execute(command)?;
        if !output.success() {
            error!(
                "Error while performing command on {}: {}",
                self.address,
                output.stderr.trim()
            );
            bail!(
                "command failed on {} (status {}): {}",
                self.address,
                output.status,
                output.stderr.trim()
            );
        }
        Ok(output)
    }

    fn scp(&self, from: String, to: String) -> Result<CommandOutput> {
        let mut args = self.ssh_options();
        args.push("-P".to_string());
        args.push(self.ssh.port.to_string());
        args.push(from);
        args.push(to);
        self.execute_checked(self.local_command("scp", args))
    }
}

impl DeviceTransport for SshTransport {
    fn get_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        debug!(
            "Copying remote file {} to local {}",
            remote_path,
            local_path.display()
        );
        self.scp(
            format!("{}:{}", self.target(), remote_path),
            local_path.display().to_string(),
        )?;
        Ok(())
    }

    fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        debug!(
            "Copying local file {} to remote {}",
            local_path.display(),
            remote_path
        );
        self.scp(
            local_path.display().to_string(),
            format!("{}:{}", self.target(), remote_path),
        )?;
        Ok(())
    }

    fn validate_config(&self, remote_path: &str) -> bool {
        match self.run_command(&format!("haproxy -c -f {}", remote_path)) {
            Ok(output) if output.success() => {
                debug!("Remote configuration is valid: {}", remote_path);
                true
            }
            Ok(output) => {
                error!(
                    "Invalid configuration in {}: {}",
                    remote_path,
                    output.stderr.trim()
                );
                false
            }
            Err(e) => {
                error!("Cannot validate configuration in {}: {}", remote_path, e);
                false
            }
        }
    }

    fn restart_service(&self) -> Result<()> {
        debug!("Restarting haproxy on {}", self.address);
        let output = self.run_command(&format!(
            "haproxy -f {config} -p {pid} -sf $(cat {pid})",
            config = self.remote_config_path,
            pid = self.remote_pid_path
        ))?;
        if !output.success() {
            bail!("haproxy restart failed: {}", output.stderr.trim());
        }
        Ok(())
    }

    fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let mut args = self.ssh_options();
        args.push("-p".to_string());
        args.push(self.ssh.port.to_string());
        args.push(self.target());
        args.push(command.to_string());
        self.execute(self.local_command("ssh", args))
    }

    fn query_stats(&self, scope: &StatsScope) -> Result<CommandOutput> {
        self.run_command(&format!(
            "echo \"{}\" | socat stdio unix-connect:{}",
            scope.show_stat_command(),
            self.stats_socket_path
        ))
    }
}

/// Connector producing `SshTransport`s from the settings file
pub struct SshConnector {
    settings: Settings,
}

impl SshConnector {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Connector for SshConnector {
    fn connect(&self, management: &ManagementInfo) -> Result<Box<dyn DeviceTransport>> {
        Ok(Box::new(SshTransport::new(management, &self.settings)?))
    }
}
