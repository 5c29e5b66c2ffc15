//! HAProxy driver
//!
//! Maps control-plane events on VIPs, pools, members and health monitors
//! onto config sessions against one device, and reads statistics back from
//! the device's stats socket.

use anyhow::{bail, Result};
use log::{debug, error, info};

use crate::config_blocks::{block_id, Backend, BlockRef, Frontend, Probe, Server};
use crate::config_manager::with_config;
use crate::domain::{Device, HealthMonitor, ManagementInfo, Member, Pool, Vip};
use crate::error::LbError;
use crate::settings::Settings;
use crate::stats::{has_values, parse_stats, Stats};
use crate::transport::{Connector, DeviceTransport, StatsScope};

pub const DRIVER_TYPE: &str = "HAPROXY";
pub const DRIVER_VERSION: &str = "v1.0";

/// What to boot for a new appliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub name: String,
    pub image_id: String,
    pub flavor_name: String,
    pub keypair: String,
    pub subnet_id: Option<String>,
    pub tenant_id: Option<String>,
}

/// Boots and tears down appliance instances
pub trait Provisioner {
    fn create_instance(&self, request: &InstanceRequest) -> Result<ManagementInfo>;
    fn delete_instance(&self, tenant_id: Option<&str>, instance_id: &str) -> Result<()>;
}

/// Management info of `device`, or why it cannot be reached.
pub fn validate_device(device: &Device) -> Result<&ManagementInfo, LbError> {
    let Some(management) = device.management.as_ref() else {
        let msg = format!("\"management\" not found in device: {}", device.name);
        error!("{}", msg);
        return Err(LbError::ManagementInfoMissing(msg));
    };
    if management.address.as_deref().map_or(true, str::is_empty) {
        let msg = "\"address\" not found in device management info".to_string();
        error!("{}", msg);
        return Err(LbError::ManagementInfoMissing(msg));
    }
    Ok(management)
}

pub struct HaproxyDriver {
    settings: Settings,
    connector: Box<dyn Connector>,
    provisioner: Option<Box<dyn Provisioner>>,
}

impl HaproxyDriver {
    pub fn new(settings: Settings, connector: Box<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            provisioner: None,
        }
    }

    pub fn with_provisioner(mut self, provisioner: Box<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    pub fn version(&self) -> &'static str {
        DRIVER_VERSION
    }

    fn connect(&self, device: &Device) -> Result<Box<dyn DeviceTransport>> {
        let management = validate_device(device)?;
        self.connector.connect(management)
    }

    fn provisioner(&self) -> Result<&dyn Provisioner> {
        match self.provisioner.as_deref() {
            Some(provisioner) => Ok(provisioner),
            None => bail!("No instance provisioner configured"),
        }
    }

    pub fn create_device(&self, device: &Device) -> Result<ManagementInfo> {
        debug!("Create device: device={}", device.name);
        let instance = &self.settings.instance;
        let request = InstanceRequest {
            name: "haproxy".to_string(),
            image_id: instance.image_id.clone(),
            flavor_name: instance.flavor_name.clone(),
            keypair: instance.keypair.clone(),
            subnet_id: device.subnet_id.clone(),
            tenant_id: device.tenant_id.clone(),
        };
        let management = self.provisioner()?.create_instance(&request)?;
        info!(
            "Created HAProxy instance {} for device {}",
            management.instance_id.as_deref().unwrap_or("-"),
            device.name
        );
        Ok(management)
    }

    pub fn delete_device(&self, device: &Device) -> Result<()> {
        debug!("Delete device: device={}", device.name);
        let instance_id = device
            .management
            .as_ref()
            .and_then(|m| m.instance_id.as_deref());
        let Some(instance_id) = instance_id else {
            let msg = "\"instance_id\" not found in device management info".to_string();
            error!("{}", msg);
            return Err(LbError::ManagementInfoMissing(msg).into());
        };
        self.provisioner()?
            .delete_instance(device.tenant_id.as_deref(), instance_id)
    }

    pub fn create_vip(&self, device: &Device, vip: &Vip) -> Result<()> {
        debug!("Create VIP: device={}, vip={}", device.name, vip.name);
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            let backend = config.resolve_backend(&vip.pool_id);
            config.add_frontend(&Frontend::from_vip(vip, &backend))?;
            if let Some(persistence) = &vip.session_persistence {
                config.add_persistence(&backend, persistence)?;
            }
            Ok(())
        })?;
        debug!("Create VIP succeed");
        Ok(())
    }

    /// Replace the frontend; a present persistence value replaces the old
    /// policy, and a typeless one only removes it.
    pub fn update_vip(&self, device: &Device, new_vip: &Vip, old_vip: &Vip) -> Result<()> {
        debug!(
            "Update VIP: device={}, old vip={}, new vip={}",
            device.name, old_vip.name, new_vip.name
        );
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            let backend = config.resolve_backend(&new_vip.pool_id);
            config.delete_block(&BlockRef::frontend(old_vip.name.as_str()))?;
            config.add_frontend(&Frontend::from_vip(new_vip, &backend))?;

            if let Some(persistence) = &new_vip.session_persistence {
                config.delete_persistence(&backend)?;
                if !persistence.is_empty() {
                    config.add_persistence(&backend, persistence)?;
                }
            }
            Ok(())
        })?;
        debug!("Update VIP succeed");
        Ok(())
    }

    pub fn delete_vip(&self, device: &Device, vip: &Vip) -> Result<()> {
        debug!("Delete VIP: device={}, vip={}", device.name, vip.name);
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            config.delete_block(&BlockRef::frontend(vip.name.as_str()))?;
            let backend = config.resolve_backend(&vip.pool_id);
            config.delete_persistence(&backend)?;
            Ok(())
        })?;
        debug!("Delete VIP succeed");
        Ok(())
    }

    pub fn create_pool(&self, device: &Device, pool: &Pool) -> Result<()> {
        debug!("Create pool: device={}, pool={}", device.name, pool.name);
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            config.add_backend(&Backend::from(pool))?;
            Ok(())
        })?;
        debug!("Create pool succeed");
        Ok(())
    }

    pub fn update_pool(&self, device: &Device, new_pool: &Pool, old_pool: &Pool) -> Result<()> {
        debug!(
            "Update pool: device={}, old pool={}, new pool={}",
            device.name, old_pool.name, new_pool.name
        );
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            config.update_backend(&Backend::from(old_pool), &Backend::from(new_pool))?;
            Ok(())
        })?;
        debug!("Update pool succeed");
        Ok(())
    }

    pub fn delete_pool(&self, device: &Device, pool: &Pool) -> Result<()> {
        debug!("Delete pool: device={}, pool={}", device.name, pool.name);
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            config.delete_block(&BlockRef::backend(pool.name.as_str()))?;
            Ok(())
        })?;
        debug!("Delete pool succeed");
        Ok(())
    }

    pub fn create_member(&self, device: &Device, member: &Member) -> Result<()> {
        debug!(
            "Create member: device={}, member={}",
            device.name, member.name
        );
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            let backend = config.resolve_backend(&member.pool_id);
            config.add_server(&backend, &Server::from(member))?;
            Ok(())
        })?;
        debug!("Create member succeed");
        Ok(())
    }

    /// Delete the old server line and add the new one in the same session.
    pub fn update_member(
        &self,
        device: &Device,
        new_member: &Member,
        old_member: &Member,
    ) -> Result<()> {
        debug!(
            "Update member: device={}, old member={}, new member={}",
            device.name, old_member.name, new_member.name
        );
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            let backend = config.resolve_backend(&new_member.pool_id);
            config.delete_server(&backend, &Server::from(old_member))?;
            config.add_server(&backend, &Server::from(new_member))?;
            Ok(())
        })?;
        debug!("Update member succeed");
        Ok(())
    }

    pub fn delete_member(&self, device: &Device, member: &Member) -> Result<()> {
        debug!(
            "Delete member: device={}, member={}",
            device.name, member.name
        );
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            let backend = config.resolve_backend(&member.pool_id);
            config.delete_server(&backend, &Server::from(member))?;
            Ok(())
        })?;
        debug!("Member deleted successfully");
        Ok(())
    }

    pub fn create_health_monitor(
        &self,
        device: &Device,
        monitor: &HealthMonitor,
        pool_id: &str,
    ) -> Result<()> {
        debug!(
            "Add health monitor to pool {}: device={}, monitor={}",
            pool_id, device.name, monitor.id
        );
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            let backend = config.resolve_backend(pool_id);
            if config.has_health_monitors(&backend)? {
                let msg = "Can associate only one health monitor with a HAProxy pool";
                error!("{}", msg);
                return Err(LbError::Config(msg.to_string()).into());
            }
            config.add_probe(&backend, &Probe::from(monitor))?;
            Ok(())
        })?;
        debug!("Add health monitor succeed");
        Ok(())
    }

    pub fn delete_health_monitor(
        &self,
        device: &Device,
        monitor: &HealthMonitor,
        pool_id: &str,
    ) -> Result<()> {
        debug!(
            "Delete health monitor from pool {}: device={}, monitor={}",
            pool_id, device.name, monitor.id
        );
        let transport = self.connect(device)?;
        with_config(transport.as_ref(), &self.settings, |config| {
            let backend = config.resolve_backend(pool_id);
            config.delete_probe(&backend)?;
            Ok(())
        })?;
        debug!("Delete health monitor succeed");
        Ok(())
    }

    pub fn get_pool_stats(&self, device: &Device, pool_id: &str) -> Result<Stats> {
        debug!("Get pool stats: device={}, pool={}", device.name, pool_id);
        let scope = StatsScope::Backend {
            backend_id: block_id(pool_id),
        };
        let stats = self.query_stats(device, &scope, "pool", pool_id)?;
        debug!("Get pool stats succeed");
        Ok(stats)
    }

    pub fn get_member_stats(
        &self,
        device: &Device,
        pool_id: &str,
        member_id: &str,
    ) -> Result<Stats> {
        debug!(
            "Get member stats: device={}, pool={}, member={}",
            device.name, pool_id, member_id
        );
        let scope = StatsScope::Server {
            backend_id: block_id(pool_id),
            server_id: block_id(member_id),
        };
        let stats = self.query_stats(device, &scope, "member", member_id)?;
        debug!("Get member stats succeed");
        Ok(stats)
    }

    fn query_stats(
        &self,
        device: &Device,
        scope: &StatsScope,
        kind: &str,
        id: &str,
    ) -> Result<Stats> {
        let transport = self.connect(device)?;
        let output = transport.query_stats(scope)?;

        if !output.success() {
            let msg = format!(
                "Error while getting stats for {} {}: {}",
                kind,
                id,
                output.stderr.trim()
            );
            error!("{}", msg);
            return Err(LbError::Device(msg).into());
        }
        if !has_values(&output.stdout) {
            let msg = format!("No stats found for {} {}", kind, id);
            error!("{}", msg);
            return Err(LbError::Device(msg).into());
        }

        Ok(parse_stats(&output.stdout))
    }
}
