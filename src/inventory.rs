//! Inventory file
//!
//! A YAML snapshot of load-balancing objects. Stands in for the control
//! plane's storage: the generator reads it through `ObjectSource`, and the
//! `apply` command picks the objects it pushes to a device from it.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

use crate::domain::{HealthMonitor, Member, Pool, Vip};
use crate::generator::ObjectSource;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub health_monitors: Vec<HealthMonitor>,
    #[serde(default)]
    pub vips: Vec<Vip>,
}

impl Inventory {
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read inventory file: {}", path.display()))?;

        let inventory: Inventory = serde_yaml::from_str(&content)
            .with_context(|| format!("Inventory file parsing failed: {}", path.display()))?;

        inventory.validate()?;
        Ok(inventory)
    }

    /// Ids are unique per kind and every reference points at a known pool.
    pub fn validate(&self) -> Result<()> {
        unique_ids("pool", self.pools.iter().map(|p| p.id.as_str()))?;
        unique_ids("member", self.members.iter().map(|m| m.id.as_str()))?;
        unique_ids("health monitor", self.health_monitors.iter().map(|h| h.id.as_str()))?;
        unique_ids("VIP", self.vips.iter().map(|v| v.id.as_str()))?;

        let pools: HashSet<&str> = self.pools.iter().map(|p| p.id.as_str()).collect();
        let references = self
            .members
            .iter()
            .map(|m| ("member", &m.id, &m.pool_id))
            .chain(
                self.health_monitors
                    .iter()
                    .map(|h| ("health monitor", &h.id, &h.pool_id)),
            )
            .chain(self.vips.iter().map(|v| ("VIP", &v.id, &v.pool_id)));
        for (kind, id, pool_id) in references {
            if !pools.contains(pool_id.as_str()) {
                bail!("{} {} references unknown pool {}", kind, id, pool_id);
            }
        }

        let mut monitored = HashSet::new();
        for monitor in &self.health_monitors {
            if !monitored.insert(monitor.pool_id.as_str()) {
                bail!("Pool {} has more than one health monitor", monitor.pool_id);
            }
        }

        Ok(())
    }

    pub fn find_pool(&self, key: &str) -> Result<&Pool> {
        self.pools
            .iter()
            .find(|p| p.id == key || p.name == key)
            .with_context(|| format!("No pool '{}' in inventory", key))
    }

    pub fn find_member(&self, key: &str) -> Result<&Member> {
        self.members
            .iter()
            .find(|m| m.id == key || m.name == key)
            .with_context(|| format!("No member '{}' in inventory", key))
    }

    pub fn find_vip(&self, key: &str) -> Result<&Vip> {
        self.vips
            .iter()
            .find(|v| v.id == key || v.name == key)
            .with_context(|| format!("No VIP '{}' in inventory", key))
    }

    /// Monitor by its own id or by the pool (id or name) it watches
    pub fn find_health_monitor(&self, key: &str) -> Result<&HealthMonitor> {
        let pool_id = self.find_pool(key).ok().map(|p| p.id.as_str());
        self.health_monitors
            .iter()
            .find(|h| h.id == key || Some(h.pool_id.as_str()) == pool_id)
            .with_context(|| format!("No health monitor '{}' in inventory", key))
    }
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            bail!("Duplicate {} id: {}", kind, id);
        }
    }
    Ok(())
}

impl ObjectSource for Inventory {
    fn vips(&self, config_handle_id: &str) -> Result<Vec<Vip>> {
        Ok(self
            .vips
            .iter()
            .filter(|v| v.config_handle_id.as_deref() == Some(config_handle_id))
            .cloned()
            .collect())
    }

    fn pool(&self, pool_id: &str) -> Result<Pool> {
        self.pools
            .iter()
            .find(|p| p.id == pool_id)
            .cloned()
            .with_context(|| format!("Pool {} not found", pool_id))
    }

    fn members(&self, pool_id: &str) -> Result<Vec<Member>> {
        Ok(self
            .members
            .iter()
            .filter(|m| m.pool_id == pool_id)
            .cloned()
            .collect())
    }

    fn health_monitor(&self, pool_id: &str) -> Result<Option<HealthMonitor>> {
        Ok(self
            .health_monitors
            .iter()
            .find(|h| h.pool_id == pool_id)
            .cloned())
    }
}
