//! `apply` command
//!
//! Looks the named object up in the inventory and runs the matching driver
//! operation. Update actions take the old object from a second inventory.

use anyhow::{Context, Result};
use log::info;

use crate::cli::ApplyAction;
use crate::domain::Device;
use crate::driver::HaproxyDriver;
use crate::inventory::Inventory;

pub fn apply(
    driver: &HaproxyDriver,
    device: &Device,
    action: ApplyAction,
    object: &str,
    inventory: &Inventory,
    previous: Option<&Inventory>,
) -> Result<()> {
    let previous = || {
        previous.with_context(|| format!("{:?} needs --previous <FILE>", action))
    };

    match action {
        ApplyAction::CreateVip => driver.create_vip(device, inventory.find_vip(object)?),
        ApplyAction::UpdateVip => driver.update_vip(
            device,
            inventory.find_vip(object)?,
            previous()?.find_vip(object)?,
        ),
        ApplyAction::DeleteVip => driver.delete_vip(device, inventory.find_vip(object)?),
        ApplyAction::CreatePool => driver.create_pool(device, inventory.find_pool(object)?),
        ApplyAction::UpdatePool => driver.update_pool(
            device,
            inventory.find_pool(object)?,
            previous()?.find_pool(object)?,
        ),
        ApplyAction::DeletePool => driver.delete_pool(device, inventory.find_pool(object)?),
        ApplyAction::CreateMember => driver.create_member(device, inventory.find_member(object)?),
        ApplyAction::UpdateMember => driver.update_member(
            device,
            inventory.find_member(object)?,
            previous()?.find_member(object)?,
        ),
        ApplyAction::DeleteMember => driver.delete_member(device, inventory.find_member(object)?),
        ApplyAction::CreateHealthMonitor => {
            let monitor = inventory.find_health_monitor(object)?;
            driver.create_health_monitor(device, monitor, &monitor.pool_id)
        }
        ApplyAction::DeleteHealthMonitor => {
            let monitor = inventory.find_health_monitor(object)?;
            driver.delete_health_monitor(device, monitor, &monitor.pool_id)
        }
    }?;

    info!("{:?} {} applied to device {}", action, object, device.name);
    Ok(())
}
