//! hacfg - HAProxy configuration reconciliation engine
//!
//! Keeps the haproxy.cfg of load-balancer appliances in line with the
//! control plane's pools, members, health monitors and VIPs:
//! - Incremental edits: fetch the live config, patch it, validate and deploy
//! - Full generation: one complete config per configuration handle
//! - Stats read-back from the HAProxy stats socket

use anyhow::{bail, Context, Result};
use log::{error, info};
use std::path::Path;

mod apply;
mod check;
mod cli;
mod config_blocks;
mod config_manager;
mod config_model;
mod constants;
mod doctor;
mod domain;
mod driver;
mod error;
mod generator;
mod inventory;
mod logging;
mod provisioner;
mod settings;
mod stats;
mod transport;

use cli::{Cli, Commands, DeviceAction};
use config_model::HaproxyConfig;
use driver::HaproxyDriver;
use generator::{create_config, GenerateRequest};
use inventory::Inventory;
use provisioner::HookProvisioner;
use settings::Settings;
use transport::SshConnector;

/// Application entry point
///
/// Parses CLI arguments and dispatches to appropriate subcommands.
#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // log level comes from the settings file; fall back to info if it is unusable
    let log_level = match Settings::load_or_default(cli.command.settings_path()).await {
        Ok(settings) => settings.log_level,
        Err(_) => "info".to_string(),
    };

    if let Err(e) = logging::init_logging(&log_level, cli.log_file.as_deref()) {
        eprintln!("Error: cannot initialize logging: {:#}", e);
        std::process::exit(1);
    }

    info!("{} v{} starting", constants::APP_NAME, env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli.command).await {
        error!("{:#}", e);
        eprintln!("Error: {}", error::format_user_error(&e));
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Generate {
            inventory,
            handle,
            slug,
            config_version,
            output,
            json,
        } => {
            let inventory = Inventory::load_from_file(&inventory).await?;
            let request = GenerateRequest {
                config_handle_id: handle,
                slug,
                version: config_version,
            };
            let generated = create_config(&inventory, &request)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&generated)?);
            } else if let Some(path) = output {
                tokio::fs::write(&path, &generated.data)
                    .await
                    .with_context(|| format!("Cannot write {}", path.display()))?;
                info!("Configuration written to {}", path.display());
            } else {
                print!("{}", generated.data);
            }
        }
        Commands::Render { file, config } => {
            let settings = Settings::load_or_default(config.as_deref()).await?;
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let parsed = HaproxyConfig::parse(&text, &settings.stats_socket_path);
            info!(
                "Parsed {} with backends: {}",
                file.display(),
                parsed.backend_names().collect::<Vec<_>>().join(", ")
            );
            print!("{}", parsed.render());
        }
        Commands::Apply {
            action,
            object,
            device,
            inventory,
            previous,
            config,
        } => {
            let settings = load_settings(config.as_deref()).await?;
            let device = settings.device(&device)?.clone();
            let inventory = Inventory::load_from_file(&inventory).await?;
            let previous = match previous {
                Some(path) => Some(Inventory::load_from_file(&path).await?),
                None if action.is_update() => {
                    bail!("{:?} needs the previous state: pass --previous <FILE>", action)
                }
                None => None,
            };

            let driver = build_driver(settings);
            info!("Running {:?} {} on device {}", action, object, device.name);
            apply::apply(
                &driver,
                &device,
                action,
                &object,
                &inventory,
                previous.as_ref(),
            )?;
        }
        Commands::Stats {
            device,
            pool,
            member,
            config,
            json,
        } => {
            let settings = load_settings(config.as_deref()).await?;
            let device = settings.device(&device)?.clone();
            let driver = build_driver(settings);

            let stats = match member {
                Some(member) => driver.get_member_stats(&device, &pool, &member)?,
                None => driver.get_pool_stats(&device, &pool)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                for (name, value) in &stats {
                    println!("{:<20} {}", name, value);
                }
            }
        }
        Commands::Device {
            action,
            device,
            config,
        } => {
            let settings = load_settings(config.as_deref()).await?;
            let device = settings.device(&device)?.clone();
            let driver = build_driver(settings);

            match action {
                DeviceAction::Create => {
                    let management = driver.create_device(&device)?;
                    println!("{}", serde_json::to_string_pretty(&management)?);
                }
                DeviceAction::Delete => {
                    driver.delete_device(&device)?;
                    info!("Device {} deleted", device.name);
                }
            }
        }
        Commands::Info => {
            let settings = Settings::default();
            let driver = build_driver(settings);
            println!("{} {}", driver.driver_type(), driver.version());
        }
        Commands::Check {
            config,
            strict,
            json,
            verbose,
        } => {
            info!("Running static settings check");
            check::run_and_print(config, strict, json, verbose).await?;
        }
        Commands::Doctor {
            config,
            json,
            brief,
            verbose,
        } => {
            info!("Running hacfg doctor diagnostics");
            doctor::run_and_print(config, json, verbose && !brief).await?;
        }
    }

    Ok(())
}

fn build_driver(settings: Settings) -> HaproxyDriver {
    let provisioner = HookProvisioner::from_settings(&settings.instance);
    let driver = HaproxyDriver::new(settings.clone(), Box::new(SshConnector::new(settings)));
    match provisioner {
        Some(provisioner) => driver.with_provisioner(Box::new(provisioner)),
        None => driver,
    }
}

/// Settings for commands that talk to a device; a missing file is an error.
async fn load_settings(cli_path: Option<&Path>) -> Result<Settings> {
    let path = Settings::resolve_config_path(cli_path)?;
    if !path.exists() {
        bail!(
            "Settings file not found: {}\n\nCreate one like:\n{}",
            path.display(),
            Settings::default_template()
        );
    }
    Settings::load_from_file(&path).await
}
