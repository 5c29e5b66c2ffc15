//! CLI argument parsing module
//!
//! Uses clap derive macros to declaratively define commands and arguments.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// hacfg - HAProxy configuration reconciliation
#[derive(Parser, Debug)]
#[command(
    name = "hacfg",
    about = "HAProxy configuration reconciliation engine",
    long_about = r#"
hacfg keeps the HAProxy configuration of load-balancer appliances in line
with pools, members, health monitors and VIPs.

Core operations (recommended flow: check -> doctor -> apply):
  hacfg check      # Validate the settings file
  hacfg doctor     # Check that configured devices are reachable
  hacfg apply      # Push one inventory object to a device

Offline tools:
  hacfg generate   # Build a full haproxy.cfg from an inventory
  hacfg render     # Parse a haproxy.cfg and print it in canonical form

Read-back:
  hacfg stats      # Pool or member statistics from a device

Appliances:
  hacfg device     # Boot or remove an appliance through the instance hooks
  hacfg info       # Driver type and version
"#,
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Append JSON logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE", help = "Write logs to FILE")]
    pub log_file: Option<PathBuf>,
}

/// Driver operation run by `apply`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    CreateVip,
    UpdateVip,
    DeleteVip,
    CreatePool,
    UpdatePool,
    DeletePool,
    CreateMember,
    UpdateMember,
    DeleteMember,
    CreateHealthMonitor,
    DeleteHealthMonitor,
}

impl ApplyAction {
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            ApplyAction::UpdateVip | ApplyAction::UpdatePool | ApplyAction::UpdateMember
        )
    }
}

/// Appliance lifecycle operation run by `device`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Create,
    Delete,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a complete configuration from an inventory
    #[command(name = "generate", about = "Generate haproxy.cfg for a configuration handle")]
    Generate {
        /// Inventory file with pools, members, monitors and VIPs
        #[arg(short, long, value_name = "FILE")]
        inventory: PathBuf,

        /// Configuration handle whose VIPs are rendered
        #[arg(long, value_name = "ID")]
        handle: String,

        #[arg(long, default_value = "")]
        slug: String,

        /// Version echoed back with the generated configuration
        #[arg(long = "config-version", value_name = "VERSION", default_value = "")]
        config_version: String,

        /// Write the configuration here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print the result with its metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a local haproxy.cfg and print it in canonical form
    #[command(name = "render", about = "Normalize a local haproxy.cfg")]
    Render {
        /// haproxy.cfg to normalize
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Settings file path (for the stats socket path)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Apply one inventory object to a device
    #[command(
        name = "apply",
        about = "Run a driver operation against a device (core, step 3 after check -> doctor)"
    )]
    Apply {
        /// Operation to run
        #[arg(value_enum)]
        action: ApplyAction,

        /// Id or name of the VIP, pool, member, or monitored pool
        #[arg(value_name = "OBJECT")]
        object: String,

        /// Device name from the settings file
        #[arg(short, long)]
        device: String,

        /// Inventory holding the object
        #[arg(short, long, value_name = "FILE")]
        inventory: PathBuf,

        /// Inventory holding the previous state (update actions)
        #[arg(long, value_name = "FILE")]
        previous: Option<PathBuf>,

        /// Settings file path
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Read pool or member statistics from a device
    #[command(name = "stats", about = "Show pool or member statistics")]
    Stats {
        /// Device name from the settings file
        #[arg(short, long)]
        device: String,

        /// Pool id
        #[arg(long)]
        pool: String,

        /// Member id (member statistics instead of pool statistics)
        #[arg(long)]
        member: Option<String>,

        /// Settings file path
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print statistics in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Boot or remove a HAProxy appliance
    #[command(name = "device", about = "Create or delete an appliance instance")]
    Device {
        #[arg(value_enum)]
        action: DeviceAction,

        /// Device name from the settings file
        #[arg(short, long)]
        device: String,

        /// Settings file path
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print driver type and version
    #[command(name = "info", about = "Show driver type and version")]
    Info,

    /// Validate the settings file
    #[command(
        name = "check",
        about = "Validate the settings file (core, step 1: check -> doctor -> apply)"
    )]
    Check {
        /// Settings file path to validate
        #[arg(
            short,
            long,
            value_name = "FILE",
            help = "Settings file path to validate"
        )]
        config: Option<PathBuf>,

        /// Treat warnings as errors (non-zero exit)
        #[arg(long, help = "[advanced] Return non-zero when warnings are present")]
        strict: bool,

        /// Print check report in JSON format
        #[arg(long, help = "Print check report in JSON format")]
        json: bool,

        /// Print detailed check output
        #[arg(long, help = "Print detailed check output")]
        verbose: bool,
    },

    /// Check device management reachability
    #[command(
        name = "doctor",
        about = "Check device reachability (core, step 2 between check -> apply)"
    )]
    Doctor {
        /// Settings file path used for diagnostics
        #[arg(
            short,
            long,
            value_name = "FILE",
            help = "Settings file path for diagnostics"
        )]
        config: Option<PathBuf>,

        /// Print diagnostics in JSON format
        #[arg(long, help = "Print diagnostics in JSON format")]
        json: bool,

        /// Print compact diagnostics output
        #[arg(long, help = "[advanced] Force compact diagnostics output (default)")]
        brief: bool,

        /// Print detailed diagnostics output
        #[arg(long, help = "Print detailed diagnostics output")]
        verbose: bool,
    },
}

impl Commands {
    /// Settings file passed to the command, if any
    pub fn settings_path(&self) -> Option<&std::path::Path> {
        match self {
            Commands::Generate { .. } | Commands::Info => None,
            Commands::Render { config, .. }
            | Commands::Apply { config, .. }
            | Commands::Stats { config, .. }
            | Commands::Device { config, .. }
            | Commands::Check { config, .. }
            | Commands::Doctor { config, .. } => config.as_deref(),
        }
    }
}

impl Cli {
    /// Parse CLI arguments and create Cli struct
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn check_accepts_strict_json_and_verbose_flags() {
        let cli = Cli::try_parse_from(["hacfg", "check", "--strict", "--json", "--verbose"])
            .expect("check command should parse");

        match cli.command {
            Commands::Check {
                strict,
                json,
                verbose,
                ..
            } => {
                assert!(strict);
                assert!(json);
                assert!(verbose);
            }
            _ => panic!("expected check command"),
        }
    }

    #[test]
    fn apply_parses_action_and_object() {
        let cli = Cli::try_parse_from([
            "hacfg",
            "apply",
            "update-member",
            "s1",
            "--device",
            "lb1",
            "--inventory",
            "inv.yaml",
            "--previous",
            "old.yaml",
            "--log-file",
            "/tmp/hacfg.log",
        ])
        .expect("apply command should parse");

        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/hacfg.log")));
        match cli.command {
            Commands::Apply {
                action,
                object,
                device,
                previous,
                ..
            } => {
                assert_eq!(action, ApplyAction::UpdateMember);
                assert!(action.is_update());
                assert_eq!(object, "s1");
                assert_eq!(device, "lb1");
                assert_eq!(previous, Some(PathBuf::from("old.yaml")));
            }
            _ => panic!("expected apply command"),
        }
    }

    #[test]
    fn generate_requires_handle() {
        assert!(Cli::try_parse_from(["hacfg", "generate", "-i", "inv.yaml"]).is_err());

        let cli = Cli::try_parse_from(["hacfg", "generate", "-i", "inv.yaml", "--handle", "h1"])
            .expect("generate command should parse");
        assert!(cli.command.settings_path().is_none());
    }

    #[test]
    fn device_parses_action() {
        let cli = Cli::try_parse_from(["hacfg", "device", "delete", "-d", "lb1"])
            .expect("device command should parse");

        match cli.command {
            Commands::Device { action, device, .. } => {
                assert_eq!(action, DeviceAction::Delete);
                assert_eq!(device, "lb1");
            }
            _ => panic!("expected device command"),
        }
        assert!(Cli::try_parse_from(["hacfg", "device", "reboot", "-d", "lb1"]).is_err());
    }

    #[test]
    fn doctor_accepts_brief_and_verbose_flags() {
        let cli = Cli::try_parse_from(["hacfg", "doctor", "--brief", "--verbose", "-c", "s.yaml"])
            .expect("doctor command should parse");

        assert_eq!(
            cli.command.settings_path(),
            Some(std::path::Path::new("s.yaml"))
        );
        match cli.command {
            Commands::Doctor { brief, verbose, .. } => {
                assert!(brief);
                assert!(verbose);
            }
            _ => panic!("expected doctor command"),
        }
    }
}
