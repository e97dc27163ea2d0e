//! Corral CLI - manage plugins for the Corral container runtime.
//!
//! Plugins ship as SIF images. The CLI installs them under the configured
//! libexec directory, keeps the on-disk registry consistent, and packages
//! compiled objects into new plugin images.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod theme;

use commands::{config, plugin};

/// Corral - plugin manager for the Corral container runtime
#[derive(Parser)]
#[command(name = "corral")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory plugins are installed under (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    libexec_dir: Option<PathBuf>,

    /// Directory holding the user config.toml
    #[arg(long, global = true, value_name = "DIR")]
    config_home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage installed plugins
    Plugin {
        #[command(subcommand)]
        command: PluginCommands,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum PluginCommands {
    /// Install a plugin from a SIF image
    Install {
        /// Path to the plugin image
        image: PathBuf,
    },

    /// List installed plugins
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Enable an installed plugin
    Enable {
        /// Plugin name
        name: String,
    },

    /// Disable an installed plugin
    Disable {
        /// Plugin name
        name: String,
    },

    /// Remove an installed plugin and its files
    #[command(alias = "remove")]
    Uninstall {
        /// Plugin name
        name: String,
    },

    /// Show details of a plugin image file or an installed plugin
    Inspect {
        /// Image path or installed plugin name
        target: String,
    },

    /// Check the registry for inconsistencies
    Verify {
        /// Resolve what can be resolved safely
        #[arg(long)]
        repair: bool,
    },

    /// Package a compiled object and manifest into a plugin image
    Create {
        /// Compiled object (shared library)
        #[arg(long)]
        object: PathBuf,

        /// Manifest JSON file
        #[arg(long)]
        manifest: PathBuf,

        /// Output image path
        output: PathBuf,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = corral_config::Config::load(cli.config_home.as_deref());

    // Set up logging from config, with --verbose override.
    let log_config = if let Ok(r) = &resolved {
        let mut lc = config_bridge::to_log_config(&r.config);
        if cli.verbose {
            "debug".clone_into(&mut lc.level);
        }
        lc
    } else {
        // Fallback if config loading fails.
        let level = if cli.verbose { "debug" } else { "warn" };
        corral_telemetry::LogConfig::new(level).with_format(corral_telemetry::LogFormat::Compact)
    };
    if let Err(e) = corral_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let resolved = resolved.context("failed to load configuration")?;
    let libexec = config_bridge::libexec_dir(&resolved.config, cli.libexec_dir)?;
    tracing::debug!(libexec = %libexec.display(), "resolved libexec directory");

    match cli.command {
        Commands::Plugin { command } => handle_plugin(command, &libexec),
        Commands::Config { command } => match command {
            ConfigCommands::Show => config::show_config(&resolved),
        },
    }
}

fn handle_plugin(command: PluginCommands, libexec: &std::path::Path) -> Result<()> {
    match command {
        PluginCommands::Install { image } => plugin::install_plugin(libexec, &image),
        PluginCommands::List { json } => plugin::list_plugins(libexec, json),
        PluginCommands::Enable { name } => plugin::set_plugin_enabled(libexec, &name, true),
        PluginCommands::Disable { name } => plugin::set_plugin_enabled(libexec, &name, false),
        PluginCommands::Uninstall { name } => plugin::uninstall_plugin(libexec, &name),
        PluginCommands::Inspect { target } => plugin::inspect_plugin(libexec, &target),
        PluginCommands::Verify { repair } => plugin::verify_plugins(libexec, repair),
        PluginCommands::Create {
            object,
            manifest,
            output,
            force,
        } => plugin::create_plugin(&object, &manifest, &output, force),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_with_globals() {
        let cli = Cli::try_parse_from([
            "corral",
            "plugin",
            "install",
            "log.sif",
            "--libexec-dir",
            "/opt/corral",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.libexec_dir, Some(PathBuf::from("/opt/corral")));
        assert!(matches!(
            cli.command,
            Commands::Plugin {
                command: PluginCommands::Install { image }
            } if image == PathBuf::from("log.sif")
        ));
    }

    #[test]
    fn test_remove_is_an_alias_for_uninstall() {
        let cli = Cli::try_parse_from(["corral", "plugin", "remove", "hello"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Plugin {
                command: PluginCommands::Uninstall { name }
            } if name == "hello"
        ));
    }

    #[test]
    fn test_verify_repair_flag() {
        let cli = Cli::try_parse_from(["corral", "plugin", "verify", "--repair"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Plugin {
                command: PluginCommands::Verify { repair: true }
            }
        ));
    }

    #[test]
    fn test_create_requires_object_and_manifest() {
        assert!(Cli::try_parse_from(["corral", "plugin", "create", "out.sif"]).is_err());
        let cli = Cli::try_parse_from([
            "corral",
            "plugin",
            "create",
            "--object",
            "p.so",
            "--manifest",
            "m.json",
            "out.sif",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Plugin {
                command: PluginCommands::Create { force: false, .. }
            }
        ));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["corral"]).is_err());
        assert!(Cli::try_parse_from(["corral", "plugin"]).is_err());
    }
}
