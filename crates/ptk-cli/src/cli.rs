//! CLI command definitions and argument parsing

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ptk_installer::{ChannelLogSink, Installer, InstallerConfig, InstallerError, LogLine};
use tokio::sync::mpsc;

use crate::output::{CommandOutput, EyelidOutput, OperationOutput, OutputFormat, OutputFormatter, StatusOutput};
use crate::ExitCode;

/// PSVR2 Toolkit Installer - swaps the PlayStation VR2 SteamVR driver
#[derive(Parser, Debug)]
#[command(name = "psvr2-toolkit-installer")]
#[command(version, about = "Install, update, and remove the PSVR2 Toolkit SteamVR driver")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Steam installation directory, bypassing detection
    #[arg(long, env = "PSVR2_TOOLKIT_STEAM_ROOT", global = true)]
    pub steam_root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show the driver status and the eyelid estimation flag
    Status,
    /// Install the latest Toolkit driver, backing up the vendor driver
    Install,
    /// Restore the vendor driver
    Uninstall,
    /// Download the latest Toolkit driver over the installed one
    Update,
    /// Check the Toolkit and installer for updates
    Check,
    /// Manage eyelid estimation in SteamVR settings
    Eyelid {
        #[command(subcommand)]
        action: EyelidAction,
    },
}

/// Eyelid estimation actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyelidAction {
    /// Enable eyelid estimation
    On,
    /// Disable eyelid estimation
    Off,
    /// Show whether eyelid estimation is enabled
    Status,
}

impl Commands {
    /// Command name used in JSON output
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Status => "status",
            Commands::Install => "install",
            Commands::Uninstall => "uninstall",
            Commands::Update => "update",
            Commands::Check => "check",
            Commands::Eyelid { action: EyelidAction::On } => "eyelid on",
            Commands::Eyelid { action: EyelidAction::Off } => "eyelid off",
            Commands::Eyelid { action: EyelidAction::Status } => "eyelid status",
        }
    }
}

impl Cli {
    /// Execute the CLI command with a pre-loaded configuration.
    ///
    /// `--steam-root` overrides the configured Steam root.
    pub async fn execute_with_config(self, mut config: InstallerConfig) -> anyhow::Result<ExitCode> {
        if let Some(root) = &self.steam_root {
            config.steam.root = Some(root.clone());
        }

        let formatter = OutputFormatter::new(self.output, self.verbose);
        let command_name = self.command.name();

        let (sink, rx) = ChannelLogSink::channel();
        let printer = tokio::spawn(collect_log(rx, formatter));

        let outcome = run_command(self.command, config, Arc::new(sink), &formatter).await;
        // The engine owned the last sender, so the printer has drained.
        let log = printer.await?;

        match outcome {
            Ok(output) => {
                println!("{}", formatter.format_output(&output, command_name, log));
                Ok(ExitCode::Success)
            }
            Err(e) => {
                let code = ExitCode::from_error(&e);
                tracing::debug!(error = ?e, code = code.name(), "Command failed");
                if let Some(text) = formatter.format_error(&e.to_string(), code, command_name, log) {
                    match formatter.format() {
                        OutputFormat::Table => eprintln!("{text}"),
                        OutputFormat::Json => println!("{text}"),
                    }
                }
                Ok(code)
            }
        }
    }
}

/// Print log lines live and keep them for the final document.
async fn collect_log(mut rx: mpsc::UnboundedReceiver<LogLine>, formatter: OutputFormatter) -> Vec<LogLine> {
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        formatter.log_line(&line);
        lines.push(line);
    }
    lines
}

async fn run_command(
    command: Commands,
    config: InstallerConfig,
    sink: Arc<ChannelLogSink>,
    formatter: &OutputFormatter,
) -> Result<CommandOutput, InstallerError> {
    formatter.progress("Locating the PlayStation VR2 App...");
    let installer = Installer::from_config(config, sink).await?;
    formatter.progress(&format!(
        "Driver directory: {}",
        installer.context().driver_dir.display()
    ));

    let operation = |name: &str, driver_status| {
        CommandOutput::Operation(OperationOutput {
            operation: name.to_string(),
            driver_status,
        })
    };

    match command {
        Commands::Status => {
            let snapshot = installer.snapshot().await?;
            let eyelid = match installer.eyelid_estimation_enabled().await {
                Ok(enabled) => Some(enabled),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read SteamVR settings");
                    None
                }
            };
            Ok(CommandOutput::Status(StatusOutput::new(
                installer.context(),
                snapshot,
                eyelid,
            )))
        }
        Commands::Install => Ok(operation("install", installer.install().await?)),
        Commands::Uninstall => Ok(operation("uninstall", installer.uninstall().await?)),
        Commands::Update => Ok(operation("update", installer.reinstall().await?)),
        Commands::Check => Ok(CommandOutput::Updates(installer.check_for_updates().await?)),
        Commands::Eyelid { action } => {
            let output = match action {
                EyelidAction::Status => EyelidOutput {
                    enabled: installer.eyelid_estimation_enabled().await?,
                    changed: None,
                },
                EyelidAction::On | EyelidAction::Off => {
                    let enabled = action == EyelidAction::On;
                    let changed = installer.set_eyelid_estimation(enabled).await?;
                    EyelidOutput {
                        enabled,
                        changed: Some(changed),
                    }
                }
            };
            Ok(CommandOutput::Eyelid(output))
        }
    }
}
