//! Output formatting for CLI results
//!
//! Two output formats are supported:
//! - Table: operation log lines as they arrive, results as tables (default)
//! - JSON: one document per command, with the operation log embedded

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use ptk_installer::{
    ArtifactUpdate, DriverSnapshot, DriverStatus, InstallerContext, LogLine, Tone, UpdateReport,
};
use serde::Serialize;

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Table,
    /// JSON for scripting
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// JSON response wrapper shared by every command
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code_name: Option<&'static str>,
    /// Operation log in emission order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LogLine>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    pub command: String,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success(data: T, command: &str, log: Vec<LogLine>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            exit_code: None,
            exit_code_name: None,
            log,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

impl JsonResponse<()> {
    pub fn error(message: &str, code: ExitCode, command: &str, log: Vec<LogLine>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
            exit_code: Some(code.into()),
            exit_code_name: Some(code.name()),
            log,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

/// `status` result
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub driver_status: DriverStatus,
    pub game_dir: String,
    pub current_driver: String,
    pub current_exists: bool,
    pub original_driver: String,
    pub original_exists: bool,
    pub settings_path: String,
    /// `None` when the settings file could not be read
    pub eyelid_estimation: Option<bool>,
}

impl StatusOutput {
    pub fn new(context: &InstallerContext, snapshot: DriverSnapshot, eyelid: Option<bool>) -> Self {
        Self {
            driver_status: snapshot.status,
            game_dir: context.game_dir.display().to_string(),
            current_driver: context.current_driver.display().to_string(),
            current_exists: snapshot.current_exists,
            original_driver: context.original_driver.display().to_string(),
            original_exists: snapshot.original_exists,
            settings_path: context.settings_path.display().to_string(),
            eyelid_estimation: eyelid,
        }
    }
}

/// `install`, `uninstall` and `update` result
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutput {
    pub operation: String,
    pub driver_status: DriverStatus,
}

/// `eyelid` result
#[derive(Debug, Clone, Serialize)]
pub struct EyelidOutput {
    pub enabled: bool,
    /// Whether the settings file was rewritten; absent for `eyelid status`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

/// Successful result of any command.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Status(StatusOutput),
    Operation(OperationOutput),
    Updates(UpdateReport),
    Eyelid(EyelidOutput),
}

/// Formats output for the selected mode
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a command result.
    pub fn format_output(&self, output: &CommandOutput, command: &str, log: Vec<LogLine>) -> String {
        match self.format {
            OutputFormat::Table => match output {
                CommandOutput::Status(status) => self.status_table(status),
                CommandOutput::Operation(op) => format!("Driver status: {}", op.driver_status),
                CommandOutput::Updates(report) => self.updates_table(report),
                CommandOutput::Eyelid(eyelid) => format!(
                    "Eyelid estimation: {}",
                    if eyelid.enabled { "enabled" } else { "disabled" }
                ),
            },
            OutputFormat::Json => self.to_json(&JsonResponse::success(output, command, log)),
        }
    }

    /// Render a failure. Table mode prints nothing when the operation log
    /// already reported it.
    pub fn format_error(
        &self,
        message: &str,
        code: ExitCode,
        command: &str,
        log: Vec<LogLine>,
    ) -> Option<String> {
        match self.format {
            OutputFormat::Table => {
                // The operation log already ended with the failure.
                if log
                    .last()
                    .is_some_and(|line| matches!(line.tone, Tone::Negative | Tone::Warning))
                {
                    None
                } else if code == ExitCode::Success {
                    Some(format!("⚠ {message}"))
                } else {
                    Some(format!("✗ Error: {message}"))
                }
            }
            OutputFormat::Json => Some(self.to_json(&JsonResponse::error(message, code, command, log))),
        }
    }

    /// Print one operation log line as it arrives (table mode only)
    pub fn log_line(&self, line: &LogLine) {
        if self.format != OutputFormat::Table {
            return;
        }
        match line.tone {
            Tone::Accent | Tone::Info => println!("{}", line.message),
            Tone::Positive => println!("✓ {}", line.message),
            Tone::Emphasis => println!("» {}", line.message),
            Tone::Warning => eprintln!("⚠ {}", line.message),
            Tone::Negative => eprintln!("✗ {}", line.message),
        }
    }

    /// Progress message (verbose table mode only)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn status_table(&self, status: &StatusOutput) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Property", "Value"]);
        table.add_row(vec!["Driver Status", &status.driver_status.to_string()]);
        table.add_row(vec![
            "Eyelid Estimation",
            match status.eyelid_estimation {
                Some(true) => "enabled",
                Some(false) => "disabled",
                None => "unknown",
            },
        ]);
        table.add_row(vec!["Game Directory", &status.game_dir]);
        table.add_row(vec![
            "Installed Driver",
            &presence(&status.current_driver, status.current_exists),
        ]);
        table.add_row(vec![
            "Original Driver",
            &presence(&status.original_driver, status.original_exists),
        ]);
        if self.verbose {
            table.add_row(vec!["SteamVR Settings", &status.settings_path]);
        }
        table.to_string()
    }

    fn updates_table(&self, report: &UpdateReport) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Artifact", "Latest", "Status", "Release"]);
        for artifact in [&report.toolkit, &report.installer] {
            table.add_row(vec![
                artifact.name.as_str(),
                artifact.tag.as_str(),
                update_verdict(artifact),
                artifact.html_url.as_str(),
            ]);
        }

        let mut out = table.to_string();
        if self.verbose {
            for artifact in [&report.toolkit, &report.installer] {
                if let Some(changelog) = artifact.changelog.as_deref().filter(|c| !c.trim().is_empty()) {
                    out.push_str(&format!("\n\n{} {}\n{}", artifact.name, artifact.tag, changelog.trim()));
                }
            }
        }
        out
    }
}

fn presence(path: &str, exists: bool) -> String {
    if exists {
        path.to_string()
    } else {
        format!("{path} (missing)")
    }
}

fn update_verdict(artifact: &ArtifactUpdate) -> &'static str {
    match artifact.has_update {
        Some(true) => "Update available",
        Some(false) => "Up to date",
        None => "Unknown",
    }
}
