//! Simple Output and Reporting
//!
//! This module renders validation results and live updates for operators.

use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::monitor::LiveUpdate;
use crate::validator::{Severity, ValidationError, ValidationResult};

/// Rendering style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One line per finding
    #[default]
    Human,
    /// The result serialized as JSON
    Json,
    /// Counts only
    Summary,
}

/// How much of a result to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VerbosityLevel {
    /// Only error findings
    Quiet,
    /// Errors and warnings
    #[default]
    Normal,
    /// Findings with their kind, plus counts
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Simple output formatter for validation results
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            format: OutputFormat::Human,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(VerbosityLevel::from_flags(config.verbose, config.quiet)).with_format(config.format)
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_result(&self, result: &ValidationResult) -> String {
        match self.format {
            OutputFormat::Human => self.format_human(result),
            OutputFormat::Json => to_json(result),
            OutputFormat::Summary => self.format_summary(result),
        }
    }

    pub fn format_update(&self, update: &LiveUpdate) -> String {
        match self.format {
            OutputFormat::Json => to_json(update),
            OutputFormat::Human | OutputFormat::Summary => {
                format!("[{}] {}", update.iso_timestamp(), self.format_result(&update.result))
            }
        }
    }

    fn format_human(&self, result: &ValidationResult) -> String {
        let mut output = String::new();

        if result.is_valid() {
            if self.verbosity == VerbosityLevel::Quiet {
                return output;
            }
            output.push_str(&self.colorize("Validation passed - no errors detected.", "32"));
        } else {
            output.push_str(&self.colorize("Validation failed - detected errors:", "31"));
        }

        for error in result.errors() {
            if self.verbosity == VerbosityLevel::Quiet && !error.is_error() {
                continue;
            }
            output.push('\n');
            output.push_str(&self.format_finding(error));
        }

        if self.verbosity == VerbosityLevel::Verbose {
            output.push('\n');
            output.push_str(&counts_line(result));
        }

        output
    }

    pub fn format_finding(&self, error: &ValidationError) -> String {
        let severity = match error.severity {
            Severity::Error => self.colorize("error", "31"),
            Severity::Warning => self.colorize("warning", "33"),
        };
        let mut line = format!("  - [{}] {}", severity, error.message);
        if let Some(location) = &error.location {
            line.push_str(&format!(" ({})", location));
        }
        if self.verbosity == VerbosityLevel::Verbose {
            line.push_str(&format!(" {{{}}}", kind_name(error)));
        }
        line
    }

    fn format_summary(&self, result: &ValidationResult) -> String {
        let status = if result.is_valid() {
            self.colorize("VALID", "32")
        } else {
            self.colorize("INVALID", "31")
        };
        format!("{} {}", status, counts_line(result))
    }
}

fn counts_line(result: &ValidationResult) -> String {
    format!(
        "Errors: {} Warnings: {}",
        result.error_count(),
        result.warning_count()
    )
}

fn kind_name(error: &ValidationError) -> String {
    serde_json::to_value(error.kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|err| format!("{{\"error\": \"{}\"}}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ErrorKind;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn plain(verbosity: VerbosityLevel) -> Output {
        Output::new(verbosity).with_colors(false)
    }

    fn mixed_result() -> ValidationResult {
        ValidationResult::from_errors([
            ValidationError::error(
                ErrorKind::Structural,
                "Missing <FilerInformation> block.",
                Some("/SAR".to_string()),
            ),
            ValidationError::warning(
                ErrorKind::Format,
                "Transaction date 2030-01-01 occurs in the future relative to today (2024-06-01).",
                Some("/SAR/Transactions/Transaction/Date".to_string()),
            ),
        ])
    }

    #[test]
    fn test_passed_message() {
        let formatted = plain(VerbosityLevel::Normal).format_result(&ValidationResult::valid());
        assert_eq!(formatted, "Validation passed - no errors detected.");
    }

    #[test]
    fn test_failed_message_lists_findings() {
        let formatted = plain(VerbosityLevel::Normal).format_result(&mixed_result());
        let lines: Vec<&str> = formatted.lines().collect();
        assert_eq!(lines[0], "Validation failed - detected errors:");
        assert_eq!(
            lines[1],
            "  - [error] Missing <FilerInformation> block. (/SAR)"
        );
        assert!(lines[2].starts_with("  - [warning] Transaction date 2030-01-01"));
    }

    #[test]
    fn test_quiet_hides_warnings_and_passes() {
        let quiet = plain(VerbosityLevel::Quiet);
        assert_eq!(quiet.format_result(&mixed_result()).lines().count(), 2);
        assert!(quiet.format_result(&ValidationResult::valid()).is_empty());
    }

    #[test]
    fn test_verbose_adds_kind_and_counts() {
        let formatted = plain(VerbosityLevel::Verbose).format_result(&mixed_result());
        assert!(formatted.contains("{structural}"));
        assert!(formatted.ends_with("Errors: 1 Warnings: 1"));
    }

    #[test]
    fn test_summary_and_json_formats() {
        let summary = plain(VerbosityLevel::Normal).with_format(OutputFormat::Summary);
        assert_eq!(
            summary.format_result(&mixed_result()),
            "INVALID Errors: 1 Warnings: 1"
        );

        let json = plain(VerbosityLevel::Normal).with_format(OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&json.format_result(&mixed_result())).unwrap();
        assert_eq!(value["errors"][0]["kind"], "structural");
    }

    #[test]
    fn test_update_is_prefixed_with_timestamp() {
        let update = LiveUpdate {
            source: PathBuf::from("sar.xml"),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            result: ValidationResult::valid(),
        };
        assert_eq!(
            plain(VerbosityLevel::Normal).format_update(&update),
            "[2024-05-01T08:00:00Z] Validation passed - no errors detected."
        );
    }

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(VerbosityLevel::from_flags(false, false), VerbosityLevel::Normal);
        assert_eq!(VerbosityLevel::from_flags(true, false), VerbosityLevel::Verbose);
        assert_eq!(VerbosityLevel::from_flags(true, true), VerbosityLevel::Quiet);
    }

    #[test]
    fn test_from_config() {
        let config = OutputConfig {
            format: OutputFormat::Summary,
            verbose: false,
            quiet: false,
        };
        let output = Output::from_config(&config).with_colors(false);
        assert_eq!(
            output.format_result(&ValidationResult::valid()),
            "VALID Errors: 0 Warnings: 0"
        );
    }
}
