//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use hidx_core::{BackfillStats, DedupStats, IngestStats, ReconcileStats, Summary};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `data` parameter must be a serializable struct that includes
    /// `success: bool` and `result_code: u8` fields.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error with its context chain.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `ingest` command.
#[derive(Debug, Serialize)]
pub struct IngestOutput {
    pub success: bool,
    pub result_code: u8,
    pub directory: String,
    pub dry_run: bool,
    #[serde(flatten)]
    pub stats: IngestStats,
}

/// Output for `check` command.
#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub success: bool,
    pub result_code: u8,
    pub directory: String,
    #[serde(flatten)]
    pub stats: ReconcileStats,
}

/// Output for `dedup` command.
#[derive(Debug, Serialize)]
pub struct DedupOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    #[serde(flatten)]
    pub stats: DedupStats,
}

/// Output for `backfill` command.
#[derive(Debug, Serialize)]
pub struct BackfillOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub stats: BackfillStats,
}

/// Output for `summary` command.
#[derive(Debug, Serialize)]
pub struct SummaryOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub summary: Summary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_output_flattens() {
        let data = SummaryOutput {
            success: true,
            result_code: 0,
            summary: Summary {
                total: 5,
                with_digest: 5,
                duplicate_path_groups: 0,
                duplicate_digest_groups: 1,
            },
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["total"], 5);
        assert_eq!(value["duplicate_digest_groups"], 1);
        assert_eq!(value["success"], true);
    }

    #[test]
    fn test_dedup_output_fields() {
        let data = DedupOutput {
            success: true,
            result_code: 0,
            dry_run: true,
            stats: DedupStats {
                candidate_groups: 2,
                records_deleted: 0,
                digest_failures: 0,
            },
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["candidate_groups"], 2);
        assert_eq!(value["records_deleted"], 0);
    }
}
