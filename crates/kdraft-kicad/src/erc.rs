//! Typed view of the kicad-cli ERC JSON report.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// KiCad ERC report structure matching the JSON schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErcReport {
    pub coordinate_units: String,
    pub date: String,
    pub kicad_version: String,
    pub source: String,
    #[serde(default)]
    pub sheets: Vec<ErcSheet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErcSheet {
    pub path: String,
    pub uuid_path: String,
    pub violations: Vec<ErcViolation>,
}

/// A single ERC violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErcViolation {
    #[serde(rename = "type")]
    pub violation_type: String,
    pub severity: String,
    pub description: String,
    pub items: Vec<ErcItem>,
    /// Whether this violation has been excluded by the user in KiCad.
    #[serde(default)]
    pub excluded: bool,
    /// Optional user comment (present in some KiCad versions).
    #[serde(default)]
    pub comment: Option<String>,
}

/// An item involved in an ERC violation (symbol pin, net label, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErcItem {
    pub description: String,
    #[serde(default)]
    pub pos: Option<ErcPosition>,
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErcPosition {
    pub x: f64,
    pub y: f64,
}

impl ErcReport {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse ERC JSON report")
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).context("Failed to read ERC report file")?;
        Self::from_json(&contents)
    }

    fn count(&self, severity: &str) -> usize {
        self.sheets
            .iter()
            .flat_map(|s| &s.violations)
            .filter(|v| !v.excluded && v.severity == severity)
            .count()
    }

    /// Non-excluded error violations across all sheets.
    pub fn error_count(&self) -> usize {
        self.count("error")
    }

    /// Non-excluded warning violations across all sheets.
    pub fn warning_count(&self) -> usize {
        self.count("warning")
    }

    /// One line per violation, suitable for logs and summaries.
    pub fn summarize(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for sheet in &self.sheets {
            for violation in &sheet.violations {
                if violation.excluded {
                    continue;
                }
                lines.push(format!(
                    "[{}] {} ({}): {}",
                    violation.severity, violation.violation_type, sheet.path, violation.description
                ));
            }
        }
        lines
    }
}
