//! kicad-cli integration.
//!
//! Everything here shells out to the KiCad command line tool and is strictly
//! downstream of a persisted schematic: ERC, netlist export and PDF export
//! read the file on disk and never modify it. A failed invocation is reported
//! to the caller; it does not undo a schematic edit that already succeeded.

pub mod erc;

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::NamedTempFile;

#[cfg(target_os = "macos")]
mod paths {
    pub(crate) fn kicad_cli() -> String {
        std::env::var("KICAD_CLI")
            .unwrap_or_else(|_| {
                "/Applications/KiCad/KiCad.app/Contents/MacOS/kicad-cli".to_string()
            })
            .replace(
                "~",
                dirs::home_dir()
                    .unwrap_or_default()
                    .to_str()
                    .unwrap_or_default(),
            )
    }
}

#[cfg(target_os = "windows")]
mod paths {
    pub(crate) fn kicad_cli() -> String {
        std::env::var("KICAD_CLI")
            .unwrap_or_else(|_| r"C:\Program Files\KiCad\9.0\bin\kicad-cli.exe".to_string())
    }
}

#[cfg(all(not(target_os = "macos"), not(target_os = "windows")))]
mod paths {
    pub(crate) fn kicad_cli() -> String {
        std::env::var("KICAD_CLI").unwrap_or_else(|_| "/usr/bin/kicad-cli".to_string())
    }
}

/// Check that kicad-cli exists and runs, with a helpful error if not.
pub fn check_kicad_installed() -> Result<()> {
    let kicad_path = paths::kicad_cli();

    if !Path::new(&kicad_path).exists() {
        return Err(anyhow!(
            "kicad-cli not found at {kicad_path}. Install KiCad \
             (https://www.kicad.org/) or point the KICAD_CLI environment \
             variable at the binary."
        ));
    }

    match Command::new(&kicad_path).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(anyhow!(
            "kicad-cli at {kicad_path} exists but exited with an error; \
             check the KiCad installation"
        )),
        Err(e) => Err(anyhow!(
            "could not run kicad-cli at {kicad_path}: {e}. \
             Set KICAD_CLI if the binary lives elsewhere."
        )),
    }
}

/// Builder for kicad-cli invocations.
#[derive(Debug, Default)]
pub struct KiCadCliBuilder {
    args: Vec<String>,
    current_dir: Option<String>,
}

impl KiCadCliBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command group (e.g. "sch").
    pub fn command(mut self, cmd: &str) -> Self {
        self.args.push(cmd.to_string());
        self
    }

    /// Add a subcommand (e.g. "erc", "export").
    pub fn subcommand(mut self, subcmd: &str) -> Self {
        self.args.push(subcmd.to_string());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<String>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Execute, surfacing stderr in the error on failure.
    pub fn run(self) -> Result<()> {
        check_kicad_installed()?;

        let mut cmd = Command::new(paths::kicad_cli());
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        log::debug!("kicad-cli {}", self.args.join(" "));
        let output = cmd.output().context("Failed to execute kicad-cli")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "kicad-cli {} failed: {}",
                self.args.first().map(String::as_str).unwrap_or(""),
                stderr.trim()
            );
        }
        Ok(())
    }
}

fn require_schematic(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Schematic file not found: {}", path.display());
    }
    Ok(())
}

/// Run KiCad ERC on a schematic and return the parsed JSON report.
pub fn run_erc_report(
    schematic_path: impl AsRef<Path>,
    working_dir: Option<&Path>,
) -> Result<erc::ErcReport> {
    check_kicad_installed()?;

    let schematic_path = schematic_path.as_ref();
    require_schematic(schematic_path)?;

    // ERC output goes to a temporary JSON file we parse and discard.
    let temp_file =
        NamedTempFile::new().context("Failed to create temporary file for ERC output")?;
    let temp_path = temp_file.path();

    let mut builder = KiCadCliBuilder::new()
        .command("sch")
        .subcommand("erc")
        .arg("--format")
        .arg("json")
        .arg("--severity-all")
        .arg("--severity-exclusions")
        .arg("--output")
        .arg(temp_path.to_string_lossy())
        .arg(schematic_path.to_string_lossy());

    if let Some(dir) = working_dir {
        builder = builder.current_dir(dir.to_string_lossy().to_string());
    }

    builder.run().context("Failed to run KiCad ERC")?;

    erc::ErcReport::from_file(temp_path).context("Failed to parse ERC report")
}

/// Export a KiCad netlist for a schematic.
pub fn export_netlist(
    schematic_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<()> {
    let schematic_path = schematic_path.as_ref();
    require_schematic(schematic_path)?;

    KiCadCliBuilder::new()
        .command("sch")
        .subcommand("export")
        .arg("netlist")
        .arg("--output")
        .arg(output_path.as_ref().to_string_lossy())
        .arg(schematic_path.to_string_lossy())
        .run()
        .context("Failed to export netlist")
}

/// Render a schematic to PDF.
pub fn export_pdf(schematic_path: impl AsRef<Path>, output_path: impl AsRef<Path>) -> Result<()> {
    let schematic_path = schematic_path.as_ref();
    require_schematic(schematic_path)?;

    KiCadCliBuilder::new()
        .command("sch")
        .subcommand("export")
        .arg("pdf")
        .arg("--output")
        .arg(output_path.as_ref().to_string_lossy())
        .arg(schematic_path.to_string_lossy())
        .run()
        .context("Failed to export PDF")
}
