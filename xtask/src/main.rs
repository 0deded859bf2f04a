use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{fs, path::{Path, PathBuf}, process::{Command, Stdio}};

#[derive(Parser)]
#[command(name = "xtask", about = "expipe workspace tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Validate a plugin manifest JSON file against schemas/plugin_manifest.schema.json
    ValidateManifest {
        file: PathBuf,
        /// Treat FILE as a plugin executable and validate what it prints for --expipe-manifest
        #[arg(long)]
        exec: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::ValidateManifest { file, exec } => validate_manifest(&file, exec),
    }
}

fn validate_manifest(path: &Path, exec: bool) -> Result<()> {
    let data_text = if exec { probe_manifest(path)? } else {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
    };
    let data: serde_json::Value = serde_json::from_str(&data_text).with_context(|| format!("parse json from {}", path.display()))?;
    let errors = validate_value(&data)?;
    if !errors.is_empty() {
        eprintln!("Invalid: {}", path.display());
        for e in errors {
            eprintln!("- {e}");
        }
        std::process::exit(1);
    }
    let plugins = data["plugins"].as_array().map_or(0, Vec::len);
    println!("OK: {} ({plugins} plugin(s))", path.display());
    Ok(())
}

/// What the executable prints when asked for its manifest.
fn probe_manifest(exe: &Path) -> Result<String> {
    let out = Command::new(exe).arg("--expipe-manifest").stdin(Stdio::null()).output()
        .with_context(|| format!("run {}", exe.display()))?;
    anyhow::ensure!(out.status.success(), "{} exited with {}", exe.display(), out.status);
    String::from_utf8(out.stdout).context("manifest is not utf-8")
}

/// Schema violations in `data`, one message per error.
fn validate_value(data: &serde_json::Value) -> Result<Vec<String>> {
    let schema: serde_json::Value = serde_json::from_str(include_str!("../../schemas/plugin_manifest.schema.json"))?;
    let compiled = jsonschema::validator_for(&schema)?;
    Ok(compiled.iter_errors(data).map(|e| e.to_string()).collect())
}
