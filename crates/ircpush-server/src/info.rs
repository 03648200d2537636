//! `info` command: where configuration comes from and what it resolves to.

use crate::config::{Config, ENV_PREFIX, ENV_SEPARATOR, MASK};
use anyhow::{Context, Result};
use ircpush_core::RuleSet;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Print the configuration report to stdout.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or printed.
pub fn run(explicit: Option<&Path>) -> Result<()> {
    let path = Config::locate(explicit);
    let effective = Config::load(path.as_deref())?;
    let file_only = match &path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Some(Config::from_toml(&raw)?)
        }
        None => None,
    };
    let env = collect_env(std::env::vars());

    let mut out = std::io::stdout().lock();
    render(
        &mut out,
        &Report {
            path: path.as_deref(),
            env: &env,
            effective: &effective,
            file_only: file_only.as_ref(),
        },
    )
}

struct Report<'a> {
    path: Option<&'a Path>,
    env: &'a [(String, String)],
    effective: &'a Config,
    file_only: Option<&'a Config>,
}

fn render(out: &mut impl Write, report: &Report<'_>) -> Result<()> {
    match report.path {
        Some(path) => writeln!(out, "Config file: {}", path.display())?,
        None => writeln!(out, "Config file: (none found via search order)")?,
    }

    if report.env.is_empty() {
        writeln!(out, "Environment overrides: (none)")?;
    } else {
        writeln!(out, "Environment overrides (present):")?;
        for (name, value) in report.env {
            writeln!(out, "  {name}={value}")?;
        }
    }

    let effective = report.effective.masked();
    writeln!(out, "\nEffective config:")?;
    write!(
        out,
        "{}",
        toml::to_string_pretty(&effective).context("Failed to render configuration")?
    )?;

    match report.file_only {
        Some(file_only) => {
            let overrides = diff_overrides(&file_only.masked(), &effective)?;
            if overrides.is_empty() {
                writeln!(out, "\nOverrides: (none; effective == file)")?;
            } else {
                writeln!(out, "\nOverrides (file -> effective):")?;
                for o in &overrides {
                    let source = if report.env.iter().any(|(name, _)| *name == env_name(&o.key)) {
                        " [env]"
                    } else {
                        ""
                    };
                    writeln!(out, "  {}: {} -> {}{source}", o.key, o.file, o.effective)?;
                }
            }
        }
        None => writeln!(
            out,
            "\nOverrides: (no config file in use; everything is from env/defaults)"
        )?,
    }

    let (rules, rejected) = RuleSet::build_with_report(&report.effective.highlight.rules);
    writeln!(
        out,
        "\nHighlight rules: {} compiled, {} rejected",
        rules.len(),
        rejected.len()
    )?;
    for r in &rejected {
        writeln!(out, "  rule {}: {:?}: {}", r.index, r.pattern, r.reason)?;
    }

    Ok(())
}

/// `IRCPUSH_*` variables, sorted, with secrets masked.
fn collect_env(vars: impl Iterator<Item = (String, String)>) -> Vec<(String, String)> {
    let prefix = format!("{ENV_PREFIX}_");
    let mut env: Vec<_> = vars
        .filter(|(name, _)| name.starts_with(&prefix))
        .map(|(name, value)| {
            let upper = name.to_ascii_uppercase();
            let value = if upper.contains("PASS") || upper.contains("KEY") {
                MASK.to_string()
            } else {
                value
            };
            (name, value)
        })
        .collect();
    env.sort();
    env
}

/// Environment variable that overrides the dotted config `key`.
fn env_name(key: &str) -> String {
    format!(
        "{ENV_PREFIX}{ENV_SEPARATOR}{}",
        key.to_ascii_uppercase().replace('.', ENV_SEPARATOR)
    )
}

#[derive(Debug, PartialEq, Eq)]
struct Override {
    key: String,
    file: String,
    effective: String,
}

fn diff_overrides(file: &Config, effective: &Config) -> Result<Vec<Override>> {
    let file = flatten_config(file)?;
    let effective = flatten_config(effective)?;

    let mut keys: Vec<&String> = file.keys().chain(effective.keys()).collect();
    keys.sort();
    keys.dedup();

    Ok(keys
        .into_iter()
        .filter_map(|key| {
            let (old, new) = match (file.get(key), effective.get(key)) {
                (Some(old), Some(new)) if old == new => return None,
                (Some(old), Some(new)) => (old.clone(), new.clone()),
                (None, Some(new)) => ("(unset in file)".to_string(), new.clone()),
                (Some(old), None) => (old.clone(), "(unset effective)".to_string()),
                (None, None) => return None,
            };
            Some(Override {
                key: key.clone(),
                file: old,
                effective: new,
            })
        })
        .collect())
}

fn flatten_config(config: &Config) -> Result<BTreeMap<String, String>> {
    let value = toml::Value::try_from(config).context("Failed to render configuration")?;
    let mut flat = BTreeMap::new();
    flatten("", &value, &mut flat);
    Ok(flat)
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, value) in table {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, value, out);
            }
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}
