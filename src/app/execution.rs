//! Command execution

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use colored::Colorize;
use log::{debug, info};
use prettytable::{format, Cell, Row, Table};
use serde::Serialize;
use crate::cli::{Args, Command, Family};
use crate::config::ConfigManager;
use crate::plugin::{
    CapabilityFamily, DescriptorValidator, LearningStrategies, LoadOutcome, LoadedPlugin,
    PackageBuilder, PluginHost, PluginManager, QuestionModules, ValidationResult,
};

/// Run the selected subcommand
pub fn run_command(args: &Args, config: &ConfigManager) -> Result<()> {
    match &args.command {
        Command::List { family } => {
            let host = super::build_plugin_host(args, config)?;
            handle_list(&host, *family)
        }
        Command::Dump { json } => {
            let host = super::build_plugin_host(args, config)?;
            handle_dump(&host, *json)
        }
        Command::Check { family, package } => handle_check(*family, package),
        Command::Pack { family, output, implementations, units } => {
            handle_pack(*family, output, implementations, units)
        }
    }
}

/// Format a compact table with headers and rows using prettytable-rs clean format
pub fn format_compact_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(Row::new(headers.iter().map(|header| Cell::new(header)).collect()));

    for row in rows {
        table.add_row(Row::new(row.iter().map(|cell| Cell::new(cell)).collect()));
    }

    let mut result = String::new();
    for line in table.to_string().lines() {
        result.push_str("  ");
        result.push_str(line);
        result.push('\n');
    }
    result
}

fn plugin_rows<F: CapabilityFamily>(manager: &PluginManager<F>) -> Result<Vec<Vec<String>>> {
    Ok(manager
        .all()?
        .iter()
        .map(|plugin| {
            vec![
                plugin.key().to_string(),
                plugin.display_name().to_string(),
                plugin.version().to_string(),
                package_name(plugin.package()),
            ]
        })
        .collect())
}

fn package_name(package: &Path) -> String {
    package
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| package.display().to_string())
}

fn print_family<F: CapabilityFamily>(title: &str, manager: &PluginManager<F>) -> Result<()> {
    let rows = plugin_rows(manager)?;
    println!("{} ({})", title.bold(), rows.len());
    if rows.is_empty() {
        println!("  {}", "none installed".dimmed());
    } else {
        print!("{}", format_compact_table(&["KEY", "NAME", "VERSION", "PACKAGE"], &rows));
    }

    let outcome = manager.outcome()?;
    if !outcome.failures.is_empty() {
        println!("  {}", format!("{} package(s) or plugin(s) rejected; run `dump` for reasons", outcome.failures.len()).yellow());
    }
    Ok(())
}

fn handle_list(host: &PluginHost, family: Option<Family>) -> Result<()> {
    debug!("Listing plugins for {:?}", family);

    if family.map_or(true, |f| f == Family::QuestionModules) {
        print_family("Question Modules", host.question_modules())?;
    }
    if family.is_none() {
        println!();
    }
    if family.map_or(true, |f| f == Family::LearningStrategies) {
        print_family("Learning Strategies", host.learning_strategies())?;
    }
    Ok(())
}

/// One accepted plugin in a JSON dump
#[derive(Debug, Serialize)]
struct PluginSummary {
    key: String,
    display_name: String,
    version: String,
    implementation: String,
    package: PathBuf,
}

impl<F: CapabilityFamily> From<&LoadedPlugin<F>> for PluginSummary {
    fn from(plugin: &LoadedPlugin<F>) -> Self {
        Self {
            key: plugin.key().to_string(),
            display_name: plugin.display_name().to_string(),
            version: plugin.version().to_string(),
            implementation: plugin.implementation().to_string(),
            package: plugin.package().to_path_buf(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FamilyDump<'a> {
    family: &'static str,
    directory: &'a Path,
    plugins: Vec<PluginSummary>,
    outcome: &'a LoadOutcome,
}

fn family_dump<F: CapabilityFamily>(manager: &PluginManager<F>) -> Result<FamilyDump<'_>> {
    Ok(FamilyDump {
        family: F::NAME,
        directory: &manager.config().directory,
        plugins: manager.all()?.iter().map(|plugin| PluginSummary::from(plugin.as_ref())).collect(),
        outcome: manager.outcome()?,
    })
}

fn print_outcome(outcome: &LoadOutcome) {
    println!("  {}", outcome.summary());
    for failure in &outcome.failures {
        println!("  {} {}", "rejected".red(), failure);
    }
}

fn handle_dump(host: &PluginHost, json: bool) -> Result<()> {
    if json {
        let dump = vec![
            family_dump(host.question_modules())?,
            family_dump(host.learning_strategies())?,
        ];
        println!("{}", serde_json::to_string_pretty(&dump)?);
        return Ok(());
    }

    print!("{}", host.question_modules().diagnostic_dump()?);
    print_outcome(host.question_modules().outcome()?);
    print!("{}", host.learning_strategies().diagnostic_dump()?);
    print_outcome(host.learning_strategies().outcome()?);
    Ok(())
}

fn validate_as(family: Family, package: &Path) -> ValidationResult {
    match family {
        Family::QuestionModules => DescriptorValidator::<QuestionModules>::new().validate(package),
        Family::LearningStrategies => DescriptorValidator::<LearningStrategies>::new().validate(package),
    }
}

fn handle_check(family: Family, package: &Path) -> Result<()> {
    let result = validate_as(family, package);

    if !result.ok {
        let reason = result.reason.unwrap_or_else(|| "validation failed".to_string());
        println!("{} {}: {}", "invalid".red().bold(), package.display(), reason);
        return Err(anyhow::anyhow!("Package {} is not a valid {} package", package.display(), family));
    }

    println!("{} {} ({} package)", "valid".green().bold(), package.display(), family);
    if let Some(descriptor) = &result.descriptor {
        for name in descriptor.implementations() {
            println!("  declares {}", name);
        }
    }
    for unit in &result.units {
        println!("  unit     {}", unit);
    }
    Ok(())
}

fn handle_pack(family: Family, output: &Path, implementations: &[String], units: &[PathBuf]) -> Result<()> {
    let mut builder = PackageBuilder::new(family.descriptor_path());
    for name in implementations {
        builder = builder.implementation(name.as_str());
    }
    for unit in units {
        let file_name = unit
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("Unit path has no file name: {}", unit.display()))?;
        let bytes = fs::read(unit)
            .with_context(|| format!("Failed to read unit: {}", unit.display()))?;
        builder = builder.unit(file_name, bytes);
    }

    builder.check()
        .with_context(|| format!("Refusing to write an invalid {} package", family))?;
    builder.write_to(output)
        .with_context(|| format!("Failed to write package: {}", output.display()))?;

    info!("Wrote {} package {}", family, output.display());
    println!("{} {}", "wrote".green().bold(), output.display());
    Ok(())
}
