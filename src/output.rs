//! Output formatting for Drupal scan results

use crate::error::{Error, Result};
use crate::model::AddonStatus;
use crate::scanner::{AddonReport, ScanResult};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL,
};
use std::io::Write;
use std::str::FromStr;

/// Placeholder for unknown/missing information
const UNKNOWN: &str = "-";

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table output
    #[default]
    Human,
    /// JSON output
    Json,
    /// No output (silent mode)
    None,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidOutputFormat(s.to_string())),
        }
    }
}

/// Sort order for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSort {
    /// Sort by type (Core, Plugin, Theme), then by name (default)
    #[default]
    Type,
    /// Sort alphabetically by name only
    Name,
    /// Sort by status, then by type, then by name
    Status,
}

impl FromStr for OutputSort {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "type" => Ok(Self::Type),
            "name" => Ok(Self::Name),
            "status" => Ok(Self::Status),
            _ => Err(Error::InvalidOutputSort(s.to_string())),
        }
    }
}

/// Configuration for output formatting
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Sort order
    pub sort: OutputSort,
}

impl OutputConfig {
    /// Create a new output config
    pub fn new(format: OutputFormat, sort: OutputSort) -> Self {
        Self { format, sort }
    }
}

/// One table line, core or add-on
struct Row<'a> {
    kind: String,
    order: u8,
    name: &'a str,
    version: &'a str,
    latest: &'a str,
    released: &'a str,
    status: AddonStatus,
    notes: String,
}

impl<'a> Row<'a> {
    fn core(result: &'a ScanResult) -> Self {
        let mut notes = Vec::new();
        if let Some(failure) = &result.core_failure {
            notes.push(failure.clone());
        }
        if !result.core.vulnerabilities.is_empty() {
            notes.push(format!("{} vulnerabilities", result.core.vulnerabilities.len()));
        }

        Self {
            kind: "Core".to_string(),
            order: 0,
            name: result.cms,
            version: &result.core.version,
            latest: &result.core.last_version,
            released: "",
            status: result.core.status,
            notes: notes.join("; "),
        }
    }

    fn addon(report: &'a AddonReport) -> Self {
        let addon = &report.addon;
        let mut notes = Vec::new();
        if !addon.notes.is_empty() {
            notes.push(addon.notes.clone());
        }
        if let Some(failure) = &report.failure {
            notes.push(failure.to_string());
        }
        if !addon.vulnerabilities.is_empty() {
            notes.push(format!("{} vulnerabilities", addon.vulnerabilities.len()));
        }
        if !addon.altered_files.is_empty() {
            notes.push(format!("{} altered files", addon.altered_files.len()));
        }

        Self {
            kind: addon.addon_type.to_string(),
            order: 1 + addon.addon_type as u8,
            name: &addon.name,
            version: &addon.version,
            latest: &addon.last_version,
            released: &addon.last_release_date,
            status: addon.status,
            notes: notes.join("; "),
        }
    }
}

/// Output the scan results
pub fn output_scan<W: Write>(
    result: &ScanResult,
    config: &OutputConfig,
    writer: &mut W,
) -> Result<()> {
    match config.format {
        OutputFormat::Human => output_human(result, config, writer),
        OutputFormat::Json => output_json(result, writer),
        OutputFormat::None => Ok(()),
    }
}

/// Output JSON format
fn output_json<W: Write>(result: &ScanResult, writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, result)?;
    writeln!(writer).map_err(Error::OutputFailed)?;
    Ok(())
}

/// Output human-readable table format
fn output_human<W: Write>(
    result: &ScanResult,
    config: &OutputConfig,
    writer: &mut W,
) -> Result<()> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Latest").add_attribute(Attribute::Bold),
            Cell::new("Released").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Notes").add_attribute(Attribute::Bold),
        ]);

    let mut rows = vec![Row::core(result)];
    rows.extend(result.addons().map(Row::addon));

    match config.sort {
        // Default: by type (Core, Plugin, Theme), then by name
        OutputSort::Type => {
            rows.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(b.name)));
        }
        OutputSort::Name => {
            rows.sort_by(|a, b| a.name.cmp(b.name));
        }
        // Most severe status first
        OutputSort::Status => {
            rows.sort_by(|a, b| {
                b.status
                    .cmp(&a.status)
                    .then_with(|| a.order.cmp(&b.order))
                    .then_with(|| a.name.cmp(b.name))
            });
        }
    }

    for row in &rows {
        add_row(&mut table, row);
    }

    writeln!(writer, "{}", table).map_err(Error::OutputFailed)?;
    writeln!(
        writer,
        "{} outdated, {} altered, {} incomplete",
        result.outdated_count(),
        result.altered_count(),
        result.failed_count()
    )
    .map_err(Error::OutputFailed)
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { UNKNOWN } else { value }
}

/// Add a row for a component to the table
fn add_row(table: &mut Table, row: &Row<'_>) {
    let color = match row.status {
        AddonStatus::UpToDate => Color::Green,
        AddonStatus::Outdated => Color::Yellow,
        AddonStatus::Untracked => Color::Cyan,
        AddonStatus::Unknown => Color::DarkGrey,
    };
    let status_cell = Cell::new(row.status.to_string())
        .fg(color)
        .set_alignment(CellAlignment::Center);

    table.add_row(vec![
        Cell::new(&row.kind),
        Cell::new(row.name),
        Cell::new(or_unknown(row.version)),
        Cell::new(or_unknown(row.latest)),
        Cell::new(or_unknown(row.released)),
        status_cell,
        Cell::new(&row.notes),
    ]);
}
