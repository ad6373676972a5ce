//! Rendering of command results as text tables or JSON.

use console::style;
use modelport_archive::ArchiveEntry;
use modelport_crossval::ParityReceipt;
use modelport_crossval::receipt::RepresentationRow;
use serde::Serialize;
use std::fmt;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text (default).
    #[default]
    Text,
    /// Machine-readable JSON on stdout.
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}'. Expected one of: text, json")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Pretty JSON followed by a newline.
pub fn to_json_line<T: Serialize>(value: &T) -> anyhow::Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

#[derive(Debug, Serialize)]
pub struct EntryRow<'a> {
    pub key: &'a str,
    pub offset: u64,
    pub size: u64,
}

impl<'a> From<&'a ArchiveEntry> for EntryRow<'a> {
    fn from(entry: &'a ArchiveEntry) -> Self {
        Self { key: &entry.key, offset: entry.offset, size: entry.size }
    }
}

/// Key listing for `inspect`.
pub struct EntryTable<'a>(pub &'a [ArchiveEntry]);

impl fmt::Display for EntryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.0;
        let width = entries.iter().map(|e| e.key.len()).max().unwrap_or(0).max("KEY".len());
        writeln!(f, "{}", style(format!("{:<width$}  {:>12}  {:>12}", "KEY", "OFFSET", "BYTES")).bold())?;
        for entry in entries {
            writeln!(f, "{:<width$}  {:>12}  {:>12}", entry.key, entry.offset, entry.size)?;
        }
        let total: u64 = entries.iter().map(|e| e.size).sum();
        writeln!(f, "{} entries, {} bytes", entries.len(), total)
    }
}

/// Per-representation verdict table for `verify`.
pub struct ReceiptTable<'a>(pub &'a ParityReceipt);

impl ReceiptTable<'_> {
    fn row(f: &mut fmt::Formatter<'_>, row: &RepresentationRow) -> fmt::Result {
        let verdict = if row.passed {
            style(format!("{:<8}", "PASS")).green()
        } else {
            style(format!("{:<8}", "FAIL")).red().bold()
        };
        let name = row.representation.name();
        match &row.metrics {
            Some(m) => {
                let worst = m.worst_index.map_or_else(|| "-".to_string(), |i| i.to_string());
                let mismatched = format!("{}/{}", m.mismatched, m.total);
                writeln!(
                    f,
                    "{name:<8}  {verdict}  {:>12.3e}  {:>12.3e}  {mismatched:>12}  {worst:>7}",
                    m.max_abs_diff, m.max_rel_diff
                )?;
            }
            None => writeln!(f, "{name:<8}  {verdict}  {:>12}  {:>12}  {:>12}  {:>7}", "-", "-", "-", "-")?,
        }
        match &row.failure {
            Some(failure) => writeln!(f, "          {}", style(failure).dim()),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ReceiptTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let receipt = self.0;
        writeln!(
            f,
            "archive {}  seed {}  sample {:?}  atol {:e}  rtol {:e}",
            receipt.archive, receipt.seed, receipt.sample_shape, receipt.tolerance.atol, receipt.tolerance.rtol
        )?;
        let header = format!(
            "{:<8}  {:<8}  {:>12}  {:>12}  {:>12}  {:>7}",
            "REPR", "VERDICT", "MAX ABS", "MAX REL", "MISMATCHED", "WORST"
        );
        writeln!(f, "{}", style(header).bold())?;

        for row in &receipt.rows {
            Self::row(f, row)?;
        }
        for failure in &receipt.export_failures {
            writeln!(
                f,
                "{:<8}  {}  {}",
                failure.representation.name(),
                style(format!("{:<8}", "EXPORT")).yellow(),
                failure.error
            )?;
        }

        let s = &receipt.summary;
        let summary = format!("{}/{} representations passed", s.passed, s.compared);
        if s.diverged.is_empty() {
            writeln!(f, "{}", style(summary).green())
        } else {
            let names: Vec<_> = s.diverged.iter().map(|k| k.name()).collect();
            writeln!(f, "{}; diverged: {}", style(summary).red(), names.join(", "))
        }
    }
}
