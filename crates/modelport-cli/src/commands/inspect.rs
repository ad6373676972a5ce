//! Archive inspection

use crate::exit::EXIT_SUCCESS;
use crate::output::{EntryRow, EntryTable, OutputFormat, to_json_line};
use anyhow::Result;
use clap::Args;
use modelport_archive::ArchiveReader;
use modelport_common::PortConfig;
use std::path::PathBuf;
use tracing::debug;

/// Inspect command arguments
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Archive file path
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Output format as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl InspectCommand {
    pub fn execute(&self, config: &PortConfig) -> Result<i32> {
        let reader = ArchiveReader::open_with_config(&self.archive, &config.archive)?;
        debug!(entries = reader.len(), "listing archive");

        match OutputFormat::from_json_flag(self.json) {
            OutputFormat::Json => {
                let rows: Vec<EntryRow<'_>> = reader.entries().iter().map(EntryRow::from).collect();
                print!("{}", to_json_line(&rows)?);
            }
            OutputFormat::Text => print!("{}", EntryTable(reader.entries())),
        }
        reader.close();
        Ok(EXIT_SUCCESS)
    }
}
