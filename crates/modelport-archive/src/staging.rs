//! Scoped temporary staging for entries that must be streamed to disk.
//!
//! The staged file lives exactly as long as its [`StagedEntry`] guard, so it
//! is removed on success, on early return and on error alike.

use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const STAGE_PREFIX: &str = "modelport-stage-";

/// Temporary on-disk copy of one archive entry.
pub struct StagedEntry {
    file: NamedTempFile,
}

impl StagedEntry {
    /// Create an empty staging file in `dir`, or the system temp dir.
    pub fn create(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGE_PREFIX);
        let file = match dir {
            Some(d) => builder.tempfile_in(d)?,
            None => builder.tempfile()?,
        };
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Stream `reader` into the staging file.
    pub fn fill<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<u64> {
        let written = io::copy(reader, self.file.as_file_mut())?;
        self.file.as_file_mut().flush()?;
        Ok(written)
    }

    /// Map the staged bytes and copy them into an owned buffer.
    pub fn copy_out(&self) -> io::Result<Vec<u8>> {
        let file: &File = self.file.as_file();
        if file.metadata()?.len() == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the mapping is read-only, private to this guard, and dropped
        // before the staging file is removed.
        let mmap = unsafe { Mmap::map(file)? };
        Ok(mmap.to_vec())
    }
}

/// Stage `reader` through a temporary file and return an owned copy.
pub fn stage_and_copy<R: Read + ?Sized>(reader: &mut R, dir: Option<&Path>) -> io::Result<Vec<u8>> {
    let mut staged = StagedEntry::create(dir)?;
    staged.fill(reader)?;
    staged.copy_out()
}
