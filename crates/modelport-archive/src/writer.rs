//! Archive writer producing uncompressed containers.

use modelport_common::{ArchiveError, Tensor};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub struct ArchiveWriter {
    path: PathBuf,
    zip: ZipWriter<BufWriter<File>>,
    keys: HashSet<String>,
}

impl ArchiveWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self { path, zip: ZipWriter::new(BufWriter::new(file)), keys: HashSet::new() })
    }

    /// Append one uncompressed entry. Keys must be unique.
    pub fn write_entry(&mut self, key: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        if !self.keys.insert(key.to_string()) {
            return Err(ArchiveError::DuplicateKey { key: key.to_string() });
        }

        // Fixed timestamp keeps archives byte-reproducible.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(DateTime::default())
            .large_file(bytes.len() as u64 >= u64::from(u32::MAX));

        self.zip.start_file(key, options).map_err(zip_to_archive)?;
        self.zip.write_all(bytes)?;
        debug!(key, bytes = bytes.len(), "wrote archive entry");
        Ok(())
    }

    pub fn write_tensor(&mut self, key: &str, tensor: &Tensor) -> Result<(), ArchiveError> {
        self.write_entry(key, tensor.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Write the central directory and flush. Returns the archive path.
    pub fn finish(self) -> Result<PathBuf, ArchiveError> {
        let entries = self.keys.len();
        let mut inner = self.zip.finish().map_err(zip_to_archive)?;
        inner.flush()?;
        info!(path = %self.path.display(), entries, "wrote archive");
        Ok(self.path)
    }
}

/// Write `tensors` to a new archive at `path`, in iteration order.
pub fn write_archive<'a, I>(path: impl AsRef<Path>, tensors: I) -> Result<PathBuf, ArchiveError>
where
    I: IntoIterator<Item = (&'a str, &'a Tensor)>,
{
    let mut writer = ArchiveWriter::create(path)?;
    for (key, tensor) in tensors {
        writer.write_tensor(key, tensor)?;
    }
    writer.finish()
}

fn zip_to_archive(e: ZipError) -> ArchiveError {
    match e {
        ZipError::Io(e) => ArchiveError::Io(e),
        other => ArchiveError::Io(io::Error::other(other.to_string())),
    }
}
