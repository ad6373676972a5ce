//! Read-only access to a keyed tensor archive.

use crate::staging;
use modelport_common::tensor::byte_len;
use modelport_common::{ArchiveConfig, ArchiveError, DType, StagingMode, Tensor};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

/// Location of one raw tensor buffer inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub key: String,
    /// Byte offset of the entry data from the start of the container.
    pub offset: u64,
    /// Uncompressed length in bytes.
    pub size: u64,
}

/// Opened archive. Entries are indexed once at open time and never mutated.
pub struct ArchiveReader {
    path: PathBuf,
    config: ArchiveConfig,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
    zip: Mutex<ZipArchive<BufReader<File>>>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.path)
            .field("staging", &self.config.staging)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        Self::open_with_config(path, &ArchiveConfig::default())
    }

    /// Open `path` and index its central directory.
    ///
    /// Fails with `NotFound` when the path is not a readable regular file and
    /// with `CorruptArchive` when the directory cannot be parsed or a key
    /// appears twice. Stored and deflated entries are both readable.
    pub fn open_with_config(path: impl AsRef<Path>, config: &ArchiveConfig) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let not_found = || ArchiveError::NotFound { path: path.to_path_buf() };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(ArchiveError::Io(e)),
        };
        if !file.metadata()?.is_file() {
            return Err(not_found());
        }

        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(path, e))?;

        let mut entries = Vec::with_capacity(zip.len());
        let mut index = HashMap::with_capacity(zip.len());
        for i in 0..zip.len() {
            let file = zip.by_index_raw(i).map_err(|e| corrupt(path, e))?;
            if file.is_dir() {
                continue;
            }
            let key = file.name().to_string();
            if index.contains_key(&key) {
                return Err(corrupt(path, format!("duplicate key `{key}`")));
            }
            debug!(
                key = %key,
                offset = file.data_start(),
                size = file.size(),
                compression = ?file.compression(),
                "indexed archive entry"
            );
            index.insert(key.clone(), entries.len());
            entries.push(ArchiveEntry { key, offset: file.data_start(), size: file.size() });
        }

        info!(path = %path.display(), entries = entries.len(), staging = ?config.staging, "opened archive");

        Ok(Self {
            path: path.to_path_buf(),
            config: config.clone(),
            entries,
            index,
            zip: Mutex::new(zip),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in container order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn entry(&self, key: &str) -> Option<&ArchiveEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Extract `key` as an owned tensor of the declared `shape` and `dtype`.
    ///
    /// The stored length must equal `product(shape) * dtype.size()` exactly.
    pub fn extract(&self, key: &str, shape: &[usize], dtype: DType) -> Result<Tensor, ArchiveError> {
        let entry = self.entry(key).ok_or_else(|| ArchiveError::KeyNotFound { key: key.to_string() })?;

        let invalid_shape = || ArchiveError::InvalidShape { key: key.to_string(), shape: shape.to_vec() };
        if shape.contains(&0) {
            return Err(invalid_shape());
        }
        let expected = byte_len(shape, dtype).ok_or_else(invalid_shape)?;
        if entry.size != expected as u64 {
            return Err(ArchiveError::ShapeMismatch {
                key: key.to_string(),
                shape: shape.to_vec(),
                dtype: dtype.to_string(),
                expected_bytes: expected,
                actual_bytes: usize::try_from(entry.size).unwrap_or(usize::MAX),
            });
        }

        let bytes = self.read_entry(key, expected)?;
        if bytes.len() != expected {
            return Err(corrupt(
                &self.path,
                format!("entry `{key}` yielded {} bytes, directory declares {expected}", bytes.len()),
            ));
        }

        debug!(key, ?shape, %dtype, bytes = expected, "extracted tensor");
        Tensor::from_bytes(dtype, shape.to_vec(), bytes).map_err(|e| corrupt(&self.path, e))
    }

    /// Like [`extract`](Self::extract) with the element type given by name.
    pub fn extract_named(&self, key: &str, shape: &[usize], dtype: &str) -> Result<Tensor, ArchiveError> {
        let dtype: DType = dtype.parse()?;
        self.extract(key, shape, dtype)
    }

    /// Release the container handle.
    pub fn close(self) {
        debug!(path = %self.path.display(), "closed archive");
    }

    fn read_entry(&self, key: &str, expected: usize) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = self.lock();
        let mut file = zip.by_name(key).map_err(|e| match e {
            ZipError::FileNotFound => ArchiveError::KeyNotFound { key: key.to_string() },
            other => corrupt(&self.path, other),
        })?;

        let read = match self.config.staging {
            StagingMode::Memory => {
                let mut buf = Vec::with_capacity(expected);
                file.read_to_end(&mut buf).map(|_| buf)
            }
            StagingMode::TempFile => staging::stage_and_copy(&mut file, self.config.staging_dir.as_deref()),
        };
        read.map_err(|e| match e.kind() {
            // CRC and framing failures surface from the entry stream as InvalidData.
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                corrupt(&self.path, format!("entry `{key}`: {e}"))
            }
            _ => ArchiveError::Io(e),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ZipArchive<BufReader<File>>> {
        self.zip.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn corrupt(path: &Path, reason: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::CorruptArchive { path: path.to_path_buf(), reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArchiveWriter;
    use std::io::Write;
    use tempfile::TempDir;

    fn fixture(entries: &[(&str, &[u8])]) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        for (key, bytes) in entries {
            writer.write_entry(key, bytes).unwrap();
        }
        writer.finish().unwrap();
        (dir, path)
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveReader::open(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound { .. }));
    }

    #[test]
    fn directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveReader::open(dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound { .. }));
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::File::create(&path).unwrap().write_all(b"definitely not a zip").unwrap();
        let err = ArchiveReader::open(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive { .. }), "{err}");
    }

    #[test]
    fn indexes_entries_in_order() {
        let bias = f32_bytes(&[0.5; 10]);
        let weight = f32_bytes(&[1.0; 100]);
        let (_dir, path) = fixture(&[("linear.weight", &weight), ("linear.bias", &bias)]);

        let reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.keys().collect::<Vec<_>>(), ["linear.weight", "linear.bias"]);
        assert!(reader.contains("linear.bias"));
        assert!(!reader.contains("linear"));
        assert_eq!(reader.entry("linear.bias").unwrap().size, 40);
        assert!(reader.entry("linear.bias").unwrap().offset > 0);
    }

    #[test]
    fn extract_reads_exact_bytes() {
        let values: Vec<f32> = (0..10).map(|i| i as f32 * 0.25 - 1.0).collect();
        let (_dir, path) = fixture(&[("linear.bias", &f32_bytes(&values))]);

        let reader = ArchiveReader::open(&path).unwrap();
        let t = reader.extract("linear.bias", &[10], DType::Float32).unwrap();
        assert_eq!(t.shape(), &[10]);
        assert_eq!(t.to_f32_vec(), values);
    }

    #[test]
    fn extract_missing_key() {
        let (_dir, path) = fixture(&[("a", &[0u8; 4])]);
        let reader = ArchiveReader::open(&path).unwrap();
        let err = reader.extract("b", &[1], DType::Float32).unwrap_err();
        assert!(matches!(err, ArchiveError::KeyNotFound { ref key } if key == "b"));
    }

    #[test]
    fn extract_rejects_wrong_length_both_ways() {
        let (_dir, path) = fixture(&[("linear.bias", &f32_bytes(&[0.0; 9]))]);
        let reader = ArchiveReader::open(&path).unwrap();

        match reader.extract("linear.bias", &[10], DType::Float32).unwrap_err() {
            ArchiveError::ShapeMismatch { key, expected_bytes, actual_bytes, .. } => {
                assert_eq!(key, "linear.bias");
                assert_eq!(expected_bytes, 40);
                assert_eq!(actual_bytes, 36);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
        assert!(matches!(
            reader.extract("linear.bias", &[8], DType::Float32),
            Err(ArchiveError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn extract_rejects_zero_dimension() {
        let (_dir, path) = fixture(&[("x", &[0u8; 4])]);
        let reader = ArchiveReader::open(&path).unwrap();
        assert!(matches!(
            reader.extract("x", &[0, 1], DType::Float32),
            Err(ArchiveError::InvalidShape { .. })
        ));
    }

    #[test]
    fn extract_named_parses_dtype() {
        let (_dir, path) = fixture(&[("x", &[1u8, 2, 3, 4])]);
        let reader = ArchiveReader::open(&path).unwrap();
        let t = reader.extract_named("x", &[2], "f16").unwrap();
        assert_eq!(t.dtype(), DType::Float16);
        let err = reader.extract_named("x", &[1], "complex64").unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedType { ref name } if name == "complex64"));
    }

    #[test]
    fn same_bytes_reinterpreted_by_dtype() {
        let (_dir, path) = fixture(&[("x", &[0u8; 8])]);
        let reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.extract("x", &[2], DType::Int32).unwrap().numel(), 2);
        assert_eq!(reader.extract("x", &[1], DType::Float64).unwrap().numel(), 1);
        assert_eq!(reader.extract("x", &[2, 2, 2], DType::UInt8).unwrap().numel(), 8);
    }

    #[test]
    fn tempfile_staging_matches_memory_and_cleans_up() {
        let values: Vec<f32> = (0..100).map(|i| (i as f32).sin()).collect();
        let (_dir, path) = fixture(&[("linear.weight", &f32_bytes(&values))]);
        let stage_dir = tempfile::tempdir().unwrap();
        let config = ArchiveConfig {
            staging: StagingMode::TempFile,
            staging_dir: Some(stage_dir.path().to_path_buf()),
        };

        let staged = ArchiveReader::open_with_config(&path, &config).unwrap();
        let direct = ArchiveReader::open(&path).unwrap();
        let a = staged.extract("linear.weight", &[10, 10], DType::Float32).unwrap();
        let b = direct.extract("linear.weight", &[10, 10], DType::Float32).unwrap();
        assert_eq!(a, b);
        assert!(std::fs::read_dir(stage_dir.path()).unwrap().next().is_none());

        // Failing extractions leave nothing behind either.
        assert!(staged.extract("linear.weight", &[10], DType::Float32).is_err());
        assert!(std::fs::read_dir(stage_dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn tempfile_staging_cleans_up_when_the_entry_stream_fails() {
        let (_dir, path) = fixture(&[("linear.bias", &[1u8; 40])]);
        let offset = ArchiveReader::open(&path).unwrap().entry("linear.bias").unwrap().offset as usize;
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[offset] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let stage_dir = tempfile::tempdir().unwrap();
        let config = ArchiveConfig {
            staging: StagingMode::TempFile,
            staging_dir: Some(stage_dir.path().to_path_buf()),
        };
        let reader = ArchiveReader::open_with_config(&path, &config).unwrap();

        // The length check passes, so the failure comes from the CRC while staging.
        let err = reader.extract("linear.bias", &[10], DType::Float32).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive { .. }), "{err}");
        assert!(std::fs::read_dir(stage_dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn tensor_outlives_archive_file() {
        let (dir, path) = fixture(&[("w", &f32_bytes(&[3.0, 4.0]))]);
        let reader = ArchiveReader::open(&path).unwrap();
        let t = reader.extract("w", &[2], DType::Float32).unwrap();
        reader.close();
        drop(dir);
        assert_eq!(t.to_f32_vec(), vec![3.0, 4.0]);
    }
}
