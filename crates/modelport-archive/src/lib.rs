//! Keyed tensor archive reader and writer.
//!
//! An archive is a zip container whose entries are raw little-endian tensor
//! buffers named by dot-separated parameter paths (`linear.weight`). Shape
//! and element type are not stored in the container; the caller declares
//! them at extraction time and the reader checks the uncompressed entry
//! length against them. The writer stores entries uncompressed; the reader
//! also accepts deflated entries.
//!
//! # Example
//!
//! ```no_run
//! use modelport_archive::ArchiveReader;
//! use modelport_common::DType;
//!
//! let reader = ArchiveReader::open("model.bin").unwrap();
//! let weight = reader.extract("linear.weight", &[10, 10], DType::Float32).unwrap();
//! assert_eq!(weight.numel(), 100);
//! ```

pub mod reader;
pub mod staging;
pub mod writer;

pub use reader::{ArchiveEntry, ArchiveReader};
pub use staging::StagedEntry;
pub use writer::{ArchiveWriter, write_archive};
