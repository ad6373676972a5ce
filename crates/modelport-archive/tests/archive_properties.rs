//! Property and corruption tests for the archive reader.

use modelport_archive::{ArchiveReader, ArchiveWriter};
use modelport_common::tensor::byte_len;
use modelport_common::{ArchiveConfig, ArchiveError, DType, StagingMode, Tensor};
use proptest::prelude::*;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn arb_dtype() -> impl Strategy<Value = DType> {
    prop::sample::select(DType::ALL.to_vec())
}

fn arb_tensor() -> impl Strategy<Value = Tensor> {
    (arb_dtype(), prop::collection::vec(1usize..5, 1..4)).prop_flat_map(|(dtype, shape)| {
        let len = byte_len(&shape, dtype).unwrap();
        prop::collection::vec(any::<u8>(), len)
            .prop_map(move |data| Tensor::from_bytes(dtype, shape.clone(), data).unwrap())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn extract_round_trips_bit_identical(tensors in prop::collection::vec(arb_tensor(), 1..6)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.bin");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        for (i, t) in tensors.iter().enumerate() {
            writer.write_tensor(&format!("layer{i}.weight"), t).unwrap();
        }
        writer.finish().unwrap();

        let reader = ArchiveReader::open(&path).unwrap();
        prop_assert_eq!(reader.len(), tensors.len());
        for (i, t) in tensors.iter().enumerate() {
            let got = reader.extract(&format!("layer{i}.weight"), t.shape(), t.dtype()).unwrap();
            prop_assert_eq!(&got, t);
        }
    }

    #[test]
    fn wrong_element_count_is_always_shape_mismatch(
        stored in 1usize..64,
        declared in 1usize..64,
        dtype in arb_dtype(),
    ) {
        prop_assume!(stored != declared);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shape.bin");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.write_entry("t", &vec![0u8; stored * dtype.size()]).unwrap();
        writer.finish().unwrap();

        let reader = ArchiveReader::open(&path).unwrap();
        let err = reader.extract("t", &[declared], dtype).unwrap_err();
        match err {
            ArchiveError::ShapeMismatch { expected_bytes, actual_bytes, .. } => {
                prop_assert_eq!(expected_bytes, declared * dtype.size());
                prop_assert_eq!(actual_bytes, stored * dtype.size());
            }
            other => prop_assert!(false, "expected ShapeMismatch, got {other:?}"),
        }
    }
}

fn deflated_fixture(dir: &std::path::Path, values: &[f32]) -> std::path::PathBuf {
    let path = dir.join("deflated.bin");
    let mut zip = ZipWriter::new(std::fs::File::create(&path).unwrap());
    zip.start_file("linear.weight", SimpleFileOptions::default().compression_method(CompressionMethod::Deflated))
        .unwrap();
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    zip.write_all(&bytes).unwrap();
    zip.finish().unwrap();
    path
}

#[test]
fn deflated_entry_extracts_like_a_stored_one() {
    let dir = tempfile::tempdir().unwrap();
    let values: Vec<f32> = (0..100).map(|i| (i % 7) as f32 * 0.25).collect();
    let path = deflated_fixture(dir.path(), &values);

    let reader = ArchiveReader::open(&path).unwrap();
    assert_eq!(reader.entry("linear.weight").unwrap().size, 400);
    let tensor = reader.extract("linear.weight", &[10, 10], DType::Float32).unwrap();
    assert_eq!(tensor.to_f32_vec(), values);

    let staged = ArchiveReader::open_with_config(
        &path,
        &ArchiveConfig { staging: StagingMode::TempFile, staging_dir: Some(dir.path().to_path_buf()) },
    )
    .unwrap();
    assert_eq!(staged.extract("linear.weight", &[10, 10], DType::Float32).unwrap(), tensor);
}

#[test]
fn deflated_entry_length_is_checked_uncompressed() {
    let dir = tempfile::tempdir().unwrap();
    let path = deflated_fixture(dir.path(), &[0.0; 100]);

    let err = ArchiveReader::open(&path).unwrap().extract("linear.weight", &[10, 9], DType::Float32).unwrap_err();
    match err {
        ArchiveError::ShapeMismatch { expected_bytes, actual_bytes, .. } => {
            assert_eq!((expected_bytes, actual_bytes), (360, 400));
        }
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
}

#[test]
fn truncated_container_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.bin");
    let mut writer = ArchiveWriter::create(&path).unwrap();
    writer.write_entry("linear.weight", &[7u8; 400]).unwrap();
    writer.finish().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let cut = dir.path().join("cut.bin");
    std::fs::write(&cut, &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(ArchiveReader::open(&cut), Err(ArchiveError::CorruptArchive { .. })));
}

#[test]
fn flipped_payload_byte_fails_crc() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crc.bin");
    let mut writer = ArchiveWriter::create(&path).unwrap();
    writer.write_entry("linear.bias", &[1u8; 40]).unwrap();
    writer.finish().unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    let offset = reader.entry("linear.bias").unwrap().offset as usize;
    drop(reader);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[offset] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    let err = reader.extract("linear.bias", &[10], DType::Float32).unwrap_err();
    assert!(matches!(err, ArchiveError::CorruptArchive { .. }), "{err}");
}
