//! Configuration tests

use super::*;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

const ENV_VARS: [&str; 10] = [
    "MODELPORT_ATOL",
    "MODELPORT_RTOL",
    "MODELPORT_SEED",
    "MODELPORT_SAMPLE_SHAPE",
    "MODELPORT_TIMEOUT_MS",
    "MODELPORT_STAGING",
    "MODELPORT_OUT_DIR",
    "MODELPORT_REPRESENTATIONS",
    "MODELPORT_LOG_LEVEL",
    "MODELPORT_LOG_FORMAT",
];

fn clear_env() {
    for var in &ENV_VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

#[test]
fn test_default_config() {
    let config = PortConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.harness.atol, 1e-5);
    assert_eq!(config.harness.rtol, 1e-3);
    assert_eq!(config.harness.seed, 0);
    assert_eq!(config.harness.sample_shape, vec![10]);
    assert_eq!(config.archive.staging, StagingMode::Memory);
    assert_eq!(config.export.representations, RepresentationKind::ALL.to_vec());
}

#[test]
fn test_config_validation() {
    let mut config = PortConfig::default();
    config.harness.atol = -1.0;
    assert!(config.validate().is_err());

    config = PortConfig::default();
    config.harness.rtol = f64::NAN;
    assert!(config.validate().is_err());

    config = PortConfig::default();
    config.harness.sample_shape = vec![1, 0];
    assert!(config.validate().is_err());

    config = PortConfig::default();
    config.harness.timeout_ms = 0;
    assert!(config.validate().is_err());

    config = PortConfig::default();
    config.export.representations.clear();
    assert!(config.validate().is_err());

    config = PortConfig::default();
    config.logging.format = "xml".into();
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_toml_config_loading() {
    clear_env();

    let toml_content = r#"
[archive]
staging = "tempfile"

[harness]
atol = 1e-4
seed = 42
sample_shape = [2, 10]

[export]
representations = ["trace", "engine"]
"#;

    let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
    temp_file.write_all(toml_content.as_bytes()).unwrap();

    let config = PortConfig::from_file(temp_file.path()).unwrap();
    assert_eq!(config.archive.staging, StagingMode::TempFile);
    assert_eq!(config.harness.atol, 1e-4);
    assert_eq!(config.harness.rtol, 1e-3); // default preserved
    assert_eq!(config.harness.seed, 42);
    assert_eq!(config.harness.sample_shape, vec![2, 10]);
    assert_eq!(config.export.representations, vec![RepresentationKind::Trace, RepresentationKind::Engine]);
}

#[test]
#[serial]
fn test_json_config_loading() {
    clear_env();

    let json_content = r#"
{
    "harness": { "rtol": 0.01, "timeout_ms": 500 },
    "logging": { "level": "debug", "format": "json" }
}
"#;

    let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
    temp_file.write_all(json_content.as_bytes()).unwrap();

    let config = PortConfig::from_file(temp_file.path()).unwrap();
    assert_eq!(config.harness.rtol, 0.01);
    assert_eq!(config.harness.timeout_ms, 500);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_unsupported_extension() {
    let temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
    let err = PortConfig::from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedExtension { .. }));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = PortConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();

    unsafe {
        env::set_var("MODELPORT_ATOL", "0.5");
        env::set_var("MODELPORT_SEED", "7");
        env::set_var("MODELPORT_SAMPLE_SHAPE", "1x10");
        env::set_var("MODELPORT_STAGING", "tempfile");
        env::set_var("MODELPORT_REPRESENTATIONS", "graph, trace");
    }

    let config = PortConfig::from_env().unwrap();
    assert_eq!(config.harness.atol, 0.5);
    assert_eq!(config.harness.seed, 7);
    assert_eq!(config.harness.sample_shape, vec![1, 10]);
    assert_eq!(config.archive.staging, StagingMode::TempFile);
    assert_eq!(config.export.representations, vec![RepresentationKind::Graph, RepresentationKind::Trace]);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_value() {
    clear_env();

    unsafe {
        env::set_var("MODELPORT_RTOL", "not-a-number");
    }
    let err = PortConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MODELPORT_RTOL"));

    clear_env();
}

#[test]
fn test_config_merging() {
    let mut base = PortConfig::default();
    base.harness.atol = 1e-3;
    base.harness.seed = 9;

    let mut overrides = PortConfig::default();
    overrides.harness.seed = 11;
    overrides.archive.staging = StagingMode::TempFile;

    base.merge_with(overrides);

    assert_eq!(base.harness.atol, 1e-3); // preserved
    assert_eq!(base.harness.seed, 11); // overridden
    assert_eq!(base.archive.staging, StagingMode::TempFile);
}

#[test]
#[serial]
fn test_config_loader_precedence() {
    clear_env();

    let toml_content = r#"
[harness]
seed = 3
atol = 2e-5
"#;

    let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
    temp_file.write_all(toml_content.as_bytes()).unwrap();

    unsafe {
        env::set_var("MODELPORT_SEED", "5");
    }

    let config = ConfigLoader::load_with_precedence(Some(temp_file.path())).unwrap();

    // Environment overrides file
    assert_eq!(config.harness.seed, 5);
    // File overrides default
    assert_eq!(config.harness.atol, 2e-5);

    clear_env();
}

#[test]
fn test_parse_shape() {
    assert_eq!(parse_shape("10").unwrap(), vec![10]);
    assert_eq!(parse_shape("1, 10").unwrap(), vec![1, 10]);
    assert_eq!(parse_shape("2x3x4").unwrap(), vec![2, 3, 4]);
    assert!(parse_shape("").is_err());
    assert!(parse_shape("1,0").is_err());
    assert!(parse_shape("a,b").is_err());
}

#[test]
fn test_parse_representations() {
    assert_eq!(
        parse_representations("engine,engine,trace").unwrap(),
        vec![RepresentationKind::Engine, RepresentationKind::Trace]
    );
    assert!(parse_representations("bogus").is_err());
    assert!(parse_representations(" , ").is_err());
}
