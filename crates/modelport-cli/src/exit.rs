// Exit codes for CI triage
use modelport_common::{ArchiveError, ConfigError, ModelError};
use modelport_crossval::PipelineError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_RECONSTRUCT: i32 = 3;
pub const EXIT_DIVERGED: i32 = 5;

/// Map an error that escaped a command to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<PipelineError>() {
        return if e.is_reconstruction() { EXIT_RECONSTRUCT } else { EXIT_GENERIC_FAIL };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<ModelError>() {
        Some(ModelError::Skeleton(_)) => return EXIT_CONFIG,
        Some(_) => return EXIT_RECONSTRUCT,
        None => {}
    }
    if err.downcast_ref::<ArchiveError>().is_some() {
        return EXIT_RECONSTRUCT;
    }
    EXIT_GENERIC_FAIL
}
