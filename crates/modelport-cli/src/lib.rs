//! Library side of the `modelport` binary: subcommands, exit codes,
//! logging setup and output rendering.

pub mod commands;
pub mod exit;
pub mod logging;
pub mod output;
