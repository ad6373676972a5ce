//! Subcommand implementations

pub mod inspect;
pub mod pack;
pub mod verify;

pub use inspect::InspectCommand;
pub use pack::{PackCommand, TensorSource};
pub use verify::VerifyCommand;
