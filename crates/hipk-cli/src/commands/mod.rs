//! CLI command implementations

pub mod info;
pub mod run;

pub use info::InfoCommand;
pub use run::RunCommand;
