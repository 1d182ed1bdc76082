//! Library half of the `hipk` binary, exposed for argument-parsing tests.

pub mod commands;
pub mod exit;
pub mod logging;
