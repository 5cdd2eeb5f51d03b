//! Subcommand implementations

pub mod init;
pub mod reset;
pub mod run;
pub mod status;
