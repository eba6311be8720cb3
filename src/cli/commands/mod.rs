//! Command execution for each subcommand.

pub mod build;
pub mod install_app_deps;
