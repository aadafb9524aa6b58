//! meshspider command line front end.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, ProbeArgs};
