//! CLI command implementations

pub mod init_index;
pub mod run;
pub mod show_config;
