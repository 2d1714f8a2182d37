//! plunk-migrate library - exports modules for testing

pub mod cmd;
pub mod config;
pub mod elastic;
pub mod mongo;
