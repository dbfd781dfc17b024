//! Command-line surface over the session core

pub mod app;
pub mod commands;
pub mod ui;

pub use app::{Cli, Commands};
