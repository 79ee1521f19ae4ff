//! Configuration module for the price announcer.
//!
//! Provides CLI argument parsing, the asset catalogue, and schedule types.

mod assets;
#[allow(clippy::module_inception)]
mod config;

pub use assets::Asset;
pub use config::{AppConfig, PollInterval, ScheduleConfig};
