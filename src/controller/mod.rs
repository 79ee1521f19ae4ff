//! Announcement loop state machine and the console commands that drive it.

mod commands;
mod loop_controller;

pub use commands::{Flow, HELP, execute, parse_command};
pub use loop_controller::{LoopConfig, LoopController};
