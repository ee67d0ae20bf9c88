//! # launchwrap
//!
//! The launcher: command-line surface, configuration, built-in units, the
//! exit hook, and the launch flow that wires them into `launchwrap-core`.

pub mod builtin;
pub mod cli;
pub mod config;
pub mod shutdown;
