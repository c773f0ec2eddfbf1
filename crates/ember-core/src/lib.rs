//! Ember Core - configuration, sandboxing and command policy for ember
//!
//! This crate provides the leaf components the tool-calling agent is built on:
//! - Configuration management
//! - Project-root confined file access
//! - Shell command filtering and launch planning
//! - Shared types

pub mod command;
pub mod config;
pub mod sandbox;
pub mod types;

pub use command::{CommandError, CommandFilter, CommandPlan};
pub use config::{Config, ConfigError};
pub use sandbox::{Sandbox, SandboxError};
pub use types::*;
