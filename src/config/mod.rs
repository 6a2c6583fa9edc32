// src/config/mod.rs

//! Configuration loading and validation for tandem.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from an explicit path (`loader.rs`).
//! - Validate names, references and option values (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{CommandSection, ConfigFile, IdleSection, OptionsSection, ProbeSection, RawConfigFile};
pub use validate::validate_raw_config;
