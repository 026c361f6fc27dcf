// src/config/mod.rs

//! Configuration loading and validation for cinder.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and merge CLI overrides (`loader.rs`).
//! - Validate it and prepare the work directory (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_overrides, load_and_validate, load_from_path};
pub use model::{ConfigOverrides, RawConfigFile, ServerConfig, ServerSection};
