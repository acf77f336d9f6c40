//! # chime-core
//!
//! Core error and configuration types shared by the Chime sound crates.

pub mod config;
pub mod error;

pub use config::{OutputConfig, SoundConfig};
pub use error::{Error, LoadError, Result};
