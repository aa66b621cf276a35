//! # patisserie-core
//!
//! Configuration types shared by the Patisserie crates.
//!
//! The protocol crate never reads files or environment variables on its own;
//! callers that want file-driven settings load a [`MacaroonConfig`] here and
//! hand its parts to builders, verifiers and decoders.

pub mod config;

pub use config::{
    ConfigError, Limits, MacaroonConfig, SerializationFormat, SerializationSettings,
    VerifierSettings,
};
