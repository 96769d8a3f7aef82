//! Minimal installer ISO builder.
//!
//! Turns a full live ISO into a minimal one that fetches its rootfs over the
//! network, optionally carrying a ram disk with `nmstatectl` for early
//! network configuration. See [`minimal`] for the pipeline.

pub mod artifact;
pub mod bootcfg;
pub mod commands;
pub mod config;
pub mod error;
pub mod iso;
pub mod layout;
pub mod minimal;
pub mod preflight;
pub mod process;
pub mod rootfs;
pub mod timing;
pub mod version;

pub use error::EditError;
pub use minimal::{EditorConfig, MinimalIsoBuilder, MinimalIsoRequest};
