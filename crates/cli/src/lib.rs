//! fwatch command-line front end
//!
//! Exposed as a library so the commands, configuration and manifest
//! handling can be tested directly.

pub mod cmd;
pub mod config;
pub mod logging;
pub mod manifest;
pub mod util;
