//! tlsn-plugin-host: sandboxed plugin runtime for TLSNotary proofs
//!
//! This library provides:
//! - A QuickJS plugin host with capability injection and a reactive render loop
//! - Permission validation for plugin `prove` and `openWindow` calls
//! - An HTTP transcript parser with exact byte ranges
//! - Range extraction from reveal handlers
//! - A prove pipeline over an opaque prover

pub mod cli;
pub mod config;
pub mod core;
pub mod plugins;
pub mod policy;
pub mod prove;
pub mod reveal;
pub mod transcript;

pub use config::HostConfig;
pub use core::errors::{ExecutionError, ParseError, PermissionError, RangeExtractionError, SandboxError};
pub use plugins::Host;
pub use transcript::HttpMessage;
