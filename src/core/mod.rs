//! Core domain modules
//!
//! Types shared by the parser, the range extractor, the permission layer and
//! the plugin host.

pub mod errors;

pub use errors::{
    ExecutionError, ParseError, PermissionError, RangeExtractionError, SandboxError,
};
