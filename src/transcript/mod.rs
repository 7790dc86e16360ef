//! HTTP transcript parsing
//!
//! Everything here is pure and synchronous. Offsets are byte offsets into the
//! transcript exactly as it was sent or received.

pub mod chunked;
pub mod json;
pub mod parser;

pub use json::JsonField;
pub use parser::{
    Body, BodySelector, HideOptions, HttpMessage, JsonBody, ParsedHeader, ParsedValue, Ranges,
    StartLine,
};

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` into a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
