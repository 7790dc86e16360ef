//! Reveal handlers and range extraction
//!
//! Turns the handler list a plugin passes to `prove` into the exact byte
//! ranges of the sent and received transcripts to disclose.

pub mod extractor;
pub mod handler;

pub use extractor::{extract_ranges, process_handlers, ProcessedRanges, RangeWithHandler};
pub use handler::{Handler, HandlerAction, HandlerParams, HandlerPart, HandlerType, ParamsType};
