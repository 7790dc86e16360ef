//! Chunked transfer-encoding decoding with offset mapping
//!
//! Body ranges are always reported against the original (still chunked)
//! transcript. [`OffsetMap`] translates offsets in the decoded payload back to
//! offsets in the original buffer, one segment per chunk.

use super::Range;

/// One contiguous run of decoded bytes and where it lives in the original buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub decoded_start: usize,
    pub original_start: usize,
    pub len: usize,
}

/// Decoded-offset to original-offset translation for a message body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    segments: Vec<Segment>,
    /// Original offset reported for the empty tail of the payload
    tail: usize,
}

impl OffsetMap {
    /// Identity map for a body that sits contiguously at `original_start`
    pub fn contiguous(original_start: usize, len: usize) -> Self {
        Self {
            segments: vec![Segment {
                decoded_start: 0,
                original_start,
                len,
            }],
            tail: original_start + len,
        }
    }

    /// Map a decoded offset that begins a range
    pub fn map_start(&self, decoded: usize) -> usize {
        self.segments
            .iter()
            .find(|seg| decoded >= seg.decoded_start && decoded < seg.decoded_start + seg.len)
            .map(|seg| seg.original_start + (decoded - seg.decoded_start))
            .unwrap_or(self.tail)
    }

    /// Map a decoded offset that ends a range (exclusive)
    pub fn map_end(&self, decoded: usize) -> usize {
        if decoded == 0 {
            return self.map_start(0);
        }
        self.map_start(decoded - 1) + 1
    }

    /// Map a decoded half-open range into the original buffer.
    ///
    /// A range crossing a chunk boundary covers the chunk framing in between.
    pub fn map_range(&self, range: Range) -> Range {
        let start = self.map_start(range.start);
        if range.end <= range.start {
            return Range { start, end: start };
        }
        Range {
            start,
            end: self.map_end(range.end).max(start),
        }
    }
}

/// Result of decoding a chunked body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dechunked {
    /// Concatenated chunk payloads
    pub data: Vec<u8>,
    /// Offset in the original buffer just past the terminating chunk
    pub original_end: usize,
    pub offsets: OffsetMap,
}

/// Decode a chunked body starting at `start`.
///
/// Chunk extensions after `;` are ignored. Decoding stops at the zero-size
/// chunk, at a size line that is not hex, or at the end of the buffer.
pub fn dechunk(data: &[u8], start: usize) -> Dechunked {
    let mut decoded = Vec::new();
    let mut segments = Vec::new();
    let mut offset = start;

    while offset < data.len() {
        let Some(size_end) = find_crlf(data, offset) else {
            break;
        };

        let size_line = String::from_utf8_lossy(&data[offset..size_end]);
        let size_field = size_line.split(';').next().unwrap_or("").trim();
        let Ok(size) = usize::from_str_radix(size_field, 16) else {
            tracing::debug!("Stopping dechunk at non-hex size line: {:?}", size_field);
            break;
        };

        offset = size_end + 2;

        if size == 0 {
            offset = (offset + 2).min(data.len());
            break;
        }

        let chunk_end = (offset + size).min(data.len());
        segments.push(Segment {
            decoded_start: decoded.len(),
            original_start: offset,
            len: chunk_end - offset,
        });
        decoded.extend_from_slice(&data[offset..chunk_end]);

        offset = (chunk_end + 2).min(data.len());
    }

    let tail = segments
        .last()
        .map(|seg: &Segment| seg.original_start + seg.len)
        .unwrap_or(start);

    Dechunked {
        data: decoded,
        original_end: offset.min(data.len()),
        offsets: OffsetMap { segments, tail },
    }
}

pub(crate) fn find_crlf(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|pos| from + pos)
}
