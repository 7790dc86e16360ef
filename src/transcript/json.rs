//! Byte-accurate span indexing for JSON bodies
//!
//! `serde_json` decides whether a body is JSON and produces the values; this
//! module walks the same text byte by byte to find where every field lives.
//! Spans are byte offsets into the UTF-8 text, so multi-byte characters before
//! a field never shift its range.

use super::Range;
use serde_json::Value;

/// One indexed JSON field
#[derive(Debug, Clone, PartialEq)]
pub struct JsonField {
    pub value: Value,
    /// `"key": value` for object fields, the element itself for array elements
    pub range: Range,
    /// Only object fields carry a key range
    pub key_range: Option<Range>,
    pub value_range: Range,
}

impl JsonField {
    pub fn is_array_element(&self) -> bool {
        self.key_range.is_none()
    }
}

/// Index every nested field of `root` by its flattened path.
///
/// Paths join object keys with `.` and append array indices as `[i]`
/// (`a.b[2].c`). A top-level array yields paths starting with `[0]`.
/// Returns `None` if the text does not have the shape of `root`.
pub fn index_fields(text: &str, root: &Value) -> Option<Vec<(String, JsonField)>> {
    let mut scanner = Scanner {
        bytes: text.as_bytes(),
        pos: 0,
    };
    let mut out = Vec::new();
    scanner.walk(root, "", &mut out)?;
    Some(out)
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    /// Scan one value, recording nested fields under `path`
    fn walk(&mut self, value: &Value, path: &str, out: &mut Vec<(String, JsonField)>) -> Option<Range> {
        self.skip_ws();
        let start = self.pos;
        match self.peek()? {
            b'{' => self.walk_object(value, path, out)?,
            b'[' => self.walk_array(value, path, out)?,
            b'"' => {
                self.scan_string()?;
            }
            _ => self.scan_literal(),
        }
        Some(Range {
            start,
            end: self.pos,
        })
    }

    fn walk_object(&mut self, value: &Value, path: &str, out: &mut Vec<(String, JsonField)>) -> Option<()> {
        self.expect(b'{')?;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Some(());
        }

        loop {
            self.skip_ws();
            let key_range = self.scan_string()?;
            let key: String = serde_json::from_slice(&self.bytes[key_range.start..key_range.end]).ok()?;
            self.expect(b':')?;

            let child = value.get(&key).unwrap_or(&Value::Null);
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", path, key)
            };
            let value_range = self.walk(child, &child_path, out)?;

            out.push((
                child_path,
                JsonField {
                    value: child.clone(),
                    range: Range {
                        start: key_range.start,
                        end: value_range.end,
                    },
                    key_range: Some(key_range),
                    value_range,
                },
            ));

            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b'}' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn walk_array(&mut self, value: &Value, path: &str, out: &mut Vec<(String, JsonField)>) -> Option<()> {
        self.expect(b'[')?;
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Some(());
        }

        let mut index = 0usize;
        loop {
            let child = value.get(index).unwrap_or(&Value::Null);
            let child_path = format!("{}[{}]", path, index);
            let value_range = self.walk(child, &child_path, out)?;

            out.push((
                child_path,
                JsonField {
                    value: child.clone(),
                    range: value_range,
                    key_range: None,
                    value_range,
                },
            ));

            index += 1;
            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b']' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    /// Scan a quoted string including both quotes
    fn scan_string(&mut self) -> Option<Range> {
        let start = self.pos;
        if self.peek()? != b'"' {
            return None;
        }
        self.pos += 1;
        loop {
            match self.peek()? {
                b'\\' => self.pos += 2,
                b'"' => {
                    self.pos += 1;
                    return Some(Range {
                        start,
                        end: self.pos,
                    });
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Numbers, `true`, `false` and `null`
    fn scan_literal(&mut self) {
        while let Some(b) = self.peek() {
            if matches!(b, b',' | b']' | b'}' | b' ' | b'\t' | b'\n' | b'\r') {
                break;
            }
            self.pos += 1;
        }
    }
}
