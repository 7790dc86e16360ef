//! HTTP message parser with byte range tracking
//!
//! Parses a raw request or response once, up front, and records the byte
//! range of every element: start line tokens, each header (whole line, key,
//! value) and every nested field of a JSON body. Ranges always index the
//! original buffer, including for chunked bodies.

use super::chunked::{self, find_crlf, OffsetMap};
use super::json::{self, JsonField};
use super::Range;
use crate::core::errors::{ParseError, RangeExtractionError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// A value together with where it was found
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue<T> {
    pub value: T,
    pub range: Range,
}

/// One header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    /// Value with surrounding whitespace trimmed
    pub value: String,
    /// The whole `Key: Value` line, without CRLF
    pub range: Range,
    pub key_range: Range,
    /// Starts after leading whitespace and runs to the end of the line
    pub value_range: Range,
}

/// Start line of a request or a response
#[derive(Debug, Clone, PartialEq)]
pub enum StartLine {
    Request {
        method: ParsedValue<String>,
        request_target: ParsedValue<String>,
        protocol: ParsedValue<String>,
    },
    Response {
        protocol: ParsedValue<String>,
        status_code: ParsedValue<String>,
        reason_phrase: ParsedValue<String>,
    },
}

/// Parsed JSON body: the value plus every field indexed by path
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody {
    pub value: Value,
    fields: HashMap<String, JsonField>,
}

impl JsonBody {
    pub fn field(&self, path: &str) -> Option<&JsonField> {
        self.fields.get(path)
    }
}

/// Message body after transfer decoding
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Decoded bytes; the range covers the body in the original buffer
    pub raw: ParsedValue<Vec<u8>>,
    /// Present when the decoded bytes are valid UTF-8
    pub text: Option<ParsedValue<String>>,
    /// Present when the body is JSON by content type or by shape and parses
    pub json: Option<JsonBody>,
    offsets: OffsetMap,
}

impl Body {
    /// Translate a range within the decoded body into the original buffer
    pub fn map_range(&self, range: Range) -> Range {
        self.offsets.map_range(range)
    }
}

/// `hideKey` / `hideValue` selection for headers and JSON fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HideOptions {
    pub hide_key: bool,
    pub hide_value: bool,
}

impl HideOptions {
    pub fn hide_key() -> Self {
        Self {
            hide_key: true,
            hide_value: false,
        }
    }

    pub fn hide_value() -> Self {
        Self {
            hide_key: false,
            hide_value: true,
        }
    }

    fn check(self) -> Result<Self, RangeExtractionError> {
        if self.hide_key && self.hide_value {
            Err(RangeExtractionError::HideKeyAndValue)
        } else {
            Ok(self)
        }
    }
}

/// How to select within a body
#[derive(Debug, Clone, Copy)]
pub enum BodySelector<'a> {
    /// Flattened JSON path (`a.b[2].c`)
    Json(&'a str),
    /// Every match in the body text
    Regex(&'a regex::Regex),
    /// The whole body, only if it is valid UTF-8
    Text,
    XPath,
}

/// An immutable, fully parsed HTTP request or response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpMessage {
    data: Vec<u8>,
    start_line: ParsedValue<String>,
    kind: StartLine,
    /// Lower-cased key order of first appearance; duplicates keep the last line
    headers: Vec<(String, ParsedHeader)>,
    body: Option<Body>,
}

impl HttpMessage {
    /// Parse raw transcript bytes
    pub fn parse(data: impl Into<Vec<u8>>) -> Result<Self, ParseError> {
        let data = data.into();

        let start_line_end = find_crlf(&data, 0).ok_or(ParseError::MissingStartLineCrlf)?;
        let line = &data[..start_line_end];
        let start_line = ParsedValue {
            value: String::from_utf8_lossy(line).into_owned(),
            range: Range {
                start: 0,
                end: start_line_end,
            },
        };

        let kind = if line.starts_with(b"HTTP/") {
            parse_status_line(line)?
        } else {
            parse_request_line(line)?
        };

        let (headers, body_start) = parse_headers(&data, start_line_end + 2)?;

        let mut message = Self {
            data,
            start_line,
            kind,
            headers,
            body: None,
        };
        if body_start < message.data.len() {
            message.body = Some(message.parse_body(body_start));
        }

        tracing::debug!(
            "Parsed HTTP {} with {} headers, body: {}",
            if message.is_request() { "request" } else { "response" },
            message.headers.len(),
            message.body.as_ref().map(|b| b.raw.value.len()).unwrap_or(0)
        );

        Ok(message)
    }

    fn parse_body(&self, start: usize) -> Body {
        let transfer_encoding = self
            .header("transfer-encoding")
            .map(|h| h.value.to_ascii_lowercase())
            .unwrap_or_default();
        let content_type = self
            .header("content-type")
            .map(|h| h.value.to_ascii_lowercase())
            .unwrap_or_default();

        let (bytes, end, offsets) = if transfer_encoding == "chunked" {
            let decoded = chunked::dechunk(&self.data, start);
            (decoded.data, decoded.original_end, decoded.offsets)
        } else {
            let bytes = self.data[start..].to_vec();
            let len = bytes.len();
            (bytes, self.data.len(), OffsetMap::contiguous(start, len))
        };

        let range = Range { start, end };
        let text = std::str::from_utf8(&bytes).ok().map(|s| ParsedValue {
            value: s.to_string(),
            range,
        });

        let json = text.as_ref().and_then(|text| {
            if content_type.contains("application/json") || looks_like_json(&text.value) {
                index_json(&text.value, &offsets)
            } else {
                None
            }
        });

        Body {
            raw: ParsedValue { value: bytes, range },
            text,
            json,
            offsets,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, StartLine::Request { .. })
    }

    pub fn start_line(&self) -> &ParsedValue<String> {
        &self.start_line
    }

    pub fn kind(&self) -> &StartLine {
        &self.kind
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&ParsedHeader> {
        let name = name.to_ascii_lowercase();
        self.headers.iter().find(|(k, _)| *k == name).map(|(_, h)| h)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &ParsedHeader)> {
        self.headers.iter().map(|(k, h)| (k.as_str(), h))
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Range queries over this message
    pub fn ranges(&self) -> Ranges<'_> {
        Ranges { message: self }
    }

    /// Summary of the message as JSON: start line fields, headers, body
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("startLine".into(), json!(self.start_line.value));
        match &self.kind {
            StartLine::Request {
                method,
                request_target,
                protocol,
            } => {
                out.insert("method".into(), json!(method.value));
                out.insert("requestTarget".into(), json!(request_target.value));
                out.insert("protocol".into(), json!(protocol.value));
            }
            StartLine::Response {
                protocol,
                status_code,
                reason_phrase,
            } => {
                out.insert("protocol".into(), json!(protocol.value));
                out.insert("statusCode".into(), json!(status_code.value));
                out.insert("reasonPhrase".into(), json!(reason_phrase.value));
            }
        }

        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, h)| (k.clone(), json!(h.value)))
            .collect();
        out.insert("headers".into(), Value::Object(headers));

        if let Some(body) = &self.body {
            if let Some(json_body) = &body.json {
                out.insert("body".into(), json_body.value.clone());
            } else if let Some(text) = &body.text {
                out.insert("body".into(), json!(text.value));
            }
        }

        Value::Object(out)
    }
}

/// Range accessors for a parsed message
pub struct Ranges<'a> {
    message: &'a HttpMessage,
}

impl Ranges<'_> {
    pub fn start_line(&self) -> Vec<Range> {
        vec![self.message.start_line.range]
    }

    pub fn protocol(&self) -> Vec<Range> {
        match &self.message.kind {
            StartLine::Request { protocol, .. } | StartLine::Response { protocol, .. } => {
                vec![protocol.range]
            }
        }
    }

    pub fn method(&self) -> Result<Vec<Range>, RangeExtractionError> {
        match &self.message.kind {
            StartLine::Request { method, .. } => Ok(vec![method.range]),
            StartLine::Response { .. } => Err(RangeExtractionError::WrongMessageKind {
                part: "method",
                expected: "requests",
            }),
        }
    }

    pub fn request_target(&self) -> Result<Vec<Range>, RangeExtractionError> {
        match &self.message.kind {
            StartLine::Request { request_target, .. } => Ok(vec![request_target.range]),
            StartLine::Response { .. } => Err(RangeExtractionError::WrongMessageKind {
                part: "requestTarget",
                expected: "requests",
            }),
        }
    }

    pub fn status_code(&self) -> Result<Vec<Range>, RangeExtractionError> {
        match &self.message.kind {
            StartLine::Response { status_code, .. } => Ok(vec![status_code.range]),
            StartLine::Request { .. } => Err(RangeExtractionError::WrongMessageKind {
                part: "statusCode",
                expected: "responses",
            }),
        }
    }

    /// One header; an absent header yields no ranges
    pub fn header(&self, name: &str, options: HideOptions) -> Result<Vec<Range>, RangeExtractionError> {
        let options = options.check()?;
        Ok(self
            .message
            .header(name)
            .map(|h| vec![select_header(h, options)])
            .unwrap_or_default())
    }

    /// Every header, in order of first appearance
    pub fn all_headers(&self, options: HideOptions) -> Result<Vec<Range>, RangeExtractionError> {
        let options = options.check()?;
        Ok(self
            .message
            .headers
            .iter()
            .map(|(_, h)| select_header(h, options))
            .collect())
    }

    /// Body ranges. `None` selects the whole body.
    ///
    /// JSON array elements have no key, so hide options other than both
    /// flags at once are ignored for them.
    pub fn body(
        &self,
        selector: Option<BodySelector<'_>>,
        options: HideOptions,
    ) -> Result<Vec<Range>, RangeExtractionError> {
        let Some(body) = &self.message.body else {
            return match selector {
                Some(BodySelector::XPath) => Err(RangeExtractionError::XPathNotImplemented),
                _ => Ok(Vec::new()),
            };
        };

        match selector {
            None => Ok(vec![body.raw.range]),
            Some(BodySelector::Json(path)) => {
                let options = options.check()?;
                let json = body.json.as_ref().ok_or(RangeExtractionError::BodyNotJson)?;
                let Some(field) = json.field(path) else {
                    return Ok(Vec::new());
                };
                let range = match field.key_range {
                    None => field.value_range,
                    Some(_) if options.hide_key => field.value_range,
                    Some(key_range) if options.hide_value => key_range,
                    Some(_) => field.range,
                };
                Ok(vec![range])
            }
            Some(BodySelector::Regex(re)) => {
                let text = body.text.as_ref().ok_or(RangeExtractionError::BodyNotText)?;
                Ok(re
                    .find_iter(&text.value)
                    .map(|m| {
                        body.map_range(Range {
                            start: m.start(),
                            end: m.end(),
                        })
                    })
                    .collect())
            }
            Some(BodySelector::Text) => {
                let text = body.text.as_ref().ok_or(RangeExtractionError::BodyNotText)?;
                Ok(vec![text.range])
            }
            Some(BodySelector::XPath) => Err(RangeExtractionError::XPathNotImplemented),
        }
    }

    /// Every match over the whole transcript, headers included
    pub fn regex(&self, re: &regex::bytes::Regex) -> Vec<Range> {
        re.find_iter(&self.message.data)
            .map(|m| Range {
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }

    pub fn all(&self) -> Vec<Range> {
        vec![Range {
            start: 0,
            end: self.message.data.len(),
        }]
    }
}

fn select_header(header: &ParsedHeader, options: HideOptions) -> Range {
    if options.hide_key {
        header.value_range
    } else if options.hide_value {
        header.key_range
    } else {
        header.range
    }
}

fn parse_request_line(line: &[u8]) -> Result<StartLine, ParseError> {
    let tokens: Vec<&[u8]> = line.split(|b| *b == b' ').collect();
    if tokens.len() < 3 {
        return Err(ParseError::InvalidRequestLine(
            String::from_utf8_lossy(line).into_owned(),
        ));
    }

    let method = tokens[0];
    let protocol = tokens[tokens.len() - 1];
    let method_end = method.len();
    let protocol_start = line.len() - protocol.len();
    // Everything between the first and last space, spaces included
    let target = Range {
        start: method_end + 1,
        end: protocol_start - 1,
    };

    Ok(StartLine::Request {
        method: ParsedValue {
            value: String::from_utf8_lossy(method).into_owned(),
            range: Range {
                start: 0,
                end: method_end,
            },
        },
        request_target: ParsedValue {
            value: String::from_utf8_lossy(&line[target.start..target.end]).into_owned(),
            range: target,
        },
        protocol: ParsedValue {
            value: String::from_utf8_lossy(protocol).into_owned(),
            range: Range {
                start: protocol_start,
                end: line.len(),
            },
        },
    })
}

fn parse_status_line(line: &[u8]) -> Result<StartLine, ParseError> {
    let tokens: Vec<&[u8]> = line.splitn(3, |b| *b == b' ').collect();
    if tokens.len() < 2 {
        return Err(ParseError::InvalidResponseLine(
            String::from_utf8_lossy(line).into_owned(),
        ));
    }

    let protocol = tokens[0];
    let status = tokens[1];
    let reason = tokens.get(2).copied().unwrap_or(&[]);

    let protocol_end = protocol.len();
    let status_start = protocol_end + 1;
    let status_end = status_start + status.len();
    let reason_start = if reason.is_empty() {
        status_end
    } else {
        status_end + 1
    };

    Ok(StartLine::Response {
        protocol: ParsedValue {
            value: String::from_utf8_lossy(protocol).into_owned(),
            range: Range {
                start: 0,
                end: protocol_end,
            },
        },
        status_code: ParsedValue {
            value: String::from_utf8_lossy(status).into_owned(),
            range: Range {
                start: status_start,
                end: status_end,
            },
        },
        reason_phrase: ParsedValue {
            value: String::from_utf8_lossy(reason).into_owned(),
            range: Range {
                start: reason_start,
                end: line.len(),
            },
        },
    })
}

fn parse_headers(data: &[u8], mut offset: usize) -> Result<(Vec<(String, ParsedHeader)>, usize), ParseError> {
    let mut headers: Vec<(String, ParsedHeader)> = Vec::new();

    while offset < data.len() {
        if data[offset..].starts_with(b"\r\n") {
            offset += 2;
            break;
        }

        let line_end = find_crlf(data, offset).ok_or(ParseError::MissingHeaderCrlf)?;
        let line = &data[offset..line_end];
        let colon = line.iter().position(|b| *b == b':').ok_or_else(|| {
            ParseError::InvalidHeaderLine(String::from_utf8_lossy(line).into_owned())
        })?;

        let key = String::from_utf8_lossy(&line[..colon]).to_ascii_lowercase();
        let raw_value = &line[colon + 1..];
        let leading = raw_value
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();

        let key_end = offset + colon;
        let header = ParsedHeader {
            value: String::from_utf8_lossy(raw_value).trim().to_string(),
            range: Range {
                start: offset,
                end: line_end,
            },
            key_range: Range {
                start: offset,
                end: key_end,
            },
            value_range: Range {
                start: key_end + 1 + leading,
                end: line_end,
            },
        };

        match headers.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = header,
            None => headers.push((key, header)),
        }

        offset = line_end + 2;
    }

    Ok((headers, offset.min(data.len())))
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

fn index_json(text: &str, offsets: &OffsetMap) -> Option<JsonBody> {
    let value: Value = serde_json::from_str(text).ok()?;
    let fields = json::index_fields(text, &value)?
        .into_iter()
        .map(|(path, mut field)| {
            field.range = offsets.map_range(field.range);
            field.value_range = offsets.map_range(field.value_range);
            field.key_range = field.key_range.map(|r| offsets.map_range(r));
            (path, field)
        })
        .collect();
    Some(JsonBody { value, fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(message: &HttpMessage, range: Range) -> &str {
        std::str::from_utf8(&message.data()[range.start..range.end]).unwrap()
    }

    const REQUEST: &str = "GET /path?q=1 HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";

    #[test]
    fn test_parse_request_line() {
        let msg = HttpMessage::parse(REQUEST).unwrap();
        assert!(msg.is_request());
        let r = msg.ranges();
        assert_eq!(text(&msg, r.method().unwrap()[0]), "GET");
        assert_eq!(text(&msg, r.request_target().unwrap()[0]), "/path?q=1");
        assert_eq!(text(&msg, r.protocol()[0]), "HTTP/1.1");
        assert_eq!(text(&msg, r.start_line()[0]), "GET /path?q=1 HTTP/1.1");
        assert!(msg.body().is_none());
    }

    #[test]
    fn test_request_target_with_spaces() {
        let msg = HttpMessage::parse("GET /a b c HTTP/1.1\r\n\r\n").unwrap();
        let range = msg.ranges().request_target().unwrap()[0];
        assert_eq!(text(&msg, range), "/a b c");
        match msg.kind() {
            StartLine::Request { request_target, .. } => assert_eq!(request_target.value, "/a b c"),
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn test_parse_response_line() {
        let msg = HttpMessage::parse("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").unwrap();
        assert!(!msg.is_request());
        assert_eq!(text(&msg, msg.ranges().status_code().unwrap()[0]), "404");
        match msg.kind() {
            StartLine::Response { reason_phrase, .. } => {
                assert_eq!(reason_phrase.value, "Not Found");
                assert_eq!(text(&msg, reason_phrase.range), "Not Found");
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn test_wrong_kind_queries() {
        let response = HttpMessage::parse("HTTP/1.1 200 OK\r\n\r\n").unwrap();
        assert_eq!(
            response.ranges().method().unwrap_err().to_string(),
            "method() is only available for requests"
        );
        assert!(response.ranges().request_target().is_err());

        let request = HttpMessage::parse(REQUEST).unwrap();
        assert_eq!(
            request.ranges().status_code().unwrap_err().to_string(),
            "statusCode() is only available for responses"
        );
    }

    #[test]
    fn test_malformed_messages() {
        assert_eq!(
            HttpMessage::parse("GET / HTTP/1.1").unwrap_err(),
            ParseError::MissingStartLineCrlf
        );
        assert!(matches!(
            HttpMessage::parse("GET /\r\n\r\n").unwrap_err(),
            ParseError::InvalidRequestLine(_)
        ));
        assert!(matches!(
            HttpMessage::parse("HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::InvalidResponseLine(_)
        ));
        assert_eq!(
            HttpMessage::parse("GET / HTTP/1.1\r\nHost: x").unwrap_err(),
            ParseError::MissingHeaderCrlf
        );
        assert!(matches!(
            HttpMessage::parse("GET / HTTP/1.1\r\nbroken\r\n\r\n").unwrap_err(),
            ParseError::InvalidHeaderLine(line) if line == "broken"
        ));
    }

    #[test]
    fn test_header_ranges() {
        let msg = HttpMessage::parse(REQUEST).unwrap();
        let r = msg.ranges();
        assert_eq!(text(&msg, r.header("Host", HideOptions::default()).unwrap()[0]), "Host: example.com");
        assert_eq!(text(&msg, r.header("host", HideOptions::hide_key()).unwrap()[0]), "example.com");
        assert_eq!(text(&msg, r.header("HOST", HideOptions::hide_value()).unwrap()[0]), "Host");
        assert!(r.header("missing", HideOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_header_hide_both_always_raises() {
        let msg = HttpMessage::parse(REQUEST).unwrap();
        let both = HideOptions {
            hide_key: true,
            hide_value: true,
        };
        assert_eq!(
            msg.ranges().header("missing", both).unwrap_err(),
            RangeExtractionError::HideKeyAndValue
        );
        assert!(msg.ranges().all_headers(both).is_err());
    }

    #[test]
    fn test_header_value_range_keeps_trailing_whitespace() {
        let msg = HttpMessage::parse("GET / HTTP/1.1\r\nX-Pad:   value  \r\n\r\n").unwrap();
        let header = msg.header("x-pad").unwrap();
        assert_eq!(header.value, "value");
        assert_eq!(text(&msg, header.value_range), "value  ");
    }

    #[test]
    fn test_duplicate_headers_last_write_wins() {
        let msg = HttpMessage::parse("GET / HTTP/1.1\r\nCookie: a=1\r\nHost: h\r\nCookie: b=2\r\n\r\n").unwrap();
        let keys: Vec<&str> = msg.headers().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["cookie", "host"]);
        let range = msg.ranges().header("cookie", HideOptions::hide_key()).unwrap()[0];
        assert_eq!(text(&msg, range), "b=2");
    }

    #[test]
    fn test_json_body_ranges() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"a\": {\"b\": 1}, \"c\": [10, 20]}";
        let msg = HttpMessage::parse(raw).unwrap();
        let r = msg.ranges();

        let b = r.body(Some(BodySelector::Json("a.b")), HideOptions::default()).unwrap();
        assert_eq!(text(&msg, b[0]), "\"b\": 1");
        let b_value = r.body(Some(BodySelector::Json("a.b")), HideOptions::hide_key()).unwrap();
        assert_eq!(text(&msg, b_value[0]), "1");
        let b_key = r.body(Some(BodySelector::Json("a.b")), HideOptions::hide_value()).unwrap();
        assert_eq!(text(&msg, b_key[0]), "\"b\"");

        assert!(r.body(Some(BodySelector::Json("nope")), HideOptions::default()).unwrap().is_empty());
        assert!(r.body(Some(BodySelector::Json("c[5]")), HideOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_array_element_ignores_hide_flags() {
        let raw = "HTTP/1.1 200 OK\r\n\r\n{\"c\": [10, 20]}";
        let msg = HttpMessage::parse(raw).unwrap();
        let r = msg.ranges();
        let plain = r.body(Some(BodySelector::Json("c[0]")), HideOptions::default()).unwrap();
        let key = r.body(Some(BodySelector::Json("c[0]")), HideOptions::hide_key()).unwrap();
        let value = r.body(Some(BodySelector::Json("c[0]")), HideOptions::hide_value()).unwrap();
        assert_eq!(plain, key);
        assert_eq!(plain, value);
        assert_eq!(text(&msg, plain[0]), "10");
    }

    #[test]
    fn test_emoji_before_field() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"e\": \"🎉\", \"name\": \"alice\"}";
        let msg = HttpMessage::parse(raw).unwrap();
        let range = msg
            .ranges()
            .body(Some(BodySelector::Json("name")), HideOptions::hide_key())
            .unwrap()[0];
        assert_eq!(text(&msg, range), "\"alice\"");
    }

    #[test]
    fn test_non_json_body_json_query_fails() {
        let msg = HttpMessage::parse("HTTP/1.1 200 OK\r\n\r\nplain text").unwrap();
        assert_eq!(
            msg.ranges()
                .body(Some(BodySelector::Json("a")), HideOptions::default())
                .unwrap_err(),
            RangeExtractionError::BodyNotJson
        );
        let whole = msg.ranges().body(None, HideOptions::default()).unwrap();
        assert_eq!(text(&msg, whole[0]), "plain text");
    }

    #[test]
    fn test_chunked_body() {
        let raw = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: application/json\r\n\r\n\
                   8;ext=1\r\n{\"id\": 4\r\n9\r\n2, \"x\": 1\r\n1\r\n}\r\n0\r\n\r\n";
        let msg = HttpMessage::parse(raw).unwrap();
        let body = msg.body().unwrap();
        assert_eq!(body.raw.value, b"{\"id\": 42, \"x\": 1}");
        assert_eq!(body.json.as_ref().unwrap().value["id"], 42);

        let x = msg
            .ranges()
            .body(Some(BodySelector::Json("x")), HideOptions::default())
            .unwrap()[0];
        assert_eq!(text(&msg, x), "\"x\": 1");
        assert!(body.raw.range.end <= msg.data().len());
    }

    #[test]
    fn test_body_regex_multibyte() {
        let raw = "HTTP/1.1 200 OK\r\n\r\n😀 token=abc token=def";
        let msg = HttpMessage::parse(raw).unwrap();
        let re = regex::Regex::new("token=[a-z]+").unwrap();
        let ranges = msg.ranges().body(Some(BodySelector::Regex(&re)), HideOptions::default()).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(text(&msg, ranges[0]), "token=abc");
        assert_eq!(text(&msg, ranges[1]), "token=def");
    }

    #[test]
    fn test_body_xpath_not_implemented() {
        let msg = HttpMessage::parse("HTTP/1.1 200 OK\r\n\r\n<a/>").unwrap();
        assert_eq!(
            msg.ranges().body(Some(BodySelector::XPath), HideOptions::default()).unwrap_err(),
            RangeExtractionError::XPathNotImplemented
        );
    }

    #[test]
    fn test_invalid_utf8_body_has_no_text() {
        let mut raw = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe, 0x00]);
        let msg = HttpMessage::parse(raw).unwrap();
        let body = msg.body().unwrap();
        assert!(body.text.is_none());
        assert!(body.json.is_none());
    }

    #[test]
    fn test_all_and_transcript_regex() {
        let msg = HttpMessage::parse(REQUEST).unwrap();
        assert_eq!(msg.ranges().all(), vec![Range { start: 0, end: REQUEST.len() }]);
        let re = regex::bytes::Regex::new("example\\.com").unwrap();
        let ranges = msg.ranges().regex(&re);
        assert_eq!(ranges.len(), 1);
        assert_eq!(text(&msg, ranges[0]), "example.com");
    }

    #[test]
    fn test_to_json_summary() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"a\":1}";
        let summary = HttpMessage::parse(raw).unwrap().to_json();
        assert_eq!(summary["statusCode"], "200");
        assert_eq!(summary["headers"]["content-type"], "application/json");
        assert_eq!(summary["body"]["a"], 1);
    }
}
