//! Declarative reveal handlers
//!
//! A handler names one part of the sent or received transcript and how to
//! reveal it. Handlers arrive from plugin code as JSON.

use crate::core::errors::RangeExtractionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which transcript direction a handler applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerType {
    Sent,
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerPart {
    StartLine,
    Protocol,
    Method,
    RequestTarget,
    StatusCode,
    Headers,
    Body,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerAction {
    Reveal,
    /// Commitment instead of plaintext reveal; not supported yet
    Pedersen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamsType {
    Json,
    Regex,
    Xpath,
}

/// Part-specific handler parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerParams {
    /// Header name for `HEADERS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParamsType>,
    /// JSON path for `BODY` with `type: "json"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// JavaScript-style regex flags (`i`, `m`, `s`; `g`, `u`, `y` are accepted and ignored)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_value: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    #[serde(rename = "type")]
    pub handler_type: HandlerType,
    pub part: HandlerPart,
    pub action: HandlerAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<HandlerParams>,
}

impl Handler {
    pub fn reveal(handler_type: HandlerType, part: HandlerPart) -> Self {
        Self {
            handler_type,
            part,
            action: HandlerAction::Reveal,
            params: None,
        }
    }

    /// Decode one handler from plugin-supplied JSON
    pub fn from_value(value: Value) -> Result<Self, RangeExtractionError> {
        serde_json::from_value(value).map_err(|e| RangeExtractionError::InvalidHandler(e.to_string()))
    }

    /// Decode a handler list, keeping order
    pub fn list_from_value(value: Value) -> Result<Vec<Self>, RangeExtractionError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Err(RangeExtractionError::InvalidHandler(format!(
                "expected a handler array, got {}",
                other
            ))),
        }
    }
}

/// Compile a handler regex for matching decoded body text
pub fn compile_regex(pattern: &str, flags: Option<&str>) -> Result<regex::Regex, RangeExtractionError> {
    let flags = RegexFlags::parse(pattern, flags)?;
    regex::RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .build()
        .map_err(|e| invalid_regex(pattern, e))
}

/// Compile a handler regex for matching raw transcript bytes
pub fn compile_bytes_regex(
    pattern: &str,
    flags: Option<&str>,
) -> Result<regex::bytes::Regex, RangeExtractionError> {
    let flags = RegexFlags::parse(pattern, flags)?;
    regex::bytes::RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .build()
        .map_err(|e| invalid_regex(pattern, e))
}

fn invalid_regex(pattern: &str, err: regex::Error) -> RangeExtractionError {
    RangeExtractionError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    }
}

#[derive(Default)]
struct RegexFlags {
    case_insensitive: bool,
    multi_line: bool,
    dot_all: bool,
}

impl RegexFlags {
    fn parse(pattern: &str, flags: Option<&str>) -> Result<Self, RangeExtractionError> {
        let mut parsed = Self::default();
        for flag in flags.unwrap_or("").chars() {
            match flag {
                'i' => parsed.case_insensitive = true,
                'm' => parsed.multi_line = true,
                's' => parsed.dot_all = true,
                // Global matching is always on; unicode and sticky have no equivalent here
                'g' | 'u' | 'y' => {}
                other => {
                    return Err(RangeExtractionError::InvalidRegex {
                        pattern: pattern.to_string(),
                        reason: format!("unsupported flag '{}'", other),
                    })
                }
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_plugin_handler() {
        let handler = Handler::from_value(json!({
            "type": "RECV",
            "part": "BODY",
            "action": "REVEAL",
            "params": { "type": "json", "path": "screen_name", "hideKey": true }
        }))
        .unwrap();

        assert_eq!(handler.handler_type, HandlerType::Recv);
        assert_eq!(handler.part, HandlerPart::Body);
        let params = handler.params.unwrap();
        assert_eq!(params.kind, Some(ParamsType::Json));
        assert_eq!(params.path.as_deref(), Some("screen_name"));
        assert_eq!(params.hide_key, Some(true));
    }

    #[test]
    fn test_unknown_part_is_invalid() {
        let err = Handler::from_value(json!({
            "type": "SENT",
            "part": "TRAILERS",
            "action": "REVEAL"
        }))
        .unwrap_err();
        assert!(matches!(err, RangeExtractionError::InvalidHandler(_)));
    }

    #[test]
    fn test_serialize_omits_empty_params() {
        let handler = Handler::reveal(HandlerType::Sent, HandlerPart::StartLine);
        assert_eq!(
            serde_json::to_value(&handler).unwrap(),
            json!({ "type": "SENT", "part": "START_LINE", "action": "REVEAL" })
        );
    }

    #[test]
    fn test_regex_flags() {
        let re = compile_regex("token", Some("gi")).unwrap();
        assert!(re.is_match("TOKEN"));
        assert!(compile_regex("x", Some("q")).is_err());
        assert!(matches!(
            compile_bytes_regex("(", None).unwrap_err(),
            RangeExtractionError::InvalidRegex { .. }
        ));
    }
}
