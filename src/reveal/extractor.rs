//! Range extraction: handlers in, byte ranges out

use super::handler::{
    compile_bytes_regex, compile_regex, Handler, HandlerAction, HandlerParams, HandlerPart,
    HandlerType, ParamsType,
};
use crate::core::errors::RangeExtractionError;
use crate::transcript::{BodySelector, HideOptions, HttpMessage, Range};
use serde::Serialize;

/// A range tagged with the handler that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeWithHandler {
    #[serde(flatten)]
    pub range: Range,
    pub handler: Handler,
}

/// Ranges for both directions, in handler order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRanges {
    pub sent_ranges: Vec<Range>,
    pub recv_ranges: Vec<Range>,
    pub sent_ranges_with_handlers: Vec<RangeWithHandler>,
    pub recv_ranges_with_handlers: Vec<RangeWithHandler>,
}

/// Compute the ranges one handler selects in one message
pub fn extract_ranges(handler: &Handler, message: &HttpMessage) -> Result<Vec<Range>, RangeExtractionError> {
    if handler.action != HandlerAction::Reveal {
        return Err(RangeExtractionError::UnsupportedAction("PEDERSEN".to_string()));
    }

    let ranges = message.ranges();
    match handler.part {
        HandlerPart::StartLine => Ok(ranges.start_line()),
        HandlerPart::Protocol => Ok(ranges.protocol()),
        HandlerPart::Method => ranges.method(),
        HandlerPart::RequestTarget => ranges.request_target(),
        HandlerPart::StatusCode => ranges.status_code(),
        HandlerPart::Headers => {
            let params = handler.params.as_ref();
            let hide = hide_options(params);
            match params.and_then(|p| p.key.as_deref()).filter(|key| !key.is_empty()) {
                Some(key) => ranges.header(key, hide),
                None => ranges.all_headers(hide),
            }
        }
        HandlerPart::Body => extract_body(handler.params.as_ref(), message),
        HandlerPart::All => extract_all(handler.params.as_ref(), message),
    }
}

fn hide_options(params: Option<&HandlerParams>) -> HideOptions {
    params
        .map(|p| HideOptions {
            hide_key: p.hide_key.unwrap_or(false),
            hide_value: p.hide_value.unwrap_or(false),
        })
        .unwrap_or_default()
}

fn extract_body(params: Option<&HandlerParams>, message: &HttpMessage) -> Result<Vec<Range>, RangeExtractionError> {
    let ranges = message.ranges();
    let Some(p) = params else {
        return ranges.body(None, HideOptions::default());
    };

    // A path without an explicit type is a JSON path
    let kind = p
        .kind
        .or_else(|| p.path.as_ref().map(|_| ParamsType::Json));

    match kind {
        None => ranges.body(None, HideOptions::default()),
        Some(ParamsType::Json) => {
            let path = p.path.as_deref().ok_or(RangeExtractionError::MissingJsonPath)?;
            ranges.body(Some(BodySelector::Json(path)), hide_options(params))
        }
        Some(ParamsType::Regex) => {
            let pattern = p.regex.as_deref().ok_or(RangeExtractionError::MissingRegex)?;
            let re = compile_regex(pattern, p.flags.as_deref())?;
            ranges.body(Some(BodySelector::Regex(&re)), HideOptions::default())
        }
        Some(ParamsType::Xpath) => ranges.body(Some(BodySelector::XPath), HideOptions::default()),
    }
}

fn extract_all(params: Option<&HandlerParams>, message: &HttpMessage) -> Result<Vec<Range>, RangeExtractionError> {
    let ranges = message.ranges();
    match params.and_then(|p| p.kind.map(|kind| (p, kind))) {
        None => Ok(ranges.all()),
        Some((p, ParamsType::Regex)) => {
            let pattern = p.regex.as_deref().ok_or(RangeExtractionError::MissingRegex)?;
            let re = compile_bytes_regex(pattern, p.flags.as_deref())?;
            Ok(ranges.regex(&re))
        }
        Some((_, other)) => Err(RangeExtractionError::UnsupportedParams {
            part: "ALL".to_string(),
            params: format!("{:?}", other).to_lowercase(),
        }),
    }
}

/// Route each handler to its transcript and collect the ranges in order
pub fn process_handlers(
    handlers: &[Handler],
    sent: &HttpMessage,
    recv: &HttpMessage,
) -> Result<ProcessedRanges, RangeExtractionError> {
    let mut out = ProcessedRanges::default();

    for handler in handlers {
        let (message, ranges, tagged) = match handler.handler_type {
            HandlerType::Sent => (sent, &mut out.sent_ranges, &mut out.sent_ranges_with_handlers),
            HandlerType::Recv => (recv, &mut out.recv_ranges, &mut out.recv_ranges_with_handlers),
        };

        let extracted = extract_ranges(handler, message)?;
        tracing::debug!(
            "Handler {:?}/{:?} selected {} range(s)",
            handler.handler_type,
            handler.part,
            extracted.len()
        );

        for range in extracted {
            ranges.push(range);
            tagged.push(RangeWithHandler {
                range,
                handler: handler.clone(),
            });
        }
    }

    Ok(out)
}
