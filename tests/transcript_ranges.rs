//! Transcript parsing and reveal range tests
//!
//! Every range is checked by slicing the original transcript bytes.

use proptest::prelude::*;
use serde_json::json;
use tlsn_plugin_host::reveal::{process_handlers, Handler};
use tlsn_plugin_host::transcript::{HideOptions, Range};
use tlsn_plugin_host::{HttpMessage, ParseError, RangeExtractionError};

const SENT: &[u8] = b"GET /1.1/account/settings.json HTTP/1.1\r\n\
Host: api.x.com\r\n\
Authorization: Bearer secret-token\r\n\
Cookie: auth_token=abc; ct0=def\r\n\
Accept: */*\r\n\r\n";

const RECV: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: application/json; charset=utf-8\r\n\
Date: Tue, 01 Oct 2024 10:00:00 GMT\r\n\r\n\
{\"screen_name\":\"alice\",\"protected\":false,\"settings\":{\"lang\":\"en\",\"tags\":[\"a\",\"b\"]}}";

fn slice(data: &[u8], range: Range) -> &str {
    std::str::from_utf8(&data[range.start..range.end]).unwrap()
}

fn handlers(value: serde_json::Value) -> Vec<Handler> {
    Handler::list_from_value(value).unwrap()
}

mod reveal_tests {
    use super::*;

    #[test]
    fn test_x_profile_handlers() {
        let sent = HttpMessage::parse(SENT).unwrap();
        let recv = HttpMessage::parse(RECV).unwrap();

        let ranges = process_handlers(
            &handlers(json!([
                {"type": "SENT", "part": "START_LINE", "action": "REVEAL"},
                {"type": "SENT", "part": "HEADERS", "action": "REVEAL", "params": {"key": "host"}},
                {"type": "SENT", "part": "HEADERS", "action": "REVEAL", "params": {"key": "authorization", "hideValue": true}},
                {"type": "RECV", "part": "STATUS_CODE", "action": "REVEAL"},
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"type": "json", "path": "screen_name"}},
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"path": "settings.lang", "hideKey": true}},
            ])),
            &sent,
            &recv,
        )
        .unwrap();

        let sent_slices: Vec<&str> = ranges.sent_ranges.iter().map(|r| slice(SENT, *r)).collect();
        assert_eq!(
            sent_slices,
            ["GET /1.1/account/settings.json HTTP/1.1", "Host: api.x.com", "Authorization"]
        );

        let recv_slices: Vec<&str> = ranges.recv_ranges.iter().map(|r| slice(RECV, *r)).collect();
        assert_eq!(recv_slices, ["200", r#""screen_name":"alice""#, r#""en""#]);

        assert_eq!(ranges.recv_ranges_with_handlers.len(), 3);
        assert_eq!(ranges.recv_ranges_with_handlers[1].range, ranges.recv_ranges[1]);
    }

    #[test]
    fn test_missing_header_and_path_select_nothing() {
        let sent = HttpMessage::parse(SENT).unwrap();
        let recv = HttpMessage::parse(RECV).unwrap();

        let ranges = process_handlers(
            &handlers(json!([
                {"type": "SENT", "part": "HEADERS", "action": "REVEAL", "params": {"key": "x-missing"}},
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"type": "json", "path": "nope.deeper"}},
            ])),
            &sent,
            &recv,
        )
        .unwrap();
        assert!(ranges.sent_ranges.is_empty());
        assert!(ranges.recv_ranges.is_empty());
    }

    #[test]
    fn test_array_elements_and_nested_objects() {
        let recv = HttpMessage::parse(RECV).unwrap();
        let r = recv.ranges();

        let tag = r
            .body(
                Some(tlsn_plugin_host::transcript::BodySelector::Json("settings.tags[1]")),
                HideOptions::default(),
            )
            .unwrap();
        assert_eq!(slice(RECV, tag[0]), r#""b""#);

        let settings = r
            .body(
                Some(tlsn_plugin_host::transcript::BodySelector::Json("settings")),
                HideOptions::hide_key(),
            )
            .unwrap();
        assert_eq!(slice(RECV, settings[0]), r#"{"lang":"en","tags":["a","b"]}"#);
    }

    #[test]
    fn test_regex_over_whole_transcript() {
        let sent = HttpMessage::parse(SENT).unwrap();
        let recv = HttpMessage::parse(RECV).unwrap();

        let ranges = process_handlers(
            &handlers(json!([
                {"type": "SENT", "part": "ALL", "action": "REVEAL", "params": {"type": "regex", "regex": "ct0=[a-z]+", "flags": "g"}},
                {"type": "RECV", "part": "ALL", "action": "REVEAL", "params": {"type": "regex", "regex": "CONTENT-TYPE", "flags": "i"}},
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"type": "regex", "regex": "\"lang\":\"[a-z]+\""}},
            ])),
            &sent,
            &recv,
        )
        .unwrap();

        assert_eq!(slice(SENT, ranges.sent_ranges[0]), "ct0=def");
        assert_eq!(slice(RECV, ranges.recv_ranges[0]), "Content-Type");
        assert_eq!(slice(RECV, ranges.recv_ranges[1]), r#""lang":"en""#);
    }

    #[test]
    fn test_all_without_params_covers_transcript() {
        let recv = HttpMessage::parse(RECV).unwrap();
        assert_eq!(recv.ranges().all(), vec![Range::new(0, RECV.len())]);
    }

    #[test]
    fn test_handler_errors() {
        let sent = HttpMessage::parse(SENT).unwrap();
        let recv = HttpMessage::parse(RECV).unwrap();
        let run = |value| process_handlers(&handlers(value), &sent, &recv).unwrap_err();

        assert_eq!(
            run(json!([{"type": "RECV", "part": "METHOD", "action": "REVEAL"}])),
            RangeExtractionError::WrongMessageKind {
                part: "method",
                expected: "requests"
            }
        );
        assert_eq!(
            run(json!([{"type": "SENT", "part": "STATUS_CODE", "action": "REVEAL"}])).to_string(),
            "statusCode() is only available for responses"
        );
        assert_eq!(
            run(json!([{"type": "SENT", "part": "HEADERS", "action": "REVEAL", "params": {"key": "host", "hideKey": true, "hideValue": true}}])),
            RangeExtractionError::HideKeyAndValue
        );
        assert_eq!(
            run(json!([{"type": "RECV", "part": "BODY", "action": "PEDERSEN", "params": {"path": "screen_name"}}])),
            RangeExtractionError::UnsupportedAction("PEDERSEN".into())
        );
        assert_eq!(
            run(json!([{"type": "RECV", "part": "ALL", "action": "REVEAL", "params": {"type": "regex"}}])),
            RangeExtractionError::MissingRegex
        );
        assert_eq!(
            run(json!([{"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"type": "xpath", "path": "//a"}}])),
            RangeExtractionError::XPathNotImplemented
        );
        assert!(matches!(
            run(json!([{"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"type": "regex", "regex": "(unclosed"}}])),
            RangeExtractionError::InvalidRegex { .. }
        ));
        assert!(Handler::list_from_value(json!([{"type": "RECV", "part": "FOOTER", "action": "REVEAL"}])).is_err());
    }

    #[test]
    fn test_json_path_on_text_body_fails() {
        let recv = HttpMessage::parse(&b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello"[..]).unwrap();
        let err = process_handlers(
            &handlers(json!([{"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"type": "json", "path": "a"}}])),
            &HttpMessage::parse(SENT).unwrap(),
            &recv,
        )
        .unwrap_err();
        assert_eq!(err, RangeExtractionError::BodyNotJson);
    }
}

mod parser_tests {
    use super::*;

    #[test]
    fn test_chunked_json_maps_to_original_offsets() {
        let data: &[u8] = b"HTTP/1.1 200 OK\r\n\
Transfer-Encoding: chunked\r\n\
Content-Type: application/json\r\n\r\n\
8\r\n{\"id\":1,\r\n\
d\r\n\"name\":\"bob\"}\r\n\
0\r\n\r\n";
        let message = HttpMessage::parse(data).unwrap();
        let body = message.body().unwrap();
        assert_eq!(body.raw.value, br#"{"id":1,"name":"bob"}"#.to_vec());
        assert_eq!(body.json.as_ref().unwrap().value, json!({"id": 1, "name": "bob"}));
        assert_eq!(body.raw.range.end, data.len());

        let ranges = process_handlers(
            &handlers(json!([
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"path": "name"}},
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"path": "id", "hideKey": true}},
            ])),
            &HttpMessage::parse(SENT).unwrap(),
            &message,
        )
        .unwrap();
        assert_eq!(slice(data, ranges.recv_ranges[0]), r#""name":"bob""#);
        assert_eq!(slice(data, ranges.recv_ranges[1]), "1");
    }

    #[test]
    fn test_chunk_extensions_are_ignored() {
        let data: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5;name=v\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let message = HttpMessage::parse(data).unwrap();
        assert_eq!(message.body().unwrap().text.as_ref().unwrap().value, "hello world");
    }

    #[test]
    fn test_array_elements_ignore_hide_flags() {
        let data: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"c\":[10,20]}";
        let message = HttpMessage::parse(data).unwrap();
        let select = |options| {
            message
                .ranges()
                .body(Some(tlsn_plugin_host::transcript::BodySelector::Json("c[0]")), options)
                .unwrap()
        };
        let plain = select(HideOptions::default());
        assert_eq!(slice(data, plain[0]), "10");
        assert_eq!(select(HideOptions::hide_key()), plain);
        assert_eq!(select(HideOptions::hide_value()), plain);
    }

    #[test]
    fn test_multibyte_body_offsets_are_bytes() {
        let data = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"msg\":\"héllo 👋\",\"n\":2}";
        let message = HttpMessage::parse(data.as_bytes()).unwrap();
        let ranges = process_handlers(
            &handlers(json!([
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"path": "msg", "hideKey": true}},
                {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"path": "n"}},
            ])),
            &HttpMessage::parse(SENT).unwrap(),
            &message,
        )
        .unwrap();
        assert_eq!(slice(data.as_bytes(), ranges.recv_ranges[0]), "\"héllo 👋\"");
        assert_eq!(slice(data.as_bytes(), ranges.recv_ranges[1]), "\"n\":2");
    }

    #[test]
    fn test_duplicate_headers_keep_last_line() {
        let data: &[u8] = b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nset-cookie: b=2\r\n\r\n";
        let message = HttpMessage::parse(data).unwrap();
        assert_eq!(message.header("SET-COOKIE").unwrap().value, "b=2");

        let ranges = message.ranges().header("set-cookie", HideOptions::default()).unwrap();
        assert_eq!(slice(data, ranges[0]), "set-cookie: b=2");
        assert_eq!(message.headers().count(), 1);
    }

    #[test]
    fn test_header_value_keeps_trailing_whitespace_in_range() {
        let data: &[u8] = b"GET / HTTP/1.1\r\nX-Token:   abc  \r\n\r\n";
        let message = HttpMessage::parse(data).unwrap();
        let header = message.header("x-token").unwrap();
        assert_eq!(header.value, "abc");
        assert_eq!(slice(data, header.value_range), "abc  ");
        assert_eq!(slice(data, header.key_range), "X-Token");
    }

    #[test]
    fn test_top_level_array_body() {
        let data: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n[{\"id\":7},{\"id\":8}]";
        let message = HttpMessage::parse(data).unwrap();
        let ranges = process_handlers(
            &handlers(json!([{"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"path": "[1].id"}}])),
            &HttpMessage::parse(SENT).unwrap(),
            &message,
        )
        .unwrap();
        assert_eq!(slice(data, ranges.recv_ranges[0]), r#""id":8"#);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            HttpMessage::parse(&b"GET / HTTP/1.1"[..]).unwrap_err(),
            ParseError::MissingStartLineCrlf
        );
        assert!(matches!(
            HttpMessage::parse(&b"GET /\r\n\r\n"[..]).unwrap_err(),
            ParseError::InvalidRequestLine(_)
        ));
        assert!(matches!(
            HttpMessage::parse(&b"HTTP/1.1\r\n\r\n"[..]).unwrap_err(),
            ParseError::InvalidResponseLine(_)
        ));
        assert!(matches!(
            HttpMessage::parse(&b"GET / HTTP/1.1\r\nNoColon\r\n\r\n"[..]).unwrap_err(),
            ParseError::InvalidHeaderLine(_)
        ));
        assert_eq!(
            HttpMessage::parse(&b"GET / HTTP/1.1\r\nHost: a"[..]).unwrap_err(),
            ParseError::MissingHeaderCrlf
        );
    }

    #[test]
    fn test_message_without_body() {
        let message = HttpMessage::parse(SENT).unwrap();
        assert!(message.body().is_none());
        assert!(message.ranges().body(None, HideOptions::default()).unwrap().is_empty());
        assert_eq!(message.to_json()["headers"]["host"], "api.x.com");
    }
}

proptest! {
    #[test]
    fn prop_header_ranges_slice_back(
        name in "[A-Za-z][A-Za-z0-9-]{0,15}",
        value in "[!-~]([ -~]{0,30}[!-~])?",
    ) {
        let raw = format!("GET / HTTP/1.1\r\n{}: {}\r\nAccept: */*\r\n\r\n", name, value);
        let message = HttpMessage::parse(raw.as_bytes()).unwrap();
        let header = message.header(&name).unwrap();

        prop_assert_eq!(slice(raw.as_bytes(), header.key_range), name.as_str());
        prop_assert_eq!(slice(raw.as_bytes(), header.value_range), value.as_str());
        prop_assert_eq!(slice(raw.as_bytes(), header.range), format!("{}: {}", name, value));
    }

    #[test]
    fn prop_json_string_fields_slice_back(
        key in "k[a-z]{0,7}",
        value in "[a-zA-Z0-9 éü]{0,20}",
    ) {
        let body = json!({ key.clone(): value.clone(), "tail": 1 }).to_string();
        let raw = format!("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{}", body);
        let message = HttpMessage::parse(raw.as_bytes()).unwrap();
        let ranges = message
            .ranges()
            .body(Some(tlsn_plugin_host::transcript::BodySelector::Json(&key)), HideOptions::hide_key())
            .unwrap();
        prop_assert_eq!(slice(raw.as_bytes(), ranges[0]), format!("\"{}\"", value));
    }
}
