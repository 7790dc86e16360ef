//! Domain error types
//!
//! These errors represent the failure modes of the plugin host, distinct from
//! infrastructure errors (which travel as `anyhow::Error`).
//! Using thiserror for ergonomic error handling with proper Display implementations.

use thiserror::Error;

/// Malformed HTTP bytes handed to the transcript parser
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The buffer has no CRLF terminating the start line
    #[error("Invalid HTTP message: no CRLF found in start line")]
    MissingStartLineCrlf,

    /// Request line with fewer than three space separated tokens
    #[error("Invalid HTTP request line: {0}")]
    InvalidRequestLine(String),

    /// Status line with fewer than two space separated tokens
    #[error("Invalid HTTP response line: {0}")]
    InvalidResponseLine(String),

    /// A header line runs to the end of the buffer without CRLF
    #[error("Invalid HTTP headers: no CRLF found")]
    MissingHeaderCrlf,

    /// A header line has no `:` separator
    #[error("Invalid header line: {0}")]
    InvalidHeaderLine(String),
}

/// Errors raised while turning handler declarations into byte ranges
///
/// These are plugin author errors: they are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeExtractionError {
    /// A start-line query that does not exist for this message kind
    #[error("{part}() is only available for {expected}")]
    WrongMessageKind {
        part: &'static str,
        expected: &'static str,
    },

    /// `hideKey` and `hideValue` were both requested
    #[error("Cannot hide both key and value")]
    HideKeyAndValue,

    /// JSON path lookup on a body that did not parse as JSON
    #[error("Body is not JSON")]
    BodyNotJson,

    /// Regex lookup on a body that is not valid UTF-8
    #[error("Body is not text")]
    BodyNotText,

    /// Body handler with `type: "json"` but no `path`
    #[error("JSON body handler requires a path")]
    MissingJsonPath,

    /// Regex handler without a `regex` parameter
    #[error("Regex handler requires a regex")]
    MissingRegex,

    /// The handler's regex does not compile
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// XPath body selection
    #[error("XPath parsing not yet implemented")]
    XPathNotImplemented,

    /// Params type that the part does not understand
    #[error("Unsupported params type '{params}' for handler part {part}")]
    UnsupportedParams { part: String, params: String },

    /// Commitment actions other than plain reveal
    #[error("Handler action {0} is not yet supported")]
    UnsupportedAction(String),

    /// Handler JSON that does not match the handler model (unknown part etc.)
    #[error("Invalid handler: {0}")]
    InvalidHandler(String),
}

/// A plugin action not covered by its declared permissions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// The plugin declares no request permissions at all
    #[error("Permission denied: Plugin has no request permissions defined. Cannot make {method} request to {url}")]
    NoRequestPermissions { method: String, url: String },

    /// No declared request permission matches the prove call
    #[error(
        "Permission denied: Plugin does not have permission to make {method} request to {host}{pathname} with verifier {verifier_url} and proxy {proxy_url}.\nDeclared request permissions:\n{declared}"
    )]
    RequestNotAllowed {
        method: String,
        host: String,
        pathname: String,
        verifier_url: String,
        proxy_url: String,
        declared: String,
    },

    /// The plugin declares no window URL permissions at all
    #[error("Permission denied: Plugin has no URL permissions defined. Cannot open URL {url}")]
    NoUrlPermissions { url: String },

    /// No declared URL pattern matches the window URL
    #[error("Permission denied: Plugin does not have permission to open URL {url}.\nDeclared URL permissions:\n{declared}")]
    UrlNotAllowed { url: String, declared: String },

    /// The URL handed to prove/openWindow does not parse
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Origin grants requested from the platform were refused
    #[error("Permission denied: origins not granted: {0}")]
    OriginsRefused(String),
}

/// Failures of the JavaScript sandbox itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// The JS runtime or context could not be created
    #[error("Failed to create sandbox: {0}")]
    Runtime(String),

    /// Syntax error or uncaught exception while evaluating code
    #[error("Plugin evaluation failed: {0}")]
    Evaluation(String),

    /// The preprocessed plugin does not export `main`
    #[error("Main function not found")]
    MainNotFound,

    /// A value could not cross the sandbox boundary
    #[error("Marshalling error: {0}")]
    Marshal(String),

    /// A synchronous JS turn ran past the configured deadline
    #[error("Plugin exceeded the {0}ms execution budget for a single turn")]
    TurnTimeout(u64),
}

/// Outcome of a plugin execution that did not end with `done(result)`
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Sandbox failure (evaluation, missing main, marshalling)
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Permission failure detected by the host before running the plugin
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// An error thrown by plugin code and not caught (main or a click handler)
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// The plugin window was closed before the plugin called done()
    #[error("Plugin window {0} was closed before the plugin finished")]
    WindowClosed(i64),

    /// The event emitter dropped this execution's listener
    #[error("Event source closed before the plugin finished")]
    EventSourceClosed,

    /// Nothing is pending (no host call, no window listener) and the plugin
    /// has not called done()
    #[error("Plugin stalled: nothing left to wait for and done() was never called")]
    Stalled,
}
