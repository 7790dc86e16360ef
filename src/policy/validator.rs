//! Permission checks for `prove` and `openWindow`
//!
//! Both checks deny by default and report the declared permissions on
//! failure so a plugin author can see what would have matched.

use super::manifest::{PluginConfig, ProveTarget, RequestPermission};
use crate::core::errors::PermissionError;
use glob::{MatchOptions, Pattern};
use regex::Regex;
use url::Url;

/// Default proxy for a verifier: `wss://<verifier host>/proxy?token=<target host>`
/// (`ws://` for plain http verifiers)
pub fn derive_proxy_url(verifier_url: &str, target_host: &str) -> Result<String, PermissionError> {
    let url = Url::parse(verifier_url).map_err(|e| PermissionError::InvalidUrl(format!("{}: {}", verifier_url, e)))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    let host = url.host_str().unwrap_or_default();
    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok(format!("{}://{}/proxy?token={}", scheme, authority, target_host))
}

/// Match a URL pathname against a permission pattern.
///
/// `*` matches within one path segment, `**` matches across segments
/// (including none). Everything else is literal.
pub fn matches_pathname_pattern(pathname: &str, pattern: &str) -> bool {
    let mut regex = String::from("^");
    for (i, multi) in pattern.split("**").enumerate() {
        if i > 0 {
            regex.push_str(".*");
        }
        for (j, single) in multi.split('*').enumerate() {
            if j > 0 {
                regex.push_str("[^/]*");
            }
            regex.push_str(&regex::escape(single));
        }
    }
    regex.push('$');

    Regex::new(&regex).map(|re| re.is_match(pathname)).unwrap_or(false)
}

/// Match a window URL against a declared URL pattern
///
/// Scheme, host (with port), path and query are matched separately, so a
/// `*` never runs from one component into the next. Within the path `*`
/// may cross `/`. A pattern without a query accepts any query. When either
/// side cannot be split into components the whole URL is matched with `*`
/// as the only wildcard.
pub fn matches_url_pattern(url: &str, pattern: &str) -> bool {
    match (UrlParts::parse(url), UrlParts::split_pattern(pattern)) {
        (Some(url), Some(pattern)) => url.matches(&pattern),
        _ => wildcard_matches(url, pattern),
    }
}

/// The components a URL pattern is matched on
#[derive(Debug, PartialEq, Eq)]
struct UrlParts {
    scheme: String,
    authority: String,
    path: String,
    query: Option<String>,
}

impl UrlParts {
    fn parse(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Some(Self {
            scheme: parsed.scheme().to_string(),
            authority,
            path: parsed.path().to_string(),
            query: parsed.query().map(str::to_string),
        })
    }

    /// `scheme://authority/path?query#fragment`, split without parsing so
    /// wildcards survive. The fragment is ignored.
    fn split_pattern(pattern: &str) -> Option<Self> {
        let (scheme, rest) = pattern.split_once("://")?;
        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (rest, query) = match rest.split_once('?') {
            Some((before, query)) => (before, Some(query.to_string())),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if scheme.is_empty() || authority.is_empty() {
            return None;
        }

        Some(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            path: path.to_string(),
            query,
        })
    }

    fn matches(&self, pattern: &UrlParts) -> bool {
        let query_matches = match &pattern.query {
            Some(query) => component_matches(self.query.as_deref().unwrap_or_default(), query),
            None => true,
        };
        component_matches(&self.scheme, &pattern.scheme)
            && component_matches(&self.authority, &pattern.authority)
            && component_matches(&self.path, &pattern.path)
            && query_matches
    }
}

/// Glob match of one URL component; patterns the glob syntax rejects fall
/// back to a literal match with `*` as a wildcard
fn component_matches(value: &str, pattern: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(glob) => {
            let options = MatchOptions {
                case_sensitive: true,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            };
            glob.matches_with(value, options)
        }
        Err(_) => wildcard_matches(value, pattern),
    }
}

fn wildcard_matches(value: &str, pattern: &str) -> bool {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    Regex::new(&format!("^{}$", escaped))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Check a `prove` call against the plugin's declared request permissions
pub fn validate_prove_permission(
    target: &ProveTarget<'_>,
    config: Option<&PluginConfig>,
) -> Result<(), PermissionError> {
    let requests = config.map(PluginConfig::requests).unwrap_or(&[]);
    if requests.is_empty() {
        return Err(PermissionError::NoRequestPermissions {
            method: target.method.to_string(),
            url: target.url.to_string(),
        });
    }

    let url = Url::parse(target.url).map_err(|e| PermissionError::InvalidUrl(format!("{}: {}", target.url, e)))?;
    let hostname = url.host_str().unwrap_or_default();
    let pathname = url.path();
    let method = target.method.to_uppercase();

    let matched = requests
        .iter()
        .find(|perm| request_matches(perm, &method, hostname, pathname, target));

    match matched {
        Some(perm) => {
            tracing::debug!(
                "Prove permitted: {} {}{} via {}",
                method,
                hostname,
                pathname,
                perm.verifier_url
            );
            Ok(())
        }
        None => {
            tracing::warn!("Prove denied: {} {}{}", method, hostname, pathname);
            Err(PermissionError::RequestNotAllowed {
                method,
                host: hostname.to_string(),
                pathname: pathname.to_string(),
                verifier_url: target.verifier_url.to_string(),
                proxy_url: target.proxy_url.to_string(),
                declared: summarize_requests(requests),
            })
        }
    }
}

fn request_matches(
    perm: &RequestPermission,
    method: &str,
    hostname: &str,
    pathname: &str,
    target: &ProveTarget<'_>,
) -> bool {
    if perm.method.to_uppercase() != method || perm.host != hostname {
        return false;
    }
    if !matches_pathname_pattern(pathname, &perm.pathname) || perm.verifier_url != target.verifier_url {
        return false;
    }

    let expected_proxy = match &perm.proxy_url {
        Some(proxy) => proxy.clone(),
        None => match derive_proxy_url(&perm.verifier_url, hostname) {
            Ok(proxy) => proxy,
            Err(_) => return false,
        },
    };
    expected_proxy == target.proxy_url
}

/// Human readable list of declared request permissions
pub fn summarize_requests(requests: &[RequestPermission]) -> String {
    requests
        .iter()
        .map(|p| format!("  - {} {}{} (verifier: {})", p.method, p.host, p.pathname, p.verifier_url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check an `openWindow` URL against the plugin's declared URL patterns
pub fn validate_open_window_permission(url: &str, config: Option<&PluginConfig>) -> Result<(), PermissionError> {
    let urls = config.map(PluginConfig::urls).unwrap_or(&[]);
    if urls.is_empty() {
        return Err(PermissionError::NoUrlPermissions { url: url.to_string() });
    }

    if urls.iter().any(|pattern| matches_url_pattern(url, pattern)) {
        tracing::debug!("Window permitted: {}", url);
        return Ok(());
    }

    tracing::warn!("Window denied: {}", url);
    Err(PermissionError::UrlNotAllowed {
        url: url.to_string(),
        declared: urls
            .iter()
            .map(|u| format!("  - {}", u))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}
