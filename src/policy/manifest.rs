//! Plugin permission manifest types

use serde::{Deserialize, Serialize};

/// A plugin's exported `config`
///
/// Absent `requests` or `urls` grant nothing of that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<Vec<RequestPermission>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}

impl PluginConfig {
    pub fn requests(&self) -> &[RequestPermission] {
        self.requests.as_deref().unwrap_or(&[])
    }

    pub fn urls(&self) -> &[String] {
        self.urls.as_deref().unwrap_or(&[])
    }
}

/// One allowed `prove` target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermission {
    pub method: String,
    /// Exact hostname, no port
    pub host: String,
    /// Pathname pattern: `*` stays within a segment, `**` spans segments
    pub pathname: String,
    pub verifier_url: String,
    /// Defaults to the proxy derived from `verifier_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

/// The parts of a `prove` call that permissions are checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProveTarget<'a> {
    pub url: &'a str,
    pub method: &'a str,
    pub verifier_url: &'a str,
    pub proxy_url: &'a str,
}
