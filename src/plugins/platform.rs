//! Platform collaborator interface
//!
//! The host never touches windows, tabs or the prover directly. A platform
//! (browser extension background, mobile bridge, test double) implements
//! [`PluginPlatform`] and the host drives it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options a plugin may pass to `openWindow`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenWindowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_overlay: Option<bool>,
}

/// What `openWindow` resolves to inside the plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub window_id: i64,
    pub uuid: String,
    pub tab_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub details: String,
}

impl WindowError {
    /// `details` when present, otherwise `error`
    pub fn message(&self) -> String {
        if self.details.is_empty() {
            self.error.clone()
        } else {
            self.details.clone()
        }
    }
}

/// Platform reply to a window request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenWindowResponse {
    WindowOpened(WindowInfo),
    WindowError(WindowError),
}

/// Collaborator the host drives on behalf of a plugin
///
/// Futures are not `Send`: the host runs on a single thread next to the
/// sandbox.
#[async_trait(?Send)]
pub trait PluginPlatform {
    /// Open a window on `url`. Intercepted traffic for it may be emitted
    /// before this resolves.
    async fn open_window(&self, url: &str, options: &OpenWindowOptions) -> anyhow::Result<OpenWindowResponse>;

    /// Show the plugin UI in its window
    fn render_plugin_ui(&self, window_id: i64, dom: &Value);

    async fn close_window(&self, window_id: i64) -> anyhow::Result<()>;

    /// Run a proof for an already permission-checked request
    async fn prove(&self, request: Value, prover_options: Value) -> anyhow::Result<Value>;
}
