//! Window messages and the event emitter that delivers them
//!
//! The platform (extension background, app bridge) emits tagged messages
//! about plugin windows. Each running execution listens through its own
//! channel and filters by window id.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A request seen on the plugin window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedRequest {
    pub id: String,
    pub method: String,
    pub url: String,
    /// Unix time in milliseconds
    pub timestamp: u64,
    pub tab_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Request headers seen on the plugin window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedRequestHeader {
    pub id: String,
    pub method: String,
    pub url: String,
    pub timestamp: u64,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    pub request_headers: Vec<HeaderEntry>,
    pub tab_id: i64,
}

/// Tagged message about a plugin window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum WindowMessage {
    RequestIntercepted {
        request: InterceptedRequest,
        window_id: i64,
    },
    RequestsBatch {
        requests: Vec<InterceptedRequest>,
        window_id: i64,
    },
    HeaderIntercepted {
        header: InterceptedRequestHeader,
        window_id: i64,
    },
    HeadersBatch {
        headers: Vec<InterceptedRequestHeader>,
        window_id: i64,
    },
    /// `onclick` names an exported plugin function
    PluginUiClick {
        onclick: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_id: Option<i64>,
    },
    WindowClosed {
        window_id: i64,
    },
    ReRenderPluginUi {
        window_id: i64,
    },
}

impl WindowMessage {
    /// The window this message is about, if it names one
    pub fn window_id(&self) -> Option<i64> {
        match self {
            Self::RequestIntercepted { window_id, .. }
            | Self::RequestsBatch { window_id, .. }
            | Self::HeaderIntercepted { window_id, .. }
            | Self::HeadersBatch { window_id, .. }
            | Self::WindowClosed { window_id }
            | Self::ReRenderPluginUi { window_id } => Some(*window_id),
            Self::PluginUiClick { window_id, .. } => *window_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestIntercepted { .. } => "REQUEST_INTERCEPTED",
            Self::RequestsBatch { .. } => "REQUESTS_BATCH",
            Self::HeaderIntercepted { .. } => "HEADER_INTERCEPTED",
            Self::HeadersBatch { .. } => "HEADERS_BATCH",
            Self::PluginUiClick { .. } => "PLUGIN_UI_CLICK",
            Self::WindowClosed { .. } => "WINDOW_CLOSED",
            Self::ReRenderPluginUi { .. } => "RE_RENDER_PLUGIN_UI",
        }
    }
}

pub type ListenerId = u64;

/// Fan-out of window messages to registered listeners
///
/// Cheap to clone; clones share the listener set.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<DashMap<ListenerId, mpsc::UnboundedSender<WindowMessage>>>,
    next_id: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; messages emitted from now on are queued on the receiver
    pub fn add_listener(&self) -> (ListenerId, mpsc::UnboundedReceiver<WindowMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(id, tx);
        (id, rx)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Deliver to every listener, dropping listeners whose receiver is gone
    pub fn emit(&self, message: WindowMessage) {
        let mut closed = Vec::new();
        for entry in self.listeners.iter() {
            if entry.value().send(message.clone()).is_err() {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            self.listeners.remove(&id);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
