//! Per-execution state
//!
//! Everything a running plugin accumulates lives here and is owned by that
//! execution alone: the named state store, effect dependencies, the
//! intercepted request/header history, the window it opened and the
//! messages buffered while that window was still opening.

use super::messages::{InterceptedRequest, InterceptedRequestHeader, ListenerId, WindowMessage};
use super::platform::WindowInfo;
use crate::config::HistoryConfig;
use crate::core::errors::ExecutionError;
use futures::future::{LocalBoxFuture, Shared};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tokio::sync::mpsc;

pub type SharedExecution = Rc<RefCell<ExecutionState>>;

pub(crate) type OpenWindowFuture = Shared<LocalBoxFuture<'static, Result<WindowInfo, String>>>;

/// Lifecycle of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Running,
    AwaitingEvent,
    Rerendering,
    Done,
}

/// Signals raised by the sandbox during a turn, handled by the host after it
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    RenderComplete(Value),
    RenderFailed(String),
    ClickSettled(String),
    ClickFailed { handler: String, message: String },
    ClickMissing(String),
}

/// Where an inbound message goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Window id not known yet
    Buffer,
    Deliver,
    /// Message for another window
    Discard,
}

pub struct ExecutionState {
    pub uuid: String,
    phase: Phase,
    store: HashMap<String, Value>,
    effect_deps: HashMap<String, Vec<Value>>,
    effect_cursor: HashMap<String, usize>,
    requests: VecDeque<InterceptedRequest>,
    headers: VecDeque<InterceptedRequestHeader>,
    history: HistoryConfig,
    window: Option<WindowInfo>,
    buffer: Vec<WindowMessage>,
    pending_replay: bool,
    render_in_flight: bool,
    rerender_requested: bool,
    renders_completed: u64,
    notifications: VecDeque<Notification>,
    outcome: Option<Result<Value, ExecutionError>>,
    pub(crate) listener: Option<(ListenerId, mpsc::UnboundedReceiver<WindowMessage>)>,
    pub(crate) open_window: Option<OpenWindowFuture>,
}

impl ExecutionState {
    pub fn new(history: HistoryConfig) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            phase: Phase::Loading,
            store: HashMap::new(),
            effect_deps: HashMap::new(),
            effect_cursor: HashMap::new(),
            requests: VecDeque::new(),
            headers: VecDeque::new(),
            history,
            window: None,
            buffer: Vec::new(),
            pending_replay: false,
            render_in_flight: false,
            rerender_requested: false,
            renders_completed: 0,
            notifications: VecDeque::new(),
            outcome: None,
            listener: None,
            open_window: None,
        }
    }

    pub fn shared(history: HistoryConfig) -> SharedExecution {
        Rc::new(RefCell::new(Self::new(history)))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase && self.phase != Phase::Done {
            tracing::debug!("[execution:{}] {:?} -> {:?}", self.uuid, self.phase, phase);
            self.phase = phase;
        }
    }

    // =========================================================================
    // State store
    // =========================================================================

    /// Stored value for `key`, seeding `default` only when nothing is stored
    pub fn use_state(&mut self, key: &str, default: Value) -> Value {
        self.store.entry(key.to_string()).or_insert(default).clone()
    }

    /// Store a value; `true` when it differs from what was stored
    pub fn set_state(&mut self, key: &str, value: Value) -> bool {
        if self.store.get(key) == Some(&value) {
            return false;
        }
        self.store.insert(key.to_string(), value);
        self.rerender_requested = true;
        true
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Start a render or click handler run; effect slots restart at zero
    pub fn begin_context(&mut self, context: &str) {
        self.effect_cursor.insert(context.to_string(), 0);
    }

    /// Whether the next effect slot of `context` should run. `null` deps run
    /// every time; otherwise on first sight and when the deps change.
    pub fn effect_due(&mut self, context: &str, deps: Value) -> bool {
        let cursor = self.effect_cursor.entry(context.to_string()).or_insert(0);
        let slot = *cursor;
        *cursor += 1;

        let slots = self.effect_deps.entry(context.to_string()).or_default();
        if deps.is_null() {
            if slot < slots.len() {
                slots[slot] = Value::Null;
            } else {
                slots.push(Value::Null);
            }
            return true;
        }

        match slots.get_mut(slot) {
            Some(previous) if *previous == deps => false,
            Some(previous) => {
                *previous = deps;
                true
            }
            None => {
                slots.push(deps);
                true
            }
        }
    }

    // =========================================================================
    // Interception history
    // =========================================================================

    pub fn record_requests(&mut self, requests: impl IntoIterator<Item = InterceptedRequest>) {
        for request in requests {
            self.requests.push_back(request);
        }
        while self.requests.len() > self.history.max_requests_per_window {
            self.requests.pop_front();
        }
        self.rerender_requested = true;
    }

    pub fn record_headers(&mut self, headers: impl IntoIterator<Item = InterceptedRequestHeader>) {
        for header in headers {
            self.headers.push_back(header);
        }
        while self.headers.len() > self.history.max_headers_per_window {
            self.headers.pop_front();
        }
        self.rerender_requested = true;
    }

    pub fn requests(&self) -> Vec<InterceptedRequest> {
        self.requests.iter().cloned().collect()
    }

    pub fn headers(&self) -> Vec<InterceptedRequestHeader> {
        self.headers.iter().cloned().collect()
    }

    // =========================================================================
    // Window and message routing
    // =========================================================================

    pub fn window(&self) -> Option<&WindowInfo> {
        self.window.as_ref()
    }

    pub fn window_id(&self) -> Option<i64> {
        self.window.as_ref().map(|w| w.window_id)
    }

    /// Record the opened window; buffered messages become due for replay
    pub fn window_opened(&mut self, info: WindowInfo) {
        self.window = Some(info);
        self.pending_replay = true;
    }

    /// The window could not be opened; nothing buffered for it survives
    pub fn window_failed(&mut self) -> Option<ListenerId> {
        self.buffer.clear();
        self.listener.take().map(|(id, _)| id)
    }

    pub fn route(&self, message: &WindowMessage) -> Route {
        match (self.window_id(), message.window_id()) {
            (None, _) => Route::Buffer,
            (Some(_), None) => Route::Deliver,
            (Some(ours), Some(theirs)) if ours == theirs => Route::Deliver,
            (Some(_), Some(_)) => Route::Discard,
        }
    }

    pub fn buffer(&mut self, message: WindowMessage) {
        tracing::debug!(
            "[execution:{}] buffering {} until the window id is known",
            self.uuid,
            message.kind()
        );
        self.buffer.push(message);
    }

    /// Buffered messages for the opened window in arrival order; the rest
    /// are discarded
    pub fn take_replay(&mut self) -> Vec<WindowMessage> {
        if !self.pending_replay {
            return Vec::new();
        }
        let Some(ours) = self.window_id() else {
            return Vec::new();
        };
        self.pending_replay = false;

        let (keep, drop): (Vec<_>, Vec<_>) = self
            .buffer
            .drain(..)
            .partition(|m| m.window_id().map_or(true, |id| id == ours));
        if !drop.is_empty() {
            tracing::debug!(
                "[execution:{}] discarded {} buffered messages for other windows",
                self.uuid,
                drop.len()
            );
        }
        keep
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    pub fn request_rerender(&mut self) {
        self.rerender_requested = true;
    }

    /// Claim the next render if one is wanted and none is running
    pub fn start_render(&mut self) -> bool {
        let wanted = self.renders_completed == 0 || self.rerender_requested;
        if self.render_in_flight || !wanted || self.outcome.is_some() {
            return false;
        }
        if self.renders_completed == 0 && self.phase == Phase::Loading {
            self.set_phase(Phase::Running);
        } else {
            self.set_phase(Phase::Rerendering);
        }
        self.render_in_flight = true;
        self.rerender_requested = false;
        true
    }

    /// Mark the running render finished; returns whether it was the first
    pub fn finish_render(&mut self) -> bool {
        self.render_in_flight = false;
        self.renders_completed += 1;
        self.set_phase(Phase::AwaitingEvent);
        self.renders_completed == 1
    }

    pub fn render_in_flight(&self) -> bool {
        self.render_in_flight
    }

    pub fn rerender_requested(&self) -> bool {
        self.rerender_requested
    }

    pub fn renders_completed(&self) -> u64 {
        self.renders_completed
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    pub fn next_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front()
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Record the outcome; only the first call counts
    pub fn finish(&mut self, outcome: Result<Value, ExecutionError>) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        self.set_phase(Phase::Done);
        true
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn take_outcome(&mut self) -> Option<Result<Value, ExecutionError>> {
        self.outcome.take()
    }
}
