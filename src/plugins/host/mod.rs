//! Plugin host
//!
//! Runs plugins inside QuickJS sandboxes and drives their render loop:
//! `main()` is rendered once at startup and again whenever intercepted
//! traffic, a UI click or a state change arrives, until the plugin calls
//! `done(result)` or its window is closed.

mod hooks;

use super::capabilities::{AsyncCompletion, Capability, CapabilitySet};
use super::dom;
use super::execution::{ExecutionState, Notification, Phase, Route, SharedExecution};
use super::messages::{EventEmitter, WindowMessage};
use super::platform::PluginPlatform;
use super::preprocess::{preprocess, to_script, EXPORTS_GLOBAL};
use super::sandbox::Sandbox;
use crate::config::HostConfig;
use crate::core::errors::{ExecutionError, PermissionError, SandboxError};
use crate::policy::{PermissionManager, PluginConfig};
use hooks::HookEnv;
use serde_json::Value;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Poll;

enum Wake {
    Completion(AsyncCompletion),
    Message(Option<WindowMessage>),
}

pub struct Host {
    platform: Rc<dyn PluginPlatform>,
    emitter: EventEmitter,
    config: HostConfig,
    capabilities: CapabilitySet,
    permissions: Option<Arc<PermissionManager>>,
}

impl Host {
    /// Create a host with the built-in `div` and `button` capabilities
    pub fn new(platform: Rc<dyn PluginPlatform>, emitter: EventEmitter, config: HostConfig) -> Self {
        let mut capabilities = CapabilitySet::new();
        capabilities.insert("div", Capability::sync(|args| dom::element("div", &args)));
        capabilities.insert("button", Capability::sync(|args| dom::element("button", &args)));

        Self {
            platform,
            emitter,
            config,
            capabilities,
            permissions: None,
        }
    }

    /// Acquire origin grants for each execution and release them afterwards
    pub fn with_permission_manager(mut self, manager: Arc<PermissionManager>) -> Self {
        self.permissions = Some(manager);
        self
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Add a capability to the base set every sandbox starts from
    pub fn add_capability(&mut self, name: impl Into<String>, capability: Capability) {
        let name = name.into();
        tracing::debug!("Registered capability: {} ({})", name, capability.kind());
        self.capabilities.insert(name, capability);
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// A sandbox with the base capabilities plus `overrides`, which win on
    /// name clashes. The base set is not modified.
    pub fn create_sandbox(&self, overrides: &CapabilitySet) -> Result<Sandbox, SandboxError> {
        Sandbox::new(&self.config.sandbox, self.capabilities.merged(overrides))
    }

    /// Read the `config` a plugin exports without running `main`
    pub fn get_plugin_config(&self, code: &str) -> Result<Option<PluginConfig>, SandboxError> {
        let sandbox = self.create_sandbox(&CapabilitySet::new())?;
        sandbox.eval(&to_script(&preprocess(code)))?;
        let config = sandbox.eval_json(&format!(
            "globalThis.{0} ? globalThis.{0}.config : undefined",
            EXPORTS_GLOBAL
        ))?;

        match config {
            Value::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SandboxError::Marshal(format!("Invalid plugin config: {}", e))),
        }
    }

    /// Run a plugin until it calls `done(result)`
    pub async fn execute_plugin(&self, code: &str) -> Result<Value, ExecutionError> {
        let plugin_config = self.get_plugin_config(code)?;
        let plugin = plugin_config
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "unnamed".to_string());

        let origins = plugin_config
            .as_ref()
            .map(|c| PermissionManager::extract_origins(c.requests()))
            .unwrap_or_default();
        if let Some(manager) = &self.permissions {
            if !manager.request_permissions(&origins).await {
                return Err(PermissionError::OriginsRefused(origins.join(", ")).into());
            }
        }

        let execution = ExecutionState::shared(self.config.history.clone());
        tracing::info!("[plugin:{}] starting execution {}", plugin, execution.borrow().uuid);

        let result = self.run(code, &plugin, plugin_config, &execution).await;
        self.teardown(&plugin, &execution, &result).await;

        if let Some(manager) = &self.permissions {
            manager.remove_permissions(&origins).await;
        }

        match &result {
            Ok(_) => tracing::info!("[plugin:{}] finished", plugin),
            Err(e) => tracing::warn!("[plugin:{}] failed: {}", plugin, e),
        }
        result
    }

    async fn run(
        &self,
        code: &str,
        plugin: &str,
        plugin_config: Option<PluginConfig>,
        execution: &SharedExecution,
    ) -> Result<Value, ExecutionError> {
        let env = Rc::new(HookEnv {
            plugin: plugin.to_string(),
            execution: execution.clone(),
            platform: self.platform.clone(),
            emitter: self.emitter.clone(),
            config: self.config.clone(),
            plugin_config,
        });
        let sandbox = self.create_sandbox(&hooks::execution_capabilities(env))?;

        sandbox.eval(&to_script(&preprocess(code)))?;
        let has_main = sandbox.eval_json(&format!(
            "typeof globalThis.{0} === 'object' && globalThis.{0} !== null && typeof globalThis.{0}.main === 'function'",
            EXPORTS_GLOBAL
        ))?;
        if has_main != Value::Bool(true) {
            return Err(SandboxError::MainNotFound.into());
        }

        loop {
            sandbox.run_pending_jobs()?;
            self.process_notifications(plugin, execution)?;
            if let Some(outcome) = execution.borrow_mut().take_outcome() {
                return outcome;
            }

            if self.flush_replay(plugin, &sandbox, execution)? {
                continue;
            }

            if execution.borrow_mut().start_render() {
                sandbox.call("__hostRender", "")?;
                continue;
            }

            let listening = execution.borrow().listener.is_some();
            if !sandbox.has_pending_calls() && !listening {
                return Err(ExecutionError::Stalled);
            }

            match next_wake(&sandbox, execution).await {
                Wake::Completion(completion) => {
                    // Traffic already delivered for the window lands in the
                    // history before the plugin resumes. Messages buffered
                    // while the window was opening go first.
                    self.flush_replay(plugin, &sandbox, execution)?;
                    self.drain_messages(plugin, &sandbox, execution)?;
                    if !execution.borrow().is_done() {
                        sandbox.settle(completion)?;
                    }
                }
                Wake::Message(Some(message)) => self.route_message(plugin, &sandbox, execution, message)?,
                Wake::Message(None) => return Err(ExecutionError::EventSourceClosed),
            }
        }
    }

    fn process_notifications(&self, plugin: &str, execution: &SharedExecution) -> Result<(), ExecutionError> {
        loop {
            let Some(notification) = execution.borrow_mut().next_notification() else {
                return Ok(());
            };

            match notification {
                Notification::RenderComplete(dom) => {
                    let (window, done) = {
                        let mut state = execution.borrow_mut();
                        state.finish_render();
                        (state.window_id(), state.is_done())
                    };
                    if let (Some(window_id), false) = (window, done) {
                        tracing::debug!("[plugin:{}] rendering UI in window {}", plugin, window_id);
                        self.platform.render_plugin_ui(window_id, &dom);
                    }
                }
                Notification::RenderFailed(message) => {
                    let mut state = execution.borrow_mut();
                    if state.finish_render() {
                        state.finish(Err(ExecutionError::Plugin(message)));
                    } else {
                        tracing::warn!("[plugin:{}] render failed: {}", plugin, message);
                    }
                }
                Notification::ClickSettled(handler) => {
                    tracing::debug!("[plugin:{}] {}() settled", plugin, handler);
                    execution.borrow_mut().request_rerender();
                }
                Notification::ClickFailed { handler, message } => {
                    tracing::warn!("[plugin:{}] {}() failed: {}", plugin, handler, message);
                    execution.borrow_mut().finish(Err(ExecutionError::Plugin(message)));
                }
                Notification::ClickMissing(handler) => {
                    tracing::warn!("[plugin:{}] no exported click handler named '{}'", plugin, handler);
                }
            }
        }
    }

    fn route_message(
        &self,
        plugin: &str,
        sandbox: &Sandbox,
        execution: &SharedExecution,
        message: WindowMessage,
    ) -> Result<(), ExecutionError> {
        let route = execution.borrow().route(&message);
        match route {
            Route::Buffer => execution.borrow_mut().buffer(message),
            Route::Discard => {
                tracing::debug!(
                    "[plugin:{}] ignoring {} for window {:?}",
                    plugin,
                    message.kind(),
                    message.window_id()
                );
            }
            Route::Deliver => {
                self.flush_replay(plugin, sandbox, execution)?;
                self.handle_message(plugin, sandbox, execution, message)?;
            }
        }
        Ok(())
    }

    /// Deliver messages buffered before the window id was known, in arrival
    /// order. Returns whether anything was replayed.
    fn flush_replay(&self, plugin: &str, sandbox: &Sandbox, execution: &SharedExecution) -> Result<bool, ExecutionError> {
        let replay = execution.borrow_mut().take_replay();
        if replay.is_empty() {
            return Ok(false);
        }
        tracing::debug!("[plugin:{}] replaying {} buffered messages", plugin, replay.len());
        for message in replay {
            self.handle_message(plugin, sandbox, execution, message)?;
        }
        Ok(true)
    }

    /// Route everything already queued on the listener without waiting
    fn drain_messages(&self, plugin: &str, sandbox: &Sandbox, execution: &SharedExecution) -> Result<(), ExecutionError> {
        loop {
            let next = {
                let mut state = execution.borrow_mut();
                match state.listener.as_mut() {
                    Some((_, rx)) => rx.try_recv().ok(),
                    None => None,
                }
            };
            match next {
                Some(message) => self.route_message(plugin, sandbox, execution, message)?,
                None => return Ok(()),
            }
        }
    }

    fn handle_message(
        &self,
        plugin: &str,
        sandbox: &Sandbox,
        execution: &SharedExecution,
        message: WindowMessage,
    ) -> Result<(), ExecutionError> {
        if execution.borrow().is_done() {
            return Ok(());
        }

        match message {
            WindowMessage::RequestIntercepted { request, .. } => {
                execution.borrow_mut().record_requests([request]);
            }
            WindowMessage::RequestsBatch { requests, .. } => {
                tracing::debug!("[plugin:{}] {} intercepted requests", plugin, requests.len());
                execution.borrow_mut().record_requests(requests);
            }
            WindowMessage::HeaderIntercepted { header, .. } => {
                execution.borrow_mut().record_headers([header]);
            }
            WindowMessage::HeadersBatch { headers, .. } => {
                tracing::debug!("[plugin:{}] {} intercepted headers", plugin, headers.len());
                execution.borrow_mut().record_headers(headers);
            }
            WindowMessage::PluginUiClick { onclick, .. } => {
                tracing::debug!("[plugin:{}] click -> {}()", plugin, onclick);
                sandbox.call("__hostClick", &onclick)?;
            }
            WindowMessage::WindowClosed { window_id } => {
                tracing::info!("[plugin:{}] window {} closed", plugin, window_id);
                execution
                    .borrow_mut()
                    .finish(Err(ExecutionError::WindowClosed(window_id)));
            }
            WindowMessage::ReRenderPluginUi { .. } => execution.borrow_mut().request_rerender(),
        }
        Ok(())
    }

    /// Detach the listener and close the window the plugin opened. A window
    /// the user closed is not closed again.
    async fn teardown(&self, plugin: &str, execution: &SharedExecution, result: &Result<Value, ExecutionError>) {
        let (listener, window) = {
            let mut state = execution.borrow_mut();
            state.set_phase(Phase::Done);
            state.open_window = None;
            (state.listener.take().map(|(id, _)| id), state.window_id())
        };

        if let Some(id) = listener {
            self.emitter.remove_listener(id);
        }

        let closed_by_user = matches!(result, Err(ExecutionError::WindowClosed(_)));
        if let (Some(window_id), false) = (window, closed_by_user) {
            if let Err(e) = self.platform.close_window(window_id).await {
                tracing::warn!("[plugin:{}] failed to close window {}: {}", plugin, window_id, e);
            }
        }
    }
}

async fn next_wake(sandbox: &Sandbox, execution: &SharedExecution) -> Wake {
    std::future::poll_fn(|cx| {
        if sandbox.has_pending_calls() {
            if let Poll::Ready(Some(completion)) = sandbox.poll_completion(cx) {
                return Poll::Ready(Wake::Completion(completion));
            }
        }
        let mut state = execution.borrow_mut();
        if let Some((_, rx)) = state.listener.as_mut() {
            if let Poll::Ready(message) = rx.poll_recv(cx) {
                return Poll::Ready(Wake::Message(message));
            }
        }
        Poll::Pending
    })
    .await
}
