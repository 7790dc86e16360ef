//! Capabilities bound to one plugin execution
//!
//! These close over the execution's state and are layered on top of the
//! host's base capabilities when the execution's sandbox is created.

use crate::config::HostConfig;
use crate::plugins::capabilities::{Capability, CapabilitySet};
use crate::plugins::execution::{Notification, OpenWindowFuture, SharedExecution};
use crate::plugins::messages::EventEmitter;
use crate::plugins::platform::{OpenWindowOptions, OpenWindowResponse, PluginPlatform};
use crate::policy::{
    derive_proxy_url, validate_open_window_permission, validate_prove_permission, PluginConfig, ProveTarget,
};
use crate::prove::{ProverOptions, RequestOptions};
use anyhow::Context;
use futures::FutureExt;
use serde_json::Value;
use std::rc::Rc;
use url::Url;

/// What the execution-bound capabilities need
pub(super) struct HookEnv {
    pub plugin: String,
    pub execution: SharedExecution,
    pub platform: Rc<dyn PluginPlatform>,
    pub emitter: EventEmitter,
    pub config: HostConfig,
    pub plugin_config: Option<PluginConfig>,
}

pub(super) fn execution_capabilities(env: Rc<HookEnv>) -> CapabilitySet {
    let mut set = CapabilitySet::new();

    // =========================================================================
    // State
    // =========================================================================

    // useState(key, default) -> value
    let e = env.clone();
    set.insert(
        "useState",
        Capability::sync(move |args| {
            let key = string_arg(&args, 0, "useState")?;
            let default = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(e.execution.borrow_mut().use_state(&key, default))
        }),
    );

    // setState(key, value)
    let e = env.clone();
    set.insert(
        "setState",
        Capability::sync(move |args| {
            let key = string_arg(&args, 0, "setState")?;
            let value = args.get(1).cloned().unwrap_or(Value::Null);
            if e.execution.borrow_mut().set_state(&key, value) {
                tracing::debug!("[plugin:{}] setState({}) requested a re-render", e.plugin, key);
            }
            Ok(Value::Null)
        }),
    );

    // done(result?)
    let e = env.clone();
    set.insert(
        "done",
        Capability::sync(move |args| {
            let result = args.into_iter().next().unwrap_or(Value::Null);
            if e.execution.borrow_mut().finish(Ok(result)) {
                tracing::info!("[plugin:{}] done", e.plugin);
            } else {
                tracing::debug!("[plugin:{}] done() called again, ignored", e.plugin);
            }
            Ok(Value::Null)
        }),
    );

    // =========================================================================
    // Hook plumbing (driven by the sandbox bootstrap)
    // =========================================================================

    let e = env.clone();
    set.insert(
        "__beginContext",
        Capability::sync(move |args| {
            let context = string_arg(&args, 0, "__beginContext")?;
            e.execution.borrow_mut().begin_context(&context);
            Ok(Value::Null)
        }),
    );

    let e = env.clone();
    set.insert(
        "__effectDue",
        Capability::sync(move |args| {
            let context = string_arg(&args, 0, "useEffect")?;
            let deps = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(Value::Bool(e.execution.borrow_mut().effect_due(&context, deps)))
        }),
    );

    let e = env.clone();
    set.insert(
        "__headers",
        Capability::sync(move |_| Ok(serde_json::to_value(e.execution.borrow().headers())?)),
    );

    let e = env.clone();
    set.insert(
        "__requests",
        Capability::sync(move |_| Ok(serde_json::to_value(e.execution.borrow().requests())?)),
    );

    let e = env.clone();
    set.insert(
        "__renderComplete",
        Capability::sync(move |args| {
            let dom = args.into_iter().next().unwrap_or(Value::Null);
            e.execution.borrow_mut().notify(Notification::RenderComplete(dom));
            Ok(Value::Null)
        }),
    );

    let e = env.clone();
    set.insert(
        "__renderFailed",
        Capability::sync(move |args| {
            let message = string_arg(&args, 0, "__renderFailed")?;
            e.execution.borrow_mut().notify(Notification::RenderFailed(message));
            Ok(Value::Null)
        }),
    );

    let e = env.clone();
    set.insert(
        "__clickSettled",
        Capability::sync(move |args| {
            let handler = string_arg(&args, 0, "__clickSettled")?;
            e.execution.borrow_mut().notify(Notification::ClickSettled(handler));
            Ok(Value::Null)
        }),
    );

    let e = env.clone();
    set.insert(
        "__clickFailed",
        Capability::sync(move |args| {
            let handler = string_arg(&args, 0, "__clickFailed")?;
            let message = string_arg(&args, 1, "__clickFailed")?;
            e.execution
                .borrow_mut()
                .notify(Notification::ClickFailed { handler, message });
            Ok(Value::Null)
        }),
    );

    let e = env.clone();
    set.insert(
        "__clickMissing",
        Capability::sync(move |args| {
            let handler = string_arg(&args, 0, "__clickMissing")?;
            e.execution.borrow_mut().notify(Notification::ClickMissing(handler));
            Ok(Value::Null)
        }),
    );

    // =========================================================================
    // Window and prover
    // =========================================================================

    // openWindow(url, {width?, height?, showOverlay?}) -> Promise<{windowId, uuid, tabId}>
    let e = env.clone();
    set.insert(
        "openWindow",
        Capability::asynchronous(move |args| {
            let e = e.clone();
            async move { open_window(e, args).await }.boxed_local()
        }),
    );

    // prove(requestOptions, proverOptions) -> Promise<result>
    set.insert(
        "prove",
        Capability::asynchronous(move |args| {
            let e = env.clone();
            async move { prove(e, args).await }.boxed_local()
        }),
    );

    set
}

fn string_arg(args: &[Value], index: usize, capability: &str) -> anyhow::Result<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => anyhow::bail!("{}: argument {} must be a string", capability, index + 1),
    }
}

async fn open_window(env: Rc<HookEnv>, args: Vec<Value>) -> anyhow::Result<Value> {
    let url = string_arg(&args, 0, "openWindow")?;
    let parsed = Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid URL: {}: {}", url, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Invalid URL: {} (only http and https URLs can be opened)", url);
    }
    validate_open_window_permission(&url, env.plugin_config.as_ref())?;

    let requested: OpenWindowOptions = match args.get(1) {
        None | Some(Value::Null) => OpenWindowOptions::default(),
        Some(v) => serde_json::from_value(v.clone()).context("Invalid openWindow options")?,
    };
    let options = OpenWindowOptions {
        width: requested.width.or(Some(env.config.window.default_width)),
        height: requested.height.or(Some(env.config.window.default_height)),
        show_overlay: requested.show_overlay.or(Some(env.config.window.show_overlay)),
    };

    let window = {
        let mut state = env.execution.borrow_mut();
        if let Some(existing) = state.open_window.clone() {
            tracing::debug!("[plugin:{}] openWindow: reusing window", env.plugin);
            existing
        } else {
            let started = start_window(env.clone(), url, options);
            state.open_window = Some(started.clone());
            started
        }
    };

    let info = window.await.map_err(anyhow::Error::msg)?;
    Ok(serde_json::to_value(info)?)
}

/// Register the listener first, then ask the platform for the window: the
/// platform may emit traffic for the window before it reports the id.
fn start_window(env: Rc<HookEnv>, url: String, options: OpenWindowOptions) -> OpenWindowFuture {
    async move {
        let (listener, rx) = env.emitter.add_listener();
        env.execution.borrow_mut().listener = Some((listener, rx));
        tracing::info!("[plugin:{}] opening window {}", env.plugin, url);

        let response = env.platform.open_window(&url, &options).await;

        let mut state = env.execution.borrow_mut();
        let failure = match response {
            Ok(OpenWindowResponse::WindowOpened(info)) => {
                tracing::info!(
                    "[plugin:{}] window {} opened (tab {})",
                    env.plugin,
                    info.window_id,
                    info.tab_id
                );
                state.window_opened(info.clone());
                return Ok(info);
            }
            Ok(OpenWindowResponse::WindowError(error)) => error.message(),
            Err(e) => format!("{:#}", e),
        };

        tracing::warn!("[plugin:{}] failed to open window: {}", env.plugin, failure);
        if let Some(id) = state.window_failed() {
            env.emitter.remove_listener(id);
        }
        Err(failure)
    }
    .boxed_local()
    .shared()
}

async fn prove(env: Rc<HookEnv>, args: Vec<Value>) -> anyhow::Result<Value> {
    let request: RequestOptions =
        serde_json::from_value(args.first().cloned().unwrap_or(Value::Null)).context("Invalid prove request options")?;
    let mut options: ProverOptions =
        serde_json::from_value(args.get(1).cloned().unwrap_or(Value::Null)).context("Invalid prover options")?;

    let target_host = Url::parse(&request.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| anyhow::anyhow!("Invalid URL: {}", request.url))?;
    let proxy_url = match options.proxy_url.take() {
        Some(proxy) => proxy,
        None => derive_proxy_url(&options.verifier_url, &target_host)?,
    };

    validate_prove_permission(
        &ProveTarget {
            url: &request.url,
            method: &request.method,
            verifier_url: &options.verifier_url,
            proxy_url: &proxy_url,
        },
        env.plugin_config.as_ref(),
    )?;

    options.proxy_url = Some(proxy_url);
    let options = options.with_defaults(&env.config.prove);
    tracing::info!(
        "[plugin:{}] prove {} {} via {}",
        env.plugin,
        request.method,
        request.url,
        options.verifier_url
    );

    env.platform
        .prove(serde_json::to_value(&request)?, serde_json::to_value(&options)?)
        .await
}
