//! QuickJS sandbox for plugin code
//!
//! Each sandbox owns its own runtime and context. Plugin code sees only the
//! capabilities it was created with, installed as globals and on `env`.
//! Every call into the host goes through two native bridges that take and
//! return JSON strings:
//!
//! - `__host_call_sync(name, argsJson) -> envelopeJson`
//! - `__host_call_async(name, argsJson, id)`, settled later through
//!   `__hostSettle` once the host future completes

use super::capabilities::{call_async, call_sync, envelope, AsyncCompletion, CapabilitySet};
use crate::config::SandboxConfig;
use crate::core::errors::SandboxError;
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use rquickjs::{CatchResultExt, Context, Ctx, Function, Runtime};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

type PendingCalls = Rc<RefCell<FuturesUnordered<LocalBoxFuture<'static, AsyncCompletion>>>>;

const BOOTSTRAP: &str = r#"
(() => {
  const g = globalThis;
  const syncBridge = g.__host_call_sync;
  const asyncBridge = g.__host_call_async;
  const logBridge = g.__host_log;
  delete g.__host_call_sync;
  delete g.__host_call_async;
  delete g.__host_log;
  const pending = new Map();
  let nextId = 1;

  const messageOf = (e) => (e && e.message !== undefined ? String(e.message) : String(e));

  const sync = (name, args) => {
    const reply = JSON.parse(syncBridge(name, JSON.stringify(args)));
    if (Object.prototype.hasOwnProperty.call(reply, 'err')) throw new Error(reply.err);
    return reply.ok;
  };

  const call = (name, args) =>
    new Promise((resolve, reject) => {
      const id = nextId++;
      pending.set(id, { resolve, reject });
      asyncBridge(name, JSON.stringify(args), id);
    });

  g.__hostSettle = (payload) => {
    const { id, ok, value } = JSON.parse(payload);
    const entry = pending.get(id);
    if (!entry) return;
    pending.delete(id);
    if (ok) entry.resolve(value);
    else entry.reject(new Error(value));
  };

  const format = (args) =>
    args.map((a) => (typeof a === 'string' ? a : JSON.stringify(a))).join(' ');
  g.console = {
    log: (...a) => logBridge('info', format(a)),
    info: (...a) => logBridge('info', format(a)),
    debug: (...a) => logBridge('debug', format(a)),
    warn: (...a) => logBridge('warn', format(a)),
    error: (...a) => logBridge('error', format(a)),
  };

  g.__installCapabilities = (manifestJson) => {
    delete g.__installCapabilities;
    const manifest = JSON.parse(manifestJson);
    const env = {};
    for (const [name, kind] of Object.entries(manifest)) {
      if (kind === 'internal') continue;
      const fn = kind === 'async' ? (...args) => call(name, args) : (...args) => sync(name, args);
      env[name] = fn;
      g[name] = fn;
    }
    g.env = env;

    if (!('__effectDue' in manifest)) return;

    let frame = null;
    const runIn = (name, fn) => {
      const previous = frame;
      const current = { name, effects: [] };
      frame = current;
      sync('__beginContext', [name]);
      try {
        return { result: fn(), effects: current.effects };
      } finally {
        frame = previous;
      }
    };
    const runEffects = (effects) => {
      for (const cb of effects) {
        try {
          cb();
        } catch (e) {
          console.warn('useEffect callback failed:', messageOf(e));
        }
      }
    };

    env.useEffect = g.useEffect = (callback, deps) => {
      const name = frame ? frame.name : 'main';
      if (!sync('__effectDue', [name, deps === undefined ? null : deps])) return;
      if (frame) frame.effects.push(callback);
      else runEffects([callback]);
    };
    env.useHeaders = g.useHeaders = (filter) => filter(sync('__headers', []));
    env.useRequests = g.useRequests = (filter) => filter(sync('__requests', []));

    g.__hostRender = () => {
      let run;
      try {
        run = runIn('main', () => g.__pluginExports.main());
      } catch (e) {
        sync('__renderFailed', [messageOf(e)]);
        return;
      }
      Promise.resolve(run.result).then(
        (dom) => {
          runEffects(run.effects);
          try {
            sync('__renderComplete', [dom === undefined ? null : dom]);
          } catch (e) {
            sync('__renderFailed', [messageOf(e)]);
          }
        },
        (e) => sync('__renderFailed', [messageOf(e)]),
      );
    };

    g.__hostClick = (name) => {
      const handler = g.__pluginExports ? g.__pluginExports[name] : undefined;
      if (typeof handler !== 'function') {
        sync('__clickMissing', [name]);
        return;
      }
      let run;
      try {
        run = runIn(name, () => handler());
      } catch (e) {
        sync('__clickFailed', [name, messageOf(e)]);
        return;
      }
      Promise.resolve(run.result).then(
        () => {
          runEffects(run.effects);
          sync('__clickSettled', [name]);
        },
        (e) => sync('__clickFailed', [name, messageOf(e)]),
      );
    };
  };
})();
"#;

pub struct Sandbox {
    // Dropped before the runtime
    context: Context,
    runtime: Runtime,
    calls: PendingCalls,
    deadline: Rc<Cell<Option<Instant>>>,
    timed_out: Rc<Cell<bool>>,
    turn_timeout: Duration,
}

impl Sandbox {
    pub fn new(config: &SandboxConfig, capabilities: CapabilitySet) -> Result<Self, SandboxError> {
        let runtime = Runtime::new().map_err(|e| SandboxError::Runtime(e.to_string()))?;
        runtime.set_memory_limit(config.memory_limit_bytes());
        runtime.set_max_stack_size(config.max_stack_bytes());

        let deadline: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));
        let timed_out = Rc::new(Cell::new(false));
        {
            let deadline = deadline.clone();
            let timed_out = timed_out.clone();
            runtime.set_interrupt_handler(Some(Box::new(move || {
                let expired = deadline.get().is_some_and(|d| Instant::now() >= d);
                if expired {
                    timed_out.set(true);
                }
                expired
            })));
        }

        let context = Context::full(&runtime).map_err(|e| SandboxError::Runtime(e.to_string()))?;
        let calls: PendingCalls = Rc::new(RefCell::new(FuturesUnordered::new()));

        let manifest = capabilities.manifest().to_string();
        context
            .with(|ctx| install_bridges(&ctx, capabilities, calls.clone()))
            .map_err(|e| SandboxError::Runtime(e.to_string()))?;

        let sandbox = Self {
            context,
            runtime,
            calls,
            deadline,
            timed_out,
            turn_timeout: Duration::from_millis(config.turn_timeout_ms),
        };
        sandbox
            .eval(BOOTSTRAP)
            .map_err(|e| SandboxError::Runtime(e.to_string()))?;
        sandbox
            .call("__installCapabilities", &manifest)
            .map_err(|e| SandboxError::Runtime(e.to_string()))?;
        Ok(sandbox)
    }

    /// Evaluate a script for its side effects
    pub fn eval(&self, code: &str) -> Result<(), SandboxError> {
        self.turn(|ctx| {
            ctx.eval::<rquickjs::Value, _>(code)
                .catch(&ctx)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }

    /// Evaluate an expression and bring its value out as JSON.
    /// `undefined` and functions come out as `null`.
    pub fn eval_json(&self, expression: &str) -> Result<Value, SandboxError> {
        let wrapped = format!(
            "(() => {{ const v = ({}); const s = v === undefined ? undefined : JSON.stringify(v); return s === undefined ? 'null' : s; }})()",
            expression
        );
        let text = self.turn(|ctx| {
            ctx.eval::<String, _>(wrapped)
                .catch(&ctx)
                .map_err(|e| e.to_string())
        })?;
        serde_json::from_str(&text).map_err(|e| SandboxError::Marshal(e.to_string()))
    }

    /// Call a global function with one string argument
    pub fn call(&self, function: &str, arg: &str) -> Result<(), SandboxError> {
        self.turn(|ctx| {
            let f: Function = ctx
                .globals()
                .get(function)
                .catch(&ctx)
                .map_err(|e| format!("{}: {}", function, e))?;
            f.call::<_, rquickjs::Value>((arg.to_string(),))
                .catch(&ctx)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }

    /// Run queued promise jobs until none are left
    pub fn run_pending_jobs(&self) -> Result<(), SandboxError> {
        loop {
            self.start_turn();
            let step = self.runtime.execute_pending_job();
            self.deadline.set(None);
            match step {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(_) if self.timed_out.get() => {
                    return Err(SandboxError::TurnTimeout(self.turn_timeout.as_millis() as u64))
                }
                Err(_) => tracing::warn!("Sandbox job raised an uncaught exception"),
            }
        }
    }

    pub fn has_pending_calls(&self) -> bool {
        !self.calls.borrow().is_empty()
    }

    /// Poll the in-flight async host calls for the next completion
    pub fn poll_completion(&self, cx: &mut TaskContext<'_>) -> Poll<Option<AsyncCompletion>> {
        let mut calls = self.calls.borrow_mut();
        if calls.is_empty() {
            return Poll::Ready(None);
        }
        calls.poll_next_unpin(cx)
    }

    /// Resolve or reject the plugin promise waiting on a completion
    pub fn settle(&self, completion: AsyncCompletion) -> Result<(), SandboxError> {
        let payload = match completion.result {
            Ok(value) => json!({"id": completion.id, "ok": true, "value": value}),
            Err(e) => json!({"id": completion.id, "ok": false, "value": format!("{:#}", e)}),
        };
        self.call("__hostSettle", &payload.to_string())
    }

    /// Run jobs and settle host calls until nothing is pending
    pub async fn drive_until_idle(&self) -> Result<(), SandboxError> {
        loop {
            self.run_pending_jobs()?;
            if !self.has_pending_calls() {
                return Ok(());
            }
            if let Some(completion) = std::future::poll_fn(|cx| self.poll_completion(cx)).await {
                self.settle(completion)?;
            }
        }
    }

    fn start_turn(&self) {
        self.timed_out.set(false);
        if !self.turn_timeout.is_zero() {
            self.deadline.set(Some(Instant::now() + self.turn_timeout));
        }
    }

    fn turn<T>(&self, f: impl for<'js> FnOnce(Ctx<'js>) -> Result<T, String>) -> Result<T, SandboxError> {
        self.start_turn();
        let result = self.context.with(f);
        self.deadline.set(None);
        result.map_err(|message| {
            if self.timed_out.get() {
                SandboxError::TurnTimeout(self.turn_timeout.as_millis() as u64)
            } else {
                SandboxError::Evaluation(message)
            }
        })
    }
}

fn install_bridges(ctx: &Ctx<'_>, capabilities: CapabilitySet, calls: PendingCalls) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let sync_caps = capabilities.clone();
    globals.set(
        "__host_call_sync",
        Function::new(ctx.clone(), move |name: String, args: String| -> String {
            envelope(&call_sync(&sync_caps, &name, &args))
        })?,
    )?;

    globals.set(
        "__host_call_async",
        Function::new(ctx.clone(), move |name: String, args: String, id: f64| {
            calls
                .borrow_mut()
                .push(call_async(&capabilities, &name, &args, id as u64));
        })?,
    )?;

    // console.*
    globals.set(
        "__host_log",
        Function::new(ctx.clone(), |level: String, message: String| match level.as_str() {
            "error" => tracing::error!("[plugin] {}", message),
            "warn" => tracing::warn!("[plugin] {}", message),
            "debug" => tracing::debug!("[plugin] {}", message),
            _ => tracing::info!("[plugin] {}", message),
        })?,
    )?;

    Ok(())
}
