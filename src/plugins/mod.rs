//! Plugin sandbox host runtime
//!
//! Plugins are small JavaScript modules that export `main` (and optionally a
//! `config` manifest and click handlers). The host runs each one in its own
//! QuickJS sandbox with no ambient access: everything a plugin can do goes
//! through a named capability.
//!
//! # Architecture
//!
//! - `preprocess`: normalizes plugin exports into one wrapped default export
//! - `sandbox`: the QuickJS runtime and the JSON bridge into the host
//! - `capabilities`: sync and async capability functions
//! - `execution`: per-execution state (state store, effects, history, window)
//! - `host`: capability wiring and the render/event loop
//! - `messages`, `platform`, `dom`: the wire types and collaborator traits
//!
//! # Security
//!
//! `openWindow` and `prove` are checked against the permissions the plugin
//! declares in its `config` before the platform is asked to do anything.

pub mod capabilities;
pub mod dom;
pub mod execution;
pub mod host;
pub mod messages;
pub mod platform;
pub mod preprocess;
pub mod sandbox;

pub use capabilities::{Capability, CapabilitySet};
pub use dom::{DomJson, DomOptions};
pub use execution::Phase;
pub use host::Host;
pub use messages::{EventEmitter, InterceptedRequest, InterceptedRequestHeader, WindowMessage};
pub use platform::{OpenWindowOptions, OpenWindowResponse, PluginPlatform, WindowError, WindowInfo};
pub use preprocess::preprocess;
pub use sandbox::Sandbox;
