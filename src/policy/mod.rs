//! Plugin permissions
//!
//! - `manifest`: the `config` a plugin exports (request and URL permissions)
//! - `validator`: deny-by-default checks for `prove` and `openWindow`
//! - `grants`: reference-counted platform origin grants

pub mod grants;
pub mod manifest;
pub mod validator;

pub use grants::{is_removable_origin, OriginPermissionStore, PermissionManager, PermissionPattern};
pub use manifest::{PluginConfig, ProveTarget, RequestPermission};
pub use validator::{
    derive_proxy_url, matches_pathname_pattern, matches_url_pattern, summarize_requests,
    validate_open_window_permission, validate_prove_permission,
};
