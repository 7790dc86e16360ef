//! Origin grant tracking across concurrent plugin executions
//!
//! Before a plugin runs, the host asks the platform for access to the
//! origins its request permissions name. Grants are reference counted so an
//! origin shared by two running plugins is only revoked when the last one
//! finishes.

use super::manifest::RequestPermission;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use url::Url;

/// Platform store of granted origins (browser permissions, app allowlist)
#[async_trait]
pub trait OriginPermissionStore: Send + Sync {
    /// Whether every origin is already granted
    async fn contains(&self, origins: &[String]) -> anyhow::Result<bool>;

    /// Ask for the origins; `false` when refused
    async fn request(&self, origins: &[String]) -> anyhow::Result<bool>;

    /// Revoke the origins
    async fn remove(&self, origins: &[String]) -> anyhow::Result<bool>;
}

/// An origin pattern and the request permission it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPattern {
    /// Origin pattern, e.g. `https://api.x.com/*`
    pub origin: String,
    pub host: String,
    pub pathname: String,
}

/// Origins granted by the platform that cannot be revoked
const MANIFEST_ORIGINS: &[&str] = &["http://*/*", "https://*/*", "<all_urls>"];

pub struct PermissionManager {
    store: Arc<dyn OriginPermissionStore>,
    active: DashMap<String, i64>,
}

impl PermissionManager {
    pub fn new(store: Arc<dyn OriginPermissionStore>) -> Self {
        Self {
            store,
            active: DashMap::new(),
        }
    }

    /// Origin patterns for a plugin's request permissions: each target host
    /// over https plus each distinct verifier origin
    pub fn extract_permission_patterns(requests: &[RequestPermission]) -> Vec<PermissionPattern> {
        let mut patterns: Vec<PermissionPattern> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for req in requests {
            let origin = format!("https://{}/*", req.host);
            if seen.insert(origin.clone()) {
                patterns.push(PermissionPattern {
                    origin,
                    host: req.host.clone(),
                    pathname: req.pathname.clone(),
                });
            }

            let Ok(verifier) = Url::parse(&req.verifier_url) else {
                continue;
            };
            let host = match verifier.port() {
                Some(port) => format!("{}:{}", verifier.host_str().unwrap_or_default(), port),
                None => verifier.host_str().unwrap_or_default().to_string(),
            };
            let origin = format!("{}://{}/*", verifier.scheme(), host);
            if seen.insert(origin.clone()) {
                patterns.push(PermissionPattern {
                    origin,
                    host,
                    pathname: "/*".to_string(),
                });
            }
        }

        patterns
    }

    pub fn extract_origins(requests: &[RequestPermission]) -> Vec<String> {
        Self::extract_permission_patterns(requests)
            .into_iter()
            .map(|p| p.origin)
            .collect()
    }

    /// `host + pathname` for each request permission, for display
    pub fn format_for_display(requests: &[RequestPermission]) -> Vec<String> {
        requests.iter().map(|r| format!("{}{}", r.host, r.pathname)).collect()
    }

    /// Acquire the origins, asking the store only when they are not already held
    pub async fn request_permissions(&self, origins: &[String]) -> bool {
        if origins.is_empty() {
            return true;
        }

        match self.store.contains(origins).await {
            Ok(true) => {
                tracing::debug!("Origins already granted: {:?}", origins);
                self.track_usage(origins, 1);
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to query origin grants: {}", e);
                return false;
            }
        }

        match self.store.request(origins).await {
            Ok(granted) => {
                tracing::info!(
                    "Origins {} for: {:?}",
                    if granted { "granted" } else { "denied" },
                    origins
                );
                if granted {
                    self.track_usage(origins, 1);
                }
                granted
            }
            Err(e) => {
                tracing::warn!("Failed to request origin grants: {}", e);
                false
            }
        }
    }

    /// Release the origins, revoking those no longer used by any execution
    pub async fn remove_permissions(&self, origins: &[String]) -> bool {
        if origins.is_empty() {
            return true;
        }

        self.track_usage(origins, -1);

        let to_remove: Vec<String> = origins
            .iter()
            .filter(|origin| {
                let in_use = self.usage_count(origin) > 0;
                let removable = is_removable_origin(origin);
                if !removable {
                    tracing::debug!("Skipping non-removable origin: {}", origin);
                }
                !in_use && removable
            })
            .cloned()
            .collect();

        if to_remove.is_empty() {
            tracing::debug!("No origins to revoke from {:?}", origins);
            return true;
        }

        match self.store.remove(&to_remove).await {
            Ok(removed) => {
                tracing::info!("Revoked origins {:?}: {}", to_remove, removed);
                removed
            }
            Err(e) => {
                tracing::warn!("Failed to revoke origins {:?}: {}", to_remove, e);
                false
            }
        }
    }

    pub fn usage_count(&self, origin: &str) -> i64 {
        self.active.get(origin).map(|c| *c).unwrap_or(0)
    }

    fn track_usage(&self, origins: &[String], delta: i64) {
        for origin in origins {
            let remove = {
                let mut count = self.active.entry(origin.clone()).or_insert(0);
                *count += delta;
                *count <= 0
            };
            if remove {
                self.active.remove(origin);
            }
        }
    }
}

/// Manifest-wide patterns and wildcard hosts stay granted
pub fn is_removable_origin(origin: &str) -> bool {
    if MANIFEST_ORIGINS.contains(&origin) {
        return false;
    }
    let Some((_, rest)) = origin.split_once("://") else {
        return false;
    };
    let host = rest.split('/').next().unwrap_or_default();
    !host.is_empty() && !host.contains('*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        granted: Mutex<Vec<String>>,
        refuse: bool,
    }

    #[async_trait]
    impl OriginPermissionStore for MemoryStore {
        async fn contains(&self, origins: &[String]) -> anyhow::Result<bool> {
            let granted = self.granted.lock().unwrap();
            Ok(origins.iter().all(|o| granted.contains(o)))
        }

        async fn request(&self, origins: &[String]) -> anyhow::Result<bool> {
            if self.refuse {
                return Ok(false);
            }
            self.granted.lock().unwrap().extend(origins.iter().cloned());
            Ok(true)
        }

        async fn remove(&self, origins: &[String]) -> anyhow::Result<bool> {
            self.granted.lock().unwrap().retain(|o| !origins.contains(o));
            Ok(true)
        }
    }

    fn permission(host: &str, verifier: &str) -> RequestPermission {
        RequestPermission {
            method: "GET".into(),
            host: host.into(),
            pathname: "/*".into(),
            verifier_url: verifier.into(),
            proxy_url: None,
        }
    }

    #[test]
    fn test_extract_origins_dedupes() {
        let origins = PermissionManager::extract_origins(&[
            permission("api.x.com", "http://localhost:7047"),
            permission("api.x.com", "http://localhost:7047"),
            permission("x.com", "https://verifier.org"),
        ]);
        assert_eq!(
            origins,
            vec![
                "https://api.x.com/*",
                "http://localhost:7047/*",
                "https://x.com/*",
                "https://verifier.org/*"
            ]
        );
    }

    #[test]
    fn test_removable_origins() {
        assert!(is_removable_origin("https://api.x.com/*"));
        assert!(!is_removable_origin("https://*/*"));
        assert!(!is_removable_origin("<all_urls>"));
        assert!(!is_removable_origin("https://*.x.com/*"));
    }

    #[tokio::test]
    async fn test_shared_origin_revoked_by_last_holder() {
        let store = Arc::new(MemoryStore::default());
        let manager = PermissionManager::new(store.clone());
        let origins = vec!["https://api.x.com/*".to_string()];

        assert!(manager.request_permissions(&origins).await);
        assert!(manager.request_permissions(&origins).await);
        assert_eq!(manager.usage_count("https://api.x.com/*"), 2);

        manager.remove_permissions(&origins).await;
        assert_eq!(store.granted.lock().unwrap().len(), 1);

        manager.remove_permissions(&origins).await;
        assert!(store.granted.lock().unwrap().is_empty());
        assert_eq!(manager.usage_count("https://api.x.com/*"), 0);
    }

    #[tokio::test]
    async fn test_refused_grant_is_not_tracked() {
        let store = Arc::new(MemoryStore {
            refuse: true,
            ..Default::default()
        });
        let manager = PermissionManager::new(store);
        let origins = vec!["https://api.x.com/*".to_string()];
        assert!(!manager.request_permissions(&origins).await);
        assert_eq!(manager.usage_count("https://api.x.com/*"), 0);
    }
}
