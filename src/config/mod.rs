//! Configuration management for the plugin host

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub sandbox: SandboxConfig,
    pub window: WindowConfig,
    pub history: HistoryConfig,
    pub prove: ProveConfig,
}

/// Limits applied to each JavaScript sandbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Heap limit for one sandbox runtime, in megabytes
    pub memory_limit_mb: usize,
    /// Native stack limit for one sandbox runtime, in kilobytes
    pub max_stack_kb: usize,
    /// Budget for a single synchronous JS turn (0 disables the watchdog).
    /// A plugin execution as a whole has no timeout.
    pub turn_timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 64,
            max_stack_kb: 1024,
            turn_timeout_ms: 5000,
        }
    }
}

/// Defaults for `openWindow` options a plugin leaves out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub default_width: u32,
    pub default_height: u32,
    pub show_overlay: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_width: 900,
            default_height: 700,
            show_overlay: true,
        }
    }
}

/// Caps on the intercepted request/header history kept per execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Oldest requests are dropped past this count
    pub max_requests_per_window: usize,
    /// Oldest header records are dropped past this count
    pub max_headers_per_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 1000,
            max_headers_per_window: 1000,
        }
    }
}

/// Prover defaults used when a plugin omits them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProveConfig {
    pub max_sent_data: u64,
    pub max_recv_data: u64,
}

impl Default for ProveConfig {
    fn default() -> Self {
        Self {
            max_sent_data: 4096,
            max_recv_data: 16384,
        }
    }
}

impl SandboxConfig {
    pub fn memory_limit_bytes(&self) -> usize {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn max_stack_bytes(&self) -> usize {
        self.max_stack_kb.saturating_mul(1024)
    }
}

impl HostConfig {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file, defaulting when it is absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: HostConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            tracing::debug!("Loaded host config from {}", path.display());
            Ok(config)
        } else {
            Ok(HostConfig::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "tlsn-plugin-host") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}
