//! Command-line entry points
//!
//! Offline tooling for plugin authors: inspect transcripts, compute reveal
//! ranges and check a plugin's permissions without a browser.

use crate::config::HostConfig;
use crate::plugins::messages::EventEmitter;
use crate::plugins::platform::{OpenWindowOptions, OpenWindowResponse, PluginPlatform};
use crate::plugins::Host;
use crate::policy::{
    derive_proxy_url, validate_open_window_permission, validate_prove_permission, PluginConfig, ProveTarget,
};
use crate::reveal::{process_handlers, Handler, ProcessedRanges};
use crate::transcript::HttpMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::rc::Rc;

/// Platform for offline commands: plugins never get a window or a prover
struct OfflinePlatform;

#[async_trait(?Send)]
impl PluginPlatform for OfflinePlatform {
    async fn open_window(&self, url: &str, _options: &OpenWindowOptions) -> Result<OpenWindowResponse> {
        anyhow::bail!("Windows are not available offline (requested {})", url)
    }

    fn render_plugin_ui(&self, _window_id: i64, _dom: &Value) {}

    async fn close_window(&self, _window_id: i64) -> Result<()> {
        Ok(())
    }

    async fn prove(&self, _request: Value, _prover_options: Value) -> Result<Value> {
        anyhow::bail!("No prover is available offline")
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parsed summary of an HTTP transcript file
pub fn parse_transcript(path: &Path) -> Result<Value> {
    let message = HttpMessage::parse(read_bytes(path)?)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(message.to_json())
}

pub fn run_parse(path: &Path) -> Result<()> {
    print_json(&parse_transcript(path)?)
}

/// Reveal ranges for a handler list against a sent/received transcript pair
pub fn compute_ranges(handlers: &Path, sent: &Path, recv: &Path) -> Result<ProcessedRanges> {
    let handlers_json: Value = serde_json::from_slice(&read_bytes(handlers)?)
        .with_context(|| format!("Failed to parse handlers: {}", handlers.display()))?;
    let handlers = Handler::list_from_value(handlers_json)?;

    let sent = HttpMessage::parse(read_bytes(sent)?).context("Failed to parse sent transcript")?;
    let recv = HttpMessage::parse(read_bytes(recv)?).context("Failed to parse received transcript")?;

    Ok(process_handlers(&handlers, &sent, &recv)?)
}

pub fn run_ranges(handlers: &Path, sent: &Path, recv: &Path) -> Result<()> {
    print_json(&compute_ranges(handlers, sent, recv)?)
}

/// The `config` a plugin file exports, evaluated without running `main`
pub fn plugin_config(path: &Path, config: &HostConfig) -> Result<Option<PluginConfig>> {
    let code = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let host = Host::new(Rc::new(OfflinePlatform), EventEmitter::new(), config.clone());
    Ok(host.get_plugin_config(&code)?)
}

pub fn run_config(path: &Path, config: &HostConfig) -> Result<()> {
    match plugin_config(path, config)? {
        Some(plugin) => print_json(&plugin),
        None => {
            println!("{} exports no config", path.display());
            Ok(())
        }
    }
}

pub fn run_check_window(path: &Path, url: &str, config: &HostConfig) -> Result<()> {
    let plugin = plugin_config(path, config)?;
    validate_open_window_permission(url, plugin.as_ref())?;
    println!("allowed: open {}", url);
    Ok(())
}

pub fn run_check_prove(
    path: &Path,
    url: &str,
    method: &str,
    verifier: &str,
    proxy: Option<&str>,
    config: &HostConfig,
) -> Result<()> {
    let plugin = plugin_config(path, config)?;
    let proxy = match proxy {
        Some(p) => p.to_string(),
        None => {
            let host = url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .with_context(|| format!("Invalid URL: {}", url))?;
            derive_proxy_url(verifier, &host)?
        }
    };

    validate_prove_permission(
        &ProveTarget {
            url,
            method,
            verifier_url: verifier,
            proxy_url: &proxy,
        },
        plugin.as_ref(),
    )?;
    println!("allowed: {} {} via {} (proxy {})", method.to_uppercase(), url, verifier, proxy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PLUGIN: &str = r#"
export const config = {
  name: 'X Profile',
  description: 'Prove your screen name',
  requests: [{ method: 'GET', host: 'api.x.com', pathname: '/1.1/account/*', verifierUrl: 'http://localhost:7047' }],
  urls: ['https://x.com/*'],
};
export function main() { return div({}, ['hi']); }
"#;

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_plugin_config_and_checks() {
        let dir = TempDir::new().unwrap();
        let plugin = write(&dir, "plugin.js", PLUGIN.as_bytes());
        let config = HostConfig::default();

        let exported = plugin_config(&plugin, &config).unwrap().unwrap();
        assert_eq!(exported.name, "X Profile");

        assert!(run_check_window(&plugin, "https://x.com/home", &config).is_ok());
        assert!(run_check_window(&plugin, "https://evil.com/", &config).is_err());

        assert!(run_check_prove(
            &plugin,
            "https://api.x.com/1.1/account/settings.json",
            "GET",
            "http://localhost:7047",
            None,
            &config
        )
        .is_ok());
        assert!(run_check_prove(
            &plugin,
            "https://api.x.com/2/tweets",
            "GET",
            "http://localhost:7047",
            None,
            &config
        )
        .is_err());
    }

    #[test]
    fn test_compute_ranges_from_files() {
        let dir = TempDir::new().unwrap();
        let handlers = write(
            &dir,
            "handlers.json",
            br#"[{"type": "SENT", "part": "START_LINE", "action": "REVEAL"},
                 {"type": "RECV", "part": "BODY", "action": "REVEAL", "params": {"type": "json", "path": "screen_name"}}]"#,
        );
        let sent = write(&dir, "sent.http", b"GET /1.1/account/settings.json HTTP/1.1\r\nHost: api.x.com\r\n\r\n");
        let recv_bytes = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"screen_name\":\"alice\"}";
        let recv = write(&dir, "recv.http", recv_bytes);

        let ranges = compute_ranges(&handlers, &sent, &recv).unwrap();
        assert_eq!(ranges.sent_ranges.len(), 1);
        let r = ranges.recv_ranges[0];
        assert_eq!(&recv_bytes[r.start..r.end], br#""screen_name":"alice""#);
    }

    #[test]
    fn test_parse_transcript_summary() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "recv.http", b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        let summary = parse_transcript(&path).unwrap();
        assert_eq!(summary["statusCode"], "404");
    }
}
