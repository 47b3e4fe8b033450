//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Shared passphrase used when none is configured. Public, so it protects nothing.
pub const DEMO_PASSPHRASE: &str = "walkie-demo-passphrase-32-bytes!";

/// Peer configuration. File: ~/.config/walkie/config.toml or /etc/walkie/config.toml.
/// Env overrides: WALKIE_PASSPHRASE, WALKIE_STUN_URL, WALKIE_DOWNLOAD_DIR, WALKIE_GATHER_TIMEOUT_SECS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Shared file-encryption passphrase, 16 or 32 bytes.
    #[serde(default = "default_passphrase")]
    pub passphrase: String,
    /// STUN servers for candidate gathering.
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
    /// Where received files and snapshots are written.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Upper bound on waiting for end-of-candidates.
    #[serde(default = "default_gather_timeout_secs")]
    pub gather_timeout_secs: u64,
    /// Data channel label.
    #[serde(default = "default_channel_label")]
    pub channel_label: String,
}

fn default_passphrase() -> String {
    DEMO_PASSPHRASE.to_string()
}
fn default_stun_urls() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}
fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_gather_timeout_secs() -> u64 {
    10
}
fn default_channel_label() -> String {
    walkie_core::connection::DEFAULT_CHANNEL_LABEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            passphrase: default_passphrase(),
            stun_urls: default_stun_urls(),
            download_dir: default_download_dir(),
            gather_timeout_secs: default_gather_timeout_secs(),
            channel_label: default_channel_label(),
        }
    }
}

impl Config {
    pub fn uses_demo_passphrase(&self) -> bool {
        self.passphrase == DEMO_PASSPHRASE
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |name| std::env::var(name).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("WALKIE_PASSPHRASE") {
        c.passphrase = s;
    }
    if let Some(s) = var("WALKIE_STUN_URL") {
        c.stun_urls = s
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(s) = var("WALKIE_DOWNLOAD_DIR") {
        c.download_dir = PathBuf::from(s);
    }
    if let Some(s) = var("WALKIE_GATHER_TIMEOUT_SECS") {
        if let Ok(n) = s.parse::<u64>() {
            c.gather_timeout_secs = n;
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/walkie/config.toml"));
    }
    out.push(PathBuf::from("/etc/walkie/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => {
                        tracing::debug!(path = %p.display(), "loaded config");
                        return Some(c);
                    }
                    Err(e) => tracing::warn!(path = %p.display(), error = %e, "ignoring invalid config"),
                },
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "cannot read config"),
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.uses_demo_passphrase());
        assert_eq!(c.gather_timeout_secs, 10);
        assert_eq!(c.channel_label, "walkie");
        assert_eq!(DEMO_PASSPHRASE.len(), 32);
    }

    #[test]
    fn file_values_and_unknown_fields() {
        let c: Config = toml::from_str(
            r#"
            passphrase = "sixteen byte key"
            stun_urls = []
            download_dir = "/tmp/walkie"
            "#,
        )
        .unwrap();
        assert!(!c.uses_demo_passphrase());
        assert!(c.stun_urls.is_empty());
        assert_eq!(c.download_dir, PathBuf::from("/tmp/walkie"));

        assert!(toml::from_str::<Config>("proxy_port = 3128").is_err());
    }

    #[test]
    fn env_overrides() {
        let mut c = Config::default();
        apply_env(&mut c, |name| match name {
            "WALKIE_STUN_URL" => Some("stun:a:1, stun:b:2,".into()),
            "WALKIE_GATHER_TIMEOUT_SECS" => Some("nope".into()),
            "WALKIE_DOWNLOAD_DIR" => Some("/srv/in".into()),
            _ => None,
        });
        assert_eq!(c.stun_urls, vec!["stun:a:1", "stun:b:2"]);
        assert_eq!(c.gather_timeout_secs, 10);
        assert_eq!(c.download_dir, PathBuf::from("/srv/in"));
        assert!(c.uses_demo_passphrase());
    }
}
