//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILHARVEST_CONFIG` (environment variable)
//! 2. `~/.config/mailharvest/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailharvest\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags and their environment variables are layered on top in
//! `main`; nothing below the entry point reads the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::files::ConflictPolicy;
use crate::archive::ArchiveLayout;
use crate::error::{HarvestError, Result};
use crate::ingest::Settings;
use crate::mail::imap::ImapParams;
use crate::router::{RoutingTable, Strategy};

/// Default implicit-TLS IMAP port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mail server connection.
    pub imap: ImapConfig,
    /// Extension → strategy overrides.
    pub routing: RoutingConfig,
    /// Where archive contents are looked up and where they go.
    pub archive: ArchiveLayout,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Destination root. Defaults to the current working directory.
    pub dest_root: Option<PathBuf>,
    /// What to do when a destination file already exists.
    pub on_conflict: ConflictPolicy,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Mail server connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    pub server: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Folder to select.
    pub mailbox: String,
}

/// Extension routing overrides, merged over the built-in table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// e.g. `lua = "save"`, `zip = "ignore"`.
    pub extensions: BTreeMap<String, Strategy>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dest_root: None,
            on_conflict: ConflictPolicy::Overwrite,
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: DEFAULT_IMAP_PORT,
            username: None,
            password: None,
            mailbox: "INBOX".to_string(),
        }
    }
}

impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("mailbox", &self.mailbox)
            .finish()
    }
}

// ── Resolution ──────────────────────────────────────────────────

impl Config {
    /// Build connection parameters, failing before any network activity if
    /// server, username or password is absent.
    pub fn imap_params(&self) -> Result<ImapParams> {
        let server = required(&self.imap.server, "imap.server", "set --server or EMAIL_SERVER")?;
        let username = required(&self.imap.username, "imap.username", "set --user or EMAIL_USER")?;
        let password = required(&self.imap.password, "imap.password", "set EMAIL_PASSWORD")?;

        if self.imap.mailbox.trim().is_empty() {
            return Err(HarvestError::config("imap.mailbox", "mailbox name is empty"));
        }

        Ok(ImapParams {
            server,
            port: self.imap.port,
            username,
            password,
            mailbox: self.imap.mailbox.clone(),
        })
    }

    /// Take the password from the environment when one is given. Blank values are ignored.
    pub fn set_password(&mut self, password: Option<String>) {
        if let Some(password) = password.filter(|p| !p.trim().is_empty()) {
            self.imap.password = Some(password);
        }
    }

    /// Build processing settings. `cwd` is used when no destination root is configured.
    pub fn settings(&self, cwd: &Path) -> Settings {
        let dest_root = self
            .general
            .dest_root
            .clone()
            .unwrap_or_else(|| cwd.to_path_buf());

        Settings {
            dest_root,
            routing: RoutingTable::with_overrides(&self.routing.extensions),
            layout: self.archive.clone(),
            conflict: self.general.on_conflict,
        }
    }
}

fn required(value: &Option<String>, key: &str, hint: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(HarvestError::config(key, hint)),
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration from `path` if given, otherwise from the standard location.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config(path: Option<&Path>) -> Config {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => config_file_path(),
    };

    if let Some(path) = path {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILHARVEST_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailharvest").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailharvest")
}
