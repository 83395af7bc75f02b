//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the client starts with zero
//! configuration.

use std::path::PathBuf;

use parley_shared::constants::{DEFAULT_LIVE_LIMIT, DEFAULT_PAGE_SIZE};

use crate::session::SessionConfig;

/// How the shell prints the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// One line per message, newest first.
    Text,
    /// One JSON array per window change.
    Json,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite file holding the message collection.
    /// Env: `PARLEY_DB_PATH`
    /// Default: platform data dir, see `parley_store::database::default_path`.
    pub db_path: Option<PathBuf>,

    /// Records covered by the live subscription.
    /// Env: `PARLEY_LIVE_LIMIT`
    /// Default: `25`
    pub live_limit: u32,

    /// Records per history page.
    /// Env: `PARLEY_PAGE_SIZE`
    /// Default: `10`
    pub page_size: u32,

    /// Show sends as pending until the live subscription confirms them.
    /// Env: `PARLEY_OPTIMISTIC_SENDS` (true/false)
    /// Default: `false`
    pub optimistic_sends: bool,

    /// Env: `PARLEY_RENDER` (`text` or `json`)
    /// Default: `text`
    pub render: RenderMode,

    /// Skips the name prompt when set.
    /// Env: `PARLEY_DISPLAY_NAME`
    pub display_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            live_limit: DEFAULT_LIVE_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            optimistic_sends: false,
            render: RenderMode::Text,
            display_name: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("PARLEY_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("PARLEY_LIVE_LIMIT") {
            match parse_limit(&val) {
                Some(n) => config.live_limit = n,
                None => tracing::warn!(value = %val, "Invalid PARLEY_LIVE_LIMIT, using default"),
            }
        }

        if let Some(val) = lookup("PARLEY_PAGE_SIZE") {
            match parse_limit(&val) {
                Some(n) => config.page_size = n,
                None => tracing::warn!(value = %val, "Invalid PARLEY_PAGE_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("PARLEY_OPTIMISTIC_SENDS") {
            config.optimistic_sends = val == "true" || val == "1";
        }

        if let Some(val) = lookup("PARLEY_RENDER") {
            match val.to_ascii_lowercase().as_str() {
                "text" => config.render = RenderMode::Text,
                "json" => config.render = RenderMode::Json,
                _ => tracing::warn!(value = %val, "Invalid PARLEY_RENDER, using text"),
            }
        }

        if let Some(name) = lookup("PARLEY_DISPLAY_NAME") {
            if !name.trim().is_empty() {
                config.display_name = Some(name);
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            live_limit: self.live_limit,
            page_size: self.page_size,
            optimistic_sends: self.optimistic_sends,
        }
    }
}

/// Limits must be positive; a zero-sized window or page never makes progress.
fn parse_limit(val: &str) -> Option<u32> {
    val.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = from_pairs(&[]);
        assert_eq!(config.live_limit, 25);
        assert_eq!(config.page_size, 10);
        assert!(!config.optimistic_sends);
        assert_eq!(config.render, RenderMode::Text);
        assert!(config.db_path.is_none());
        assert!(config.display_name.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PARLEY_DB_PATH", "/tmp/chat.db"),
            ("PARLEY_LIVE_LIMIT", "50"),
            ("PARLEY_PAGE_SIZE", " 20 "),
            ("PARLEY_OPTIMISTIC_SENDS", "true"),
            ("PARLEY_RENDER", "JSON"),
            ("PARLEY_DISPLAY_NAME", "Ada"),
        ]);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/chat.db")));
        assert_eq!(config.live_limit, 50);
        assert_eq!(config.page_size, 20);
        assert!(config.optimistic_sends);
        assert_eq!(config.render, RenderMode::Json);
        assert_eq!(config.display_name.as_deref(), Some("Ada"));

        let session = config.session_config();
        assert_eq!(session.live_limit, 50);
        assert_eq!(session.page_size, 20);
        assert!(session.optimistic_sends);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PARLEY_LIVE_LIMIT", "0"),
            ("PARLEY_PAGE_SIZE", "ten"),
            ("PARLEY_RENDER", "html"),
            ("PARLEY_DISPLAY_NAME", "   "),
            ("PARLEY_DB_PATH", ""),
        ]);
        assert_eq!(config.live_limit, 25);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.render, RenderMode::Text);
        assert!(config.display_name.is_none());
        assert!(config.db_path.is_none());
    }
}
