//! Host configuration

use std::path::PathBuf;
use std::time::Duration;

/// Retry policy applied per extension during [`load_all`].
///
/// [`load_all`]: crate::ExtensionHost::load_all
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per extension before giving up
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `backoff * n` before retrying
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Configuration for an [`ExtensionHost`](crate::ExtensionHost)
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory scanned for extension manifest files
    pub extensions_dir: PathBuf,
    /// Directory holding per-extension storage records
    pub storage_dir: PathBuf,
    /// Timeout for an extension's `load` call
    pub load_timeout: Duration,
    /// Timeout for `unload`/`activate`/`deactivate` calls
    pub unload_timeout: Duration,
    /// Timeout for a single hook callback
    pub hook_timeout: Duration,
    /// Retry policy for `load_all`
    pub retry: RetryConfig,
    /// Hook names considered known during validation.
    /// Empty disables the unknown-hook warning.
    pub known_hooks: Vec<String>,
    /// Quiet period before the watcher acts on file changes
    pub watch_debounce: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        let root = default_root();

        Self {
            extensions_dir: root.join("extensions"),
            storage_dir: root.join("storage"),
            load_timeout: Duration::from_secs(30),
            unload_timeout: Duration::from_secs(5),
            hook_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            known_hooks: Vec::new(),
            watch_debounce: Duration::from_millis(500),
        }
    }
}

impl HostConfig {
    /// Config rooted at a single directory: `<root>/extensions` and
    /// `<root>/storage`. Handy for tests and embedded hosts.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            extensions_dir: root.join("extensions"),
            storage_dir: root.join("storage"),
            ..Default::default()
        }
    }
}

/// Get the arbor config root.
///
/// Returns `$XDG_CONFIG_HOME/arbor` if set, otherwise `~/.config/arbor`.
/// CLI tools should use XDG paths for cross-platform consistency.
pub fn default_root() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("arbor")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/arbor")
    } else {
        PathBuf::from(".config/arbor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_paths() {
        let config = HostConfig::default();
        assert!(config.extensions_dir.ends_with("arbor/extensions"));
        assert!(config.storage_dir.ends_with("arbor/storage"));
    }

    #[test]
    fn test_default_timeouts() {
        let config = HostConfig::default();
        assert_eq!(config.load_timeout, Duration::from_secs(30));
        assert_eq!(config.unload_timeout, Duration::from_secs(5));
        assert_eq!(config.hook_timeout, Duration::from_secs(5));
        assert_eq!(config.watch_debounce, Duration::from_millis(500));
    }

    #[test]
    fn test_default_retry() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_rooted_at() {
        let config = HostConfig::rooted_at("/tmp/arbor-test");
        assert_eq!(
            config.extensions_dir,
            PathBuf::from("/tmp/arbor-test/extensions")
        );
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/arbor-test/storage"));
    }
}
