//! Centralized configuration for extsync.
//!
//! Constants for remote endpoints, on-disk layout and mirror behavior.
//! Per-user settings (repository overrides, mirror directory, token) are
//! persisted inside the registry document, see [`crate::registry::Settings`].

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "extsync";
    /// Version of the running engine, used as the migration high-water mark.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
    /// Id of the system tag attached to extensions installed by this tool.
    pub const INSTALLED_TAG_ID: &'static str = "extsync-install";
    pub const INSTALLED_TAG_NAME: &'static str = "extsync install";
    pub const INSTALLED_TAG_COLOR: &'static str = "#409EFF";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const USER_AGENT: &'static str = "extsync/0.4";
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_RAW_BASE: &'static str = "https://raw.githubusercontent.com";
    /// Hosts that receive the GitHub token. Every other request is anonymous.
    pub const AUTHENTICATED_HOSTS: [&'static str; 1] = ["api.github.com"];
    pub const GITHUB_ACCEPT: &'static str = "application/vnd.github+json";
    pub const GITHUB_RELEASES_PER_PAGE: u32 = 50;
    /// Release lists are memoized for roughly one check cycle.
    pub const GITHUB_RELEASES_TTL: Duration = Duration::from_secs(300);
    /// Default ref used by the raw-file fallback when no tag is known.
    pub const DEFAULT_BRANCH_REF: &'static str = "HEAD";
    pub const OFFICIAL_FEED_URL: &'static str =
        "https://releases.obsidian.md/stats/plugin";
    pub const COMMUNITY_INDEX_URL: &'static str =
        "https://raw.githubusercontent.com/obsidianmd/obsidian-releases/master/community-plugins.json";
    /// Keys of an official feed entry that are metadata, not versions.
    pub const OFFICIAL_FEED_RESERVED_KEYS: [&'static str; 2] = ["downloads", "updated"];
}

/// Directory and file naming.
pub struct PathsConfig;

impl PathsConfig {
    pub const REGISTRY_FILENAME: &'static str = "registry.json";
    pub const REPO_CACHE_FILENAME: &'static str = "community-index-cache.json";
    pub const EXTENSIONS_DIR_NAME: &'static str = "extensions";
    pub const THEMES_DIR_NAME: &'static str = "themes";
    pub const ENABLED_LIST_FILENAME: &'static str = "enabled-extensions.json";
    pub const MIRROR_EXTENSION: &'static str = "md";
}

/// Release asset names recognized by the installer.
pub struct AssetConfig;

impl AssetConfig {
    pub const MANIFEST: &'static str = "manifest.json";
    pub const MAIN_BUNDLE: &'static str = "main.js";
    pub const STYLESHEET: &'static str = "styles.css";
    /// Theme stylesheet names, in order of preference.
    pub const THEME_STYLESHEETS: [&'static str; 3] = ["theme.css", "themes.css", "theme-beta.css"];
}

/// Mirror document behavior.
pub struct MirrorConfig;

impl MirrorConfig {
    pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(300);
    pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);
    /// Body written into freshly created mirror documents.
    pub const DEFAULT_BODY: &'static str =
        "\n\n<!-- Free-form notes. Everything below the front-matter block is kept as-is. -->\n";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(NetworkConfig::REQUEST_TIMEOUT > Duration::ZERO);
        assert!(MirrorConfig::WATCH_DEBOUNCE < NetworkConfig::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_default_body_starts_on_new_line() {
        assert!(MirrorConfig::DEFAULT_BODY.starts_with('\n'));
    }
}
