//! Construction-time configuration for a [`crate::hybrid::HybridStore`].

use rt_tooling::config::{get_env_bool, get_env_or};

/// How the store should be assembled: which durable backend, and whether an
/// in-memory cache tier sits in front of it.
#[derive(Debug, Clone)]
pub struct HybridStoreConfig {
    /// `sqlite:<path>` or `sqlite::memory:`.
    pub database_url: String,
    pub enable_cache: bool,
}

impl Default for HybridStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            enable_cache: true,
        }
    }
}

impl HybridStoreConfig {
    /// Load from `{prefix}DATABASE_URL` / `{prefix}ENABLE_CACHE`, falling
    /// back to defaults for anything unset.
    pub fn from_env(prefix: &str) -> rt_tooling::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            database_url: get_env_or(&format!("{prefix}DATABASE_URL"), &defaults.database_url)?,
            enable_cache: get_env_bool(&format!("{prefix}ENABLE_CACHE"))?.unwrap_or(defaults.enable_cache),
        })
    }
}
