//! View client configuration loaded from environment variables.

use std::time::Duration;

/// Default timeout for view queries that do not set their own.
pub const DEFAULT_VIEW_TIMEOUT: Duration = Duration::from_secs(75);

/// View client configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `VIEW_TIMEOUT_MS`: default view query timeout in milliseconds (default: `75000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    pub view_timeout: Duration,
}

impl ViewConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let view_timeout = lookup("VIEW_TIMEOUT_MS")
            .and_then(|ms| ms.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_VIEW_TIMEOUT);
        Self { view_timeout }
    }

    pub fn with_view_timeout(mut self, timeout: Duration) -> Self {
        self.view_timeout = timeout;
        self
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            view_timeout: DEFAULT_VIEW_TIMEOUT,
        }
    }
}
