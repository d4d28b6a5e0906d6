//! Store configuration.

use serde::Deserialize;

use crate::error::Result;

/// Default attribute prefix for directives.
pub const DEFAULT_PREFIX: &str = "sb-";

/// Configuration for creating a [`Store`](crate::Store).
///
/// Can be built in code or read from TOML:
///
/// ```
/// use horizon_trellis_core::TrellisConfig;
///
/// let config = TrellisConfig::from_toml_str(r#"
/// prefix = "data-sb"
/// defer_until_ready = false
/// "#).unwrap();
/// assert_eq!(config.prefix, "data-sb-");
/// assert!(!config.defer_until_ready);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    /// Attribute prefix prepended to every directive name. Always ends with `-`.
    pub prefix: String,
    /// Queue directive dispatch while the document is still loading and
    /// replay it once the document is ready. Watchers are never deferred.
    pub defer_until_ready: bool,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            defer_until_ready: true,
        }
    }
}

impl TrellisConfig {
    /// Create a configuration with the given attribute prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: normalize_prefix(&prefix.into()),
            ..Default::default()
        }
    }

    /// Set whether dispatch is deferred during the loading window.
    pub fn with_defer_until_ready(mut self, defer: bool) -> Self {
        self.defer_until_ready = defer;
        self
    }

    /// Parse a configuration from TOML. Missing fields take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(source)?;
        config.prefix = normalize_prefix(&config.prefix);
        Ok(config)
    }
}

/// Append the `-` separator unless the prefix already ends with one.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    if prefix.ends_with('-') {
        prefix.to_string()
    } else {
        format!("{prefix}-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrellisConfig::default();
        assert_eq!(config.prefix, "sb-");
        assert!(config.defer_until_ready);
    }

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(TrellisConfig::with_prefix("data").prefix, "data-");
        assert_eq!(TrellisConfig::with_prefix("x-").prefix, "x-");
    }

    #[test]
    fn test_partial_toml() {
        let config = TrellisConfig::from_toml_str("defer_until_ready = false").unwrap();
        assert_eq!(config.prefix, "sb-");
        assert!(!config.defer_until_ready);

        assert!(TrellisConfig::from_toml_str("prefix = 3").is_err());
    }
}
