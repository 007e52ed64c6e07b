use serde::Deserialize;

use crate::equality::Comparison;

/// Store-wide defaults.
///
/// Individual reads and writes may override each of these through
/// [`ReadSettings`] and [`WriteSettings`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Change-detection strategy for observers that do not pick one.
    pub comparison: Comparison,

    /// Whether writes deep-clone the incoming value unless told otherwise.
    pub immutable: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            comparison: Comparison::Deep,
            immutable: true,
        }
    }
}

/// Per-observer settings supplied with a read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadSettings {
    /// If set, only writes whose selector matches one of these patterns
    /// notify. An empty list never notifies (except whole-store forced
    /// writes).
    pub observed_selectors: Option<Vec<String>>,

    /// Writes whose selector matches one of these patterns never notify
    /// (except whole-store forced writes).
    pub ignored_selectors: Option<Vec<String>>,

    /// When false, the observer only reacts to forced writes.
    pub observe_changes: bool,

    /// Overrides [`StoreConfig::comparison`].
    pub comparison: Option<Comparison>,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            observed_selectors: None,
            ignored_selectors: None,
            observe_changes: true,
            comparison: None,
        }
    }
}

impl ReadSettings {
    pub fn observed<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.observed_selectors = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn ignored<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.ignored_selectors = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    pub fn muted(mut self) -> Self {
        self.observe_changes = false;
        self
    }
}

/// Settings supplied with a write.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriteSettings {
    /// Bypass change detection. Without a selector, also bypasses every
    /// other gate: all observers fire.
    pub force_rerender: bool,

    /// Deep-clone the written value before storing it. `None` defers to
    /// [`StoreConfig::immutable`].
    pub immutable: Option<bool>,

    /// When false the snapshot is replaced without notifying anyone.
    pub notify: bool,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            force_rerender: false,
            immutable: None,
            notify: true,
        }
    }
}

impl WriteSettings {
    pub fn forced() -> Self {
        Self {
            force_rerender: true,
            ..Self::default()
        }
    }

    pub fn mutable() -> Self {
        Self {
            immutable: Some(false),
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            notify: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.comparison, Comparison::Deep);
        assert!(config.immutable);

        let read = ReadSettings::default();
        assert!(read.observed_selectors.is_none());
        assert!(read.ignored_selectors.is_none());
        assert!(read.observe_changes);

        let write = WriteSettings::default();
        assert!(!write.force_rerender);
        assert_eq!(write.immutable, None);
        assert!(write.notify);
    }

    #[test]
    fn builders() {
        let read = ReadSettings::default()
            .observed(["a.*"])
            .ignored(vec!["a.b".to_string()])
            .with_comparison(Comparison::Reference);
        assert_eq!(read.observed_selectors, Some(vec!["a.*".to_string()]));
        assert_eq!(read.ignored_selectors, Some(vec!["a.b".to_string()]));
        assert_eq!(read.comparison, Some(Comparison::Reference));
        assert!(!ReadSettings::default().muted().observe_changes);

        assert!(WriteSettings::forced().force_rerender);
        assert_eq!(WriteSettings::mutable().immutable, Some(false));
        assert!(!WriteSettings::silent().notify);
    }

    #[test]
    fn deserialize_partial() {
        let config: StoreConfig = serde_json::from_str(r#"{"comparison": "reference"}"#).unwrap();
        assert_eq!(config.comparison, Comparison::Reference);
        assert!(config.immutable);

        let read: ReadSettings =
            serde_json::from_str(r#"{"observed_selectors": ["data3.data1"]}"#).unwrap();
        assert_eq!(read.observed_selectors, Some(vec!["data3.data1".to_string()]));
        assert!(read.observe_changes);

        let write: WriteSettings = serde_json::from_str(r#"{"force_rerender": true}"#).unwrap();
        assert!(write.force_rerender);
        assert!(write.notify);
    }
}
