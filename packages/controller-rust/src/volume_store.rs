//! Persisted per-class last-used sink volumes.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use routing_core::types::Volume;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Requested volume per sink, grouped by class.
///
/// Stored as JSON: `{"classes":{"BASE":{"AMP":-900}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    #[serde(default)]
    pub classes: BTreeMap<String, BTreeMap<String, Volume>>,
}

impl VolumeSnapshot {
    /// Remembers `volume` as the last one requested for `sink_name` in `class_name`.
    pub fn record(&mut self, class_name: &str, sink_name: &str, volume: Volume) {
        self.classes
            .entry(class_name.to_string())
            .or_default()
            .insert(sink_name.to_string(), volume);
    }

    /// Recorded sink volumes of one class, keyed by sink name.
    #[must_use]
    pub fn class_volumes(&self, class_name: &str) -> Option<&BTreeMap<String, Volume>> {
        self.classes.get(class_name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.values().all(BTreeMap::is_empty)
    }

    /// Reads a snapshot; a missing file yields an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no volume snapshot");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading volume snapshot {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing volume snapshot {}", path.display()))?;
        info!(path = %path.display(), classes = snapshot.classes.len(), "volume snapshot loaded");
        Ok(snapshot)
    }

    /// Writes the snapshot through a sibling temporary file and a rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, text)
            .with_context(|| format!("writing volume snapshot {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("replacing volume snapshot {}", path.display()))?;
        debug!(path = %path.display(), "volume snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = VolumeSnapshot::load(&dir.path().join("volumes.json")).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.json");
        let mut snapshot = VolumeSnapshot::default();
        snapshot.record("BASE", "AMP", -900);
        snapshot.record("BASE", "Gateway0", -300);
        snapshot.record("PHONE", "AMP", -120);
        snapshot.save(&path).unwrap();

        let loaded = VolumeSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.class_volumes("BASE").unwrap().get("AMP"), Some(&-900));
        assert!(!dir.path().join("volumes.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.json");
        std::fs::write(&path, "not json").unwrap();
        let err = VolumeSnapshot::load(&path).unwrap_err();
        assert!(err.to_string().contains("parsing volume snapshot"));
    }
}
