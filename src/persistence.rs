use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sample::{Sample, SampleBuffer};
use crate::window::{DurationSelection, WindowSelection};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("page state I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("page state encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Saved content of one chart: two parallel sequences plus the feed it showed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSnapshot {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub feed_id: i64,
    pub window: String,
}

impl ChartSnapshot {
    pub fn save(buffer: &SampleBuffer, feed_id: i64, window: WindowSelection) -> Self {
        Self {
            labels: buffer.labels(),
            values: buffer.values(),
            feed_id,
            window: window.token().to_string(),
        }
    }

    /// Rebuild the buffer if the snapshot belongs to `current_feed` and is intact.
    /// Any mismatch yields `None`; a partial snapshot is never loaded.
    pub fn restore(&self, current_feed: i64) -> Option<SampleBuffer> {
        if self.feed_id <= 0 || self.feed_id != current_feed {
            return None;
        }
        if self.labels.is_empty() || self.labels.len() != self.values.len() {
            return None;
        }
        let samples = self
            .labels
            .iter()
            .zip(&self.values)
            .map(|(label, value)| Sample::new(label.clone(), *value));
        Some(SampleBuffer::from_samples(samples))
    }

    pub fn window(&self) -> WindowSelection {
        WindowSelection::from_token_or_default(&self.window)
    }
}

/// Everything a page view needs to come back without hitting the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub power: ChartSnapshot,
    pub usage: ChartSnapshot,
    pub power_now: f64,
    pub today_kwh: f64,
    pub window: String,
    #[serde(default)]
    pub duration: DurationSelection,
    #[serde(default)]
    pub show_cost: bool,
}

impl PageState {
    pub fn window(&self) -> WindowSelection {
        WindowSelection::from_token_or_default(&self.window)
    }
}

/// JSON file holding the last `PageState` of every page, keyed by page id.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// `<data_local_dir>/emonview/page_state.json`
    pub fn default_location() -> Self {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emonview");
        Self::at(dir.join("page_state.json"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All saved states. A missing file is empty; a malformed one is logged and ignored.
    pub fn load_all(&self) -> BTreeMap<i64, PageState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read page state");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "malformed page state, ignoring");
            BTreeMap::new()
        })
    }

    pub fn load(&self, page_id: i64) -> Option<PageState> {
        self.load_all().remove(&page_id)
    }

    pub fn store(&self, page_id: i64, state: PageState) -> Result<(), PersistError> {
        let mut all = self.load_all();
        all.insert(page_id, state);
        self.write_all(&all)
    }

    pub fn remove(&self, page_id: i64) -> Result<(), PersistError> {
        let mut all = self.load_all();
        if all.remove(&page_id).is_some() {
            self.write_all(&all)?;
        }
        Ok(())
    }

    fn write_all(&self, all: &BTreeMap<i64, PageState>) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(all)?;
        fs::write(&self.path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }
        tracing::debug!(pages = all.len(), "page state written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn morning() -> SampleBuffer {
        SampleBuffer::from_samples([
            Sample::new("09:00", 100.0),
            Sample::new("09:05", 150.0),
            Sample::new("09:10", 120.0),
        ])
    }

    fn state(feed: i64) -> PageState {
        PageState {
            power: ChartSnapshot::save(&morning(), feed, WindowSelection::ThreeHours),
            usage: ChartSnapshot::save(&SampleBuffer::unbounded(), 9, WindowSelection::ThreeHours),
            power_now: 120.0,
            today_kwh: 4.5,
            window: WindowSelection::ThreeHours.token().into(),
            duration: DurationSelection::TwoWeeks,
            show_cost: true,
        }
    }

    #[test]
    fn test_roundtrip_same_feed() {
        let buf = morning();
        let snap = ChartSnapshot::save(&buf, 42, WindowSelection::ThreeHours);
        assert_eq!(snap.restore(42), Some(buf));
    }

    #[test]
    fn test_three_hour_scenario() {
        let snap = ChartSnapshot::save(&morning(), 7, WindowSelection::ThreeHours);
        assert_eq!(snap.window(), WindowSelection::ThreeHours);
        let restored = snap.restore(7).unwrap();
        assert_eq!(restored.labels(), vec!["09:00", "09:05", "09:10"]);
        assert_eq!(restored.values(), vec![100.0, 150.0, 120.0]);
    }

    #[test]
    fn test_feed_mismatch_discards() {
        let snap = ChartSnapshot::save(&morning(), 1, WindowSelection::SixHours);
        assert!(snap.restore(2).is_none());
    }

    #[test]
    fn test_unset_feed_never_matches() {
        let snap = ChartSnapshot::save(&morning(), -1, WindowSelection::SixHours);
        assert!(snap.restore(-1).is_none());
        let snap = ChartSnapshot::save(&morning(), 0, WindowSelection::SixHours);
        assert!(snap.restore(0).is_none());
    }

    #[test]
    fn test_corrupt_snapshot_discards() {
        let mut snap = ChartSnapshot::save(&morning(), 5, WindowSelection::SixHours);
        snap.values.pop();
        assert!(snap.restore(5).is_none());
        let empty = ChartSnapshot::save(&SampleBuffer::unbounded(), 5, WindowSelection::SixHours);
        assert!(empty.restore(5).is_none());
    }

    #[test]
    fn test_unknown_window_token() {
        let mut snap = ChartSnapshot::save(&morning(), 5, WindowSelection::Week);
        snap.window = "fortnight".into();
        assert_eq!(snap.window(), WindowSelection::SixHours);
    }

    #[test]
    fn test_state_file_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::at(dir.path().join("nested").join("page_state.json"));
        assert!(file.load(3).is_none());
        file.store(3, state(11)).unwrap();
        file.store(4, state(12)).unwrap();
        let loaded = file.load(3).unwrap();
        assert_eq!(loaded, state(11));
        assert_eq!(loaded.window(), WindowSelection::ThreeHours);
        file.remove(3).unwrap();
        assert!(file.load(3).is_none());
        assert!(file.load(4).is_some());
    }

    #[test]
    fn test_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_state.json");
        fs::write(&path, "{not json").unwrap();
        let file = StateFile::at(&path);
        assert!(file.load_all().is_empty());
        file.store(1, state(2)).unwrap();
        assert_eq!(file.load_all().len(), 1);
    }
}
