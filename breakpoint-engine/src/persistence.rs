// Breakpoint persistence
//
// Breakpoints are stored as a versioned JSON document. Hidden breakpoints
// belong to one session and are never written.

use crate::error::PersistenceError;
use crate::spec::{Breakpoint, BreakpointSet, BreakpointSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    breakpoints: Vec<BreakpointSpec>,
}

pub trait PersistenceStore: Send + Sync {
    fn load(&self) -> Result<Vec<BreakpointSpec>, PersistenceError>;

    fn save(&self, specs: &[BreakpointSpec]) -> Result<(), PersistenceError>;

    /// Save every visible breakpoint of a set
    fn save_set(&self, set: &BreakpointSet) -> Result<(), PersistenceError> {
        let specs: Vec<_> = set
            .all()
            .iter()
            .map(|b| b.spec())
            .filter(|s| !s.hidden)
            .collect();
        self.save(&specs)
    }

    /// Load stored breakpoints into a set, returning the new handles
    fn load_into(&self, set: &BreakpointSet) -> Result<Vec<Arc<Breakpoint>>, PersistenceError> {
        let loaded: Vec<_> = self.load()?.into_iter().map(Breakpoint::new).collect();
        for breakpoint in &loaded {
            set.add(breakpoint.clone());
        }
        Ok(loaded)
    }
}

/// Breakpoints in one JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceStore for JsonFileStore {
    fn load(&self) -> Result<Vec<BreakpointSpec>, PersistenceError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no breakpoint file yet");
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let document: Document = serde_json::from_str(&text)?;
        if document.version > DOCUMENT_VERSION {
            return Err(PersistenceError::Version(document.version));
        }
        info!(path = %self.path.display(), count = document.breakpoints.len(), "loaded breakpoints");
        Ok(document.breakpoints)
    }

    fn save(&self, specs: &[BreakpointSpec]) -> Result<(), PersistenceError> {
        let document = Document {
            version: DOCUMENT_VERSION,
            breakpoints: specs.iter().filter(|s| !s.hidden).cloned().collect(),
        };
        let text = serde_json::to_string_pretty(&document)?;

        // Write next to the target and rename so a crash never truncates the file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), count = document.breakpoints.len(), "saved breakpoints");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{HitCountStyle, SuspendPolicy};

    #[test]
    fn test_round_trip_keeps_definition() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("breakpoints.json"));

        let specs = vec![
            BreakpointSpec::line("/src/com/example/Foo.java", 42)
                .with_condition("i > 3")
                .with_hit_count(3, HitCountStyle::Multiple)
                .with_suspend(SuspendPolicy::EventThread),
            BreakpointSpec::method("com.example.Foo", "run"),
            BreakpointSpec::field("com.example.Foo", "count"),
            BreakpointSpec::exception("java.lang.IllegalStateException", true, false),
            BreakpointSpec::class_load("com.example.*"),
            BreakpointSpec::thread(true, true).disabled(),
        ];
        store.save(&specs).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, specs);
    }

    #[test]
    fn test_hidden_breakpoints_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("breakpoints.json"));

        let set = BreakpointSet::new();
        let mut hidden = BreakpointSpec::exception("java.lang.Throwable", false, true);
        hidden.hidden = true;
        set.add(Breakpoint::new(hidden));
        set.add(Breakpoint::new(BreakpointSpec::line("/src/Foo.java", 3)));

        store.save_set(&set).unwrap();
        let restored = BreakpointSet::new();
        let loaded = store.load_into(&restored).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(restored.len(), 1);
        assert_eq!(loaded[0].spec().line_number(), Some(3));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_newer_document_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breakpoints.json");
        std::fs::write(&path, r#"{"version": 9, "breakpoints": []}"#).unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PersistenceError::Version(9)));
    }

    #[test]
    fn test_document_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breakpoints.json");
        let store = JsonFileStore::new(&path);
        store
            .save(&[BreakpointSpec::line("/src/Foo.java", 7)])
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["breakpoints"][0]["kind"], "line");
        assert_eq!(value["breakpoints"][0]["line"], 7);
        assert_eq!(value["breakpoints"][0]["suspend"], "all");
    }
}
