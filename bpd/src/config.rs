// Daemon configuration
//
// A JSON file with every field optional; command line flags override it.

use anyhow::{Context, Result};
use breakpoint_engine::{EngineConfig, SourceRoot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub source_roots: Vec<SourceRoot>,
    /// Where breakpoints are loaded from and written back to
    pub breakpoints_file: PathBuf,
    /// Resume immediately after reporting a stop instead of waiting on stdin
    pub auto_resume: bool,
    pub engine: EngineConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5005,
            source_roots: Vec::new(),
            breakpoints_file: PathBuf::from("breakpoints.json"),
            auto_resume: false,
            engine: EngineConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
