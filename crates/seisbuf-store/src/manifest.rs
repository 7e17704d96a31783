use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub cycles: Vec<CycleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleEntry {
    pub cycle: u64,
    pub written_at: DateTime<Utc>,
    pub groups: Vec<GroupEntry>,
}

/// One Parquet file: every trace of a cycle sharing one sampling interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupEntry {
    pub file: String,
    pub dt: f64,
    pub traces: u64,
    pub samples: u64,
    pub bytes: u64,
}

impl StoreManifest {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            format: "parquet".to_string(),
            created_at,
            cycles: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Option<Self>, StoreError> {
        let path = root.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Write via a temp file and rename so readers never see a partial manifest.
    pub fn save(&self, root: &Path) -> Result<(), StoreError> {
        let path = root.join(MANIFEST_FILE);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn next_cycle(&self) -> u64 {
        self.cycles.iter().map(|c| c.cycle + 1).max().unwrap_or(0)
    }
}
