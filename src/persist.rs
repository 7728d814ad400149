//! Persisting fitted engines.
//!
//! A fitted [`FeatureEngine`] serializes into a tagged JSON record carrying
//! everything needed to reload and re-transform: hyperparameters, schema
//! tree, peripheral names, extracted schemas, the selected abstract
//! features and the fitted child engines. Round-tripping a record yields an
//! engine that transforms identically.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::FeatureEngine;
use crate::error::{RelPropError, Result};

/// Format version written into every record; bumped on breaking layout
/// changes so loaders can reject records they do not understand.
pub const FORMAT_VERSION: u32 = 1;

/// The persisted envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct SavedEngine {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub engine: FeatureEngine,
}

impl SavedEngine {
    pub fn new(engine: FeatureEngine) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            saved_at: Utc::now(),
            engine,
        }
    }
}

/// Serialize an engine to a JSON string.
pub fn to_json(engine: &FeatureEngine) -> Result<String> {
    serde_json::to_string_pretty(&SavedEngine::new(engine.clone()))
        .map_err(|e| RelPropError::Serialization(e.to_string()))
}

/// Deserialize an engine from a JSON string.
pub fn from_json(json: &str) -> Result<FeatureEngine> {
    let saved: SavedEngine =
        serde_json::from_str(json).map_err(|e| RelPropError::Serialization(e.to_string()))?;
    if saved.format_version != FORMAT_VERSION {
        return Err(RelPropError::Serialization(format!(
            "unsupported format version {} (expected {})",
            saved.format_version, FORMAT_VERSION
        )));
    }
    Ok(saved.engine)
}

/// Write an engine to a file.
pub fn save(engine: &FeatureEngine, path: &Path) -> Result<()> {
    let json = to_json(engine)?;
    fs::write(path, json).map_err(|e| RelPropError::Serialization(e.to_string()))
}

/// Read an engine back from a file.
pub fn load(path: &Path) -> Result<FeatureEngine> {
    let json =
        fs::read_to_string(path).map_err(|e| RelPropError::Serialization(e.to_string()))?;
    from_json(&json)
}
