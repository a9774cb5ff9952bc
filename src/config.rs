//! List configuration

use crate::error::{Result, TabulaError};
use crate::list::SyncMode;
use crate::sort::SortSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Secondary index declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub properties: Vec<String>,
}

/// Configuration for [`crate::RecordList::from_config`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// List name, also used as the nested-list name
    pub name: String,
    /// Guarded (blocking mutex) when true, unguarded otherwise
    pub synchronized: bool,
    /// Sort applied to reconciliation results
    pub sort: Option<SortSpec>,
    pub indexes: Vec<IndexConfig>,
}

impl Default for ListConfig {
    fn default() -> Self {
        ListConfig {
            name: "records".to_string(),
            synchronized: true,
            sort: None,
            indexes: Vec::new(),
        }
    }
}

impl ListConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ListConfig =
            serde_json::from_str(text).map_err(|e| TabulaError::Config(format!("invalid list config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn mode(&self) -> SyncMode {
        if self.synchronized {
            SyncMode::Guarded
        } else {
            SyncMode::Unguarded
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TabulaError::Config("list name must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for index in &self.indexes {
            if index.properties.is_empty() {
                return Err(TabulaError::Config(format!("index '{}' has no properties", index.name)));
            }
            if !seen.insert(index.name.as_str()) {
                return Err(TabulaError::Config(format!("index '{}' declared twice", index.name)));
            }
        }
        Ok(())
    }
}
