//! Asset notes
//!
//! Free-text notes shown next to assets in the rendered document. The notes
//! file is a flat YAML map whose keys are either a full file name
//! (`main_bg.png`), a name without extension (`main_bg`) or a group name
//! (`main_txt_win_normal`):
//!
//! ```yaml
//! main_bg.png: Background for the base game
//! main_txt_win_normal: Shown on any win above 10x
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lookup table from file or group name to note text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notes(BTreeMap<String, String>);

impl Notes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the YAML map form; an empty document yields no notes
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        let parsed: Option<BTreeMap<String, String>> = serde_yaml::from_str(content)?;
        let entries = parsed
            .unwrap_or_default()
            .into_iter()
            .map(|(key, note)| (key.trim().to_string(), note.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Ok(Self(entries))
    }

    pub fn insert(&mut self, key: impl Into<String>, note: impl Into<String>) {
        self.0.insert(key.into(), note.into());
    }

    /// Note for `name`, trying the exact name first and then its stem
    ///
    /// Empty notes count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        let lookup = |k: &str| self.0.get(k).map(String::as_str).filter(|n| !n.is_empty());
        lookup(name).or_else(|| {
            let (stem, _) = name.rsplit_once('.')?;
            lookup(stem)
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
