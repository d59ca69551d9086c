//! Document renderer port
//!
//! Each project supplies one [`IDocumentRenderer`] that knows how to group
//! its assets and turn them into the derived document. The engine calls it
//! once per committed cycle and hands the result to
//! [`IRemoteStore::publish_document`](super::IRemoteStore::publish_document).

use serde::Serialize;

use crate::domain::history::HistoryEntry;
use crate::domain::newtypes::AssetKey;
use crate::domain::notes::Notes;

/// One named group of assets in the rendered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Stable identifier, e.g. `main` or `multi_free`
    pub id: String,
    /// Heading shown in the document
    pub title: String,
    /// Keys in display order
    pub keys: Vec<AssetKey>,
}

/// Ordered sections produced by [`IDocumentRenderer::classify`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Categories {
    sections: Vec<Section>,
}

impl Categories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section; sections render in insertion order
    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn get(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Number of keys across all sections
    pub fn total(&self) -> usize {
        self.sections.iter().map(|s| s.keys.len()).sum()
    }
}

/// Port trait for the per-project document renderer
///
/// `classify` and `render` are pure; publishing is done by the remote store.
pub trait IDocumentRenderer: Send + Sync {
    /// Title of the derived document
    fn title(&self) -> String;

    /// Group `keys` into ordered sections
    fn classify(&self, keys: &[AssetKey]) -> Categories;

    /// Render the document body from the sections, history (newest first)
    /// and the current asset notes
    fn render(&self, categories: &Categories, history: &[HistoryEntry], notes: &Notes) -> String;
}
