use std::path::Path;

use crate::model::Speaker;

use super::CoreError;

/// Speaker metadata reported by a loaded core.
///
/// Style ids are unique across all speakers; the store is the single place
/// that answers "does this style exist" for the rest of the engine.
#[derive(Debug, Clone, Default)]
pub struct MetaStore {
    speakers: Vec<Speaker>,
}

impl MetaStore {
    pub fn new(speakers: Vec<Speaker>) -> Self {
        Self { speakers }
    }

    /// Load metas from a `metas.json` file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json(&content)?;
        log::info!(
            "Loaded {} speakers ({} styles) from {}",
            store.speakers.len(),
            store.style_ids().len(),
            path.display()
        );
        Ok(store)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let speakers: Vec<Speaker> =
            serde_json::from_str(json).map_err(|e| CoreError::Metas(e.to_string()))?;
        Ok(Self { speakers })
    }

    pub fn speakers(&self) -> &[Speaker] {
        &self.speakers
    }

    pub fn has_style(&self, style_id: u32) -> bool {
        self.speakers
            .iter()
            .any(|s| s.styles.iter().any(|st| st.id == style_id))
    }

    pub fn speaker_by_uuid(&self, uuid: &str) -> Option<&Speaker> {
        self.speakers.iter().find(|s| s.speaker_uuid == uuid)
    }

    /// All style ids in ascending order.
    pub fn style_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .speakers
            .iter()
            .flat_map(|s| s.styles.iter().map(|st| st.id))
            .collect();
        ids.sort_unstable();
        ids
    }
}
