//! Consumer-side mesh cache
//!
//! The viewer keeps one `ConsumerCache` per session. Every incoming delta is
//! merged into a new snapshot: the generation counter advances by one, entries
//! named by the delta are stamped with the new generation, and entries that
//! were not refreshed within `max_age` merges are evicted.

use crate::delta::{DisplayInfo, MeshData, MeshEntry, ResponseDelta};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_MAX_AGE: u64 = 1;

fn initial_generation() -> u64 {
    1
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Merges an entry survives without being refreshed; 0 behaves like 1
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl MergeOptions {
    pub fn with_max_age(max_age: u64) -> Self {
        Self { max_age }
    }
}

/// A cached mesh; `None` records that the id failed to mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMesh {
    pub mesh: Option<Arc<MeshData>>,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerCache {
    #[serde(default = "initial_generation")]
    pub generation_counter: u64,
    #[serde(default)]
    pub display_info: BTreeMap<String, DisplayInfo>,
    #[serde(default)]
    pub meshes: BTreeMap<String, CachedMesh>,
}

impl Default for ConsumerCache {
    fn default() -> Self {
        Self {
            generation_counter: initial_generation(),
            display_info: BTreeMap::new(),
            meshes: BTreeMap::new(),
        }
    }
}

/// What one merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStatistics {
    pub stored: usize,
    pub carried_forward: usize,
    pub evicted: usize,
    /// Reuse markers that named an id with nothing cached
    pub missing_reuse: usize,
}

impl ConsumerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh(&self, id: &str) -> Option<&MeshData> {
        self.meshes.get(id).and_then(|entry| entry.mesh.as_deref())
    }

    pub fn generation(&self, id: &str) -> Option<u64> {
        self.meshes.get(id).map(|entry| entry.generation)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Merges an incoming delta into a new snapshot
    pub fn merge(
        &self,
        display_info: &BTreeMap<String, DisplayInfo>,
        meshes: &BTreeMap<String, MeshEntry>,
        options: MergeOptions,
    ) -> (ConsumerCache, MergeStatistics) {
        let generation = self.generation_counter + 1;
        let max_age = options.max_age.max(1);
        let mut stats = MergeStatistics::default();
        let mut next = self.meshes.clone();

        for (id, entry) in meshes {
            match entry {
                MeshEntry::Reuse => match next.get_mut(id) {
                    Some(cached) => {
                        cached.generation = generation;
                        stats.carried_forward += 1;
                    }
                    None => {
                        debug!("Reuse marker for {} but nothing cached, skipping", id);
                        stats.missing_reuse += 1;
                    }
                },
                MeshEntry::Payload(mesh) => {
                    next.insert(
                        id.clone(),
                        CachedMesh {
                            mesh: Some(Arc::new(mesh.clone())),
                            generation,
                        },
                    );
                    stats.stored += 1;
                }
                MeshEntry::Failed => {
                    next.insert(id.clone(), CachedMesh { mesh: None, generation });
                    stats.stored += 1;
                }
            }
        }

        let before = next.len();
        let threshold = generation.saturating_sub(max_age);
        next.retain(|_, cached| cached.generation > threshold);
        stats.evicted = before - next.len();

        debug!(
            "Merged generation {}: {} stored, {} carried forward, {} evicted",
            generation, stats.stored, stats.carried_forward, stats.evicted
        );

        let cache = ConsumerCache {
            generation_counter: generation,
            display_info: display_info.clone(),
            meshes: next,
        };
        (cache, stats)
    }

    /// Merges a whole response delta
    pub fn merge_delta(&self, delta: &ResponseDelta, options: MergeOptions) -> (ConsumerCache, MergeStatistics) {
        self.merge(&delta.display_info, &delta.meshes, options)
    }
}
