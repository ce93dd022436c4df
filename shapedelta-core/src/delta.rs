//! Response delta wire types
//!
//! These are what travels from the evaluating side to the viewer. A mesh
//! entry is either a full payload, the `"reuse"` marker telling the viewer to
//! keep what it already has, or `null` when meshing failed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-id hash and error. A successful entry has a hash and no error; a
/// meshing failure keeps the hash and adds the error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DisplayInfo {
    pub fn success(hash: impl Into<String>) -> Self {
        Self {
            hash: Some(hash.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            hash: None,
            error: Some(error.into()),
        }
    }

    /// Built but could not be meshed
    pub fn degraded(hash: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            hash: Some(hash.into()),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Triangle mesh as sent to the viewer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 3]>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = Some(color);
        self
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Appends another mesh, offsetting its indices
    pub fn append(&mut self, other: &MeshData) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
    }
}

/// One id's entry in the `meshes` map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MeshEntryWire", into = "MeshEntryWire")]
pub enum MeshEntry {
    Payload(MeshData),
    Reuse,
    Failed,
}

impl MeshEntry {
    pub fn is_reuse(&self) -> bool {
        matches!(self, MeshEntry::Reuse)
    }

    pub fn payload(&self) -> Option<&MeshData> {
        match self {
            MeshEntry::Payload(mesh) => Some(mesh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MeshEntryWire {
    #[serde(default)]
    mesh: Option<MeshSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum MeshSlot {
    Marker(ReuseMarker),
    Data(MeshData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ReuseMarker {
    #[serde(rename = "reuse")]
    Reuse,
}

impl From<MeshEntryWire> for MeshEntry {
    fn from(wire: MeshEntryWire) -> Self {
        match wire.mesh {
            Some(MeshSlot::Marker(ReuseMarker::Reuse)) => MeshEntry::Reuse,
            Some(MeshSlot::Data(mesh)) => MeshEntry::Payload(mesh),
            None => MeshEntry::Failed,
        }
    }
}

impl From<MeshEntry> for MeshEntryWire {
    fn from(entry: MeshEntry) -> Self {
        let mesh = match entry {
            MeshEntry::Payload(mesh) => Some(MeshSlot::Data(mesh)),
            MeshEntry::Reuse => Some(MeshSlot::Marker(ReuseMarker::Reuse)),
            MeshEntry::Failed => None,
        };
        MeshEntryWire { mesh }
    }
}

/// Summary metadata for one displayed solid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolidSummary {
    /// Shape key the solid is tracked under
    pub id: String,
    /// Content hash
    pub uuid: String,
    pub name: String,
    pub area: f64,
    pub volume: f64,
}

/// Everything one evaluation sends to the viewer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDelta {
    /// One slot per evaluation record; failures leave a hole
    #[serde(default, rename = "solids")]
    pub summary: Vec<Option<SolidSummary>>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub display_info: BTreeMap<String, DisplayInfo>,
    #[serde(default)]
    pub meshes: BTreeMap<String, MeshEntry>,
}

impl ResponseDelta {
    /// Hash table to hand to the next evaluation
    pub fn hash_cache(&self) -> HashCache {
        HashCache::from_display_info(&self.display_info)
    }

    pub fn errors(&self) -> impl Iterator<Item = (&String, &String)> {
        self.display_info
            .iter()
            .filter_map(|(id, info)| info.error.as_ref().map(|error| (id, error)))
    }
}

/// Previous-run content hashes, keyed by shape key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashCache {
    hashes: BTreeMap<String, String>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only entries that were built and meshed without error
    pub fn from_display_info(display_info: &BTreeMap<String, DisplayInfo>) -> Self {
        let hashes = display_info
            .iter()
            .filter(|(_, info)| info.is_ok())
            .filter_map(|(id, info)| info.hash.clone().map(|hash| (id.clone(), hash)))
            .collect();
        Self { hashes }
    }

    pub fn hash(&self, key: &str) -> Option<&str> {
        self.hashes.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, hash: impl Into<String>) {
        self.hashes.insert(key.into(), hash.into());
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshData {
        MeshData {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
            color: None,
        }
    }

    #[test]
    fn test_mesh_entry_wire_format() {
        let reuse = serde_json::to_value(MeshEntry::Reuse).unwrap();
        assert_eq!(reuse, serde_json::json!({"mesh": "reuse"}));

        let failed = serde_json::to_value(MeshEntry::Failed).unwrap();
        assert_eq!(failed, serde_json::json!({"mesh": null}));

        let payload = serde_json::to_value(MeshEntry::Payload(triangle())).unwrap();
        assert_eq!(payload["mesh"]["indices"], serde_json::json!([0, 1, 2]));

        let parsed: MeshEntry = serde_json::from_value(serde_json::json!({"mesh": "reuse"})).unwrap();
        assert!(parsed.is_reuse());
        let parsed: MeshEntry = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(parsed, MeshEntry::Failed);
        let parsed: MeshEntry = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.payload(), Some(&triangle()));
    }

    #[test]
    fn test_response_keys_are_camel_case() {
        let mut delta = ResponseDelta::default();
        delta.display_info.insert("a".into(), DisplayInfo::success("h"));
        delta.summary.push(None);
        let value = serde_json::to_value(&delta).unwrap();
        assert!(value.get("displayInfo").is_some());
        assert_eq!(value["solids"], serde_json::json!([null]));
        assert_eq!(value["displayInfo"]["a"], serde_json::json!({"hash": "h", "error": null}));
    }

    #[test]
    fn test_hash_cache_skips_errors() {
        let mut info = BTreeMap::new();
        info.insert("ok".to_string(), DisplayInfo::success("h1"));
        info.insert("broken".to_string(), DisplayInfo::failure("cannot build box"));
        info.insert("unmeshed".to_string(), DisplayInfo::degraded("h2", "cannot mesh"));

        let cache = HashCache::from_display_info(&info);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hash("ok"), Some("h1"));
        assert_eq!(cache.hash("unmeshed"), None);
    }

    #[test]
    fn test_append_offsets_indices() {
        let mut mesh = triangle();
        mesh.append(&triangle());
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.triangle_count(), 2);
    }
}
