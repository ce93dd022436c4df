//! Result differ and response builder
//!
//! Turns evaluation records into a response delta. A shape whose content hash
//! matches the previous run is sent as the reuse marker instead of a mesh.

pub mod step_pass;

pub use step_pass::StepPass;

use crate::kernel::{GeometryKernel, ShapeHandle};
use crate::sandbox::{Evaluation, EvaluationRecord};
use log::{debug, warn};
use shapedelta_core::{DisplayInfo, HashCache, MeshEntry, ResponseDelta, SolidSummary};

/// A STEP placeholder left for the secondary pass
#[derive(Debug, Clone)]
pub struct Deferred<S> {
    pub id: String,
    pub shape_key: String,
    pub shape: S,
    /// Position of this record's entry in the summary list
    pub summary_index: usize,
}

/// Output of the first pass
#[derive(Debug, Clone)]
pub struct FirstPass<S> {
    pub response: ResponseDelta,
    pub deferred: Vec<Deferred<S>>,
}

impl<S> FirstPass<S> {
    pub fn needs_step_pass(&self) -> bool {
        !self.deferred.is_empty()
    }
}

pub fn solid_summary<S: ShapeHandle>(shape_key: &str, hash: &str, shape: &S) -> SolidSummary {
    SolidSummary {
        id: shape_key.to_string(),
        uuid: hash.to_string(),
        name: format!("id_{}", shape_key),
        area: shape.area(),
        volume: shape.volume(),
    }
}

pub struct ResponseBuilder<'a, K: GeometryKernel> {
    kernel: &'a K,
}

impl<'a, K: GeometryKernel> ResponseBuilder<'a, K> {
    pub fn new(kernel: &'a K) -> Self {
        Self { kernel }
    }

    /// Builds the first-pass response against the previous run's hashes
    pub fn build(&self, previous: &HashCache, evaluation: Evaluation<K::Shape>) -> FirstPass<K::Shape> {
        let mut response = ResponseDelta {
            logs: evaluation.logs,
            ..ResponseDelta::default()
        };
        let mut deferred = Vec::new();
        let (mut reused, mut rebuilt) = (0usize, 0usize);

        for record in evaluation.records {
            match record {
                EvaluationRecord::Failure { id, error } => {
                    response.meshes.remove(&id);
                    response.display_info.insert(id, DisplayInfo::failure(error));
                    response.summary.push(None);
                }
                EvaluationRecord::Success {
                    id,
                    shape_key,
                    shape,
                    hash,
                } => {
                    let summary_index = response.summary.len();
                    response.summary.push(Some(solid_summary(&shape_key, &hash, &shape)));

                    if shape.is_external() {
                        deferred.push(Deferred {
                            id,
                            shape_key,
                            shape,
                            summary_index,
                        });
                        continue;
                    }

                    if is_unchanged(previous, &id, &shape_key, &hash) {
                        response.display_info.insert(id.clone(), DisplayInfo::success(hash));
                        response.meshes.insert(id, MeshEntry::Reuse);
                        reused += 1;
                        continue;
                    }

                    rebuilt += 1;
                    match self.kernel.build_mesh(&shape) {
                        Ok(mesh) => {
                            response.display_info.insert(id.clone(), DisplayInfo::success(hash));
                            response.meshes.insert(id, MeshEntry::Payload(mesh));
                        }
                        Err(err) => {
                            warn!("Meshing {} has failed: {}", id, err);
                            response
                                .display_info
                                .insert(id.clone(), DisplayInfo::degraded(hash, err.to_string()));
                            response.meshes.insert(id, MeshEntry::Failed);
                        }
                    }
                }
            }
        }

        debug!(
            "First pass: {} reused, {} rebuilt, {} deferred",
            reused,
            rebuilt,
            deferred.len()
        );
        FirstPass { response, deferred }
    }
}

/// The owner's previous hash must match; a display that shares another
/// item's shape must also have been sent under its own id before.
fn is_unchanged(previous: &HashCache, id: &str, shape_key: &str, hash: &str) -> bool {
    previous.hash(shape_key) == Some(hash) && (id == shape_key || previous.hash(id) == Some(hash))
}
