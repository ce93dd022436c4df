//! Secondary pass for STEP bodies
//!
//! Imports each referenced file once and rebuilds every deferred shape with
//! its placeholders replaced by the imported bodies, so placement, booleans
//! and fillets recorded in the first pass carry over. Every body imported in
//! one pass shares a random display color.

use super::{solid_summary, FirstPass};
use crate::error::StepError;
use crate::kernel::{GeometryKernel, KernelError, ShapeHandle};
use crate::step::StepLibrary;
use log::{info, warn};
use rand::Rng;
use shapedelta_core::{DisplayInfo, MeshEntry, ResponseDelta};
use std::collections::HashMap;
use std::path::Path;

pub struct StepPass<'a, K: GeometryKernel> {
    kernel: &'a K,
    library: &'a StepLibrary,
}

impl<'a, K: GeometryKernel> StepPass<'a, K> {
    pub fn new(kernel: &'a K, library: &'a StepLibrary) -> Self {
        Self { kernel, library }
    }

    fn import(&self, path: &Path) -> Result<K::Shape, KernelError> {
        let bodies = self.kernel.import_external_format(path)?;
        match bodies.as_slice() {
            [body] => Ok(body.clone()),
            _ => self.kernel.composite(&bodies),
        }
    }

    /// Produces the final response. A guid with no file in the library fails
    /// the whole pass; import and meshing errors stay with their display id.
    pub fn run(&self, first: FirstPass<K::Shape>) -> Result<ResponseDelta, StepError> {
        let FirstPass { mut response, deferred } = first;

        let mut guids: Vec<String> = Vec::new();
        for entry in &deferred {
            for guid in entry.shape.external_guids() {
                if !guids.contains(&guid) {
                    guids.push(guid);
                }
            }
        }

        let mut bodies = HashMap::new();
        let mut failed = HashMap::new();
        for guid in guids {
            let path = self.library.locate(&guid)?;
            match self.import(&path) {
                Ok(body) => {
                    info!("Imported STEP {} from {}", guid, path.display());
                    bodies.insert(guid, body);
                }
                Err(source) => {
                    let err = StepError::Import {
                        guid: guid.clone(),
                        source,
                    };
                    warn!("{}", err);
                    failed.insert(guid, err.to_string());
                }
            }
        }

        let mut rng = rand::rng();
        let color = [rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>()];

        for entry in deferred {
            let import_failure = entry
                .shape
                .external_guids()
                .iter()
                .find_map(|guid| failed.get(guid).cloned());
            let resolved = match import_failure {
                Some(error) => Err(error),
                None => self
                    .kernel
                    .resolve_external(&entry.shape, &bodies)
                    .map_err(|err| err.to_string()),
            };

            let shape = match resolved {
                Ok(shape) => shape,
                Err(error) => {
                    warn!("STEP body for {} has failed: {}", entry.id, error);
                    response.meshes.remove(&entry.id);
                    response.display_info.insert(entry.id, DisplayInfo::failure(error));
                    response.summary[entry.summary_index] = None;
                    continue;
                }
            };

            let hash = shape.content_hash();
            response.summary[entry.summary_index] = Some(solid_summary(&entry.shape_key, &hash, &shape));

            match self.kernel.build_mesh(&shape) {
                Ok(mesh) => {
                    response.display_info.insert(entry.id.clone(), DisplayInfo::success(hash));
                    response
                        .meshes
                        .insert(entry.id, MeshEntry::Payload(mesh.with_color(color)));
                }
                Err(err) => {
                    warn!("Meshing STEP body for {} has failed: {}", entry.id, err);
                    response
                        .display_info
                        .insert(entry.id.clone(), DisplayInfo::degraded(hash, err.to_string()));
                    response.meshes.insert(entry.id, MeshEntry::Failed);
                }
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{CsgShape, ReferenceKernel};
    use crate::response::ResponseBuilder;
    use crate::sandbox::{Evaluation, EvaluationRecord};
    use crate::step::StepConfig;
    use glam::DVec3;
    use shapedelta_core::HashCache;
    use std::path::PathBuf;
    use uuid::Uuid;

    const STEP_FILE: &str = "ISO-10303-21;
HEADER;
ENDSEC;
DATA;
#1 = CARTESIAN_POINT('', (0., 0., 0.));
#2 = CARTESIAN_POINT('', (10., 20., 5.));
ENDSEC;
END-ISO-10303-21;
";

    fn library_with(files: &[(&str, &str)]) -> (StepLibrary, PathBuf) {
        let dir = std::env::temp_dir().join(format!("shapedelta-pass-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            std::fs::write(dir.join(file), content).unwrap();
        }
        (StepLibrary::resolve(&StepConfig::with_root(&dir)).unwrap(), dir)
    }

    fn first_pass(kernel: &ReferenceKernel, shapes: Vec<(&str, CsgShape)>) -> FirstPass<CsgShape> {
        let records = shapes
            .into_iter()
            .map(|(id, shape)| EvaluationRecord::Success {
                id: id.to_string(),
                shape_key: id.to_string(),
                hash: shape.content_hash(),
                shape,
            })
            .collect();
        ResponseBuilder::new(kernel).build(
            &HashCache::new(),
            Evaluation {
                records,
                logs: Vec::new(),
            },
        )
    }

    #[test]
    fn test_imports_and_colors_batch() {
        let kernel = ReferenceKernel::new();
        let (library, dir) = library_with(&[("a.step", STEP_FILE), ("b.STEP", STEP_FILE)]);
        let one = kernel.make_external("a").unwrap();
        let two = kernel
            .translate(&kernel.make_external("b").unwrap(), DVec3::new(100.0, 0.0, 0.0))
            .unwrap();
        let first = first_pass(&kernel, vec![("one", one), ("two", two)]);

        let response = StepPass::new(&kernel, &library).run(first).unwrap();

        let one = response.meshes["one"].payload().unwrap();
        let two = response.meshes["two"].payload().unwrap();
        assert!(one.color.is_some());
        assert_eq!(one.color, two.color);
        assert!(two.vertices.iter().all(|v| v[0] >= 100.0));
        assert_ne!(response.display_info["one"].hash, response.display_info["two"].hash);

        let summary = response.summary[0].as_ref().unwrap();
        assert!((summary.volume - 1000.0).abs() < 1e-6);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_file_fails_the_pass() {
        let kernel = ReferenceKernel::new();
        let (library, dir) = library_with(&[]);
        let first = first_pass(&kernel, vec![("one", kernel.make_external("a").unwrap())]);
        let result = StepPass::new(&kernel, &library).run(first);
        assert!(matches!(result, Err(StepError::FileNotFound { .. })));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_unreadable_file_fails_only_its_item() {
        let kernel = ReferenceKernel::new();
        let (library, dir) = library_with(&[("good.step", STEP_FILE), ("bad.step", "not a step file")]);
        let first = first_pass(
            &kernel,
            vec![
                ("good", kernel.make_external("good").unwrap()),
                ("bad", kernel.make_external("bad").unwrap()),
            ],
        );

        let response = StepPass::new(&kernel, &library).run(first).unwrap();
        assert!(response.display_info["good"].is_ok());
        assert!(response.meshes["good"].payload().is_some());

        let error = response.display_info["bad"].error.as_deref().unwrap();
        assert!(error.contains("bad"));
        assert!(!response.meshes.contains_key("bad"));
        assert!(response.summary[1].is_none());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_derived_shapes_are_rebuilt_from_imported_bodies() {
        let kernel = ReferenceKernel::new();
        let (library, dir) = library_with(&[("a.step", STEP_FILE)]);
        let body = kernel.make_external("a").unwrap();
        let hole = kernel.make_box(DVec3::ZERO, DVec3::splat(5.0)).unwrap();
        let cut = kernel.cut(&body, &hole).unwrap();
        let rounded = kernel.fillet(&body, &body.edges(), 1.0).unwrap();
        let first = first_pass(&kernel, vec![("cut", cut), ("rounded", rounded)]);

        let response = StepPass::new(&kernel, &library).run(first).unwrap();

        assert!(response.display_info["cut"].is_ok());
        assert!(response.meshes["cut"].payload().is_some());
        let cut_volume = response.summary[0].as_ref().unwrap().volume;
        assert!(cut_volume < 1000.0 && cut_volume > 800.0);

        assert!(response.display_info["rounded"].is_ok());
        let rounded_volume = response.summary[1].as_ref().unwrap().volume;
        assert!(rounded_volume < 1000.0);
        std::fs::remove_dir_all(dir).ok();
    }
}
