//! Reference CSG kernel

use super::solid::{BooleanOp, Solid, VoxelGrid};
use super::tessellate::tessellate;
use super::{Edge, GeometryKernel, KernelError, KernelSettings, ShapeHandle};
use crate::constants::kernel::EPSILON;
use glam::{DMat4, DQuat, DVec3};
use log::debug;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use shapedelta_core::MeshData;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

static CARTESIAN_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"CARTESIAN_POINT\s*\(\s*'[^']*'\s*,\s*\(\s*([-+0-9.eE]+)\s*,\s*([-+0-9.eE]+)\s*,\s*([-+0-9.eE]+)\s*\)",
    )
    .expect("CARTESIAN_POINT pattern is valid")
});

struct ShapeInner {
    identity: u64,
    solid: Arc<Solid>,
    hash: String,
    resolution: usize,
    /// (area, volume), computed on first request
    measures: OnceCell<(f64, f64)>,
}

/// Handle to a solid built by the reference kernel. Clones share identity.
#[derive(Clone)]
pub struct CsgShape {
    inner: Rc<ShapeInner>,
}

impl CsgShape {
    fn new(solid: Solid, resolution: usize) -> Self {
        let hash = hex::encode(Sha256::digest(solid.canonical().as_bytes()));
        Self {
            inner: Rc::new(ShapeInner {
                identity: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed),
                solid: Arc::new(solid),
                hash,
                resolution,
                measures: OnceCell::new(),
            }),
        }
    }

    pub fn solid(&self) -> &Arc<Solid> {
        &self.inner.solid
    }

    fn measures(&self) -> (f64, f64) {
        *self.inner.measures.get_or_init(|| {
            self.inner.solid.analytic_measures().unwrap_or_else(|| {
                VoxelGrid::sample(&self.inner.solid, self.inner.resolution)
                    .map(|grid| (grid.area(), grid.volume()))
                    .unwrap_or((0.0, 0.0))
            })
        })
    }
}

impl fmt::Debug for CsgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsgShape")
            .field("identity", &self.inner.identity)
            .field("kind", &self.inner.solid.kind_name())
            .field("hash", &&self.inner.hash[..12])
            .finish()
    }
}

impl ShapeHandle for CsgShape {
    fn identity(&self) -> u64 {
        self.inner.identity
    }

    fn content_hash(&self) -> String {
        self.inner.hash.clone()
    }

    fn area(&self) -> f64 {
        self.measures().0
    }

    fn volume(&self) -> f64 {
        self.measures().1
    }

    fn edges(&self) -> Vec<Edge> {
        (0..self.inner.solid.edge_count()).map(Edge).collect()
    }

    fn is_external(&self) -> bool {
        self.inner.solid.is_external()
    }

    fn external_guids(&self) -> Vec<String> {
        self.inner.solid.external_guids()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceKernel {
    settings: KernelSettings,
}

impl ReferenceKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: KernelSettings) -> Self {
        Self {
            settings: settings.sanitized(),
        }
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    fn shape(&self, solid: Solid) -> CsgShape {
        CsgShape::new(solid, self.settings.voxel_resolution)
    }

    fn boolean(&self, op: BooleanOp, left: &CsgShape, right: &CsgShape) -> CsgShape {
        self.shape(Solid::Boolean {
            op,
            left: left.solid().clone(),
            right: right.solid().clone(),
        })
    }

    fn transformed(&self, shape: &CsgShape, matrix: DMat4) -> CsgShape {
        self.shape(Solid::transformed(shape.solid().clone(), matrix))
    }
}

fn finite(name: &str, values: &[f64]) -> Result<(), KernelError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument(format!("{} must be finite", name)))
    }
}

impl GeometryKernel for ReferenceKernel {
    type Shape = CsgShape;

    fn make_box(&self, point1: DVec3, point2: DVec3) -> Result<CsgShape, KernelError> {
        finite("box corners", &[point1.x, point1.y, point1.z, point2.x, point2.y, point2.z])?;
        Ok(self.shape(Solid::cuboid(point1, point2)?))
    }

    fn make_cylinder(&self, point1: DVec3, point2: DVec3, radius: f64) -> Result<CsgShape, KernelError> {
        finite("cylinder", &[point1.x, point1.y, point1.z, point2.x, point2.y, point2.z, radius])?;
        Ok(self.shape(Solid::cylinder(point1, point2, radius)?))
    }

    fn make_sphere(&self, center: DVec3, radius: f64) -> Result<CsgShape, KernelError> {
        finite("sphere", &[center.x, center.y, center.z, radius])?;
        Ok(self.shape(Solid::sphere(center, radius)?))
    }

    fn make_external(&self, guid: &str) -> Result<CsgShape, KernelError> {
        if guid.is_empty() {
            return Err(KernelError::InvalidArgument("empty STEP guid".to_string()));
        }
        Ok(self.shape(Solid::External {
            guid: guid.to_string(),
            rounding: 0.0,
        }))
    }

    fn cut(&self, left: &CsgShape, right: &CsgShape) -> Result<CsgShape, KernelError> {
        Ok(self.boolean(BooleanOp::Cut, left, right))
    }

    fn fuse(&self, left: &CsgShape, right: &CsgShape) -> Result<CsgShape, KernelError> {
        Ok(self.boolean(BooleanOp::Fuse, left, right))
    }

    fn common(&self, left: &CsgShape, right: &CsgShape) -> Result<CsgShape, KernelError> {
        Ok(self.boolean(BooleanOp::Common, left, right))
    }

    fn translate(&self, shape: &CsgShape, offset: DVec3) -> Result<CsgShape, KernelError> {
        finite("translation", &[offset.x, offset.y, offset.z])?;
        Ok(self.transformed(shape, DMat4::from_translation(offset)))
    }

    fn rotate(&self, shape: &CsgShape, center: DVec3, axis: DVec3, degrees: f64) -> Result<CsgShape, KernelError> {
        finite("rotation", &[center.x, center.y, center.z, axis.x, axis.y, axis.z, degrees])?;
        if axis.length() <= EPSILON {
            return Err(KernelError::InvalidArgument("rotation axis must not be zero".to_string()));
        }
        let rotation = DQuat::from_axis_angle(axis.normalize(), degrees.to_radians());
        let matrix = DMat4::from_translation(center) * DMat4::from_quat(rotation) * DMat4::from_translation(-center);
        Ok(self.transformed(shape, matrix))
    }

    fn composite(&self, bodies: &[CsgShape]) -> Result<CsgShape, KernelError> {
        if bodies.is_empty() {
            return Err(KernelError::Degenerate("compound"));
        }
        Ok(self.shape(Solid::Compound(bodies.iter().map(|b| b.solid().clone()).collect())))
    }

    fn fillet(&self, shape: &CsgShape, edges: &[Edge], radius: f64) -> Result<CsgShape, KernelError> {
        // placeholders have no edges yet; the fillet is kept for the import
        if edges.is_empty() && !shape.is_external() {
            return Ok(shape.clone());
        }
        Ok(self.shape(shape.solid().round_edges(radius)?))
    }

    fn build_mesh(&self, shape: &CsgShape) -> Result<MeshData, KernelError> {
        let mesh = tessellate(shape.solid(), &self.settings)?;
        debug!(
            "Meshed {} into {} triangles",
            shape.solid().kind_name(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    fn import_external_format(&self, path: &Path) -> Result<Vec<CsgShape>, KernelError> {
        let import_error = |reason: String| KernelError::Import {
            path: path.display().to_string(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| import_error(e.to_string()))?;
        if !text.contains("ISO-10303-21") {
            return Err(import_error("not a STEP file".to_string()));
        }

        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        let mut count = 0usize;
        for captures in CARTESIAN_POINT.captures_iter(&text) {
            let mut point = [0.0; 3];
            for (axis, value) in point.iter_mut().enumerate() {
                *value = captures[axis + 1]
                    .parse::<f64>()
                    .map_err(|e| import_error(format!("bad coordinate `{}`: {}", &captures[axis + 1], e)))?;
            }
            let point = DVec3::from_array(point);
            min = min.min(point);
            max = max.max(point);
            count += 1;
        }

        if count == 0 {
            return Err(import_error("no CARTESIAN_POINT entities".to_string()));
        }
        if (max - min).min_element() <= EPSILON {
            return Err(import_error("body has no volume".to_string()));
        }

        debug!("Imported {} points from {}", count, path.display());
        Ok(vec![self.shape(Solid::Imported {
            source: path.display().to_string(),
            min,
            max,
        })])
    }

    fn resolve_external(&self, shape: &CsgShape, bodies: &HashMap<String, CsgShape>) -> Result<CsgShape, KernelError> {
        if !shape.is_external() {
            return Ok(shape.clone());
        }
        let bodies: HashMap<String, Arc<Solid>> = bodies
            .iter()
            .map(|(guid, body)| (guid.clone(), body.solid().clone()))
            .collect();
        let resolved = shape.solid().resolve_external(&bodies)?;
        Ok(self.shape(resolved.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> ReferenceKernel {
        ReferenceKernel::with_settings(KernelSettings {
            voxel_resolution: 24,
            ..KernelSettings::default()
        })
    }

    #[test]
    fn test_box_measures_and_hash() {
        let k = kernel();
        let a = k.make_box(DVec3::ZERO, DVec3::new(100.0, 200.0, 200.0)).unwrap();
        let b = k.make_box(DVec3::ZERO, DVec3::new(100.0, 200.0, 200.0)).unwrap();
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
        assert!((a.volume() - 4_000_000.0).abs() < 1e-6);
        assert!((a.area() - 200_000.0).abs() < 1e-6);
        assert_eq!(a.edges().len(), 12);
    }

    #[test]
    fn test_degenerate_box_message() {
        let err = kernel().make_box(DVec3::ONE, DVec3::ONE).unwrap_err();
        assert_eq!(err.to_string(), "cannot build box");
    }

    #[test]
    fn test_clone_shares_identity() {
        let shape = kernel().make_sphere(DVec3::ZERO, 1.0).unwrap();
        assert_eq!(shape.clone().identity(), shape.identity());
    }

    #[test]
    fn test_cut_changes_hash_with_tool() {
        let k = kernel();
        let block = k.make_box(DVec3::ZERO, DVec3::splat(10.0)).unwrap();
        let pin1 = k.make_cylinder(DVec3::new(5.0, 5.0, 0.0), DVec3::new(5.0, 5.0, 10.0), 2.0).unwrap();
        let pin2 = k.make_cylinder(DVec3::new(5.0, 5.0, 0.0), DVec3::new(5.0, 5.0, 10.0), 3.0).unwrap();
        let cut1 = k.cut(&block, &pin1).unwrap();
        let cut2 = k.cut(&block, &pin2).unwrap();
        assert_ne!(cut1.content_hash(), cut2.content_hash());
        assert!(cut1.volume() < block.volume());
        assert!(cut2.volume() < cut1.volume());
        assert!(!k.build_mesh(&cut1).unwrap().is_empty());
    }

    #[test]
    fn test_disjoint_common_cannot_be_meshed() {
        let k = kernel();
        let a = k.make_box(DVec3::ZERO, DVec3::ONE).unwrap();
        let b = k.make_box(DVec3::splat(5.0), DVec3::splat(6.0)).unwrap();
        let common = k.common(&a, &b).unwrap();
        assert_eq!(k.build_mesh(&common), Err(KernelError::EmptyShape));
    }

    #[test]
    fn test_rotate_about_center() {
        let k = kernel();
        let shape = k.make_box(DVec3::ZERO, DVec3::new(2.0, 1.0, 1.0)).unwrap();
        let turned = k.rotate(&shape, DVec3::ZERO, DVec3::Z, 90.0).unwrap();
        assert!(turned.solid().contains(DVec3::new(-0.5, 1.5, 0.5)));
        assert!(k.rotate(&shape, DVec3::ZERO, DVec3::ZERO, 90.0).is_err());
    }

    #[test]
    fn test_fillet_rounds_box() {
        let k = kernel();
        let shape = k.make_box(DVec3::ZERO, DVec3::splat(10.0)).unwrap();
        let rounded = k.fillet(&shape, &shape.edges(), 1.0).unwrap();
        assert_ne!(rounded.content_hash(), shape.content_hash());
        assert!(rounded.volume() < shape.volume());
        assert!(k.fillet(&shape, &shape.edges(), 6.0).is_err());
    }

    #[test]
    fn test_external_shape() {
        let k = kernel();
        let external = k.make_external("abc").unwrap();
        let moved = k.translate(&external, DVec3::X).unwrap();
        assert!(moved.is_external());
        assert!(k.build_mesh(&moved).is_err());
    }

    fn imported_body(k: &ReferenceKernel) -> CsgShape {
        k.shape(Solid::Imported {
            source: "part.step".into(),
            min: DVec3::ZERO,
            max: DVec3::splat(10.0),
        })
    }

    #[test]
    fn test_fillet_on_placeholder_survives_import() {
        let k = kernel();
        let external = k.make_external("abc").unwrap();
        let rounded = k.fillet(&external, &external.edges(), 1.0).unwrap();
        assert_ne!(rounded.content_hash(), external.content_hash());

        let bodies = HashMap::from([("abc".to_string(), imported_body(&k))]);
        let plain = k.resolve_external(&external, &bodies).unwrap();
        let filleted = k.resolve_external(&rounded, &bodies).unwrap();
        assert!((plain.volume() - 1000.0).abs() < 1e-6);
        assert!(filleted.volume() < 1000.0);
        assert!(!filleted.is_external());
    }

    #[test]
    fn test_resolve_external_inside_boolean() {
        let k = kernel();
        let external = k.make_external("abc").unwrap();
        let hole = k.make_box(DVec3::ZERO, DVec3::splat(5.0)).unwrap();
        let cut = k.cut(&external, &hole).unwrap();
        assert_eq!(cut.external_guids(), vec!["abc".to_string()]);

        let bodies = HashMap::from([("abc".to_string(), imported_body(&k))]);
        let resolved = k.resolve_external(&cut, &bodies).unwrap();
        assert!(!resolved.is_external());
        assert!(resolved.volume() > 800.0 && resolved.volume() < 950.0);
        assert!(k.build_mesh(&resolved).is_ok());

        let missing = k.resolve_external(&cut, &HashMap::new());
        assert_eq!(missing.unwrap_err(), KernelError::ExternalBody("abc".into()));
    }
}
