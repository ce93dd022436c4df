//! CSG solid tree used by the reference kernel
//!
//! Primitives keep exact measures. Boolean results are sampled on a voxel
//! grid for area, volume and meshing.

use super::KernelError;
use crate::constants::kernel::EPSILON;
use glam::{DMat4, DVec3};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt::Write;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    Cut,
    Fuse,
    Common,
}

impl BooleanOp {
    fn name(self) -> &'static str {
        match self {
            BooleanOp::Cut => "cut",
            BooleanOp::Fuse => "fuse",
            BooleanOp::Common => "common",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Solid {
    Cuboid {
        min: DVec3,
        max: DVec3,
        rounding: f64,
    },
    Cylinder {
        base: DVec3,
        top: DVec3,
        radius: f64,
        rounding: f64,
    },
    Sphere {
        center: DVec3,
        radius: f64,
    },
    Boolean {
        op: BooleanOp,
        left: Arc<Solid>,
        right: Arc<Solid>,
    },
    Transformed {
        solid: Arc<Solid>,
        transform: DMat4,
        inverse: DMat4,
    },
    Compound(Vec<Arc<Solid>>),
    /// Body read from an external file, kept as its bounding box
    Imported {
        source: String,
        min: DVec3,
        max: DVec3,
    },
    /// Not yet imported; `rounding` is a fillet applied once it is
    External {
        guid: String,
        rounding: f64,
    },
}

/// Axis-aligned bounds; `min > max` on any axis means empty
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn size(&self) -> DVec3 {
        if self.is_empty() {
            DVec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn intersection(&self, other: &Bounds) -> Bounds {
        Bounds::new(self.min.max(other.min), self.max.min(other.max))
    }

    pub fn include(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn transformed(&self, matrix: &DMat4) -> Bounds {
        if self.is_empty() {
            return *self;
        }
        let mut out = Bounds::empty();
        for i in 0..8 {
            let corner = DVec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.include(matrix.transform_point3(corner));
        }
        out
    }
}

impl Solid {
    pub fn cuboid(point1: DVec3, point2: DVec3) -> Result<Solid, KernelError> {
        let min = point1.min(point2);
        let max = point1.max(point2);
        if (max - min).min_element() <= EPSILON {
            return Err(KernelError::Degenerate("box"));
        }
        Ok(Solid::Cuboid { min, max, rounding: 0.0 })
    }

    pub fn cylinder(base: DVec3, top: DVec3, radius: f64) -> Result<Solid, KernelError> {
        if radius <= EPSILON || (top - base).length() <= EPSILON {
            return Err(KernelError::Degenerate("cylinder"));
        }
        Ok(Solid::Cylinder {
            base,
            top,
            radius,
            rounding: 0.0,
        })
    }

    pub fn sphere(center: DVec3, radius: f64) -> Result<Solid, KernelError> {
        if radius <= EPSILON {
            return Err(KernelError::Degenerate("sphere"));
        }
        Ok(Solid::Sphere { center, radius })
    }

    /// Wraps a solid in a rigid transform, folding nested transforms
    pub fn transformed(solid: Arc<Solid>, matrix: DMat4) -> Solid {
        let (inner, transform) = match solid.as_ref() {
            Solid::Transformed { solid, transform, .. } => (solid.clone(), matrix * *transform),
            _ => (solid, matrix),
        };
        Solid::Transformed {
            solid: inner,
            transform,
            inverse: transform.inverse(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Solid::Cuboid { .. } => "box",
            Solid::Cylinder { .. } => "cylinder",
            Solid::Sphere { .. } => "sphere",
            Solid::Boolean { op, .. } => op.name(),
            Solid::Transformed { solid, .. } => solid.kind_name(),
            Solid::Compound(_) => "compound",
            Solid::Imported { .. } => "imported body",
            Solid::External { .. } => "external body",
        }
    }

    pub fn is_external(&self) -> bool {
        match self {
            Solid::External { .. } => true,
            Solid::Transformed { solid, .. } => solid.is_external(),
            Solid::Boolean { left, right, .. } => left.is_external() || right.is_external(),
            Solid::Compound(members) => members.iter().any(|m| m.is_external()),
            _ => false,
        }
    }

    /// First external guid found in the tree
    pub fn external_guid(&self) -> Option<&str> {
        match self {
            Solid::External { guid, .. } => Some(guid),
            Solid::Transformed { solid, .. } => solid.external_guid(),
            Solid::Boolean { left, right, .. } => left.external_guid().or_else(|| right.external_guid()),
            Solid::Compound(members) => members.iter().find_map(|m| m.external_guid()),
            _ => None,
        }
    }

    /// Every external guid in the tree, first occurrence first
    pub fn external_guids(&self) -> Vec<String> {
        let mut guids = Vec::new();
        self.collect_guids(&mut guids);
        guids
    }

    fn collect_guids(&self, guids: &mut Vec<String>) {
        match self {
            Solid::External { guid, .. } => {
                if !guids.contains(guid) {
                    guids.push(guid.clone());
                }
            }
            Solid::Transformed { solid, .. } => solid.collect_guids(guids),
            Solid::Boolean { left, right, .. } => {
                left.collect_guids(guids);
                right.collect_guids(guids);
            }
            Solid::Compound(members) => members.iter().for_each(|m| m.collect_guids(guids)),
            _ => {}
        }
    }

    /// Rebuilds the tree with every external leaf replaced by its imported
    /// body, applying any fillet recorded on the leaf
    pub fn resolve_external(
        self: &Arc<Self>,
        bodies: &HashMap<String, Arc<Solid>>,
    ) -> Result<Arc<Solid>, KernelError> {
        if !self.is_external() {
            return Ok(self.clone());
        }
        let resolved = match self.as_ref() {
            Solid::External { guid, rounding } => {
                let body = bodies
                    .get(guid)
                    .ok_or_else(|| KernelError::ExternalBody(guid.clone()))?;
                if *rounding <= EPSILON {
                    return Ok(body.clone());
                }
                body.round_edges(*rounding)?
            }
            Solid::Transformed { solid, transform, .. } => {
                Solid::transformed(solid.resolve_external(bodies)?, *transform)
            }
            Solid::Boolean { op, left, right } => Solid::Boolean {
                op: *op,
                left: left.resolve_external(bodies)?,
                right: right.resolve_external(bodies)?,
            },
            Solid::Compound(members) => Solid::Compound(
                members
                    .iter()
                    .map(|m| m.resolve_external(bodies))
                    .collect::<Result<_, _>>()?,
            ),
            _ => return Ok(self.clone()),
        };
        Ok(Arc::new(resolved))
    }

    /// Deterministic text form of the definition; equal text means equal geometry
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Solid::Cuboid { min, max, rounding } => {
                let _ = write!(out, "box({},{},{})", vector(*min), vector(*max), scalar(*rounding));
            }
            Solid::Cylinder {
                base,
                top,
                radius,
                rounding,
            } => {
                let _ = write!(
                    out,
                    "cylinder({},{},{},{})",
                    vector(*base),
                    vector(*top),
                    scalar(*radius),
                    scalar(*rounding)
                );
            }
            Solid::Sphere { center, radius } => {
                let _ = write!(out, "sphere({},{})", vector(*center), scalar(*radius));
            }
            Solid::Boolean { op, left, right } => {
                out.push_str(op.name());
                out.push('(');
                left.write_canonical(out);
                out.push(',');
                right.write_canonical(out);
                out.push(')');
            }
            Solid::Transformed { solid, transform, .. } => {
                let cols: Vec<String> = transform.to_cols_array().iter().map(|v| scalar(*v)).collect();
                let _ = write!(out, "transform([{}],", cols.join(","));
                solid.write_canonical(out);
                out.push(')');
            }
            Solid::Compound(members) => {
                out.push_str("compound(");
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    member.write_canonical(out);
                }
                out.push(')');
            }
            Solid::Imported { min, max, .. } => {
                let _ = write!(out, "imported({},{})", vector(*min), vector(*max));
            }
            Solid::External { guid, rounding } => {
                let _ = write!(out, "external({},{})", guid, scalar(*rounding));
            }
        }
    }

    pub fn contains(&self, p: DVec3) -> bool {
        match self {
            Solid::Cuboid { min, max, rounding } => {
                let center = (*min + *max) * 0.5;
                let half = (*max - *min) * 0.5;
                let q = (p - center).abs() - (half - DVec3::splat(*rounding));
                let distance = q.max(DVec3::ZERO).length() + q.max_element().min(0.0);
                distance <= *rounding
            }
            Solid::Cylinder {
                base,
                top,
                radius,
                rounding,
            } => {
                let axis = *top - *base;
                let height = axis.length();
                let dir = axis / height;
                let t = (p - *base).dot(dir);
                if t < 0.0 || t > height {
                    return false;
                }
                let radial = (p - *base - dir * t).length();
                if radial > *radius {
                    return false;
                }
                let r = *rounding;
                if r > 0.0 && radial > *radius - r {
                    let dr = radial - (*radius - r);
                    if t < r {
                        return dr * dr + (r - t) * (r - t) <= r * r;
                    }
                    if t > height - r {
                        let dz = t - (height - r);
                        return dr * dr + dz * dz <= r * r;
                    }
                }
                true
            }
            Solid::Sphere { center, radius } => (p - *center).length_squared() <= radius * radius,
            Solid::Boolean { op, left, right } => match op {
                BooleanOp::Cut => left.contains(p) && !right.contains(p),
                BooleanOp::Fuse => left.contains(p) || right.contains(p),
                BooleanOp::Common => left.contains(p) && right.contains(p),
            },
            Solid::Transformed { solid, inverse, .. } => solid.contains(inverse.transform_point3(p)),
            Solid::Compound(members) => members.iter().any(|m| m.contains(p)),
            Solid::Imported { min, max, .. } => p.cmpge(*min).all() && p.cmple(*max).all(),
            Solid::External { .. } => false,
        }
    }

    pub fn bounds(&self) -> Bounds {
        match self {
            Solid::Cuboid { min, max, .. } => Bounds::new(*min, *max),
            Solid::Cylinder { base, top, radius, .. } => {
                let pad = DVec3::splat(*radius);
                Bounds::new(base.min(*top) - pad, base.max(*top) + pad)
            }
            Solid::Sphere { center, radius } => {
                let pad = DVec3::splat(*radius);
                Bounds::new(*center - pad, *center + pad)
            }
            Solid::Boolean { op, left, right } => match op {
                BooleanOp::Cut => left.bounds(),
                BooleanOp::Fuse => left.bounds().union(&right.bounds()),
                BooleanOp::Common => left.bounds().intersection(&right.bounds()),
            },
            Solid::Transformed { solid, transform, .. } => solid.bounds().transformed(transform),
            Solid::Compound(members) => members
                .iter()
                .fold(Bounds::empty(), |acc, m| acc.union(&m.bounds())),
            Solid::Imported { min, max, .. } => Bounds::new(*min, *max),
            Solid::External { .. } => Bounds::empty(),
        }
    }

    /// Exact `(area, volume)` where the solid allows it
    pub fn analytic_measures(&self) -> Option<(f64, f64)> {
        match self {
            Solid::Cuboid { min, max, rounding } => Some(rounded_box_measures(*max - *min, *rounding)),
            Solid::Cylinder {
                base,
                top,
                radius,
                rounding,
            } => Some(rounded_cylinder_measures(*radius, (*top - *base).length(), *rounding)),
            Solid::Sphere { radius, .. } => Some((4.0 * PI * radius * radius, 4.0 / 3.0 * PI * radius.powi(3))),
            Solid::Transformed { solid, .. } => solid.analytic_measures(),
            Solid::Compound(members) => members.iter().try_fold((0.0, 0.0), |(area, volume), m| {
                m.analytic_measures().map(|(a, v)| (area + a, volume + v))
            }),
            Solid::Imported { min, max, .. } => Some(rounded_box_measures(*max - *min, 0.0)),
            Solid::External { .. } => Some((0.0, 0.0)),
            Solid::Boolean { .. } => None,
        }
    }

    pub fn edge_count(&self) -> usize {
        match self {
            Solid::Cuboid { .. } | Solid::Imported { .. } => 12,
            Solid::Cylinder { .. } => 3,
            Solid::Sphere { .. } => 1,
            Solid::Boolean { left, right, .. } => left.edge_count() + right.edge_count(),
            Solid::Transformed { solid, .. } => solid.edge_count(),
            Solid::Compound(members) => members.iter().map(|m| m.edge_count()).sum(),
            Solid::External { .. } => 0,
        }
    }

    /// Rounds every edge with the given radius
    pub fn round_edges(&self, radius: f64) -> Result<Solid, KernelError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(KernelError::InvalidArgument(format!("fillet radius {}", radius)));
        }
        if radius <= EPSILON {
            return Ok(self.clone());
        }
        match self {
            Solid::Cuboid { min, max, .. } => {
                if radius * 2.0 >= (*max - *min).min_element() {
                    return Err(KernelError::FilletTooLarge { radius });
                }
                Ok(Solid::Cuboid {
                    min: *min,
                    max: *max,
                    rounding: radius,
                })
            }
            Solid::Cylinder { base, top, radius: r, .. } => {
                if radius >= *r || radius * 2.0 >= (*top - *base).length() {
                    return Err(KernelError::FilletTooLarge { radius });
                }
                Ok(Solid::Cylinder {
                    base: *base,
                    top: *top,
                    radius: *r,
                    rounding: radius,
                })
            }
            Solid::Sphere { .. } => Ok(self.clone()),
            Solid::Transformed { solid, transform, .. } => {
                Ok(Solid::transformed(Arc::new(solid.round_edges(radius)?), *transform))
            }
            Solid::Imported { min, max, .. } => Solid::Cuboid {
                min: *min,
                max: *max,
                rounding: 0.0,
            }
            .round_edges(radius),
            Solid::Compound(members) => Ok(Solid::Compound(
                members
                    .iter()
                    .map(|m| m.round_edges(radius).map(Arc::new))
                    .collect::<Result<_, _>>()?,
            )),
            Solid::External { guid, .. } => Ok(Solid::External {
                guid: guid.clone(),
                rounding: radius,
            }),
            other => Err(KernelError::InvalidArgument(format!(
                "fillet is not supported on {} shapes",
                other.kind_name()
            ))),
        }
    }
}

/// Area and volume of a box of the given size with every edge rounded
fn rounded_box_measures(size: DVec3, r: f64) -> (f64, f64) {
    let inner = size - DVec3::splat(2.0 * r);
    let (x, y, z) = (inner.x, inner.y, inner.z);
    let pairs = x * y + y * z + z * x;
    let sum = x + y + z;
    let area = 2.0 * pairs + 2.0 * PI * r * sum + 4.0 * PI * r * r;
    let volume = x * y * z + 2.0 * r * pairs + PI * r * r * sum + 4.0 / 3.0 * PI * r.powi(3);
    (area, volume)
}

/// Area and volume of a cylinder with both rim edges rounded
fn rounded_cylinder_measures(radius: f64, height: f64, r: f64) -> (f64, f64) {
    let inner = radius - r;
    let wall = height - 2.0 * r;
    let area = 2.0 * PI * inner * inner
        + 2.0 * PI * radius * wall
        + 2.0 * 2.0 * PI * (inner + 2.0 * r / PI) * (PI * r / 2.0);
    let volume = PI * inner * inner * height
        + PI * (radius * radius - inner * inner) * wall
        + 2.0 * 2.0 * PI * (inner + 4.0 * r / (3.0 * PI)) * (PI * r * r / 4.0);
    (area, volume)
}

fn scalar(value: f64) -> String {
    let value = if value.abs() < 5e-7 { 0.0 } else { value };
    format!("{:.6}", value)
}

fn vector(v: DVec3) -> String {
    format!("[{},{},{}]", scalar(v.x), scalar(v.y), scalar(v.z))
}

/// Occupancy grid sampled at cell centers
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    pub origin: DVec3,
    pub cell: f64,
    pub dims: [usize; 3],
    filled: Vec<bool>,
}

impl VoxelGrid {
    /// Samples a solid with `resolution` cells along its longest axis
    pub fn sample(solid: &Solid, resolution: usize) -> Option<VoxelGrid> {
        let bounds = solid.bounds();
        let size = bounds.size();
        let longest = size.max_element();
        if bounds.is_empty() || longest <= EPSILON {
            return None;
        }

        let cell = longest / resolution.max(1) as f64;
        let dims = [
            ((size.x / cell).ceil() as usize).max(1),
            ((size.y / cell).ceil() as usize).max(1),
            ((size.z / cell).ceil() as usize).max(1),
        ];

        let mut filled = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let p = bounds.min + (DVec3::new(x as f64, y as f64, z as f64) + DVec3::splat(0.5)) * cell;
                    filled.push(solid.contains(p));
                }
            }
        }

        Some(VoxelGrid {
            origin: bounds.min,
            cell,
            dims,
            filled,
        })
    }

    /// Out-of-range cells read as empty
    pub fn is_filled(&self, x: isize, y: isize, z: isize) -> bool {
        if x < 0 || y < 0 || z < 0 {
            return false;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        if x >= self.dims[0] || y >= self.dims[1] || z >= self.dims[2] {
            return false;
        }
        self.filled[(z * self.dims[1] + y) * self.dims[0] + x]
    }

    pub fn filled_count(&self) -> usize {
        self.filled.iter().filter(|f| **f).count()
    }

    pub fn volume(&self) -> f64 {
        self.filled_count() as f64 * self.cell.powi(3)
    }

    /// Number of filled cell faces that touch an empty cell
    pub fn exposed_faces(&self) -> usize {
        let mut count = 0;
        self.for_each_exposed_face(|_, _| count += 1);
        count
    }

    pub fn area(&self) -> f64 {
        self.exposed_faces() as f64 * self.cell * self.cell
    }

    /// Calls `f(cell, normal)` for every exposed face
    pub fn for_each_exposed_face(&self, mut f: impl FnMut([isize; 3], [isize; 3])) {
        const NEIGHBOURS: [[isize; 3]; 6] = [[1, 0, 0], [-1, 0, 0], [0, 1, 0], [0, -1, 0], [0, 0, 1], [0, 0, -1]];
        for z in 0..self.dims[2] as isize {
            for y in 0..self.dims[1] as isize {
                for x in 0..self.dims[0] as isize {
                    if !self.is_filled(x, y, z) {
                        continue;
                    }
                    for n in NEIGHBOURS {
                        if !self.is_filled(x + n[0], y + n[1], z + n[2]) {
                            f([x, y, z], n);
                        }
                    }
                }
            }
        }
    }
}
