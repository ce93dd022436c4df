//! Geometry kernel seam
//!
//! The pipeline never does geometry itself. It drives a `GeometryKernel`
//! through the sandbox and asks it for meshes, imports and fillets. The
//! reference kernel in this module is a small CSG-tree implementation good
//! enough for tests and the CLI.

pub mod reference;
pub mod solid;
pub mod tessellate;

pub use reference::{CsgShape, ReferenceKernel};

use crate::constants;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use shapedelta_core::MeshData;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// An edge of a shape, addressed by index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge(pub usize);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("cannot build {0}")]
    Degenerate(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot mesh an empty shape")]
    EmptyShape,

    #[error("external body {0} has not been imported")]
    ExternalBody(String),

    #[error("fillet radius {radius} is too large for this shape")]
    FilletTooLarge { radius: f64 },

    #[error("cannot import {path}: {reason}")]
    Import { path: String, reason: String },
}

/// A shape produced by a kernel
pub trait ShapeHandle: Clone + fmt::Debug + 'static {
    /// Unique per constructed shape; clones of a handle share it
    fn identity(&self) -> u64;

    /// Derived from the geometric definition only
    fn content_hash(&self) -> String;

    fn area(&self) -> f64;

    fn volume(&self) -> f64;

    fn edges(&self) -> Vec<Edge>;

    /// Stands in for a body that has to be imported from an external file
    fn is_external(&self) -> bool;

    /// Guids of the external bodies this shape is built from
    fn external_guids(&self) -> Vec<String>;
}

pub trait GeometryKernel: 'static {
    type Shape: ShapeHandle;

    fn make_box(&self, point1: DVec3, point2: DVec3) -> Result<Self::Shape, KernelError>;

    fn make_cylinder(&self, point1: DVec3, point2: DVec3, radius: f64) -> Result<Self::Shape, KernelError>;

    fn make_sphere(&self, center: DVec3, radius: f64) -> Result<Self::Shape, KernelError>;

    /// Placeholder for a STEP body, resolved by the secondary pass
    fn make_external(&self, guid: &str) -> Result<Self::Shape, KernelError>;

    fn cut(&self, left: &Self::Shape, right: &Self::Shape) -> Result<Self::Shape, KernelError>;

    fn fuse(&self, left: &Self::Shape, right: &Self::Shape) -> Result<Self::Shape, KernelError>;

    fn common(&self, left: &Self::Shape, right: &Self::Shape) -> Result<Self::Shape, KernelError>;

    fn translate(&self, shape: &Self::Shape, offset: DVec3) -> Result<Self::Shape, KernelError>;

    /// Rotation about the line through `center` along `axis`, in degrees
    fn rotate(&self, shape: &Self::Shape, center: DVec3, axis: DVec3, degrees: f64) -> Result<Self::Shape, KernelError>;

    fn composite(&self, bodies: &[Self::Shape]) -> Result<Self::Shape, KernelError>;

    fn fillet(&self, shape: &Self::Shape, edges: &[Edge], radius: f64) -> Result<Self::Shape, KernelError>;

    fn build_mesh(&self, shape: &Self::Shape) -> Result<MeshData, KernelError>;

    fn import_external_format(&self, path: &Path) -> Result<Vec<Self::Shape>, KernelError>;

    /// Rebuilds `shape` with its external placeholders replaced by imported
    /// bodies, keyed by guid. Operations recorded on a placeholder are
    /// applied to the body.
    fn resolve_external(&self, shape: &Self::Shape, bodies: &HashMap<String, Self::Shape>)
        -> Result<Self::Shape, KernelError>;
}

/// Tessellation and sampling resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    pub voxel_resolution: usize,
    pub circle_segments: usize,
    pub sphere_rings: usize,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            voxel_resolution: constants::kernel::VOXEL_RESOLUTION,
            circle_segments: constants::kernel::CIRCLE_SEGMENTS,
            sphere_rings: constants::kernel::SPHERE_RINGS,
        }
    }
}

impl KernelSettings {
    /// Clamps settings to values the tessellator can work with
    pub fn sanitized(self) -> Self {
        Self {
            voxel_resolution: self.voxel_resolution.clamp(4, 512),
            circle_segments: self.circle_segments.max(3),
            sphere_rings: self.sphere_rings.max(2),
        }
    }
}
