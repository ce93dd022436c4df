//! Mesh generation for the reference kernel

use super::solid::{Solid, VoxelGrid};
use super::{KernelError, KernelSettings};
use glam::{DMat4, DVec3};
use shapedelta_core::MeshData;
use std::f64::consts::PI;

/// Meshes a solid: analytic for sharp primitives, voxel surfaces otherwise
pub fn tessellate(solid: &Solid, settings: &KernelSettings) -> Result<MeshData, KernelError> {
    if let Some(guid) = solid.external_guid() {
        return Err(KernelError::ExternalBody(guid.to_string()));
    }

    match solid {
        Solid::Cuboid { min, max, rounding } if *rounding == 0.0 => Ok(box_mesh(*min, *max)),
        Solid::Imported { min, max, .. } => Ok(box_mesh(*min, *max)),
        Solid::Cylinder {
            base,
            top,
            radius,
            rounding,
        } if *rounding == 0.0 => Ok(cylinder_mesh(*base, *top, *radius, settings.circle_segments)),
        Solid::Sphere { center, radius } => Ok(sphere_mesh(
            *center,
            *radius,
            settings.circle_segments,
            settings.sphere_rings,
        )),
        Solid::Transformed { solid, transform, .. } => {
            let mesh = tessellate(solid, settings)?;
            Ok(transform_mesh(mesh, transform))
        }
        Solid::Compound(members) => {
            let mut mesh = MeshData::new();
            for member in members {
                mesh.append(&tessellate(member, settings)?);
            }
            if mesh.is_empty() {
                return Err(KernelError::EmptyShape);
            }
            Ok(mesh)
        }
        _ => {
            let grid = VoxelGrid::sample(solid, settings.voxel_resolution).ok_or(KernelError::EmptyShape)?;
            let mesh = voxel_mesh(&grid);
            if mesh.is_empty() {
                return Err(KernelError::EmptyShape);
            }
            Ok(mesh)
        }
    }
}

fn to_f32(v: DVec3) -> [f32; 3] {
    v.as_vec3().to_array()
}

/// Pushes a quad `base, base+u, base+u+v, base+v`; `u x v` must point outward
fn push_quad(mesh: &mut MeshData, base: DVec3, u: DVec3, v: DVec3, normal: DVec3) {
    let start = mesh.vertices.len() as u32;
    for corner in [base, base + u, base + u + v, base + v] {
        mesh.vertices.push(to_f32(corner));
        mesh.normals.push(to_f32(normal));
    }
    mesh.indices
        .extend_from_slice(&[start, start + 1, start + 2, start, start + 2, start + 3]);
}

/// In-plane edge directions for a face whose normal is `axis` (signed)
fn face_axes(axis: usize, positive: bool) -> (usize, usize) {
    let u = (axis + 1) % 3;
    let v = (axis + 2) % 3;
    if positive {
        (u, v)
    } else {
        (v, u)
    }
}

fn unit(axis: usize) -> DVec3 {
    match axis {
        0 => DVec3::X,
        1 => DVec3::Y,
        _ => DVec3::Z,
    }
}

pub fn box_mesh(min: DVec3, max: DVec3) -> MeshData {
    let size = max - min;
    let mut mesh = MeshData::new();
    for axis in 0..3 {
        for positive in [false, true] {
            let (u, v) = face_axes(axis, positive);
            let normal = if positive { unit(axis) } else { -unit(axis) };
            let base = if positive { min + unit(axis) * size[axis] } else { min };
            push_quad(&mut mesh, base, unit(u) * size[u], unit(v) * size[v], normal);
        }
    }
    mesh
}

pub fn cylinder_mesh(base: DVec3, top: DVec3, radius: f64, segments: usize) -> MeshData {
    let axis = (top - base).normalize();
    let e1 = axis.any_orthonormal_vector();
    let e2 = axis.cross(e1);
    let segments = segments.max(3);

    let mut mesh = MeshData::new();

    // Side rings: bottom and top vertex per segment boundary
    for i in 0..=segments {
        let angle = 2.0 * PI * i as f64 / segments as f64;
        let radial = e1 * angle.cos() + e2 * angle.sin();
        mesh.vertices.push(to_f32(base + radial * radius));
        mesh.normals.push(to_f32(radial));
        mesh.vertices.push(to_f32(top + radial * radius));
        mesh.normals.push(to_f32(radial));
    }
    for i in 0..segments as u32 {
        let bottom_current = i * 2;
        let bottom_next = (i + 1) * 2;
        let top_current = bottom_current + 1;
        let top_next = bottom_next + 1;
        mesh.indices
            .extend_from_slice(&[bottom_current, bottom_next, top_next, bottom_current, top_next, top_current]);
    }

    // Caps carry their own vertices so normals stay flat
    for (center, normal) in [(base, -axis), (top, axis)] {
        let center_index = mesh.vertices.len() as u32;
        mesh.vertices.push(to_f32(center));
        mesh.normals.push(to_f32(normal));
        for i in 0..=segments {
            let angle = 2.0 * PI * i as f64 / segments as f64;
            let radial = e1 * angle.cos() + e2 * angle.sin();
            mesh.vertices.push(to_f32(center + radial * radius));
            mesh.normals.push(to_f32(normal));
        }
        for i in 0..segments as u32 {
            let current = center_index + 1 + i;
            let next = current + 1;
            if normal == axis {
                mesh.indices.extend_from_slice(&[center_index, current, next]);
            } else {
                mesh.indices.extend_from_slice(&[center_index, next, current]);
            }
        }
    }

    mesh
}

pub fn sphere_mesh(center: DVec3, radius: f64, segments: usize, rings: usize) -> MeshData {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut mesh = MeshData::new();

    for j in 0..=rings {
        let phi = PI * j as f64 / rings as f64;
        for i in 0..=segments {
            let theta = 2.0 * PI * i as f64 / segments as f64;
            let normal = DVec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
            mesh.vertices.push(to_f32(center + normal * radius));
            mesh.normals.push(to_f32(normal));
        }
    }

    let stride = segments as u32 + 1;
    for j in 0..rings as u32 {
        for i in 0..segments as u32 {
            let a = j * stride + i;
            let b = a + stride;
            mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    mesh
}

/// Applies a rigid transform to positions and normals
pub fn transform_mesh(mut mesh: MeshData, transform: &DMat4) -> MeshData {
    for vertex in &mut mesh.vertices {
        let p = transform.transform_point3(DVec3::from_array(vertex.map(f64::from)));
        *vertex = to_f32(p);
    }
    for normal in &mut mesh.normals {
        let n = transform
            .transform_vector3(DVec3::from_array(normal.map(f64::from)))
            .normalize_or_zero();
        *normal = to_f32(n);
    }
    mesh
}

/// One quad per exposed voxel face
pub fn voxel_mesh(grid: &VoxelGrid) -> MeshData {
    let mut mesh = MeshData::new();
    grid.for_each_exposed_face(|cell, n| {
        let axis = n.iter().position(|c| *c != 0).unwrap_or(0);
        let positive = n[axis] > 0;
        let (u, v) = face_axes(axis, positive);
        let mut base = grid.origin + DVec3::new(cell[0] as f64, cell[1] as f64, cell[2] as f64) * grid.cell;
        if positive {
            base += unit(axis) * grid.cell;
        }
        let normal = DVec3::new(n[0] as f64, n[1] as f64, n[2] as f64);
        push_quad(&mut mesh, base, unit(u) * grid.cell, unit(v) * grid.cell, normal);
    });
    mesh
}
