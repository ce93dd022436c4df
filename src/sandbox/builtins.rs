//! The `csg` builder namespace and shape methods exposed to programs

use crate::kernel::{GeometryKernel, KernelError, ShapeHandle};
use glam::DVec3;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Position};
use std::rc::Rc;

/// Value bound to `csg` in the program scope
#[derive(Debug, Clone, Copy, Default)]
pub struct CsgNamespace;

type FnResult<T> = Result<T, Box<EvalAltResult>>;

/// Catchable error carrying a plain message
pub fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(message.into()), Position::NONE).into()
}

fn kernel_error(err: KernelError) -> Box<EvalAltResult> {
    runtime_error(err.to_string())
}

pub fn scalar(value: &Dynamic, what: &str) -> FnResult<f64> {
    value
        .as_float()
        .or_else(|_| value.as_int().map(|i| i as f64))
        .map_err(|_| runtime_error(format!("{} must be a number, got {}", what, value.type_name())))
}

pub fn vector(value: &Array, what: &str) -> FnResult<DVec3> {
    if value.len() != 3 {
        return Err(runtime_error(format!(
            "{} must have 3 components, got {}",
            what,
            value.len()
        )));
    }
    Ok(DVec3::new(
        scalar(&value[0], what)?,
        scalar(&value[1], what)?,
        scalar(&value[2], what)?,
    ))
}

/// Registers the builder namespace and shape methods for a kernel
pub fn register_builtins<K: GeometryKernel>(engine: &mut Engine, kernel: Rc<K>) {
    engine.register_type_with_name::<CsgNamespace>("Csg");
    engine.register_type_with_name::<K::Shape>("Shape");

    let k = kernel.clone();
    engine.register_fn(
        "makeBox",
        move |_: CsgNamespace, point1: Array, point2: Array| -> FnResult<K::Shape> {
            k.make_box(vector(&point1, "box corner")?, vector(&point2, "box corner")?)
                .map_err(kernel_error)
        },
    );

    let k = kernel.clone();
    engine.register_fn(
        "makeCylinder",
        move |_: CsgNamespace, point1: Array, point2: Array, radius: Dynamic| -> FnResult<K::Shape> {
            k.make_cylinder(
                vector(&point1, "cylinder base")?,
                vector(&point2, "cylinder top")?,
                scalar(&radius, "cylinder radius")?,
            )
            .map_err(kernel_error)
        },
    );

    let k = kernel.clone();
    engine.register_fn(
        "makeSphere",
        move |_: CsgNamespace, center: Array, radius: Dynamic| -> FnResult<K::Shape> {
            k.make_sphere(vector(&center, "sphere center")?, scalar(&radius, "sphere radius")?)
                .map_err(kernel_error)
        },
    );

    let k = kernel.clone();
    engine.register_fn(
        "makeStep",
        move |_: CsgNamespace, guid: ImmutableString| -> FnResult<K::Shape> {
            k.make_external(guid.as_str()).map_err(kernel_error)
        },
    );

    let k = kernel.clone();
    engine.register_fn(
        "compound",
        move |_: CsgNamespace, members: Array| -> FnResult<K::Shape> {
            let shapes = members
                .into_iter()
                .map(|member| {
                    let type_name = member.type_name();
                    member
                        .try_cast::<K::Shape>()
                        .ok_or_else(|| runtime_error(format!("compound member must be a shape, got {}", type_name)))
                })
                .collect::<FnResult<Vec<_>>>()?;
            k.composite(&shapes).map_err(kernel_error)
        },
    );

    let k = kernel.clone();
    engine.register_fn("cut", move |left: K::Shape, right: K::Shape| -> FnResult<K::Shape> {
        k.cut(&left, &right).map_err(kernel_error)
    });

    let k = kernel.clone();
    engine.register_fn("fuse", move |left: K::Shape, right: K::Shape| -> FnResult<K::Shape> {
        k.fuse(&left, &right).map_err(kernel_error)
    });

    let k = kernel.clone();
    engine.register_fn("common", move |left: K::Shape, right: K::Shape| -> FnResult<K::Shape> {
        k.common(&left, &right).map_err(kernel_error)
    });

    let k = kernel.clone();
    engine.register_fn("translate", move |shape: K::Shape, offset: Array| -> FnResult<K::Shape> {
        k.translate(&shape, vector(&offset, "translation")?)
            .map_err(kernel_error)
    });

    let k = kernel;
    engine.register_fn(
        "rotate",
        move |shape: K::Shape, center: Array, axis: Array, angle: Dynamic| -> FnResult<K::Shape> {
            k.rotate(
                &shape,
                vector(&center, "rotation center")?,
                vector(&axis, "rotation axis")?,
                scalar(&angle, "rotation angle")?,
            )
            .map_err(kernel_error)
        },
    );

    engine.register_get("volume", |shape: &mut K::Shape| shape.volume());
    engine.register_get("area", |shape: &mut K::Shape| shape.area());
    engine.register_get("hash", |shape: &mut K::Shape| shape.content_hash());
}
