//! Geometry items and their program fragments

use crate::expr::{emit_vector, format_number, quote_literal, Expr, FragmentContext, FragmentError};
use crate::parameter::Parameter;
use serde::{Deserialize, Serialize};

pub type ItemId = String;

/// A node in the geometry graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(flatten)]
    pub kind: ItemKind,
    /// Local parameters, referenced from this item's expressions by bare name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<Finish>,
}

fn default_visible() -> bool {
    true
}

/// What an item builds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ItemKind {
    Box {
        point1: [Expr; 3],
        point2: [Expr; 3],
    },
    Cylinder {
        point1: [Expr; 3],
        point2: [Expr; 3],
        radius: Expr,
    },
    Sphere {
        center: [Expr; 3],
        radius: Expr,
    },
    Cut {
        left: ItemId,
        right: ItemId,
    },
    Fuse {
        left: ItemId,
        right: ItemId,
    },
    Common {
        left: ItemId,
        right: ItemId,
    },
    Translate {
        target: ItemId,
        offset: [Expr; 3],
    },
    Rotate {
        target: ItemId,
        center: [Expr; 3],
        axis: [Expr; 3],
        angle: Expr,
    },
    /// A body imported from an external STEP file, placed numerically
    Step {
        guid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rotation: Option<StepRotation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        translation: Option<[f64; 3]>,
    },
    Composite {
        members: Vec<ItemId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRotation {
    pub center: [f64; 3],
    pub axis: [f64; 3],
    /// Degrees
    pub angle: f64,
}

/// Post-processing applied when the item is displayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Finish {
    /// Rounds every edge; the radius is `factor / 10`
    Fillet { factor: Expr },
}

impl GeometryItem {
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            visible: true,
            kind,
            parameters: Vec::new(),
            finish: None,
        }
    }

    /// Ordered ids of the items this one is built from
    pub fn sub_items(&self) -> Vec<&ItemId> {
        match &self.kind {
            ItemKind::Cut { left, right }
            | ItemKind::Fuse { left, right }
            | ItemKind::Common { left, right } => vec![left, right],
            ItemKind::Translate { target, .. } | ItemKind::Rotate { target, .. } => vec![target],
            ItemKind::Composite { members } => members.iter().collect(),
            ItemKind::Box { .. }
            | ItemKind::Cylinder { .. }
            | ItemKind::Sphere { .. }
            | ItemKind::Step { .. } => Vec::new(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ItemKind::Composite { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ItemKind::Box { .. } => "box",
            ItemKind::Cylinder { .. } => "cylinder",
            ItemKind::Sphere { .. } => "sphere",
            ItemKind::Cut { .. } => "cut",
            ItemKind::Fuse { .. } => "fuse",
            ItemKind::Common { .. } => "common",
            ItemKind::Translate { .. } => "translate",
            ItemKind::Rotate { .. } => "rotate",
            ItemKind::Step { .. } => "step",
            ItemKind::Composite { .. } => "composite",
        }
    }

    /// Produces the builder expression for this item
    pub fn to_fragment(&self, ctx: &dyn FragmentContext) -> Result<String, FragmentError> {
        let fragment = match &self.kind {
            ItemKind::Box { point1, point2 } => format!(
                "csg.makeBox({}, {})",
                emit_vector(point1, ctx)?,
                emit_vector(point2, ctx)?
            ),
            ItemKind::Cylinder { point1, point2, radius } => format!(
                "csg.makeCylinder({}, {}, {})",
                emit_vector(point1, ctx)?,
                emit_vector(point2, ctx)?,
                radius.emit(ctx)?
            ),
            ItemKind::Sphere { center, radius } => format!(
                "csg.makeSphere({}, {})",
                emit_vector(center, ctx)?,
                radius.emit(ctx)?
            ),
            ItemKind::Cut { left, right } => boolean(ctx, left, "cut", right)?,
            ItemKind::Fuse { left, right } => boolean(ctx, left, "fuse", right)?,
            ItemKind::Common { left, right } => boolean(ctx, left, "common", right)?,
            ItemKind::Translate { target, offset } => format!(
                "{}.translate({})",
                ctx.variable(target)?,
                emit_vector(offset, ctx)?
            ),
            ItemKind::Rotate { target, center, axis, angle } => format!(
                "{}.rotate({}, {}, {})",
                ctx.variable(target)?,
                emit_vector(center, ctx)?,
                emit_vector(axis, ctx)?,
                angle.emit(ctx)?
            ),
            ItemKind::Step { guid, rotation, translation } => step_fragment(guid, rotation, translation)?,
            ItemKind::Composite { members } => {
                let names = members
                    .iter()
                    .map(|member| ctx.variable(member))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("csg.compound([{}])", names.join(", "))
            }
        };
        Ok(fragment)
    }
}

fn boolean(ctx: &dyn FragmentContext, left: &ItemId, op: &str, right: &ItemId) -> Result<String, FragmentError> {
    Ok(format!("{}.{}({})", ctx.variable(left)?, op, ctx.variable(right)?))
}

fn step_fragment(
    guid: &str,
    rotation: &Option<StepRotation>,
    translation: &Option<[f64; 3]>,
) -> Result<String, FragmentError> {
    let valid = !guid.is_empty()
        && guid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(FragmentError::InvalidExpression {
            expr: guid.to_string(),
            reason: "a STEP guid may only contain letters, digits, `-` and `_`".to_string(),
        });
    }

    let mut fragment = format!("csg.makeStep({})", quote_literal(guid));
    if let Some(rotation) = rotation {
        fragment.push_str(&format!(
            ".rotate({}, {}, {})",
            numeric_vector(&rotation.center)?,
            numeric_vector(&rotation.axis)?,
            numeric(rotation.angle)?
        ));
    }
    if let Some(offset) = translation {
        fragment.push_str(&format!(".translate({})", numeric_vector(offset)?));
    }
    Ok(fragment)
}

fn numeric(value: f64) -> Result<String, FragmentError> {
    format_number(value).ok_or_else(|| FragmentError::InvalidExpression {
        expr: value.to_string(),
        reason: "not a finite number".to_string(),
    })
}

fn numeric_vector(values: &[f64; 3]) -> Result<String, FragmentError> {
    Ok(format!(
        "[{}, {}, {}]",
        numeric(values[0])?,
        numeric(values[1])?,
        numeric(values[2])?
    ))
}
