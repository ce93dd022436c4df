//! Shapedelta core: geometry-graph model, response wire types and the
//! consumer-side cache merger. Nothing here knows about a geometry kernel or
//! a scripting engine.

pub mod delta;
pub mod expr;
pub mod graph;
pub mod item;
pub mod merge;
pub mod parameter;

pub use delta::{DisplayInfo, HashCache, MeshData, MeshEntry, ResponseDelta, SolidSummary};
pub use expr::{vec3, Expr, FragmentContext, FragmentError};
pub use graph::GeometryGraph;
pub use item::{Finish, GeometryItem, ItemId, ItemKind, StepRotation};
pub use merge::{CachedMesh, ConsumerCache, MergeOptions, MergeStatistics, DEFAULT_MAX_AGE};
pub use parameter::Parameter;
