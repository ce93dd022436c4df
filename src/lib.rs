//! Shapedelta library
//!
//! Recomputes meshes for a parametric geometry graph and reports only what
//! changed since the previous run. The graph model, wire types and the
//! consumer-side cache live in `shapedelta-core`; this crate generates the
//! program, runs it in a sandbox against a geometry kernel and builds the
//! response delta.

pub mod config;
pub mod constants;
pub mod error;
pub mod kernel;
pub mod pipeline;
pub mod program;
pub mod response;
pub mod sandbox;
pub mod step;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{ConfigError, ContractViolation, EvaluateError, StepError};
pub use kernel::{CsgShape, GeometryKernel, KernelError, KernelSettings, ReferenceKernel, ShapeHandle};
pub use pipeline::{DisplayPipeline, DisplaySession};
pub use program::{Program, ProgramGenerator};
pub use response::{FirstPass, ResponseBuilder, StepPass};
pub use sandbox::{Evaluation, EvaluationRecord, EvaluationVisitor, ResultCollector, Sandbox, SandboxLimits};
pub use step::{StepConfig, StepLibrary, StepReference};

pub use shapedelta_core::{
    ConsumerCache, DisplayInfo, GeometryGraph, GeometryItem, HashCache, MergeOptions, MergeStatistics, MeshData,
    MeshEntry, Parameter, ResponseDelta,
};
