//! Pipeline entry points
//!
//! `DisplayPipeline` wires the generator, the sandbox, the response builder
//! and the STEP pass together. `DisplaySession` keeps the previous run's hashes
//! between calls so each response only carries meshes that changed.

use crate::config::PipelineConfig;
use crate::error::{EvaluateError, StepError};
use crate::kernel::{GeometryKernel, ReferenceKernel};
use crate::program::{Program, ProgramGenerator};
use crate::response::{ResponseBuilder, StepPass};
use crate::sandbox::Sandbox;
use crate::step::StepLibrary;
use log::{debug, info, warn};
use shapedelta_core::{GeometryGraph, HashCache, ResponseDelta};
use std::rc::Rc;

pub struct DisplayPipeline<K: GeometryKernel> {
    generator: ProgramGenerator,
    sandbox: Sandbox<K>,
    library: Result<StepLibrary, StepError>,
}

impl DisplayPipeline<ReferenceKernel> {
    /// Pipeline over the reference kernel using the configured resolution
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(ReferenceKernel::with_settings(config.kernel), config)
    }
}

impl<K: GeometryKernel> DisplayPipeline<K> {
    /// Builds the pipeline. The STEP library is resolved here and never again;
    /// a missing library only matters once a program displays a STEP body.
    pub fn new(kernel: K, config: &PipelineConfig) -> Self {
        let library = StepLibrary::resolve(&config.step);
        if let Err(err) = &library {
            warn!("STEP import unavailable: {}", err);
        }
        Self {
            generator: ProgramGenerator::new(),
            sandbox: Sandbox::new(Rc::new(kernel), config.sandbox),
            library,
        }
    }

    pub fn kernel(&self) -> &K {
        self.sandbox.kernel()
    }

    pub fn step_library(&self) -> Option<&StepLibrary> {
        self.library.as_ref().ok()
    }

    pub fn generate(&self, graph: &GeometryGraph) -> Program {
        self.generator.generate(graph)
    }

    /// Generates and evaluates the whole graph against the previous hashes
    pub fn evaluate(&self, graph: &GeometryGraph, previous: &HashCache) -> Result<ResponseDelta, EvaluateError> {
        let program = self.generate(graph);
        self.evaluate_program(&program, previous)
    }

    /// Evaluates an already generated program
    pub fn evaluate_program(&self, program: &Program, previous: &HashCache) -> Result<ResponseDelta, EvaluateError> {
        let evaluation = self.sandbox.evaluate(program.text())?;
        let kernel = self.kernel();
        let first = ResponseBuilder::new(kernel).build(previous, evaluation);

        if !first.needs_step_pass() {
            return Ok(first.response);
        }

        let library = self.library.as_ref().map_err(|err| EvaluateError::Step(err.clone()))?;
        debug!("Running STEP pass from {}", library.root().display());
        for reference in program.step_references() {
            debug!(
                "STEP {} displayed as {} (fillet factor {:?})",
                reference.guid, reference.id, reference.fillet_factor
            );
        }
        let response = StepPass::new(kernel, library).run(first)?;
        Ok(response)
    }
}

/// One viewer's evaluation history
pub struct DisplaySession<K: GeometryKernel> {
    pipeline: DisplayPipeline<K>,
    previous: HashCache,
}

impl<K: GeometryKernel> DisplaySession<K> {
    pub fn new(pipeline: DisplayPipeline<K>) -> Self {
        Self {
            pipeline,
            previous: HashCache::new(),
        }
    }

    /// Starts from hashes the viewer already holds
    pub fn with_previous(pipeline: DisplayPipeline<K>, previous: HashCache) -> Self {
        Self { pipeline, previous }
    }

    pub fn pipeline(&self) -> &DisplayPipeline<K> {
        &self.pipeline
    }

    pub fn previous(&self) -> &HashCache {
        &self.previous
    }

    /// Evaluates the graph and remembers the response's hashes. A failed
    /// evaluation leaves the previous hashes in place.
    pub fn evaluate(&mut self, graph: &GeometryGraph) -> Result<ResponseDelta, EvaluateError> {
        let response = self.pipeline.evaluate(graph, &self.previous)?;
        self.previous = response.hash_cache();
        info!(
            "Evaluated {} items, {} with errors",
            response.display_info.len(),
            response.errors().count()
        );
        Ok(response)
    }

    /// Forgets every hash so the next response carries full meshes
    pub fn reset(&mut self) {
        self.previous = HashCache::new();
    }
}
