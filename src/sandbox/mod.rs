//! Sandboxed program evaluation
//!
//! Programs run in an embedded rhai engine that sees only the `csg` builder
//! namespace, shape methods and three callbacks. `display` and `displayFillet`
//! record successful shapes, `reportError` records per-item failures. Calling
//! a callback with arguments of the wrong type is an integration defect: the
//! run is aborted with an error the program cannot catch.

pub mod builtins;
pub mod collector;

pub use builtins::CsgNamespace;
pub use collector::{Evaluation, EvaluationRecord, EvaluationVisitor, ResultCollector};

use crate::constants;
use crate::error::{ContractViolation, EvaluateError};
use crate::kernel::{GeometryKernel, ShapeHandle};
use builtins::{register_builtins, runtime_error, scalar};
use log::{debug, warn};
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Resource limits applied to every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: constants::sandbox::MAX_OPERATIONS,
            max_call_levels: constants::sandbox::MAX_CALL_LEVELS,
            max_expr_depth: constants::sandbox::MAX_EXPR_DEPTH,
        }
    }
}

type ViolationSlot = Rc<RefCell<Option<ContractViolation>>>;

pub struct Sandbox<K: GeometryKernel> {
    kernel: Rc<K>,
    limits: SandboxLimits,
}

impl<K: GeometryKernel> Sandbox<K> {
    pub fn new(kernel: Rc<K>, limits: SandboxLimits) -> Self {
        Self { kernel, limits }
    }

    pub fn kernel(&self) -> &Rc<K> {
        &self.kernel
    }

    /// Runs a program and collects its records
    pub fn evaluate(&self, program: &str) -> Result<Evaluation<K::Shape>, EvaluateError> {
        let collector = Rc::new(RefCell::new(ResultCollector::new()));
        self.run(program, collector.clone())?;
        let evaluation = collector.take().into_evaluation();
        debug!(
            "Evaluation produced {} records and {} log lines",
            evaluation.records.len(),
            evaluation.logs.len()
        );
        Ok(evaluation)
    }

    /// Runs a program, forwarding every callback to `visitor`
    pub fn run<V>(&self, program: &str, visitor: Rc<RefCell<V>>) -> Result<(), EvaluateError>
    where
        V: EvaluationVisitor<K::Shape> + 'static,
    {
        let violation: ViolationSlot = Rc::new(RefCell::new(None));
        let engine = self.engine(visitor, violation.clone());

        let ast = engine
            .compile(program)
            .map_err(|e| EvaluateError::Compile(e.to_string()))?;

        let mut scope = Scope::new();
        scope.push("csg", CsgNamespace);

        let result = engine.run_ast_with_scope(&mut scope, &ast);

        if let Some(violation) = violation.borrow_mut().take() {
            warn!("Evaluation aborted: {}", violation);
            return Err(EvaluateError::ContractViolation(violation));
        }

        result.map_err(|e| {
            warn!("Program aborted: {}", e);
            EvaluateError::Script(e.to_string())
        })
    }

    fn engine<V>(&self, visitor: Rc<RefCell<V>>, violation: ViolationSlot) -> Engine
    where
        V: EvaluationVisitor<K::Shape> + 'static,
    {
        let mut engine = Engine::new();
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_expr_depths(self.limits.max_expr_depth, self.limits.max_expr_depth);
        engine.set_max_modules(0);
        engine.disable_symbol("eval");

        let v = visitor.clone();
        engine.on_print(move |text| v.borrow_mut().on_log(text));
        let v = visitor.clone();
        engine.on_debug(move |text, _source, pos| v.borrow_mut().on_log(&format!("{} {}", pos, text)));

        register_builtins(&mut engine, self.kernel.clone());

        let fatal = {
            let v = visitor.clone();
            Rc::new(move |c: ContractViolation| -> Box<EvalAltResult> {
                v.borrow_mut().on_violation(&c);
                abort(&violation, c)
            })
        };

        let v = visitor.clone();
        let f = fatal.clone();
        engine.register_fn("display", move |shape: Dynamic, id: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let (shape, id) = display_args::<K::Shape>("display", shape, id).map_err(|c| f(c))?;
            v.borrow_mut().on_display(&id, shape);
            Ok(())
        });

        let v = visitor.clone();
        let f = fatal;
        let kernel = self.kernel.clone();
        engine.register_fn(
            "displayFillet",
            move |shape: Dynamic, id: Dynamic, factor: Dynamic| -> Result<(), Box<EvalAltResult>> {
                let (shape, id) = display_args::<K::Shape>("displayFillet", shape, id).map_err(|c| f(c))?;
                let factor = scalar(&factor, "fillet factor")
                    .map_err(|_| f(ContractViolation::new("displayFillet", "factor must be a number")))?;
                let radius = factor / constants::program::FILLET_DIVISOR;
                let rounded = kernel
                    .fillet(&shape, &shape.edges(), radius)
                    .map_err(|e| runtime_error(e.to_string()))?;
                v.borrow_mut().on_display(&id, rounded);
                Ok(())
            },
        );

        let v = visitor;
        engine.register_fn("reportError", move |error: Dynamic, id: Dynamic| {
            let id = id.clone().into_string().unwrap_or_else(|_| id.to_string());
            v.borrow_mut().on_error(&id, error_message(&error));
        });

        engine
    }
}

/// Checks the `(shape, id)` pair passed to a display callback
fn display_args<S: ShapeHandle>(
    callback: &'static str,
    shape: Dynamic,
    id: Dynamic,
) -> Result<(S, String), ContractViolation> {
    let type_name = id.type_name();
    let id = id
        .into_string()
        .map_err(|_| ContractViolation::new(callback, format!("id must be a string, got {}", type_name)))?;
    let type_name = shape.type_name();
    let shape = shape
        .try_cast::<S>()
        .ok_or_else(|| ContractViolation::new(callback, format!("expected a shape for {}, got {}", id, type_name)))?;
    Ok((shape, id))
}

/// Records the violation and builds an error the program cannot catch
fn abort(slot: &ViolationSlot, violation: ContractViolation) -> Box<EvalAltResult> {
    let message = violation.to_string();
    slot.borrow_mut().get_or_insert(violation.clone());
    EvalAltResult::ErrorSystem(message, Box::new(violation)).into()
}

/// Message carried by a caught error value
fn error_message(error: &Dynamic) -> String {
    if let Some(map) = error.clone().try_cast::<rhai::Map>() {
        if let Some(message) = map.get("message") {
            return message.to_string();
        }
    }
    error.to_string()
}
