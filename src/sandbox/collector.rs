//! Typed capture of display and error callbacks

use crate::error::ContractViolation;
use crate::kernel::ShapeHandle;
use log::{debug, info};
use std::collections::HashMap;

/// One callback invocation, in call order
#[derive(Debug, Clone)]
pub enum EvaluationRecord<S> {
    Success {
        /// Display id the program passed to `display`
        id: String,
        /// Id of the first display that showed this shape
        shape_key: String,
        shape: S,
        hash: String,
    },
    Failure {
        id: String,
        error: String,
    },
}

impl<S> EvaluationRecord<S> {
    pub fn id(&self) -> &str {
        match self {
            EvaluationRecord::Success { id, .. } | EvaluationRecord::Failure { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationRecord::Success { .. })
    }
}

/// Receives the sandbox callbacks as they happen
pub trait EvaluationVisitor<S> {
    fn on_display(&mut self, id: &str, shape: S);

    fn on_error(&mut self, id: &str, error: String);

    fn on_log(&mut self, line: &str);

    fn on_violation(&mut self, _violation: &ContractViolation) {}
}

/// Raw output of one sandbox run
#[derive(Debug, Clone)]
pub struct Evaluation<S> {
    pub records: Vec<EvaluationRecord<S>>,
    pub logs: Vec<String>,
}

impl<S> Default for Evaluation<S> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            logs: Vec::new(),
        }
    }
}

/// Collects records and log lines. A shape shown under several display ids
/// is keyed by the first one.
#[derive(Debug)]
pub struct ResultCollector<S> {
    records: Vec<EvaluationRecord<S>>,
    logs: Vec<String>,
    owners: HashMap<u64, String>,
}

impl<S> Default for ResultCollector<S> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            logs: Vec::new(),
            owners: HashMap::new(),
        }
    }
}

impl<S: ShapeHandle> ResultCollector<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_evaluation(self) -> Evaluation<S> {
        Evaluation {
            records: self.records,
            logs: self.logs,
        }
    }
}

impl<S: ShapeHandle> EvaluationVisitor<S> for ResultCollector<S> {
    fn on_display(&mut self, id: &str, shape: S) {
        let shape_key = self
            .owners
            .entry(shape.identity())
            .or_insert_with(|| id.to_string())
            .clone();
        if shape_key != id {
            debug!("Display {} shows the shape owned by {}", id, shape_key);
        }
        let hash = shape.content_hash();
        self.records.push(EvaluationRecord::Success {
            id: id.to_string(),
            shape_key,
            shape,
            hash,
        });
    }

    fn on_error(&mut self, id: &str, error: String) {
        debug!("Item {} failed: {}", id, error);
        self.records.push(EvaluationRecord::Failure {
            id: id.to_string(),
            error,
        });
    }

    fn on_log(&mut self, line: &str) {
        info!("[program] {}", line);
        self.logs.push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{GeometryKernel, ReferenceKernel};
    use glam::DVec3;

    #[test]
    fn test_first_display_owns_shape() {
        let kernel = ReferenceKernel::new();
        let shape = kernel.make_box(DVec3::ZERO, DVec3::ONE).unwrap();

        let mut collector = ResultCollector::new();
        collector.on_display("first", shape.clone());
        collector.on_display("second", shape);
        collector.on_error("third", "cannot build box".to_string());
        collector.on_log("hello");

        let evaluation = collector.into_evaluation();
        assert_eq!(evaluation.logs, vec!["hello".to_string()]);
        assert_eq!(evaluation.records.len(), 3);
        match &evaluation.records[1] {
            EvaluationRecord::Success { id, shape_key, .. } => {
                assert_eq!(id, "second");
                assert_eq!(shape_key, "first");
            }
            other => panic!("unexpected record {:?}", other),
        }
        assert!(!evaluation.records[2].is_success());
        assert_eq!(evaluation.records[2].id(), "third");
    }
}
