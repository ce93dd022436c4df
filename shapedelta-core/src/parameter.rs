//! Graph parameters
//!
//! A parameter is either a leaf holding a value (or falling back to its
//! default) or a composite grouping further parameters under its id. Composite
//! ids act as a qualifier: a leaf `wall` inside composite `frame` is referenced
//! from expressions as `$frame.wall`.

use crate::expr::Expr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Expr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Parameter {
    /// Creates a leaf parameter with an explicit value
    pub fn new(id: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self {
            id: id.into(),
            value: Some(value.into()),
            default_value: None,
            parameters: Vec::new(),
        }
    }

    /// Creates a leaf parameter that only carries a default
    pub fn with_default(id: impl Into<String>, default_value: impl Into<Expr>) -> Self {
        Self {
            id: id.into(),
            value: None,
            default_value: Some(default_value.into()),
            parameters: Vec::new(),
        }
    }

    pub fn composite(id: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            id: id.into(),
            value: None,
            default_value: None,
            parameters,
        }
    }

    /// The value if set, otherwise the default
    pub fn effective_value(&self) -> Option<&Expr> {
        self.value.as_ref().or(self.default_value.as_ref())
    }

    pub fn is_composite(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn set(&mut self, value: impl Into<Expr>) {
        self.value = Some(value.into());
    }

    /// Clears the explicit value so the default applies again
    pub fn reset(&mut self) {
        self.value = None;
    }

    /// Finds a direct child by id
    pub fn child_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }
}
