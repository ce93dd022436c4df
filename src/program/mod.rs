//! Program generation
//!
//! Turns a geometry graph into a script for the sandbox. Parameters become
//! `let` declarations, each item becomes one block that builds its shape
//! inside its own `try` and either displays it or reports the error under the
//! item's id. Dependencies are emitted before the items that use them.

pub mod symbols;

pub use symbols::{sanitize_identifier, SymbolTable, VariableTable};

use crate::step::{extract_step_references, StepReference};
use log::{debug, warn};
use shapedelta_core::expr::quote_literal;
use shapedelta_core::{Finish, FragmentContext, FragmentError, GeometryGraph, GeometryItem, ItemId, Parameter};
use std::collections::HashSet;

/// A generated program
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    text: String,
    step_references: Vec<StepReference>,
}

impl Program {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let step_references = extract_step_references(&text);
        Self { text, step_references }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn step_references(&self) -> &[StepReference] {
        &self.step_references
    }
}

/// Resolution context for one item's fragment
struct ItemContext<'a> {
    symbols: &'a SymbolTable,
    variables: &'a VariableTable,
    scope: Option<&'a str>,
}

impl FragmentContext for ItemContext<'_> {
    fn parameter(&self, name: &str) -> Result<String, FragmentError> {
        self.symbols
            .resolve(self.scope, name)
            .map(str::to_string)
            .ok_or_else(|| FragmentError::UnknownParameter(name.to_string()))
    }

    fn variable(&self, item: &ItemId) -> Result<String, FragmentError> {
        self.variables
            .get(item)
            .map(str::to_string)
            .ok_or_else(|| FragmentError::UnknownItem(item.clone()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramGenerator;

impl ProgramGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, graph: &GeometryGraph) -> Program {
        let mut declarations = Declarations::default();
        for parameter in graph.parameters() {
            declarations.declare(&parameter, None);
        }
        let Declarations { symbols, mut lines, .. } = declarations;

        let mut emitter = Emitter {
            graph,
            symbols: &symbols,
            variables: VariableTable::for_graph(graph),
            emitted: HashSet::new(),
            in_progress: HashSet::new(),
            seen: HashSet::new(),
            blocks: Vec::new(),
        };
        for item in &graph.items {
            match &item.id {
                Some(id) => emitter.emit(id),
                None => warn!("Skipping item {:?} without an id", item.name),
            }
        }

        debug!(
            "Generated {} declarations and {} item blocks",
            lines.len(),
            emitter.blocks.len()
        );
        lines.extend(emitter.blocks);
        Program::from_text(lines.join("\n"))
    }
}

/// Parameter declarations emitted so far
#[derive(Default)]
struct Declarations {
    symbols: SymbolTable,
    lines: Vec<String>,
    /// Identifiers whose value may be unset because their declaration can fail
    fallible: HashSet<String>,
}

impl Declarations {
    /// Emits `let` lines for a parameter; composites recurse with a qualifier
    fn declare(&mut self, parameter: &Parameter, scope: Option<&str>) {
        let qualified = match scope {
            Some(scope) => format!("{}.{}", scope, parameter.id),
            None => parameter.id.clone(),
        };

        if parameter.id.is_empty() {
            warn!("Skipping parameter without an id");
            return;
        }

        if parameter.is_composite() {
            for nested in &parameter.parameters {
                self.declare(nested, Some(&qualified));
            }
            return;
        }

        let Some(value) = parameter.effective_value() else {
            warn!("Parameter {} has neither a value nor a default", qualified);
            return;
        };

        // Resolve before declaring so a parameter cannot reference itself
        let context = ItemContext {
            symbols: &self.symbols,
            variables: &VariableTable::default(),
            scope,
        };
        let expression = match value.emit(&context) {
            Ok(expression) => expression,
            Err(err) => {
                warn!("Skipping parameter {}: {}", qualified, err);
                return;
            }
        };

        let fallible = value.calls_functions()
            || value.references().iter().any(|name| {
                self.symbols
                    .resolve(scope, name)
                    .is_some_and(|identifier| self.fallible.contains(identifier))
            });

        let identifier = self.symbols.allocate(&qualified);
        if fallible {
            self.lines.push(format!(
                "let {id};\ntry {{\n    {id} = {expr};\n}} catch (err) {{\n    print({message});\n}}",
                id = identifier,
                expr = expression,
                message = quote_literal(&format!("parameter {} has failed", qualified)),
            ));
            self.fallible.insert(identifier.clone());
        } else {
            self.lines.push(format!("let {} = {};", identifier, expression));
        }
        self.symbols.declare(&qualified, identifier);
    }
}

struct Emitter<'a> {
    graph: &'a GeometryGraph,
    symbols: &'a SymbolTable,
    variables: VariableTable,
    emitted: HashSet<&'a str>,
    in_progress: HashSet<&'a str>,
    seen: HashSet<String>,
    blocks: Vec<String>,
}

impl<'a> Emitter<'a> {
    /// Emits an item after everything it is built from
    fn emit(&mut self, id: &'a str) {
        if self.emitted.contains(id) || self.in_progress.contains(id) {
            return;
        }
        let graph = self.graph;
        let Some(item) = graph.item(id) else {
            return;
        };

        self.in_progress.insert(id);
        let mut cycle = None;
        for sub in item.sub_items() {
            if self.in_progress.contains(sub.as_str()) {
                cycle = Some(sub.clone());
            } else {
                self.emit(sub);
            }
        }
        self.in_progress.remove(id);
        self.emitted.insert(id);

        let fragment = match cycle {
            Some(through) => Err(FragmentError::Cycle(through)),
            None => item.to_fragment(&ItemContext {
                symbols: self.symbols,
                variables: &self.variables,
                scope: Some(id),
            }),
        };

        let Some(variable) = self.variables.get(id) else {
            return;
        };
        let block = item_block(item, id, variable, fragment, self.symbols, &self.variables);
        if self.seen.insert(block.clone()) {
            self.blocks.push(block);
        }
    }
}

fn item_block(
    item: &GeometryItem,
    id: &str,
    variable: &str,
    fragment: Result<String, FragmentError>,
    symbols: &SymbolTable,
    variables: &VariableTable,
) -> String {
    let quoted_id = quote_literal(id);
    let mut block = format!("let {};\ntry {{\n", variable);

    match fragment {
        Ok(fragment) => {
            block.push_str(&format!("    {} = {};\n", variable, fragment));
            if item.visible {
                block.push_str(&display_call(item, id, variable, &quoted_id, symbols, variables));
            }
        }
        Err(err) => {
            debug!("Item {} cannot be generated: {}", id, err);
            block.push_str(&format!("    throw {};\n", quote_literal(&err.to_string())));
        }
    }

    block.push_str("} catch (err) {\n");
    block.push_str(&format!(
        "    print({});\n",
        quote_literal(&format!("building {} with id {} has failed", variable, id))
    ));
    block.push_str(&format!("    reportError(err, {});\n", quoted_id));
    block.push('}');
    block
}

fn display_call(
    item: &GeometryItem,
    id: &str,
    variable: &str,
    quoted_id: &str,
    symbols: &SymbolTable,
    variables: &VariableTable,
) -> String {
    match &item.finish {
        Some(Finish::Fillet { factor }) => {
            let context = ItemContext {
                symbols,
                variables,
                scope: Some(id),
            };
            match factor.emit(&context) {
                Ok(factor) => format!("    displayFillet({}, {}, {});\n", variable, quoted_id, factor),
                Err(err) => format!("    throw {};\n", quote_literal(&err.to_string())),
            }
        }
        None => format!("    display({}, {});\n", variable, quoted_id),
    }
}
