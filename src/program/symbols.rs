//! Program identifier allocation

use crate::constants::program::{NAME_SEPARATOR, PARAMETER_PREFIX, SHAPE_PREFIX};
use shapedelta_core::{GeometryGraph, ItemId};
use std::collections::{HashMap, HashSet};

/// Turns arbitrary text into an identifier body: `[A-Za-z0-9_]`, never empty
pub fn sanitize_identifier(text: &str) -> String {
    let mut out: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn allocate(used: &mut HashSet<String>, base: String) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Qualified parameter ids mapped to the identifiers declared for them
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: HashMap<String, String>,
    used: HashSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the identifier for a qualified id without declaring it
    pub fn allocate(&mut self, qualified: &str) -> String {
        allocate(
            &mut self.used,
            format!("{}{}", PARAMETER_PREFIX, sanitize_identifier(qualified)),
        )
    }

    /// Makes a qualified id resolvable
    pub fn declare(&mut self, qualified: &str, identifier: String) {
        self.names.insert(qualified.to_string(), identifier);
    }

    /// Looks `name` up inside `scope` first, then globally
    pub fn resolve(&self, scope: Option<&str>, name: &str) -> Option<&str> {
        scope
            .and_then(|scope| self.names.get(&format!("{}.{}", scope, name)))
            .or_else(|| self.names.get(name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One shape variable per item id
#[derive(Debug, Default)]
pub struct VariableTable {
    names: HashMap<ItemId, String>,
}

impl VariableTable {
    /// Names every item in graph order; composites take their members' names
    pub fn for_graph(graph: &GeometryGraph) -> Self {
        let mut used = HashSet::new();
        let mut names = HashMap::new();

        for item in &graph.items {
            let Some(id) = &item.id else { continue };
            if names.contains_key(id) {
                continue;
            }
            let base = if item.is_composite() {
                let members: Vec<&str> = item
                    .sub_items()
                    .into_iter()
                    .filter_map(|member| graph.item(member))
                    .map(|member| member.name.as_str())
                    .collect();
                members.join(NAME_SEPARATOR)
            } else {
                item.name.clone()
            };
            let base = if base.is_empty() { item.kind_name().to_string() } else { base };
            let name = allocate(&mut used, format!("{}{}", SHAPE_PREFIX, sanitize_identifier(&base)));
            names.insert(id.clone(), name);
        }

        Self { names }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }
}
