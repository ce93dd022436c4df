//! Geometry graph data structures and operations

use crate::expr::Expr;
use crate::item::{GeometryItem, ItemId, ItemKind, StepRotation};
use crate::parameter::Parameter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Ordered items plus the global parameters their expressions reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryGraph {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub items: Vec<GeometryItem>,
}

impl GeometryGraph {
    /// Creates a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Adds a global parameter, replacing one with the same id
    pub fn add_parameter(&mut self, parameter: Parameter) {
        match self.parameters.iter_mut().find(|p| p.id == parameter.id) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    /// Adds an item, assigning a fresh id if it has none, and returns the id
    pub fn add_item(&mut self, mut item: GeometryItem) -> ItemId {
        let id = item
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        self.items.push(item);
        id
    }

    fn add_kind(&mut self, name: &str, kind: ItemKind) -> ItemId {
        self.add_item(GeometryItem::new(name, kind))
    }

    pub fn add_box(&mut self, name: &str, point1: [Expr; 3], point2: [Expr; 3]) -> ItemId {
        self.add_kind(name, ItemKind::Box { point1, point2 })
    }

    pub fn add_cylinder(
        &mut self,
        name: &str,
        point1: [Expr; 3],
        point2: [Expr; 3],
        radius: impl Into<Expr>,
    ) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Cylinder {
                point1,
                point2,
                radius: radius.into(),
            },
        )
    }

    pub fn add_sphere(&mut self, name: &str, center: [Expr; 3], radius: impl Into<Expr>) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Sphere {
                center,
                radius: radius.into(),
            },
        )
    }

    pub fn add_cut(&mut self, name: &str, left: &ItemId, right: &ItemId) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Cut {
                left: left.clone(),
                right: right.clone(),
            },
        )
    }

    pub fn add_fuse(&mut self, name: &str, left: &ItemId, right: &ItemId) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Fuse {
                left: left.clone(),
                right: right.clone(),
            },
        )
    }

    pub fn add_common(&mut self, name: &str, left: &ItemId, right: &ItemId) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Common {
                left: left.clone(),
                right: right.clone(),
            },
        )
    }

    pub fn add_translate(&mut self, name: &str, target: &ItemId, offset: [Expr; 3]) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Translate {
                target: target.clone(),
                offset,
            },
        )
    }

    pub fn add_rotate(
        &mut self,
        name: &str,
        target: &ItemId,
        center: [Expr; 3],
        axis: [Expr; 3],
        angle: impl Into<Expr>,
    ) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Rotate {
                target: target.clone(),
                center,
                axis,
                angle: angle.into(),
            },
        )
    }

    pub fn add_step(
        &mut self,
        name: &str,
        guid: &str,
        rotation: Option<StepRotation>,
        translation: Option<[f64; 3]>,
    ) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Step {
                guid: guid.to_string(),
                rotation,
                translation,
            },
        )
    }

    pub fn add_composite(&mut self, name: &str, members: &[ItemId]) -> ItemId {
        self.add_kind(
            name,
            ItemKind::Composite {
                members: members.to_vec(),
            },
        )
    }

    pub fn item(&self, id: &str) -> Option<&GeometryItem> {
        self.items.iter().find(|item| item.id.as_deref() == Some(id))
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut GeometryItem> {
        self.items.iter_mut().find(|item| item.id.as_deref() == Some(id))
    }

    /// Removes an item; items that referenced it will fail to build
    pub fn remove_item(&mut self, id: &str) -> Option<GeometryItem> {
        let index = self.items.iter().position(|item| item.id.as_deref() == Some(id))?;
        Some(self.items.remove(index))
    }

    /// Sets a parameter value by id. A qualified `scope.name` id addresses a
    /// nested parameter of a global composite or a local parameter of the item
    /// whose id is `scope`. Returns false if nothing matched.
    pub fn set_parameter(&mut self, id: &str, value: impl Into<Expr>) -> bool {
        let value = value.into();

        if let Some(param) = self.parameters.iter_mut().find(|p| p.id == id) {
            param.set(value);
            return true;
        }

        let Some((scope, name)) = id.split_once('.') else {
            return false;
        };

        if let Some(param) = self
            .parameters
            .iter_mut()
            .find(|p| p.id == scope)
            .and_then(|p| p.child_mut(name))
        {
            param.set(value);
            return true;
        }

        if let Some(param) = self
            .item_mut(scope)
            .and_then(|item| item.parameters.iter_mut().find(|p| p.id == name))
        {
            param.set(value);
            return true;
        }

        false
    }

    /// Applies several parameter assignments; returns the ids that matched nothing
    pub fn set_parameters<I, V>(&mut self, values: I) -> Vec<String>
    where
        I: IntoIterator<Item = (String, V)>,
        V: Into<Expr>,
    {
        values
            .into_iter()
            .filter_map(|(id, value)| if self.set_parameter(&id, value) { None } else { Some(id) })
            .collect()
    }

    /// Global parameters followed by one composite per item with local
    /// parameters, qualified by the item id
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut all = self.parameters.clone();
        for item in &self.items {
            if let (Some(id), false) = (&item.id, item.parameters.is_empty()) {
                all.push(Parameter::composite(id.clone(), item.parameters.clone()));
            }
        }
        all
    }

    pub fn visible_items(&self) -> impl Iterator<Item = &GeometryItem> {
        self.items.iter().filter(|item| item.visible)
    }

    /// The given items plus everything they are built from, in graph order,
    /// together with all parameters
    pub fn extract_subset(&self, ids: &[ItemId]) -> GeometryGraph {
        let mut wanted: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();

        while let Some(id) = stack.pop() {
            if !wanted.insert(id) {
                continue;
            }
            if let Some(item) = self.item(id) {
                stack.extend(item.sub_items().into_iter().map(|sub| sub.as_str()));
            }
        }

        GeometryGraph {
            parameters: self.parameters.clone(),
            items: self
                .items
                .iter()
                .filter(|item| item.id.as_deref().is_some_and(|id| wanted.contains(id)))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::vec3;

    fn sample() -> (GeometryGraph, ItemId, ItemId, ItemId) {
        let mut graph = GeometryGraph::new();
        graph.add_parameter(Parameter::new("length", 10.0));
        let block = graph.add_box("block", vec3(0, 0, 0), vec3("$length", 20, 20));
        let pin = graph.add_cylinder("pin", vec3(5, 5, 0), vec3(5, 5, 20), 2);
        let cut = graph.add_cut("drilled", &block, &pin);
        (graph, block, pin, cut)
    }

    #[test]
    fn test_builders_assign_unique_ids() {
        let (graph, block, pin, cut) = sample();
        assert_eq!(graph.items.len(), 3);
        assert_ne!(block, pin);
        assert_ne!(pin, cut);
        assert_eq!(graph.item(&block).map(|i| i.name.as_str()), Some("block"));
    }

    #[test]
    fn test_set_parameter_global_and_local() {
        let (mut graph, block, _, _) = sample();
        assert!(graph.set_parameter("length", 12.0));
        assert_eq!(graph.parameters[0].value, Some(Expr::Number(12.0)));

        graph
            .item_mut(&block)
            .unwrap()
            .parameters
            .push(Parameter::with_default("wall", 1.0));
        assert!(graph.set_parameter(&format!("{}.wall", block), 3.0));
        assert!(!graph.set_parameter("nope", 1.0));

        let all = graph.parameters();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, block);
        assert_eq!(all[1].parameters[0].value, Some(Expr::Number(3.0)));
    }

    #[test]
    fn test_set_parameters_reports_unmatched() {
        let (mut graph, _, _, _) = sample();
        let unmatched = graph.set_parameters(vec![("length".to_string(), 4.0), ("width".to_string(), 1.0)]);
        assert_eq!(unmatched, vec!["width".to_string()]);
    }

    #[test]
    fn test_extract_subset_keeps_dependencies_in_order() {
        let (mut graph, block, pin, cut) = sample();
        let other = graph.add_sphere("ball", vec3(0, 0, 0), 3);

        let subset = graph.extract_subset(&[cut.clone()]);
        let ids: Vec<_> = subset.items.iter().filter_map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec![block, pin, cut]);
        assert!(subset.item(&other).is_none());
        assert_eq!(subset.parameters.len(), 1);
    }

    #[test]
    fn test_remove_item() {
        let (mut graph, _, pin, _) = sample();
        assert!(graph.remove_item(&pin).is_some());
        assert!(graph.item(&pin).is_none());
        assert!(graph.remove_item(&pin).is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let (graph, _, _, _) = sample();
        let json = graph.to_json().unwrap();
        assert_eq!(GeometryGraph::from_json(&json).unwrap(), graph);
    }
}
