//! The set of configured mappings.

use apisync_protocol::{Entity, Mapping, MappingId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable set of mappings, looked up by name.
///
/// Iteration follows mapping weight, then name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Mapping>", into = "Vec<Mapping>")]
pub struct MappingRegistry {
    mappings: BTreeMap<MappingId, Mapping>,
    order: Vec<MappingId>,
}

impl MappingRegistry {
    /// Builds a registry. A later mapping with the same name replaces an earlier one.
    pub fn new(mappings: impl IntoIterator<Item = Mapping>) -> Self {
        let mappings: BTreeMap<MappingId, Mapping> =
            mappings.into_iter().map(|m| (m.id.clone(), m)).collect();

        let mut order: Vec<MappingId> = mappings.keys().cloned().collect();
        order.sort_by(|a, b| {
            let (wa, wb) = (mappings[a].weight, mappings[b].weight);
            wa.cmp(&wb).then_with(|| a.cmp(b))
        });

        Self { mappings, order }
    }

    /// Looks up a mapping by name.
    pub fn get(&self, id: &MappingId) -> Option<&Mapping> {
        self.mappings.get(id)
    }

    /// All mappings in weight order.
    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.order.iter().filter_map(|id| self.mappings.get(id))
    }

    /// Mappings whose entity type and bundle match `entity`.
    pub fn for_entity<'a>(&'a self, entity: &'a Entity) -> impl Iterator<Item = &'a Mapping> + 'a {
        self.iter().filter(move |m| m.applies_to(entity))
    }

    /// Mappings eligible for standalone pull.
    pub fn pull_standalone(&self) -> impl Iterator<Item = &Mapping> {
        self.iter().filter(|m| m.pull_standalone && m.triggers.pulls())
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if there are no mappings.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl From<Vec<Mapping>> for MappingRegistry {
    fn from(mappings: Vec<Mapping>) -> Self {
        Self::new(mappings)
    }
}

impl From<MappingRegistry> for Vec<Mapping> {
    fn from(registry: MappingRegistry) -> Self {
        let MappingRegistry {
            mut mappings,
            order,
        } = registry;
        order
            .iter()
            .filter_map(|id| mappings.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apisync_protocol::SyncTriggers;

    fn mapping(id: &str, weight: i32) -> Mapping {
        let mut m = Mapping::new(id, "node", "article", "Article__c");
        m.weight = weight;
        m
    }

    #[test]
    fn iteration_follows_weight() {
        let registry = MappingRegistry::new(vec![mapping("b", 0), mapping("a", 5), mapping("c", -1)]);
        let names: Vec<_> = registry.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn standalone_filter() {
        let registry = MappingRegistry::new(vec![
            mapping("off", 0),
            mapping("on", 0).with_standalone(true, false),
            mapping("no_triggers", 0)
                .with_standalone(true, false)
                .with_triggers(SyncTriggers::none()),
        ]);
        let names: Vec<_> = registry.pull_standalone().map(|m| m.id.as_str()).collect();
        assert_eq!(names, vec!["on"]);
    }

    #[test]
    fn entity_match() {
        let registry = MappingRegistry::new(vec![
            mapping("article", 0),
            Mapping::new("user", "user", "user", "Contact"),
        ]);
        let entity = Entity::new("node", "article");
        let names: Vec<_> = registry.for_entity(&entity).map(|m| m.id.as_str()).collect();
        assert_eq!(names, vec!["article"]);
    }

    #[test]
    fn deserializes_from_list() {
        let json = serde_json::to_string(&vec![mapping("a", 1), mapping("b", 0)]).unwrap();
        let registry: MappingRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.iter().next().unwrap().id.as_str(), "b");
    }
}
