use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::graph::{GraphModel, NodeKey};

/// Named graphs with one of them active.
#[derive(Debug, Clone)]
pub struct GraphRegistry {
    graphs: BTreeMap<String, GraphModel>,
    active: String,
}

impl GraphRegistry {
    pub fn new(name: impl Into<String>, graph: GraphModel) -> Self {
        let name = name.into();
        Self {
            graphs: BTreeMap::from([(name.clone(), graph)]),
            active: name,
        }
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GraphModel)> {
        self.graphs.iter().map(|(name, graph)| (name.as_str(), graph))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graphs.contains_key(name)
    }

    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn active(&self) -> &GraphModel {
        &self.graphs[&self.active]
    }

    pub fn active_mut(&mut self) -> &mut GraphModel {
        self.graphs.entry(self.active.clone()).or_default()
    }

    pub fn get(&self, name: &str) -> Result<&GraphModel> {
        self.graphs
            .get(name)
            .ok_or_else(|| NetworkError::UnknownGraph(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut GraphModel> {
        self.graphs
            .get_mut(name)
            .ok_or_else(|| NetworkError::UnknownGraph(name.to_string()))
    }

    pub fn insert(&mut self, name: impl Into<String>, graph: GraphModel) -> Result<()> {
        let name = name.into();
        if self.graphs.contains_key(&name) {
            return Err(NetworkError::GraphExists(name));
        }
        debug!(graph = %name, nodes = graph.node_count(), "graph registered");
        self.graphs.insert(name, graph);
        Ok(())
    }

    /// Make `name` the active graph. Gesture helpers of the outgoing graph are
    /// dropped; its edits are already stored in place.
    pub fn switch_active(&mut self, name: &str) -> Result<()> {
        if !self.graphs.contains_key(name) {
            return Err(NetworkError::UnknownGraph(name.to_string()));
        }
        if name == self.active {
            return Ok(());
        }
        self.active_mut().clear_auxiliary();
        info!(from = %self.active, to = name, "active graph switched");
        self.active = name.to_string();
        Ok(())
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return self.get(from).map(|_| ());
        }
        if self.graphs.contains_key(to) {
            return Err(NetworkError::GraphExists(to.to_string()));
        }
        let graph = self
            .graphs
            .remove(from)
            .ok_or_else(|| NetworkError::UnknownGraph(from.to_string()))?;
        self.graphs.insert(to.to_string(), graph);
        if self.active == from {
            self.active = to.to_string();
        }
        debug!(from, to, "graph renamed");
        Ok(())
    }

    /// Remove a graph. Removing the active graph activates the first remaining one.
    pub fn remove(&mut self, name: &str) -> Result<GraphModel> {
        if !self.graphs.contains_key(name) {
            return Err(NetworkError::UnknownGraph(name.to_string()));
        }
        if self.graphs.len() == 1 {
            return Err(NetworkError::LastGraph);
        }
        let graph = self
            .graphs
            .remove(name)
            .ok_or_else(|| NetworkError::UnknownGraph(name.to_string()))?;
        if self.active == name {
            if let Some(first) = self.graphs.keys().next() {
                self.active = first.clone();
            }
        }
        debug!(graph = name, "graph removed");
        Ok(graph)
    }

    /// Register the union of graphs `a` and `b` as `name`.
    ///
    /// With `merge`, metabolites whose group key occurs in both sources are
    /// joined afterwards, first occurrence winning.
    pub fn join(&mut self, a: &str, b: &str, name: &str, merge: bool) -> Result<()> {
        if self.graphs.contains_key(name) {
            return Err(NetworkError::GraphExists(name.to_string()));
        }
        let first = self.get(a)?;
        let second = self.get(b)?;

        let mut joined = first.clone();
        joined.clear_auxiliary();
        let mut incoming = second.clone();
        incoming.clear_auxiliary();
        let renamed = joined.absorb(&incoming);

        let mut merged = 0;
        if merge {
            let left = first.metabolite_classes();
            let right = second.metabolite_classes();
            let shared: Vec<NodeKey> = joined
                .nodes()
                .filter(|(_, n)| {
                    n.is_metabolite()
                        && left.contains_key(n.group_key.as_str())
                        && right.contains_key(n.group_key.as_str())
                })
                .map(|(k, _)| k)
                .collect();
            merged = joined.join_metabolites(&shared)?;
        }

        info!(
            graph = name,
            nodes = joined.node_count(),
            links = joined.link_count(),
            renamed = renamed.len(),
            merged,
            "graphs joined"
        );
        self.graphs.insert(name.to_string(), joined);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Link;
    use crate::node::Node;
    use layout::Position;

    fn pair(m: &str, r: &str, class: &str) -> GraphModel {
        let mut g = GraphModel::new();
        let mk = g.add_node(Node::metabolite(m, class)).unwrap();
        let rk = g.add_node(Node::reaction(r, r)).unwrap();
        g.add_link(mk, rk, Link::default()).unwrap();
        g
    }

    #[test]
    fn test_rename_follows_active() {
        let mut reg = GraphRegistry::new("main", GraphModel::new());
        reg.rename("main", "glycolysis").unwrap();
        assert_eq!(reg.active_name(), "glycolysis");
        assert!(matches!(
            reg.rename("main", "x"),
            Err(NetworkError::UnknownGraph(_))
        ));
        reg.insert("tca", GraphModel::new()).unwrap();
        assert!(matches!(
            reg.rename("tca", "glycolysis"),
            Err(NetworkError::GraphExists(_))
        ));
    }

    #[test]
    fn test_remove_last_graph_is_refused() {
        let mut reg = GraphRegistry::new("main", GraphModel::new());
        assert!(matches!(reg.remove("main"), Err(NetworkError::LastGraph)));

        reg.insert("b", GraphModel::new()).unwrap();
        reg.remove("main").unwrap();
        assert_eq!(reg.active_name(), "b");
    }

    #[test]
    fn test_switch_clears_auxiliary_of_outgoing() {
        let mut reg = GraphRegistry::new("a", pair("m", "r", "atp"));
        reg.insert("b", GraphModel::new()).unwrap();
        reg.active_mut().add_auxiliary(Position::new(0.0, 0.0)).unwrap();
        assert_eq!(reg.active().node_count(), 3);

        reg.switch_active("b").unwrap();
        assert_eq!(reg.active_name(), "b");
        assert_eq!(reg.get("a").unwrap().node_count(), 2);
        assert!(matches!(
            reg.switch_active("zzz"),
            Err(NetworkError::UnknownGraph(_))
        ));
    }

    #[test]
    fn test_join_concatenates_and_merges_shared_classes() {
        let mut reg = GraphRegistry::new("a", pair("m", "r1", "atp"));
        reg.insert("b", pair("m", "r2", "atp")).unwrap();

        reg.join("a", "b", "plain", false).unwrap();
        let plain = reg.get("plain").unwrap();
        assert_eq!(plain.node_count(), 4);
        assert_eq!(plain.link_count(), 2);
        plain.validate().unwrap();

        reg.join("a", "b", "merged", true).unwrap();
        let merged = reg.get("merged").unwrap();
        assert_eq!(merged.node_count(), 3);
        assert_eq!(merged.link_count(), 2);
        let m = merged.key_of("m").unwrap();
        assert_eq!(merged.degree(m), 2);

        assert!(matches!(
            reg.join("a", "b", "merged", true),
            Err(NetworkError::GraphExists(_))
        ));
    }
}
