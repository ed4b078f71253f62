//! One editing session: the registry, the selection, per-graph history and
//! the layout simulation, passed explicitly to every operation.
//!
//! Structural edits go through [`GraphSession::mutate`], which stops the
//! simulation, records the previous state, applies the edit, validates the
//! graph, rebuilds the simulation caches and restarts. An edit that fails is
//! rolled back and leaves no history entry.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

use itertools::Itertools;

use layout::svg::{SvgNode, render_svg};
use layout::{
    BodySpec, EdgeGeometry, Endpoint, ForceConfig, Position, Simulation, TickOutcome, route_link,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::graph::{GraphModel, LinkKey, NodeKey};
use crate::history::{
    Commit, DEFAULT_COMMIT_CAPACITY, DEFAULT_HISTORY_CAPACITY, History,
};
use crate::ops::RestoreReport;
use crate::persist::{PersistedGraph, PersistedHistory, SessionSnapshot};
use crate::registry::GraphRegistry;
use crate::search::{SearchBudget, SearchOutcome};
use crate::style::NodeStyle;

/// Alpha a drag gesture keeps the simulation warm at.
const DRAG_ALPHA: f64 = 0.3;
const SVG_MARGIN: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub force: ForceConfig,
    pub style: NodeStyle,
    pub history_capacity: usize,
    pub commit_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            force: ForceConfig::default(),
            style: NodeStyle::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            commit_capacity: DEFAULT_COMMIT_CAPACITY,
        }
    }
}

pub struct GraphSession {
    registry: GraphRegistry,
    selection: Vec<NodeKey>,
    histories: HashMap<String, History<GraphModel>>,
    simulation: Simulation,
    config: SessionConfig,
    traps: Vec<Vec<Position>>,
}

impl GraphSession {
    pub fn new(config: SessionConfig, registry: GraphRegistry) -> Result<Self> {
        config.force.validate()?;
        let simulation = Simulation::new(config.force.clone());
        let mut session = Self {
            registry,
            selection: Vec::new(),
            histories: HashMap::new(),
            simulation,
            config,
            traps: Vec::new(),
        };
        session.refresh_simulation()?;
        Ok(session)
    }

    /// A session over a single graph named `name`.
    pub fn with_graph(config: SessionConfig, name: &str, mut graph: GraphModel) -> Result<Self> {
        graph.set_seed_center(config.force.center);
        Self::new(config, GraphRegistry::new(name, graph))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_force_config(&mut self, force: ForceConfig) -> Result<()> {
        self.simulation.set_config(force.clone())?;
        self.config.force = force;
        Ok(())
    }

    pub fn registry(&self) -> &GraphRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &GraphModel {
        self.registry.active()
    }

    pub fn active_name(&self) -> &str {
        self.registry.active_name()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn history(&self) -> Option<&History<GraphModel>> {
        self.histories.get(self.registry.active_name())
    }

    pub fn selection(&self) -> &[NodeKey] {
        &self.selection
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.selection
            .iter()
            .filter_map(|&k| self.graph().id_of(k).map(str::to_string))
            .collect()
    }

    pub fn select(&mut self, keys: &[NodeKey]) -> Result<()> {
        self.graph().require_all(keys)?;
        self.selection = keys.iter().copied().unique().collect();
        Ok(())
    }

    pub fn select_ids<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<()> {
        let keys = self.graph().keys_of(ids)?;
        self.select(&keys)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn traps(&self) -> &[Vec<Position>] {
        &self.traps
    }

    pub fn set_traps(&mut self, traps: Vec<Vec<Position>>) {
        self.simulation.set_traps(traps.clone());
        self.traps = traps;
    }

    /// Stop, record, edit, validate, rebuild, restart.
    pub fn mutate<R>(
        &mut self,
        label: &str,
        op: impl FnOnce(&mut GraphModel) -> Result<R>,
    ) -> Result<R> {
        self.simulation.stop();
        let selected = self.selected_ids();
        let mut before = self.graph().clone();
        before.clear_auxiliary();

        let graph = self.registry.active_mut();
        let result = op(graph).and_then(|r| graph.validate().map(|_| r));
        match result {
            Ok(value) => {
                self.history_mut().record(before);
                self.reselect(&selected);
                self.refresh_simulation()?;
                self.simulation.restart();
                debug!(
                    op = label,
                    nodes = self.graph().node_count(),
                    links = self.graph().link_count(),
                    "graph edited"
                );
                Ok(value)
            }
            Err(err) => {
                *self.registry.active_mut() = before;
                self.reselect(&selected);
                self.refresh_simulation()?;
                self.simulation.resume();
                debug!(op = label, error = %err, "edit rolled back");
                Err(err)
            }
        }
    }

    pub fn split_selected(&mut self) -> Result<Vec<NodeKey>> {
        let selection = self.selection.clone();
        self.mutate("split", |g| g.split_nodes(&selection))
    }

    pub fn isolate_selected(&mut self) -> Result<Vec<NodeKey>> {
        let reaction = self.single_selected()?;
        self.mutate("isolate", |g| g.isolate_reaction(reaction))
    }

    pub fn join_selected(&mut self) -> Result<usize> {
        let selection = self.selection.clone();
        self.mutate("join", |g| g.join_metabolites(&selection))
    }

    pub fn suspend_selected(&mut self) -> Result<Vec<String>> {
        let selection = self.selection.clone();
        self.mutate("suspend", |g| g.suspend_metabolites(&selection))
    }

    pub fn restore(&mut self, node_id: &str) -> Result<RestoreReport> {
        self.mutate("restore", |g| g.restore(node_id))
    }

    pub fn delete_selected(&mut self) -> Result<usize> {
        let selection = self.selection.clone();
        self.mutate("delete", |g| g.delete_nodes(&selection))
    }

    pub fn collapse_selected(&mut self) -> Result<NodeKey> {
        let selection = self.selection.clone();
        let key = self.mutate("collapse", |g| g.collapse(&selection))?;
        self.selection = vec![key];
        Ok(key)
    }

    pub fn pin(&mut self, key: NodeKey, at: Option<Position>) -> Result<()> {
        self.mutate("pin", |g| g.pin(key, at))
    }

    pub fn unpin(&mut self, key: NodeKey) -> Result<()> {
        self.mutate("unpin", |g| g.unpin(key))
    }

    pub fn reverse_link(&mut self, link: LinkKey) -> Result<bool> {
        self.mutate("reverse", |g| g.reverse_link(link))
    }

    pub fn set_secondary(&mut self, keys: &[NodeKey], secondary: bool) -> Result<usize> {
        self.mutate("secondary", |g| g.set_secondary(keys, secondary))
    }

    pub fn auto_bezi(&mut self) -> Result<usize> {
        self.mutate("auto bezier", |g| Ok(g.auto_bezi_all()))
    }

    /// Move the selection (and its grouping) during a drag gesture.
    ///
    /// Not recorded in history; the simulation is kept warm instead of reheated.
    pub fn drag_selected(&mut self, dx: f64, dy: f64) -> Result<Vec<NodeKey>> {
        let selection = self.selection.clone();
        let moved = self.registry.active_mut().translate(&selection, dx, dy)?;
        if self.simulation.alpha() < DRAG_ALPHA {
            self.simulation.set_alpha(DRAG_ALPHA);
        }
        self.simulation.resume();
        Ok(moved)
    }

    /// Bind the selection to trap `trap`, which must be registered.
    pub fn trap_selected(&mut self, trap: Option<usize>) -> Result<()> {
        if let Some(t) = trap {
            if t >= self.traps.len() {
                return Err(NetworkError::InvalidSelection(format!("no trap {t}")));
            }
        }
        let selection = self.selection.clone();
        self.mutate("trap", |g| g.set_trap(&selection, trap))
    }

    /// Drop a gesture anchor at `at`. Anchors never enter history.
    pub fn add_auxiliary(&mut self, at: Position) -> Result<NodeKey> {
        let key = self.registry.active_mut().add_auxiliary(at)?;
        self.refresh_simulation()?;
        self.simulation.resume();
        Ok(key)
    }

    pub fn clear_auxiliary(&mut self) -> Result<usize> {
        let removed = self.registry.active_mut().clear_auxiliary();
        if removed > 0 {
            let selected = self.selected_ids();
            self.reselect(&selected);
            self.refresh_simulation()?;
            self.simulation.resume();
        }
        Ok(removed)
    }

    pub fn undo(&mut self) -> Result<bool> {
        let current = self.graph().clone();
        let Some(previous) = self.history_mut().undo(current) else {
            return Ok(false);
        };
        self.replace_active(previous)?;
        info!(graph = %self.active_name(), "undo");
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let current = self.graph().clone();
        let Some(next) = self.history_mut().redo(current) else {
            return Ok(false);
        };
        self.replace_active(next)?;
        info!(graph = %self.active_name(), "redo");
        Ok(true)
    }

    pub fn commit(&mut self, label: impl Into<String>) {
        let mut snapshot = self.graph().clone();
        snapshot.clear_auxiliary();
        let label = label.into();
        info!(graph = %self.active_name(), label = %label, "commit");
        self.history_mut().commit(label, snapshot);
    }

    /// Replace the active graph with a commit. Undoable like any edit.
    pub fn restore_commit(&mut self, label: &str) -> Result<()> {
        let snapshot = self
            .history()
            .and_then(|h| h.find_commit(label))
            .cloned()
            .ok_or_else(|| NetworkError::InvalidSelection(format!("no commit labeled {label}")))?;
        self.mutate("restore commit", move |g| {
            *g = snapshot;
            Ok(())
        })
    }

    pub fn switch_graph(&mut self, name: &str) -> Result<()> {
        self.simulation.stop();
        self.registry.switch_active(name)?;
        self.selection.clear();
        self.refresh_simulation()?;
        self.simulation.restart();
        Ok(())
    }

    pub fn rename_graph(&mut self, from: &str, to: &str) -> Result<()> {
        self.registry.rename(from, to)?;
        if let Some(history) = self.histories.remove(from) {
            self.histories.insert(to.to_string(), history);
        }
        Ok(())
    }

    pub fn remove_graph(&mut self, name: &str) -> Result<()> {
        let was_active = self.active_name() == name;
        self.registry.remove(name)?;
        self.histories.remove(name);
        if was_active {
            self.selection.clear();
            self.refresh_simulation()?;
        }
        Ok(())
    }

    pub fn join_graphs(&mut self, a: &str, b: &str, name: &str, merge: bool) -> Result<()> {
        self.registry.join(a, b, name, merge)?;
        let center = self.config.force.center;
        self.registry.get_mut(name)?.set_seed_center(center);
        Ok(())
    }

    pub fn shortest_path(
        &self,
        a: NodeKey,
        b: NodeKey,
        budget: SearchBudget,
    ) -> Result<SearchOutcome<Vec<NodeKey>>> {
        self.graph().shortest_path(a, b, budget)
    }

    pub fn shortest_paths_all(
        &self,
        a: NodeKey,
        b: NodeKey,
        budget: SearchBudget,
    ) -> Result<SearchOutcome<Vec<Vec<NodeKey>>>> {
        self.graph().shortest_paths_all(a, b, budget)
    }

    pub fn component_of_selection(
        &self,
        budget: SearchBudget,
    ) -> Result<SearchOutcome<Vec<NodeKey>>> {
        if self.selection.is_empty() {
            return Err(NetworkError::InvalidSelection("nothing selected".to_string()));
        }
        self.graph().component(&self.selection, budget)
    }

    /// Register the component of interest around the selection as graph `name`.
    pub fn extract_component(
        &mut self,
        name: &str,
        budget: SearchBudget,
    ) -> Result<SearchOutcome<usize>> {
        if self.registry.contains(name) {
            return Err(NetworkError::GraphExists(name.to_string()));
        }
        let outcome = self.component_of_selection(budget)?;
        let sub = self.graph().subgraph(outcome.value());
        let count = sub.node_count();
        self.registry.insert(name, sub)?;
        Ok(outcome.map(|_| count))
    }

    /// Advance the layout by one tick.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let graph = self.registry.active_mut();
        Ok(self.simulation.tick(graph.nodes_mut())?)
    }

    /// Restart the simulation and tick until it settles or `max_ticks` pass.
    pub fn run_until_settled(&mut self, max_ticks: usize) -> Result<usize> {
        self.refresh_simulation()?;
        self.simulation.restart();
        for taken in 0..max_ticks {
            match self.tick()? {
                TickOutcome::Running => {}
                TickOutcome::Settled => return Ok(taken + 1),
                TickOutcome::Stopped => return Ok(taken),
            }
        }
        Ok(max_ticks)
    }

    pub fn pause(&mut self) {
        self.simulation.stop();
    }

    pub fn resume(&mut self) {
        self.simulation.resume();
    }

    /// Curve and arrowhead geometry for every link of the active graph.
    pub fn route_edges(&self) -> Vec<(LinkKey, EdgeGeometry)> {
        let graph = self.graph();
        let style = &self.config.style;
        let endpoint = |key: NodeKey| {
            graph.node(key).map(|node| Endpoint {
                center: node.position,
                extent: style.extent(node),
                bezi: node.bezi,
            })
        };
        graph
            .links()
            .filter_map(|view| {
                let (from, to) = view.oriented();
                let geometry = route_link(
                    &endpoint(from)?,
                    &endpoint(to)?,
                    view.link.reversible,
                    &style.route,
                );
                Some((view.key, geometry))
            })
            .collect()
    }

    /// The active graph drawn as a standalone SVG document.
    pub fn render_svg(&self) -> String {
        let style = &self.config.style;
        let nodes: Vec<SvgNode> = self
            .graph()
            .nodes()
            .filter(|(_, n)| !n.is_auxiliary())
            .map(|(_, node)| SvgNode {
                center: node.position,
                extent: style.extent(node),
                label: node.label.clone(),
                pinned: node.is_pinned(),
            })
            .collect();
        let edges: Vec<EdgeGeometry> = self.route_edges().into_iter().map(|(_, g)| g).collect();
        render_svg(&nodes, &edges, SVG_MARGIN)
    }

    pub fn to_snapshot(&self) -> SessionSnapshot {
        let graphs = self
            .registry
            .iter()
            .map(|(name, graph)| (name.to_string(), graph.to_persisted()))
            .collect();
        let mut history_buffers = BTreeMap::new();
        let mut commits = BTreeMap::new();
        for (name, history) in &self.histories {
            let persisted = match history.try_map(|g| Ok::<_, Infallible>(g.to_persisted())) {
                Ok(persisted) => persisted,
                Err(never) => match never {},
            };
            history_buffers.insert(
                name.clone(),
                PersistedHistory {
                    undo: persisted.undo_entries().cloned().collect(),
                    redo: persisted.redo_entries().cloned().collect(),
                },
            );
            commits.insert(name.clone(), persisted.commits().cloned().collect());
        }
        SessionSnapshot {
            graphs,
            active_name: self.active_name().to_string(),
            selection: self.selected_ids(),
            history_buffers,
            commits,
            traps: self.traps.clone(),
        }
    }

    pub fn from_snapshot(config: SessionConfig, snapshot: &SessionSnapshot) -> Result<Self> {
        let center = config.force.center;
        let mut graphs = snapshot.graphs.iter();
        let (first_name, first) = graphs
            .next()
            .ok_or_else(|| NetworkError::UnknownGraph(snapshot.active_name.clone()))?;
        let mut registry =
            GraphRegistry::new(first_name.clone(), GraphModel::from_persisted_at(first, center)?);
        for (name, graph) in graphs {
            registry.insert(name.clone(), GraphModel::from_persisted_at(graph, center)?)?;
        }
        registry.switch_active(&snapshot.active_name)?;

        let load = |g: &PersistedGraph| GraphModel::from_persisted_at(g, center);
        let mut histories = HashMap::new();
        for name in registry.names() {
            let buffers = snapshot.history_buffers.get(name);
            let commits = snapshot.commits.get(name);
            if buffers.is_none() && commits.is_none() {
                continue;
            }
            let undo = buffers
                .map(|b| b.undo.iter().map(load).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            let redo = buffers
                .map(|b| b.redo.iter().map(load).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            let commits = commits
                .map(|list| {
                    list.iter()
                        .map(|c| {
                            Ok(Commit {
                                label: c.label.clone(),
                                snapshot: load(&c.snapshot)?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            histories.insert(
                name.to_string(),
                History::from_parts(
                    config.history_capacity,
                    config.commit_capacity,
                    undo,
                    redo,
                    commits,
                ),
            );
        }

        let mut session = Self::new(config, registry)?;
        session.histories = histories;
        session.set_traps(snapshot.traps.clone());
        let keys = session.graph().keys_of(&snapshot.selection)?;
        session.selection = keys;
        session.refresh_simulation()?;
        Ok(session)
    }

    fn single_selected(&self) -> Result<NodeKey> {
        match self.selection.as_slice() {
            [key] => Ok(*key),
            other => Err(NetworkError::InvalidSelection(format!(
                "expected one selected node, found {}",
                other.len()
            ))),
        }
    }

    fn history_mut(&mut self) -> &mut History<GraphModel> {
        let (capacity, commits) = (self.config.history_capacity, self.config.commit_capacity);
        self.histories
            .entry(self.registry.active_name().to_string())
            .or_insert_with(|| History::new(capacity, commits))
    }

    fn replace_active(&mut self, graph: GraphModel) -> Result<()> {
        self.simulation.stop();
        let selected = self.selected_ids();
        *self.registry.active_mut() = graph;
        self.reselect(&selected);
        self.refresh_simulation()?;
        self.simulation.restart();
        Ok(())
    }

    /// Point the selection at whichever of `ids` the active graph still holds.
    ///
    /// Keys are slot handles and a swapped-in graph may reuse a slot for
    /// another node, so the selection is carried across by id.
    fn reselect(&mut self, ids: &[String]) {
        let graph = self.registry.active();
        self.selection = ids.iter().filter_map(|id| graph.key_of(id)).collect();
    }

    /// Rebuild adjacency, degree and radius caches from the active graph.
    fn refresh_simulation(&mut self) -> Result<()> {
        let graph = self.registry.active();
        let style = &self.config.style;
        let specs: Vec<BodySpec> = graph
            .nodes()
            .map(|(_, node)| BodySpec {
                position: node.position,
                pinned: node.pinned,
                secondary: node.secondary,
                radius: style.radius(node),
                trap: node.trap,
            })
            .collect();
        let links = graph.dense_links();
        self.simulation.set_traps(self.traps.clone());
        self.simulation.rebuild(specs, &links)?;
        Ok(())
    }
}
