//! Validated topology of a network.
//!
//! Terminal elements (everything except links) are graph nodes; every
//! connection or inverter is a directed edge from its source to its target.
//! Node weights and edge weights are indices into the declaration list, so
//! the topology never holds references into element data.

use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

use crate::config::ElementConfig;
use crate::domain::ElementKind;
use crate::error::NetworkError;

/// One link as seen from the graph: `(link, source, target)` declaration
/// indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRef {
    pub link: usize,
    pub source: usize,
    pub target: usize,
}

#[derive(Debug, Clone)]
pub struct NetworkGraph {
    graph: StableDiGraph<usize, usize>,
    node_indices: HashMap<String, NodeIndex>,
    names: Vec<String>,
    kinds: Vec<ElementKind>,
}

impl NetworkGraph {
    /// Builds and validates the topology of `declarations`.
    pub fn try_new(declarations: &[ElementConfig]) -> Result<Self, NetworkError> {
        let names: Vec<String> = declarations.iter().map(ElementConfig::name).collect();
        let kinds: Vec<ElementKind> = declarations.iter().map(ElementConfig::kind).collect();

        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            if positions.insert(name.as_str(), i).is_some() {
                return Err(NetworkError::configuration(format!(
                    "Duplicate element name found: {name}"
                )));
            }
        }

        let mut graph = StableDiGraph::new();
        let mut node_indices = HashMap::new();
        for (i, kind) in kinds.iter().enumerate() {
            if !kind.is_link() {
                node_indices.insert(names[i].clone(), graph.add_node(i));
            }
        }

        let mut ng = Self {
            graph,
            node_indices,
            names,
            kinds,
        };
        for (i, declaration) in declarations.iter().enumerate() {
            if let Some((source, target)) = link_endpoints(declaration) {
                ng.add_link(i, source, target)?;
            }
        }
        ng.validate_attached()?;

        tracing::debug!(
            terminals = ng.graph.node_count(),
            links = ng.graph.edge_count(),
            "network graph validated"
        );
        Ok(ng)
    }

    fn add_link(&mut self, link: usize, source: &str, target: &str) -> Result<(), NetworkError> {
        let name = &self.names[link];
        if source == target {
            return Err(NetworkError::configuration(format!(
                "Connection `{name}` ({source} -> {target}) can't connect an element to itself."
            )));
        }

        let mut endpoints = [NodeIndex::end(); 2];
        for (slot, endpoint) in endpoints.iter_mut().zip([source, target]) {
            *slot = match self.node_indices.get(endpoint) {
                Some(idx) => *idx,
                None if self.names.iter().any(|n| n == endpoint) => {
                    return Err(NetworkError::configuration(format!(
                        "Connection `{name}` can't attach to link `{endpoint}`."
                    )));
                }
                None => {
                    return Err(NetworkError::configuration(format!(
                        "Connection `{name}` ({source} -> {target}) can't find an element named `{endpoint}`."
                    )));
                }
            };
        }

        let [source_idx, target_idx] = endpoints;
        let source_is_node = self.kind_at(source_idx).is_node();
        let target_is_node = self.kind_at(target_idx).is_node();
        if self.kinds[link] == ElementKind::Inverter && !(source_is_node && target_is_node) {
            return Err(NetworkError::configuration(format!(
                "Inverter `{name}` must connect two nodes, got {source} -> {target}."
            )));
        }
        if !source_is_node && !target_is_node {
            return Err(NetworkError::configuration(format!(
                "Connection `{name}` joins `{source}` and `{target}` directly; one end must be a node."
            )));
        }

        self.graph.add_edge(source_idx, target_idx, link);
        Ok(())
    }

    /// Every terminal other than a node needs at least one link, which by the
    /// endpoint rule reaches a node.
    fn validate_attached(&self) -> Result<(), NetworkError> {
        let mut detached = Vec::new();
        for idx in self.graph.node_indices() {
            let declaration = self.graph[idx];
            let degree = self.graph.edges_directed(idx, Direction::Incoming).count()
                + self.graph.edges_directed(idx, Direction::Outgoing).count();
            if degree > 0 {
                continue;
            }
            if self.kinds[declaration].is_node() {
                tracing::warn!(node = %self.names[declaration], "node has no connections");
            } else {
                detached.push(self.names[declaration].clone());
            }
        }
        if !detached.is_empty() {
            return Err(NetworkError::configuration(format!(
                "Elements {detached:?} are not connected to any node."
            )));
        }
        Ok(())
    }

    fn kind_at(&self, idx: NodeIndex) -> ElementKind {
        self.kinds[self.graph[idx]]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, declaration: usize) -> &str {
        &self.names[declaration]
    }

    pub fn kind(&self, declaration: usize) -> ElementKind {
        self.kinds[declaration]
    }

    /// Declaration index of the element called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// All links in declaration order.
    pub fn links(&self) -> Vec<LinkRef> {
        let mut links: Vec<_> = self
            .graph
            .edge_references()
            .map(|edge| LinkRef {
                link: *edge.weight(),
                source: self.graph[edge.source()],
                target: self.graph[edge.target()],
            })
            .collect();
        links.sort_by_key(|l| l.link);
        links
    }

    /// Links entering and leaving the terminal `declaration`.
    pub fn incident(&self, declaration: usize) -> (Vec<usize>, Vec<usize>) {
        let Some(idx) = self.node_indices.get(&self.names[declaration]) else {
            return (Vec::new(), Vec::new());
        };
        let collect = |dir| {
            let mut links: Vec<usize> = self
                .graph
                .edges_directed(*idx, dir)
                .map(|e| *e.weight())
                .collect();
            links.sort_unstable();
            links
        };
        (collect(Direction::Incoming), collect(Direction::Outgoing))
    }
}

fn link_endpoints(declaration: &ElementConfig) -> Option<(&str, &str)> {
    match declaration {
        ElementConfig::Connection(c) => Some((c.source.as_str(), c.target.as_str())),
        ElementConfig::Inverter(i) => Some((i.source.as_str(), i.target.as_str())),
        _ => None,
    }
}
