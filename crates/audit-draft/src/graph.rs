//! Version lineage
//!
//! Committed versions form a forest: each version points at the version it
//! was committed from. [`VersionGraph`] indexes the versions a client has
//! seen and answers lineage queries. It is read-only with respect to the
//! versions themselves.

use crate::error::GraphError;
use audit_model::{AnalysisVersion, GenericId, Scope, ScopeId, ScopeStrategy, VersionId};
use parking_lot::RwLock;
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How to pick the scope set of a new analysis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSelection {
    /// Exactly these scopes
    Explicit(Vec<ScopeId>),
    /// Every candidate scope
    All,
    /// Candidates whose generic id appears in this version
    Parent(VersionId),
}

impl ScopeSelection {
    /// Strategy recorded on the resulting version
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> ScopeStrategy {
        match self {
            Self::Explicit(_) => ScopeStrategy::Explicit,
            Self::All => ScopeStrategy::All,
            Self::Parent(_) => ScopeStrategy::Parent,
        }
    }
}

#[derive(Debug, Default)]
struct GraphInner {
    graph: DiGraph<VersionId, ()>,
    index: HashMap<VersionId, NodeIndex>,
    versions: HashMap<VersionId, Arc<AnalysisVersion>>,
}

impl GraphInner {
    fn node(&self, id: &VersionId) -> Result<NodeIndex, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownVersion(id.to_string()))
    }

    fn ids(&self, nodes: impl Iterator<Item = NodeIndex>) -> Vec<VersionId> {
        let mut ids: Vec<VersionId> = nodes.map(|n| self.graph[n].clone()).collect();
        ids.sort();
        ids
    }
}

/// Parent-linked index of known versions
///
/// Edges run parent to child. A version whose parent has not been seen yet
/// is kept as a root until the parent arrives.
#[derive(Debug, Default)]
pub struct VersionGraph {
    inner: RwLock<GraphInner>,
}

impl VersionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version
    ///
    /// # Errors
    /// Duplicate id, or parent links that would form a cycle
    pub fn insert(&self, version: impl Into<Arc<AnalysisVersion>>) -> Result<Arc<AnalysisVersion>, GraphError> {
        let version = version.into();
        let id = version.id().clone();

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.index.contains_key(&id) {
            return Err(GraphError::DuplicateVersion(id.to_string()));
        }

        let node = inner.graph.add_node(id.clone());
        inner.index.insert(id.clone(), node);

        if let Some(parent) = version.parent_version_id().and_then(|p| inner.index.get(p)) {
            inner.graph.add_edge(*parent, node, ());
        }
        let orphans: Vec<NodeIndex> = inner
            .versions
            .values()
            .filter(|v| v.parent_version_id() == Some(&id))
            .filter_map(|v| inner.index.get(v.id()).copied())
            .collect();
        for child in orphans {
            inner.graph.add_edge(node, child, ());
        }

        if is_cyclic_directed(&inner.graph) {
            // Newest node has the highest index, so removal does not reshuffle others
            inner.graph.remove_node(node);
            inner.index.remove(&id);
            return Err(GraphError::CycleDetected(id.to_string()));
        }

        inner.versions.insert(id.clone(), Arc::clone(&version));
        tracing::debug!(
            version = %id,
            parent = ?version.parent_version_id().map(VersionId::as_str),
            "version recorded"
        );
        Ok(version)
    }

    #[must_use]
    pub fn get(&self, id: &VersionId) -> Option<Arc<AnalysisVersion>> {
        self.inner.read().versions.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &VersionId) -> bool {
        self.inner.read().index.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parent of `id`, if both are known
    #[must_use]
    pub fn parent(&self, id: &VersionId) -> Option<Arc<AnalysisVersion>> {
        let inner = self.inner.read();
        let parent = inner.versions.get(id)?.parent_version_id()?;
        inner.versions.get(parent).cloned()
    }

    /// Direct children of `id`, sorted by id
    ///
    /// # Errors
    /// Unknown version
    pub fn children(&self, id: &VersionId) -> Result<Vec<VersionId>, GraphError> {
        let inner = self.inner.read();
        let node = inner.node(id)?;
        Ok(inner.ids(inner.graph.neighbors_directed(node, Direction::Outgoing)))
    }

    /// Every version reachable from `id`, excluding `id`, sorted by id
    ///
    /// # Errors
    /// Unknown version
    pub fn descendants(&self, id: &VersionId) -> Result<Vec<VersionId>, GraphError> {
        let inner = self.inner.read();
        let start = inner.node(id)?;
        let mut dfs = Dfs::new(&inner.graph, start);
        let mut reached = Vec::new();
        while let Some(node) = dfs.next(&inner.graph) {
            if node != start {
                reached.push(node);
            }
        }
        Ok(inner.ids(reached.into_iter()))
    }

    /// `id` followed by its ancestors, nearest first
    ///
    /// Stops at the first ancestor not in the graph.
    ///
    /// # Errors
    /// Unknown version
    pub fn lineage(&self, id: &VersionId) -> Result<Vec<VersionId>, GraphError> {
        let inner = self.inner.read();
        let mut node = inner.node(id)?;
        let mut lineage = vec![id.clone()];
        while let Some(parent) = inner.graph.neighbors_directed(node, Direction::Incoming).next() {
            lineage.push(inner.graph[parent].clone());
            node = parent;
        }
        Ok(lineage)
    }

    /// Versions with no known parent
    #[must_use]
    pub fn roots(&self) -> Vec<VersionId> {
        let inner = self.inner.read();
        let g = &inner.graph;
        inner.ids(
            g.node_indices()
                .filter(|n| g.neighbors_directed(*n, Direction::Incoming).next().is_none()),
        )
    }

    /// Versions nothing has been committed on top of
    #[must_use]
    pub fn heads(&self) -> Vec<VersionId> {
        let inner = self.inner.read();
        let g = &inner.graph;
        inner.ids(
            g.node_indices()
                .filter(|n| g.neighbors_directed(*n, Direction::Outgoing).next().is_none()),
        )
    }

    /// Whether `descendant` was committed, directly or transitively, from `ancestor`
    #[must_use]
    pub fn is_ancestor(&self, ancestor: &VersionId, descendant: &VersionId) -> bool {
        let inner = self.inner.read();
        match (inner.index.get(ancestor), inner.index.get(descendant)) {
            (Some(&a), Some(&d)) if a != d => has_path_connecting(&inner.graph, a, d, None),
            _ => false,
        }
    }

    /// Pick the scopes of a new run from `candidates`, keeping candidate order
    ///
    /// Parent matching is best-effort by generic id; scopes of the parent
    /// with no counterpart among the candidates are skipped.
    ///
    /// # Errors
    /// `Parent` naming a version not in the graph
    pub fn select_scopes(&self, selection: &ScopeSelection, candidates: &[Scope]) -> Result<Vec<Scope>, GraphError> {
        let selected: Vec<Scope> = match selection {
            ScopeSelection::All => candidates.to_vec(),
            ScopeSelection::Explicit(ids) => {
                let wanted: HashSet<&ScopeId> = ids.iter().collect();
                candidates
                    .iter()
                    .filter(|scope| wanted.contains(&scope.id))
                    .cloned()
                    .collect()
            }
            ScopeSelection::Parent(parent_id) => {
                let parent = self
                    .get(parent_id)
                    .ok_or_else(|| GraphError::UnknownVersion(parent_id.to_string()))?;
                let generics: HashSet<&GenericId> = parent.scopes().iter().map(|s| &s.generic_id).collect();
                candidates
                    .iter()
                    .filter(|scope| generics.contains(&scope.generic_id))
                    .cloned()
                    .collect()
            }
        };

        tracing::debug!(
            strategy = ?selection.strategy(),
            candidates = candidates.len(),
            selected = selected.len(),
            "scopes selected"
        );
        Ok(selected)
    }
}
