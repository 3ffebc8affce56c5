//! The mixed-dimensional graph: grids as nodes, mortar interfaces as edges.
use crate::error::AssemblyError;
use crate::grid::{EntityCounts, Grid};
use crate::mortar::MortarGrid;
use crate::Real;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node (grid) in a [`MixedDimGraph`], in insertion order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub usize);

/// Index of an edge (interface) in a [`MixedDimGraph`], in insertion order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeIndex(pub usize);

/// Anything that can own variables: a node or an edge of the graph.
///
/// The ordering places all nodes before all edges, which is the traversal order used
/// for the global numbering of degrees of freedom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Owner {
    Node(NodeIndex),
    Edge(EdgeIndex),
}

impl From<NodeIndex> for Owner {
    fn from(node: NodeIndex) -> Self {
        Owner::Node(node)
    }
}

impl From<EdgeIndex> for Owner {
    fn from(edge: EdgeIndex) -> Self {
        Owner::Edge(edge)
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

impl fmt::Display for EdgeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge {}", self.0)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Node(node) => node.fmt(f),
            Owner::Edge(edge) => edge.fmt(f),
        }
    }
}

/// An interface joining two nodes of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge<T> {
    primary: NodeIndex,
    secondary: NodeIndex,
    mortar: MortarGrid<T>,
}

impl<T> Edge<T> {
    /// The higher-dimensional node.
    pub fn primary(&self) -> NodeIndex {
        self.primary
    }

    /// The lower-dimensional node.
    pub fn secondary(&self) -> NodeIndex {
        self.secondary
    }

    pub fn mortar(&self) -> &MortarGrid<T> {
        &self.mortar
    }
}

/// A network of grids of different dimension connected pairwise by mortar interfaces.
///
/// Nodes and edges are identified by their insertion order, which also fixes the order in
/// which degrees of freedom are numbered.
///
/// The graph only enforces that the primary node of an edge is not of lower dimension than the
/// secondary node. Edges whose dimension gap differs from one are accepted so that their mortar
/// variables can still be laid out; whether a coupling law exists for them is decided when
/// coupling discretizations are selected (see [`crate::coupling::resolve_coupling`]).
#[derive(Debug, Clone)]
pub struct MixedDimGraph<G, T> {
    nodes: Vec<G>,
    edges: Vec<Edge<T>>,
}

impl<G, T> Default for MixedDimGraph<G, T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<G, T> MixedDimGraph<G, T>
where
    G: Grid,
    T: Real,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, grid: G) -> NodeIndex {
        self.nodes.push(grid);
        NodeIndex(self.nodes.len() - 1)
    }

    /// Connect two nodes by an interface.
    ///
    /// Fails with a configuration error if either node does not exist, if the nodes coincide or
    /// are already connected, if `primary` has a lower dimension than `secondary`, or if the
    /// mortar projections do not match the face count of the primary grid and the cell count
    /// of the secondary grid.
    pub fn add_edge(
        &mut self,
        primary: NodeIndex,
        secondary: NodeIndex,
        mortar: MortarGrid<T>,
    ) -> Result<EdgeIndex, AssemblyError> {
        let primary_grid = self
            .try_node(primary)
            .ok_or_else(|| AssemblyError::configuration(format!("{} does not exist", primary)))?;
        let secondary_grid = self
            .try_node(secondary)
            .ok_or_else(|| AssemblyError::configuration(format!("{} does not exist", secondary)))?;

        if primary == secondary {
            return Err(AssemblyError::configuration_at(
                primary,
                "an interface cannot connect a grid to itself",
            ));
        }
        if self.edge_between(primary, secondary).is_some() {
            return Err(AssemblyError::configuration(format!(
                "{} and {} are already connected",
                primary, secondary
            )));
        }
        if primary_grid.dim() < secondary_grid.dim() {
            return Err(AssemblyError::configuration(format!(
                "primary {} has dimension {}, lower than the dimension {} of secondary {}",
                primary,
                primary_grid.dim(),
                secondary_grid.dim(),
                secondary
            )));
        }
        if mortar.primary_to_mortar().ncols() != primary_grid.num_faces() {
            return Err(AssemblyError::configuration(format!(
                "primary projection has {} columns, but {} has {} faces",
                mortar.primary_to_mortar().ncols(),
                primary,
                primary_grid.num_faces()
            )));
        }
        if mortar.secondary_to_mortar().ncols() != secondary_grid.num_cells() {
            return Err(AssemblyError::configuration(format!(
                "secondary projection has {} columns, but {} has {} cells",
                mortar.secondary_to_mortar().ncols(),
                secondary,
                secondary_grid.num_cells()
            )));
        }

        self.edges.push(Edge {
            primary,
            secondary,
            mortar,
        });
        Ok(EdgeIndex(self.edges.len() - 1))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// # Panics
    ///
    /// Panics if the node does not exist.
    pub fn node(&self, node: NodeIndex) -> &G {
        &self.nodes[node.0]
    }

    pub fn try_node(&self, node: NodeIndex) -> Option<&G> {
        self.nodes.get(node.0)
    }

    /// # Panics
    ///
    /// Panics if the edge does not exist.
    pub fn edge(&self, edge: EdgeIndex) -> &Edge<T> {
        &self.edges[edge.0]
    }

    pub fn try_edge(&self, edge: EdgeIndex) -> Option<&Edge<T>> {
        self.edges.get(edge.0)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl ExactSizeIterator<Item = (NodeIndex, &G)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, grid)| (NodeIndex(idx), grid))
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl ExactSizeIterator<Item = (EdgeIndex, &Edge<T>)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(idx, edge)| (EdgeIndex(idx), edge))
    }

    /// All owners of the graph: nodes first, then edges, each in insertion order.
    pub fn owners(&self) -> impl Iterator<Item = Owner> {
        let nodes = (0..self.nodes.len()).map(|idx| Owner::Node(NodeIndex(idx)));
        let edges = (0..self.edges.len()).map(|idx| Owner::Edge(EdgeIndex(idx)));
        nodes.chain(edges)
    }

    pub fn contains(&self, owner: Owner) -> bool {
        match owner {
            Owner::Node(node) => node.0 < self.nodes.len(),
            Owner::Edge(edge) => edge.0 < self.edges.len(),
        }
    }

    /// The (primary, secondary) nodes of an edge.
    pub fn nodes_of_edge(&self, edge: EdgeIndex) -> (NodeIndex, NodeIndex) {
        let edge = self.edge(edge);
        (edge.primary, edge.secondary)
    }

    /// Edges incident to a node, in insertion order.
    pub fn edges_of_node(&self, node: NodeIndex) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.edges()
            .filter(move |(_, edge)| edge.primary == node || edge.secondary == node)
            .map(|(idx, _)| idx)
    }

    pub fn edge_between(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.edges()
            .find(|(_, edge)| (edge.primary, edge.secondary) == (a, b) || (edge.primary, edge.secondary) == (b, a))
            .map(|(idx, _)| idx)
    }

    /// Dimensions of the (primary, secondary) grids joined by an edge.
    pub fn edge_dims(&self, edge: EdgeIndex) -> (usize, usize) {
        let (primary, secondary) = self.nodes_of_edge(edge);
        (self.node(primary).dim(), self.node(secondary).dim())
    }

    /// The mesh entities available for degrees of freedom on an owner.
    ///
    /// Edges only carry cell degrees of freedom, on the cells of their mortar grid.
    ///
    /// # Panics
    ///
    /// Panics if the owner does not exist.
    pub fn entity_counts(&self, owner: Owner) -> EntityCounts {
        match owner {
            Owner::Node(node) => self.node(node).entity_counts(),
            Owner::Edge(edge) => EntityCounts {
                cells: self.edge(edge).mortar.num_cells(),
                faces: 0,
                nodes: 0,
            },
        }
    }

    /// Dimension of the grid of a node, or of the mortar grid of an edge.
    ///
    /// The mortar grid has the dimension of the secondary grid.
    pub fn dim(&self, owner: Owner) -> usize {
        match owner {
            Owner::Node(node) => self.node(node).dim(),
            Owner::Edge(edge) => self.node(self.edge(edge).secondary).dim(),
        }
    }
}
