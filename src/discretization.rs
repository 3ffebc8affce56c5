//! Discretization operators and the registry assigning them to nodes and edges.
use crate::coupling::CouplingOperator;
use crate::error::AssemblyError;
use crate::graph::{EdgeIndex, MixedDimGraph, NodeIndex, Owner};
use crate::grid::Grid;
use crate::params::Parameters;
use crate::variables::{DofSpec, VariableRegistry};
use crate::Real;
use eyre::eyre;
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Everything an operator gets to see when discretizing a variable on a single grid.
pub struct LocalContext<'a, T: Real, G> {
    pub node: NodeIndex,
    pub grid: &'a G,
    pub variable: &'a str,
    pub dofs: DofSpec,
    /// Size of the variable's block, i.e. the dimension of the expected local system.
    pub block_size: usize,
    /// All parameters of the node. Operators pick out their own keyword.
    pub parameters: &'a Parameters<T>,
    /// The current iterate of the variable, if one is available.
    pub state: Option<DVectorView<'a, T>>,
}

impl<'a, T: Real, G> Clone for LocalContext<'a, T, G> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            grid: self.grid,
            variable: self.variable,
            dofs: self.dofs,
            block_size: self.block_size,
            parameters: self.parameters,
            state: self.state.clone(),
        }
    }
}

/// A local (per grid and variable) linear system.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSystem<T: Real> {
    pub matrix: CsrMatrix<T>,
    pub rhs: DVector<T>,
}

impl<T: Real> LocalSystem<T> {
    pub fn new(matrix: CsrMatrix<T>, rhs: DVector<T>) -> Self {
        Self { matrix, rhs }
    }

    /// An empty system of dimension `n`.
    pub fn zeros(n: usize) -> Self {
        Self {
            matrix: CsrMatrix::zeros(n, n),
            rhs: DVector::zeros(n),
        }
    }

    /// Whether the matrix is `n x n` and the right-hand side has length `n`.
    pub fn has_size(&self, n: usize) -> bool {
        self.matrix.nrows() == n && self.matrix.ncols() == n && self.rhs.len() == n
    }

    /// Add another system of the same size to this one.
    pub fn add_assign(&mut self, other: &LocalSystem<T>) {
        self.matrix = &self.matrix + &other.matrix;
        self.rhs += &other.rhs;
    }
}

/// A discretization operator for a variable living on the cells, faces or nodes of a grid.
///
/// Operators must be pure functions of the grid, the parameters and the current iterate, so
/// that the same operator can be shared between many nodes and invoked in any order.
pub trait LocalOperator<T: Real, G: Grid>: Send + Sync {
    /// Compute the local matrix and right-hand side for the variable described by `context`.
    ///
    /// The matrix must be square with dimension `context.block_size`.
    fn assemble_local(&self, context: &LocalContext<T, G>) -> eyre::Result<LocalSystem<T>>;

    /// The trace operator, mapping the variable's degrees of freedom onto the faces of the grid.
    ///
    /// Returns a `num_faces x block_size` matrix. Coupling laws use it to evaluate the variable on
    /// the faces touching an interface. The default selects the first face degree of freedom and
    /// fails for variables without face degrees of freedom.
    fn face_trace(&self, context: &LocalContext<T, G>) -> eyre::Result<CsrMatrix<T>> {
        let counts = context.grid.entity_counts();
        if context.dofs.faces == 0 {
            return Err(eyre!(
                "variable '{}' has no face dofs, and the operator does not define a face trace",
                context.variable
            ));
        }
        let offset = context.dofs.face_offset(&counts);
        let mut trace = CooMatrix::new(counts.faces, context.block_size);
        for face in 0..counts.faces {
            trace.push(face, offset + face * context.dofs.faces, T::one());
        }
        Ok(CsrMatrix::from(&trace))
    }

    /// The restriction of the variable's degrees of freedom to one value per cell.
    ///
    /// Returns a `num_cells x block_size` matrix. The default selects the first cell degree of
    /// freedom and fails for variables without cell degrees of freedom.
    fn cell_restriction(&self, context: &LocalContext<T, G>) -> eyre::Result<CsrMatrix<T>> {
        let counts = context.grid.entity_counts();
        if context.dofs.cells == 0 {
            return Err(eyre!(
                "variable '{}' has no cell dofs, and the operator does not define a cell restriction",
                context.variable
            ));
        }
        let mut restriction = CooMatrix::new(counts.cells, context.block_size);
        for cell in 0..counts.cells {
            restriction.push(cell, cell * context.dofs.cells, T::one());
        }
        Ok(CsrMatrix::from(&restriction))
    }

    /// Derive a quantity (e.g. a flux) from the values of the variable.
    fn extract(
        &self,
        context: &LocalContext<T, G>,
        quantity: &str,
        values: DVectorView<T>,
    ) -> eyre::Result<DVector<T>> {
        let _ = (context, values);
        Err(eyre!("the operator does not provide the quantity '{}'", quantity))
    }
}

/// A named operator acting on a variable of a node.
pub struct DiscretizationEntry<T: Real, G: Grid> {
    pub variable: String,
    pub operator_name: String,
    pub operator: Arc<dyn LocalOperator<T, G>>,
}

impl<T: Real, G: Grid> fmt::Debug for DiscretizationEntry<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscretizationEntry")
            .field("variable", &self.variable)
            .field("operator_name", &self.operator_name)
            .finish_non_exhaustive()
    }
}

/// One side of a coupling term: a variable on a node together with the operator discretizing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub node: NodeIndex,
    pub variable: String,
    pub operator_name: String,
}

impl EndpointSpec {
    pub fn new(node: NodeIndex, variable: impl Into<String>, operator_name: impl Into<String>) -> Self {
        Self {
            node,
            variable: variable.into(),
            operator_name: operator_name.into(),
        }
    }
}

/// A coupling term on an edge, tying a mortar variable to variables on the two adjacent nodes.
pub struct CouplingEntry<T: Real, G: Grid> {
    pub term: String,
    pub primary: EndpointSpec,
    pub secondary: EndpointSpec,
    pub mortar_variable: String,
    pub coupling: Arc<dyn CouplingOperator<T, G>>,
}

impl<T: Real, G: Grid> CouplingEntry<T, G> {
    pub fn new(
        term: impl Into<String>,
        primary: EndpointSpec,
        secondary: EndpointSpec,
        mortar_variable: impl Into<String>,
        coupling: Arc<dyn CouplingOperator<T, G>>,
    ) -> Self {
        Self {
            term: term.into(),
            primary,
            secondary,
            mortar_variable: mortar_variable.into(),
            coupling,
        }
    }
}

impl<T: Real, G: Grid> fmt::Debug for CouplingEntry<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouplingEntry")
            .field("term", &self.term)
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .field("mortar_variable", &self.mortar_variable)
            .finish_non_exhaustive()
    }
}

/// Registry of the operators to invoke on every node and the coupling terms on every edge.
///
/// Several operators may act on the same variable of a node (e.g. a flux and a source term).
/// Their contributions are summed. Likewise, several coupling terms on the same edge add up.
pub struct DiscretizationRegistry<T: Real, G: Grid> {
    node_entries: BTreeMap<NodeIndex, Vec<DiscretizationEntry<T, G>>>,
    coupling_entries: BTreeMap<EdgeIndex, Vec<CouplingEntry<T, G>>>,
}

impl<T: Real, G: Grid> Default for DiscretizationRegistry<T, G> {
    fn default() -> Self {
        Self {
            node_entries: BTreeMap::new(),
            coupling_entries: BTreeMap::new(),
        }
    }
}

impl<T: Real, G: Grid> fmt::Debug for DiscretizationRegistry<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscretizationRegistry")
            .field("node_entries", &self.node_entries)
            .field("coupling_entries", &self.coupling_entries)
            .finish()
    }
}

impl<T: Real, G: Grid> DiscretizationRegistry<T, G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named operator for a variable on a node.
    ///
    /// Fails if the node already has an operator with the same name for the variable.
    pub fn register(
        &mut self,
        node: NodeIndex,
        variable: impl Into<String>,
        operator_name: impl Into<String>,
        operator: Arc<dyn LocalOperator<T, G>>,
    ) -> Result<(), AssemblyError> {
        let variable = variable.into();
        let operator_name = operator_name.into();
        let entries = self.node_entries.entry(node).or_default();
        if entries
            .iter()
            .any(|e| e.variable == variable && e.operator_name == operator_name)
        {
            return Err(AssemblyError::configuration_at(
                node,
                format!(
                    "operator '{}' is registered twice for variable '{}'",
                    operator_name, variable
                ),
            ));
        }
        entries.push(DiscretizationEntry {
            variable,
            operator_name,
            operator,
        });
        Ok(())
    }

    /// Add a coupling term to an edge.
    pub fn couple(&mut self, edge: EdgeIndex, entry: CouplingEntry<T, G>) {
        self.coupling_entries.entry(edge).or_default().push(entry);
    }

    /// Operators registered on a node, in registration order.
    pub fn node_entries(&self, node: NodeIndex) -> &[DiscretizationEntry<T, G>] {
        self.node_entries
            .get(&node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Coupling terms registered on an edge, in registration order.
    pub fn coupling_entries(&self, edge: EdgeIndex) -> &[CouplingEntry<T, G>] {
        self.coupling_entries
            .get(&edge)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look up the operator registered under the given name for a variable on a node.
    pub fn operator(
        &self,
        node: NodeIndex,
        variable: &str,
        operator_name: &str,
    ) -> Option<&Arc<dyn LocalOperator<T, G>>> {
        self.node_entries(node)
            .iter()
            .find(|e| e.variable == variable && e.operator_name == operator_name)
            .map(|e| &e.operator)
    }

    /// Check all registrations against the graph and the variable declarations.
    ///
    /// Every referenced node or edge must exist and have declared variables, every referenced
    /// variable must be declared, and the endpoints of a coupling term must be exactly the
    /// primary and secondary node of its edge, with operators registered for the endpoint
    /// variables.
    pub fn validate(&self, graph: &MixedDimGraph<G, T>, variables: &VariableRegistry) -> Result<(), AssemblyError> {
        for (&node, entries) in &self.node_entries {
            if entries.is_empty() {
                continue;
            }
            check_owner_declarations(graph, variables, node.into(), entries.len())?;
            for entry in entries {
                check_declared(variables, node.into(), &entry.variable)?;
            }
        }

        for (&edge, entries) in &self.coupling_entries {
            if entries.is_empty() {
                continue;
            }
            check_owner_declarations(graph, variables, edge.into(), entries.len())?;
            let (primary, secondary) = graph.nodes_of_edge(edge);
            for entry in entries {
                check_declared(variables, edge.into(), &entry.mortar_variable)?;
                if entry.primary.node != primary || entry.secondary.node != secondary {
                    return Err(AssemblyError::configuration_at(
                        edge,
                        format!(
                            "coupling term '{}' must couple {} and {}, but references {} and {}",
                            entry.term, primary, secondary, entry.primary.node, entry.secondary.node
                        ),
                    ));
                }
                for endpoint in [&entry.primary, &entry.secondary] {
                    check_declared(variables, endpoint.node.into(), &endpoint.variable)?;
                    if self
                        .operator(endpoint.node, &endpoint.variable, &endpoint.operator_name)
                        .is_none()
                    {
                        return Err(AssemblyError::configuration_at(
                            endpoint.node,
                            format!(
                                "coupling term '{}' on {} references operator '{}' for variable '{}', \
                                 which is not registered",
                                entry.term, edge, endpoint.operator_name, endpoint.variable
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_owner_declarations<G: Grid, T: Real>(
    graph: &MixedDimGraph<G, T>,
    variables: &VariableRegistry,
    owner: Owner,
    num_entries: usize,
) -> Result<(), AssemblyError> {
    if !graph.contains(owner) {
        return Err(AssemblyError::configuration_at(
            owner,
            "discretizations are registered on an entity that is not part of the graph",
        ));
    }
    if !variables.has_variables(owner) {
        return Err(AssemblyError::configuration_at(
            owner,
            format!(
                "no variables are declared, but {} discretization entries reference it",
                num_entries
            ),
        ));
    }
    Ok(())
}

fn check_declared(variables: &VariableRegistry, owner: Owner, variable: &str) -> Result<(), AssemblyError> {
    if variables.get(owner, variable).is_none() {
        return Err(AssemblyError::configuration_at(
            owner,
            format!("variable '{}' is referenced but not declared", variable),
        ));
    }
    Ok(())
}
