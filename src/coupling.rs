//! Coupling laws acting across the mortar interfaces of the graph.
//!
//! A coupling law receives the mortar grid of an edge together with the two adjacent nodes
//! ("endpoints") and returns blocks of the global system indexed by [`BlockRole`]. The assembler
//! takes care of placing those blocks at the right global positions.
use crate::discretization::{
    CouplingEntry, DiscretizationRegistry, EndpointSpec, LocalContext, LocalOperator, LocalSystem,
};
use crate::dof::BlockRange;
use crate::error::AssemblyError;
use crate::graph::{EdgeIndex, MixedDimGraph, NodeIndex};
use crate::grid::Grid;
use crate::mortar::MortarGrid;
use crate::params::{names, Parameters};
use crate::variables::{DofSpec, VariableRegistry};
use crate::Real;
use eyre::eyre;
use log::{debug, warn};
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::sync::Arc;

/// The three variable blocks touched by a coupling term.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockRole {
    /// The mortar variable on the edge.
    Mortar,
    /// The variable on the higher-dimensional node.
    Primary,
    /// The variable on the lower-dimensional node.
    Secondary,
}

/// A variable on one of the two nodes adjacent to an edge.
pub struct Endpoint<'a, T: Real, G> {
    pub node: NodeIndex,
    pub grid: &'a G,
    pub variable: &'a str,
    pub dofs: DofSpec,
    pub block: BlockRange,
    /// The operator discretizing the variable on the node.
    pub operator: &'a dyn LocalOperator<T, G>,
    pub parameters: &'a Parameters<T>,
    pub state: Option<DVectorView<'a, T>>,
    /// The local system produced for the variable in the node pass, if the node was assembled.
    pub local_system: Option<&'a LocalSystem<T>>,
}

impl<'a, T: Real, G: Grid> Endpoint<'a, T, G> {
    /// The context in which the endpoint operator was (or would be) invoked on its node.
    pub fn context(&self) -> LocalContext<'a, T, G> {
        LocalContext {
            node: self.node,
            grid: self.grid,
            variable: self.variable,
            dofs: self.dofs,
            block_size: self.block.size,
            parameters: self.parameters,
            state: self.state.clone(),
        }
    }

    pub fn face_trace(&self) -> eyre::Result<CsrMatrix<T>> {
        self.operator.face_trace(&self.context())
    }

    pub fn cell_restriction(&self) -> eyre::Result<CsrMatrix<T>> {
        self.operator.cell_restriction(&self.context())
    }
}

/// Everything a coupling law gets to see when discretizing a term on an edge.
pub struct InterfaceContext<'a, T: Real, G> {
    pub edge: EdgeIndex,
    pub term: &'a str,
    pub mortar: &'a MortarGrid<T>,
    pub mortar_variable: &'a str,
    pub mortar_dofs: DofSpec,
    pub mortar_block: BlockRange,
    /// Parameters of the edge.
    pub parameters: &'a Parameters<T>,
    pub primary: Endpoint<'a, T, G>,
    pub secondary: Endpoint<'a, T, G>,
}

impl<'a, T: Real, G> InterfaceContext<'a, T, G> {
    /// Global range of the block playing the given role.
    pub fn block(&self, role: BlockRole) -> BlockRange {
        match role {
            BlockRole::Mortar => self.mortar_block,
            BlockRole::Primary => self.primary.block,
            BlockRole::Secondary => self.secondary.block,
        }
    }
}

/// Blocks produced by a coupling law, to be added to the global system.
///
/// A matrix for `(row, col)` must have the size of the `row` block times the size of the `col`
/// block. The same pair of roles may appear several times, in which case the blocks are summed.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceContribution<T: Real> {
    matrices: Vec<(BlockRole, BlockRole, CsrMatrix<T>)>,
    vectors: Vec<(BlockRole, DVector<T>)>,
}

impl<T: Real> Default for InterfaceContribution<T> {
    fn default() -> Self {
        Self {
            matrices: Vec::new(),
            vectors: Vec::new(),
        }
    }
}

impl<T: Real> InterfaceContribution<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_matrix(&mut self, row: BlockRole, col: BlockRole, matrix: CsrMatrix<T>) {
        self.matrices.push((row, col, matrix));
    }

    pub fn add_vector(&mut self, role: BlockRole, vector: DVector<T>) {
        self.vectors.push((role, vector));
    }

    pub fn with_matrix(mut self, row: BlockRole, col: BlockRole, matrix: CsrMatrix<T>) -> Self {
        self.add_matrix(row, col, matrix);
        self
    }

    pub fn with_vector(mut self, role: BlockRole, vector: DVector<T>) -> Self {
        self.add_vector(role, vector);
        self
    }

    pub fn matrices(&self) -> &[(BlockRole, BlockRole, CsrMatrix<T>)] {
        &self.matrices
    }

    pub fn vectors(&self) -> &[(BlockRole, DVector<T>)] {
        &self.vectors
    }
}

/// A law relating a mortar variable to variables on the two grids adjacent to an interface.
pub trait CouplingOperator<T: Real, G: Grid>: Send + Sync {
    /// Whether the law applies to an interface between grids of the given dimensions.
    ///
    /// The default accepts interfaces between grids whose dimensions differ by exactly one.
    fn supports(&self, primary_dim: usize, secondary_dim: usize) -> bool {
        primary_dim == secondary_dim + 1
    }

    fn assemble_interface(&self, context: &InterfaceContext<T, G>) -> eyre::Result<InterfaceContribution<T>>;
}

/// A Robin-type coupling law for diffusion problems.
///
/// The mortar variable `λ` is the interface flux normalized by the normal transmissibility `κ`,
/// and satisfies on every mortar cell
///
/// ```text
/// κ λ = κ (Π_p tr p_p - Π_s p_s),
/// ```
///
/// where `tr p_p` is the trace of the primary variable on the primary faces and `p_s` the
/// secondary cell values. The flux `κ λ` leaves the primary variable through the interface
/// faces and enters the secondary variable as a source.
///
/// The transmissibility is read from the edge parameters under the law's keyword: the
/// `normal_diffusivity`, divided by half the `aperture` if one is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobinCoupling {
    keyword: String,
}

impl RobinCoupling {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// The normal transmissibility on every mortar cell.
    pub fn transmissibility<T: Real>(
        &self,
        parameters: &Parameters<T>,
        num_mortar_cells: usize,
    ) -> eyre::Result<DVector<T>> {
        let mut kappa = parameters.array(&self.keyword, names::NORMAL_DIFFUSIVITY, num_mortar_cells)?;
        if let Some(aperture) = parameters.optional_array(&self.keyword, names::APERTURE, num_mortar_cells)? {
            let two = T::one() + T::one();
            for (cell, (k, &a)) in kappa.iter_mut().zip(aperture.iter()).enumerate() {
                if a <= T::zero() {
                    return Err(eyre!("non-positive aperture {} on mortar cell {}", a, cell));
                }
                *k = two * *k / a;
            }
        }
        Ok(kappa)
    }
}

impl<T: Real, G: Grid> CouplingOperator<T, G> for RobinCoupling {
    fn assemble_interface(&self, context: &InterfaceContext<T, G>) -> eyre::Result<InterfaceContribution<T>> {
        if context.mortar_dofs != DofSpec::cells(1) {
            return Err(eyre!(
                "Robin coupling requires exactly one mortar dof per cell, but '{}' has {:?}",
                context.mortar_variable,
                context.mortar_dofs
            ));
        }
        let n = context.mortar.num_cells();
        let kappa = self.transmissibility(context.parameters, n)?;

        // Mortar projections of the primary trace and the secondary cell values
        let primary_trace = context.primary.face_trace()?;
        check_shape(
            "primary face trace",
            &primary_trace,
            context.primary.grid.num_faces(),
            context.primary.block.size,
        )?;
        let secondary_cells = context.secondary.cell_restriction()?;
        check_shape(
            "secondary cell restriction",
            &secondary_cells,
            context.secondary.grid.num_cells(),
            context.secondary.block.size,
        )?;
        let pi_primary = context.mortar.primary_to_mortar() * &primary_trace;
        let pi_secondary = context.mortar.secondary_to_mortar() * &secondary_cells;

        let minus_kappa = -kappa.clone();
        let k_pi_primary = scale_rows(&pi_primary, &kappa);
        let k_pi_secondary = scale_rows(&pi_secondary, &kappa);

        let contribution = InterfaceContribution::new()
            .with_matrix(BlockRole::Mortar, BlockRole::Mortar, diagonal(&kappa))
            .with_matrix(BlockRole::Mortar, BlockRole::Primary, scale_rows(&pi_primary, &minus_kappa))
            .with_matrix(BlockRole::Mortar, BlockRole::Secondary, k_pi_secondary.clone())
            .with_matrix(BlockRole::Primary, BlockRole::Mortar, k_pi_primary.transpose())
            .with_matrix(
                BlockRole::Secondary,
                BlockRole::Mortar,
                scale_rows(&pi_secondary, &minus_kappa).transpose(),
            );
        debug!(
            "Robin coupling on {} with {} mortar cells (term '{}')",
            context.edge, n, context.term
        );
        Ok(contribution)
    }
}

fn check_shape<T>(what: &str, matrix: &CsrMatrix<T>, nrows: usize, ncols: usize) -> eyre::Result<()> {
    if matrix.nrows() != nrows || matrix.ncols() != ncols {
        return Err(eyre!(
            "{} has shape {}x{}, expected {}x{}",
            what,
            matrix.nrows(),
            matrix.ncols(),
            nrows,
            ncols
        ));
    }
    Ok(())
}

/// Multiply row `i` of the matrix by `factors[i]`.
fn scale_rows<T: Real>(matrix: &CsrMatrix<T>, factors: &DVector<T>) -> CsrMatrix<T> {
    let mut scaled = matrix.clone();
    for (mut row, &factor) in scaled.row_iter_mut().zip(factors.iter()) {
        for v in row.values_mut() {
            *v *= factor;
        }
    }
    scaled
}

fn diagonal<T: Real>(values: &DVector<T>) -> CsrMatrix<T> {
    let n = values.len();
    let mut coo = CooMatrix::new(n, n);
    for (i, &v) in values.iter().enumerate() {
        coo.push(i, i, v);
    }
    CsrMatrix::from(&coo)
}

/// Check that a coupling law applies to the dimensions of the grids joined by an edge.
///
/// Returns the law itself if it applies, and a [`AssemblyError::CouplingResolution`] otherwise.
///
/// # Panics
///
/// Panics if the edge does not exist.
pub fn resolve_coupling<G, T>(
    graph: &MixedDimGraph<G, T>,
    edge: EdgeIndex,
    law: Arc<dyn CouplingOperator<T, G>>,
) -> Result<Arc<dyn CouplingOperator<T, G>>, AssemblyError>
where
    G: Grid,
    T: Real,
{
    let (primary_dim, secondary_dim) = graph.edge_dims(edge);
    if law.supports(primary_dim, secondary_dim) {
        Ok(law)
    } else {
        Err(AssemblyError::CouplingResolution {
            edge,
            primary_dim,
            secondary_dim,
        })
    }
}

/// How to treat edges for which no coupling law applies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CouplingPolicy {
    /// Report a [`AssemblyError::CouplingResolution`].
    #[default]
    Fail,
    /// Leave the edge uncoupled and log a warning. The mortar variable is still declared, so the
    /// edge keeps its block in the layout (with no contributions).
    SkipWithWarning,
}

/// Declares the same mortar variable and coupling law on every edge of a graph.
///
/// This mirrors the common setup of a single-physics problem: every node carries a variable
/// discretized by an operator registered under a common name, and every interface carries a
/// mortar variable coupling the primary and secondary variable.
pub struct CouplingSetup<T: Real, G: Grid> {
    pub term: String,
    pub node_variable: String,
    pub node_operator: String,
    pub mortar_variable: String,
    pub mortar_dofs: DofSpec,
    pub law: Arc<dyn CouplingOperator<T, G>>,
}

impl<T: Real, G: Grid> CouplingSetup<T, G> {
    /// A setup with one mortar dof per mortar cell.
    pub fn new(
        term: impl Into<String>,
        node_variable: impl Into<String>,
        node_operator: impl Into<String>,
        mortar_variable: impl Into<String>,
        law: Arc<dyn CouplingOperator<T, G>>,
    ) -> Self {
        Self {
            term: term.into(),
            node_variable: node_variable.into(),
            node_operator: node_operator.into(),
            mortar_variable: mortar_variable.into(),
            mortar_dofs: DofSpec::cells(1),
            law,
        }
    }

    /// Declare the mortar variable on every edge and register the coupling term where the law applies.
    ///
    /// Returns the edges that were left uncoupled under [`CouplingPolicy::SkipWithWarning`].
    pub fn apply(
        &self,
        graph: &MixedDimGraph<G, T>,
        variables: &mut VariableRegistry,
        discretizations: &mut DiscretizationRegistry<T, G>,
        policy: CouplingPolicy,
    ) -> Result<Vec<EdgeIndex>, AssemblyError> {
        let mut skipped = Vec::new();
        for (edge_idx, edge) in graph.edges() {
            variables.declare(edge_idx, self.mortar_variable.as_str(), self.mortar_dofs)?;
            match resolve_coupling(graph, edge_idx, Arc::clone(&self.law)) {
                Ok(law) => {
                    let entry = CouplingEntry::new(
                        self.term.as_str(),
                        EndpointSpec::new(edge.primary(), self.node_variable.as_str(), self.node_operator.as_str()),
                        EndpointSpec::new(edge.secondary(), self.node_variable.as_str(), self.node_operator.as_str()),
                        self.mortar_variable.as_str(),
                        law,
                    );
                    discretizations.couple(edge_idx, entry);
                }
                Err(err @ AssemblyError::CouplingResolution { .. }) if policy == CouplingPolicy::SkipWithWarning => {
                    warn!("{}. Leaving the interface uncoupled.", err);
                    skipped.push(edge_idx);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(skipped)
    }
}
