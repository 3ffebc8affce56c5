//! Assembly of the global system of a mixed-dimensional problem.
//!
//! Assembly proceeds in two passes over the graph. The node pass invokes every operator
//! registered on a node and adds the resulting local system to the diagonal block of its
//! variable. The edge pass invokes the coupling laws of every edge, which may read the local
//! systems and operators of the adjacent nodes, and adds the resulting blocks to the mortar and
//! node rows and columns. Contributions are always added, never overwritten.
use crate::coupling::{Endpoint, InterfaceContext};
use crate::discretization::{CouplingEntry, DiscretizationEntry, DiscretizationRegistry, LocalContext, LocalSystem};
use crate::dof::{BlockRange, DofMap};
use crate::error::AssemblyError;
use crate::graph::{Edge, EdgeIndex, MixedDimGraph, NodeIndex, Owner};
use crate::grid::Grid;
use crate::params::{ParameterStore, Parameters};
use crate::store::VariableStore;
use crate::variables::{DofSpec, VariableRegistry};
use crate::Real;
use eyre::eyre;
use log::{debug, info};
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// The assembled global system together with the layout it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSystem<T: Real> {
    pub matrix: CsrMatrix<T>,
    pub rhs: DVector<T>,
    pub dof_map: DofMap,
}

impl<T: Real> AssembledSystem<T> {
    pub fn num_dofs(&self) -> usize {
        self.dof_map.total_dofs()
    }

    /// The global range of a variable on an owner.
    pub fn block(&self, owner: impl Into<Owner>, variable: &str) -> Option<BlockRange> {
        self.dof_map.block(owner, variable)
    }
}

/// Builder for [`MixedDimAssembler`].
///
/// The graph, the variable and discretization registries and the parameters must all be
/// provided before the assembler can be built.
pub struct MixedDimAssemblerBuilder<GraphRef, VariablesRef, DiscretizationsRef, ParametersRef> {
    graph: GraphRef,
    variables: VariablesRef,
    discretizations: DiscretizationsRef,
    parameters: ParametersRef,
}

impl MixedDimAssemblerBuilder<(), (), (), ()> {
    pub fn new() -> Self {
        Self {
            graph: (),
            variables: (),
            discretizations: (),
            parameters: (),
        }
    }
}

impl Default for MixedDimAssemblerBuilder<(), (), (), ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, D, P> MixedDimAssemblerBuilder<(), V, D, P> {
    pub fn with_graph<G, T>(
        self,
        graph: &MixedDimGraph<G, T>,
    ) -> MixedDimAssemblerBuilder<&MixedDimGraph<G, T>, V, D, P> {
        MixedDimAssemblerBuilder {
            graph,
            variables: self.variables,
            discretizations: self.discretizations,
            parameters: self.parameters,
        }
    }
}

impl<G, D, P> MixedDimAssemblerBuilder<G, (), D, P> {
    pub fn with_variables(self, variables: &VariableRegistry) -> MixedDimAssemblerBuilder<G, &VariableRegistry, D, P> {
        MixedDimAssemblerBuilder {
            graph: self.graph,
            variables,
            discretizations: self.discretizations,
            parameters: self.parameters,
        }
    }
}

impl<G, V, P> MixedDimAssemblerBuilder<G, V, (), P> {
    pub fn with_discretizations<D>(self, discretizations: &D) -> MixedDimAssemblerBuilder<G, V, &D, P> {
        MixedDimAssemblerBuilder {
            graph: self.graph,
            variables: self.variables,
            discretizations,
            parameters: self.parameters,
        }
    }
}

impl<G, V, D> MixedDimAssemblerBuilder<G, V, D, ()> {
    pub fn with_parameters<T: Real>(
        self,
        parameters: &ParameterStore<T>,
    ) -> MixedDimAssemblerBuilder<G, V, D, &ParameterStore<T>> {
        MixedDimAssemblerBuilder {
            graph: self.graph,
            variables: self.variables,
            discretizations: self.discretizations,
            parameters,
        }
    }
}

impl<'a, G, T>
    MixedDimAssemblerBuilder<
        &'a MixedDimGraph<G, T>,
        &'a VariableRegistry,
        &'a DiscretizationRegistry<T, G>,
        &'a ParameterStore<T>,
    >
where
    G: Grid,
    T: Real,
{
    pub fn build(self) -> MixedDimAssembler<'a, T, G> {
        MixedDimAssembler {
            graph: self.graph,
            variables: self.variables,
            discretizations: self.discretizations,
            parameters: self.parameters,
            state: None,
            no_parameters: Parameters::new(),
        }
    }
}

/// Assembles the global system of a mixed-dimensional problem and distributes its solution.
///
/// The assembler only borrows its inputs, so the declarations cannot change while it is alive.
/// A layout obtained from [`MixedDimAssembler::dof_map`] may however outlive the assembler, and
/// is then checked for staleness when used with [`DofMap::distribute`].
pub struct MixedDimAssembler<'a, T: Real, G: Grid> {
    graph: &'a MixedDimGraph<G, T>,
    variables: &'a VariableRegistry,
    discretizations: &'a DiscretizationRegistry<T, G>,
    parameters: &'a ParameterStore<T>,
    state: Option<&'a VariableStore<T>>,
    no_parameters: Parameters<T>,
}

type NodeSystems<T> = BTreeMap<(NodeIndex, String), LocalSystem<T>>;

/// A single operator invocation in the node pass.
struct NodeTask<'b, T: Real, G: Grid> {
    node: NodeIndex,
    grid: &'b G,
    entry: &'b DiscretizationEntry<T, G>,
    dofs: DofSpec,
    block: BlockRange,
}

impl<'a, T: Real, G: Grid> MixedDimAssembler<'a, T, G> {
    /// Provide the current iterate of the variables, which operators may read during assembly.
    pub fn with_state(self, state: &'a VariableStore<T>) -> Self {
        Self {
            state: Some(state),
            ..self
        }
    }

    /// Validate the registrations and compute the current layout.
    pub fn dof_map(&self) -> Result<DofMap, AssemblyError> {
        DofMap::build(self.graph, self.variables, self.discretizations)
    }

    /// Assemble the global matrix and right-hand side.
    ///
    /// Either the complete system is returned, or the first error encountered.
    pub fn assemble(&self) -> Result<AssembledSystem<T>, AssemblyError> {
        let dof_map = self.dof_map()?;
        info!(
            "Assembling mixed-dimensional system with {} dofs in {} blocks",
            dof_map.total_dofs(),
            dof_map.num_blocks()
        );
        let tasks = self.node_tasks(&dof_map)?;
        let local_systems = tasks
            .iter()
            .map(|task| self.run_node_task(task))
            .collect::<Result<Vec<_>, _>>()?;
        self.finish_assembly(dof_map, &tasks, local_systems)
    }

    /// Assemble the global system like [`MixedDimAssembler::assemble`], computing the local
    /// systems of the node pass in parallel.
    ///
    /// Local systems are summed in the same order as in serial assembly, so the result is
    /// identical to the serial result.
    pub fn par_assemble(&self) -> Result<AssembledSystem<T>, AssemblyError>
    where
        G: Sync,
        T: Send + Sync,
    {
        let dof_map = self.dof_map()?;
        info!(
            "Assembling mixed-dimensional system with {} dofs in {} blocks (parallel node pass)",
            dof_map.total_dofs(),
            dof_map.num_blocks()
        );
        let tasks = self.node_tasks(&dof_map)?;
        let local_systems = tasks
            .par_iter()
            .map(|task| self.run_node_task(task))
            .collect::<Result<Vec<_>, _>>()?;
        self.finish_assembly(dof_map, &tasks, local_systems)
    }

    /// Split a solution of the assembled system into per-variable values.
    pub fn distribute(&self, solution: &DVector<T>, store: &mut VariableStore<T>) -> Result<(), AssemblyError> {
        let dof_map = DofMap::from_declarations(self.graph, self.variables)?;
        dof_map.distribute(self.variables, solution, store)?;
        debug!("Distributed {} dofs into {} variables", dof_map.total_dofs(), dof_map.num_blocks());
        Ok(())
    }

    /// Derive a quantity from the stored values of a variable on every node where the named
    /// operator is registered for it, storing the result under the name of the quantity.
    ///
    /// Typical use is the reconstruction of fluxes after a pressure solution has been distributed.
    pub fn extract(
        &self,
        store: &mut VariableStore<T>,
        variable: &str,
        operator_name: &str,
        quantity: &str,
    ) -> Result<(), AssemblyError> {
        let mut extracted = Vec::new();
        for (node, grid) in self.graph.nodes() {
            let entry = match self
                .discretizations
                .node_entries(node)
                .iter()
                .find(|e| e.variable == variable && e.operator_name == operator_name)
            {
                Some(entry) => entry,
                None => continue,
            };
            let dofs = self.declared_dofs(node.into(), variable)?;
            let values = store.get(node, variable).ok_or_else(|| {
                AssemblyError::configuration_at(
                    node,
                    format!("no values are stored for variable '{}'", variable),
                )
            })?;
            let context = LocalContext {
                node,
                grid,
                variable,
                dofs,
                block_size: values.len(),
                parameters: self.parameters_of(node.into()),
                state: Some(DVectorView::from(values)),
            };
            let result = entry
                .operator
                .extract(&context, quantity, DVectorView::from(values))
                .map_err(|err| AssemblyError::discretization(node, variable, operator_name, err))?;
            extracted.push((node, result));
        }
        for (node, values) in extracted {
            store.insert(node, quantity, values);
        }
        Ok(())
    }

    fn parameters_of(&self, owner: Owner) -> &Parameters<T> {
        self.parameters
            .get(owner)
            .unwrap_or(&self.no_parameters)
    }

    fn declared_dofs(&self, owner: Owner, variable: &str) -> Result<DofSpec, AssemblyError> {
        self.variables.get(owner, variable).ok_or_else(|| {
            AssemblyError::configuration_at(owner, format!("variable '{}' is not declared", variable))
        })
    }

    fn state_of(
        &self,
        owner: Owner,
        variable: &str,
        block: BlockRange,
    ) -> Result<Option<DVectorView<'a, T>>, AssemblyError> {
        let values = match self.state.and_then(|state| state.get(owner, variable)) {
            Some(values) => values,
            None => return Ok(None),
        };
        if values.len() != block.size {
            return Err(AssemblyError::DimensionMismatch {
                expected: block.size,
                actual: values.len(),
            });
        }
        Ok(Some(DVectorView::from(values)))
    }

    fn node_tasks<'b>(&'b self, dof_map: &DofMap) -> Result<Vec<NodeTask<'b, T, G>>, AssemblyError> {
        let mut tasks = Vec::new();
        for (node, grid) in self.graph.nodes() {
            for entry in self.discretizations.node_entries(node) {
                let block = dof_map.block(node, &entry.variable).ok_or_else(|| {
                    AssemblyError::configuration_at(
                        node,
                        format!("variable '{}' has no block in the dof layout", entry.variable),
                    )
                })?;
                tasks.push(NodeTask {
                    node,
                    grid,
                    entry,
                    dofs: self.declared_dofs(node.into(), &entry.variable)?,
                    block,
                });
            }
        }
        Ok(tasks)
    }

    fn run_node_task(&self, task: &NodeTask<T, G>) -> Result<LocalSystem<T>, AssemblyError> {
        let entry = task.entry;
        let wrap =
            |err: eyre::Report| AssemblyError::discretization(task.node, &entry.variable, &entry.operator_name, err);
        let context = LocalContext {
            node: task.node,
            grid: task.grid,
            variable: &entry.variable,
            dofs: task.dofs,
            block_size: task.block.size,
            parameters: self.parameters_of(task.node.into()),
            state: self.state_of(task.node.into(), &entry.variable, task.block)?,
        };
        let system = entry.operator.assemble_local(&context).map_err(wrap)?;
        if !system.has_size(task.block.size) {
            return Err(wrap(eyre!(
                "local system has matrix shape {}x{} and rhs length {}, expected dimension {}",
                system.matrix.nrows(),
                system.matrix.ncols(),
                system.rhs.len(),
                task.block.size
            )));
        }
        debug!(
            "Operator '{}' on {} produced {} entries for variable '{}'",
            entry.operator_name,
            task.node,
            system.matrix.nnz(),
            entry.variable
        );
        Ok(system)
    }

    fn finish_assembly(
        &self,
        dof_map: DofMap,
        tasks: &[NodeTask<T, G>],
        local_systems: Vec<LocalSystem<T>>,
    ) -> Result<AssembledSystem<T>, AssemblyError> {
        // Sum the contributions of all operators acting on the same variable
        let mut node_systems = NodeSystems::new();
        for (task, system) in tasks.iter().zip(local_systems) {
            let key = (task.node, task.entry.variable.clone());
            match node_systems.get_mut(&key) {
                Some(existing) => existing.add_assign(&system),
                None => {
                    node_systems.insert(key, system);
                }
            }
        }

        let n = dof_map.total_dofs();
        let mut coo = CooMatrix::new(n, n);
        let mut rhs = DVector::zeros(n);

        for ((node, variable), system) in &node_systems {
            // Presence of the block was checked when the tasks were created
            if let Some(block) = dof_map.block(*node, variable) {
                add_block(&mut coo, &system.matrix, block.start, block.start);
                add_to_rhs(&mut rhs, &system.rhs, block.start);
            }
        }

        for (edge_idx, edge) in self.graph.edges() {
            let entries = self.discretizations.coupling_entries(edge_idx);
            if entries.is_empty() {
                debug!("{} has no coupling terms", edge_idx);
            }
            for entry in entries {
                self.assemble_coupling_term(edge_idx, edge, entry, &dof_map, &node_systems, &mut coo, &mut rhs)?;
            }
        }

        let matrix = CsrMatrix::from(&coo);
        info!("Assembled global matrix with {} stored entries", matrix.nnz());
        Ok(AssembledSystem { matrix, rhs, dof_map })
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_coupling_term(
        &self,
        edge_idx: EdgeIndex,
        edge: &Edge<T>,
        entry: &CouplingEntry<T, G>,
        dof_map: &DofMap,
        node_systems: &NodeSystems<T>,
        coo: &mut CooMatrix<T>,
        rhs: &mut DVector<T>,
    ) -> Result<(), AssemblyError> {
        let (primary_dim, secondary_dim) = self.graph.edge_dims(edge_idx);
        if !entry.coupling.supports(primary_dim, secondary_dim) {
            return Err(AssemblyError::CouplingResolution {
                edge: edge_idx,
                primary_dim,
                secondary_dim,
            });
        }

        let mortar_block = self.block_of(dof_map, edge_idx.into(), &entry.mortar_variable)?;
        let context = InterfaceContext {
            edge: edge_idx,
            term: &entry.term,
            mortar: edge.mortar(),
            mortar_variable: &entry.mortar_variable,
            mortar_dofs: self.declared_dofs(edge_idx.into(), &entry.mortar_variable)?,
            mortar_block,
            parameters: self.parameters_of(edge_idx.into()),
            primary: self.endpoint(
                edge.primary(),
                &entry.primary.variable,
                &entry.primary.operator_name,
                dof_map,
                node_systems,
            )?,
            secondary: self.endpoint(
                edge.secondary(),
                &entry.secondary.variable,
                &entry.secondary.operator_name,
                dof_map,
                node_systems,
            )?,
        };

        let wrap =
            |err: eyre::Report| AssemblyError::discretization(edge_idx, &entry.mortar_variable, &entry.term, err);
        let contribution = entry.coupling.assemble_interface(&context).map_err(wrap)?;

        for (row, col, matrix) in contribution.matrices() {
            let (row_block, col_block) = (context.block(*row), context.block(*col));
            if matrix.nrows() != row_block.size || matrix.ncols() != col_block.size {
                return Err(wrap(eyre!(
                    "block ({:?}, {:?}) has shape {}x{}, expected {}x{}",
                    row,
                    col,
                    matrix.nrows(),
                    matrix.ncols(),
                    row_block.size,
                    col_block.size
                )));
            }
        }
        for (role, vector) in contribution.vectors() {
            let block = context.block(*role);
            if vector.len() != block.size {
                return Err(wrap(eyre!(
                    "right-hand side block {:?} has length {}, expected {}",
                    role,
                    vector.len(),
                    block.size
                )));
            }
        }

        for (row, col, matrix) in contribution.matrices() {
            add_block(coo, matrix, context.block(*row).start, context.block(*col).start);
        }
        for (role, vector) in contribution.vectors() {
            add_to_rhs(rhs, vector, context.block(*role).start);
        }
        debug!(
            "Coupling term '{}' on {} contributed {} blocks",
            entry.term,
            edge_idx,
            contribution.matrices().len()
        );
        Ok(())
    }

    fn block_of(&self, dof_map: &DofMap, owner: Owner, variable: &str) -> Result<BlockRange, AssemblyError> {
        dof_map.block(owner, variable).ok_or_else(|| {
            AssemblyError::configuration_at(
                owner,
                format!("variable '{}' has no block in the dof layout", variable),
            )
        })
    }

    fn endpoint<'b>(
        &'b self,
        node: NodeIndex,
        variable: &'b str,
        operator_name: &str,
        dof_map: &DofMap,
        node_systems: &'b NodeSystems<T>,
    ) -> Result<Endpoint<'b, T, G>, AssemblyError> {
        let operator = self
            .discretizations
            .operator(node, variable, operator_name)
            .ok_or_else(|| {
                AssemblyError::configuration_at(
                    node,
                    format!(
                        "operator '{}' is not registered for variable '{}'",
                        operator_name, variable
                    ),
                )
            })?;
        let block = self.block_of(dof_map, node.into(), variable)?;
        Ok(Endpoint {
            node,
            grid: self.graph.node(node),
            variable,
            dofs: self.declared_dofs(node.into(), variable)?,
            block,
            operator: operator.as_ref(),
            parameters: self.parameters_of(node.into()),
            state: self.state_of(node.into(), variable, block)?,
            local_system: node_systems.get(&(node, variable.to_string())),
        })
    }
}

fn add_block<T: Real>(coo: &mut CooMatrix<T>, block: &CsrMatrix<T>, row_offset: usize, col_offset: usize) {
    for (i, j, &v) in block.triplet_iter() {
        coo.push(row_offset + i, col_offset + j, v);
    }
}

fn add_to_rhs<T: Real>(rhs: &mut DVector<T>, values: &DVector<T>, offset: usize) {
    let mut rows = rhs.rows_mut(offset, values.len());
    rows += values;
}
