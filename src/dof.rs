//! Global numbering of degrees of freedom.
//!
//! The layout is a pure function of the graph and the variable declarations: nodes come first,
//! then edges, each in insertion order, and the variables of an owner follow in declaration
//! order. Every variable occupies one contiguous block, so blocks never overlap and together
//! cover `0..total_dofs` without gaps.
use crate::discretization::DiscretizationRegistry;
use crate::error::AssemblyError;
use crate::graph::{MixedDimGraph, Owner};
use crate::grid::Grid;
use crate::store::VariableStore;
use crate::variables::{DofSpec, VariableRegistry};
use crate::Real;
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A contiguous range of global degrees of freedom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: usize,
    pub size: usize,
}

impl BlockRange {
    pub fn new(start: usize, size: usize) -> Self {
        Self { start, size }
    }

    pub fn end(&self) -> usize {
        self.start + self.size
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }
}

/// The block of a single variable on a single owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofBlock {
    pub owner: Owner,
    pub variable: String,
    pub dofs: DofSpec,
    pub range: BlockRange,
}

/// Mapping from (owner, variable) pairs to ranges of global degrees of freedom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofMap {
    blocks: Vec<DofBlock>,
    total_dofs: usize,
    revision: u64,
}

impl DofMap {
    /// Lay out the declared variables of all nodes and edges of the graph.
    ///
    /// Fails if variables are declared on an owner that is not part of the graph, or if the
    /// total number of degrees of freedom cannot be represented.
    pub fn from_declarations<G, T>(
        graph: &MixedDimGraph<G, T>,
        variables: &VariableRegistry,
    ) -> Result<Self, AssemblyError>
    where
        G: Grid,
        T: Real,
    {
        if let Some(owner) = variables.owners().find(|&owner| !graph.contains(owner)) {
            return Err(AssemblyError::configuration_at(
                owner,
                "variables are declared on an entity that is not part of the graph",
            ));
        }

        let mut blocks = Vec::new();
        let mut total_dofs: usize = 0;
        for owner in graph.owners() {
            let counts = graph.entity_counts(owner);
            for declaration in variables.variables(owner) {
                let size = declaration
                    .dofs
                    .block_size(&counts)
                    .ok_or_else(|| overflow_error(owner, &declaration.name))?;
                let start = total_dofs;
                total_dofs = total_dofs
                    .checked_add(size)
                    .filter(|&total| total <= isize::MAX as usize)
                    .ok_or_else(|| overflow_error(owner, &declaration.name))?;
                debug!(
                    "Variable '{}' on {} occupies dofs {}..{}",
                    declaration.name,
                    owner,
                    start,
                    start + size
                );
                blocks.push(DofBlock {
                    owner,
                    variable: declaration.name.clone(),
                    dofs: declaration.dofs,
                    range: BlockRange::new(start, size),
                });
            }
        }

        Ok(Self {
            blocks,
            total_dofs,
            revision: variables.revision(),
        })
    }

    /// Validate the discretization registry against the declarations, then lay out the variables.
    pub fn build<G, T>(
        graph: &MixedDimGraph<G, T>,
        variables: &VariableRegistry,
        discretizations: &DiscretizationRegistry<T, G>,
    ) -> Result<Self, AssemblyError>
    where
        G: Grid,
        T: Real,
    {
        discretizations.validate(graph, variables)?;
        Self::from_declarations(graph, variables)
    }

    pub fn total_dofs(&self) -> usize {
        self.total_dofs
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The revision of the variable registry the layout was computed from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the layout still reflects the given registry.
    ///
    /// Besides the revision, the blocks are compared with the declarations, so that a registry
    /// cloned and modified independently is not mistaken for the one the layout was built from.
    pub fn is_current(&self, variables: &VariableRegistry) -> bool {
        self.revision == variables.revision() && self.matches_declarations(variables)
    }

    fn matches_declarations(&self, variables: &VariableRegistry) -> bool {
        let num_declared: usize = variables
            .owners()
            .map(|owner| variables.variables(owner).len())
            .sum();
        num_declared == self.blocks.len()
            && variables.owners().all(|owner| {
                let blocks = self.blocks_of(owner);
                let declarations = variables.variables(owner);
                blocks.len() == declarations.len()
                    && blocks
                        .iter()
                        .zip(declarations)
                        .all(|(block, declaration)| {
                            block.variable == declaration.name && block.dofs == declaration.dofs
                        })
            })
    }

    /// All blocks in global order.
    pub fn blocks(&self) -> &[DofBlock] {
        &self.blocks
    }

    /// Sizes of all blocks in global order.
    pub fn block_sizes(&self) -> Vec<usize> {
        self.blocks.iter().map(|block| block.range.size).collect()
    }

    /// Blocks of a single owner, in declaration order.
    pub fn blocks_of(&self, owner: impl Into<Owner>) -> &[DofBlock] {
        let owner = owner.into();
        // Blocks are sorted by owner, since nodes precede edges and both follow insertion order
        let begin = self.blocks.partition_point(|block| block.owner < owner);
        let end = self.blocks.partition_point(|block| block.owner <= owner);
        &self.blocks[begin..end]
    }

    /// The global range of a variable on an owner.
    pub fn block(&self, owner: impl Into<Owner>, variable: &str) -> Option<BlockRange> {
        self.blocks_of(owner)
            .iter()
            .find(|block| block.variable == variable)
            .map(|block| block.range)
    }

    /// Find the block containing a global index, together with the local index within the block.
    pub fn locate(&self, index: usize) -> Option<(&DofBlock, usize)> {
        if index >= self.total_dofs {
            return None;
        }
        // Skip empty blocks sharing their start with the block that holds the index
        let position = self.blocks.partition_point(|block| block.range.end() <= index);
        let block = self.blocks.get(position)?;
        Some((block, index - block.range.start))
    }

    /// Assemble a global vector from values in the store.
    ///
    /// Blocks without stored values are filled with zeros.
    pub fn gather<T: Real>(&self, store: &VariableStore<T>) -> Result<DVector<T>, AssemblyError> {
        let mut global = DVector::zeros(self.total_dofs);
        for block in &self.blocks {
            if let Some(values) = store.get(block.owner, &block.variable) {
                if values.len() != block.range.size {
                    return Err(AssemblyError::DimensionMismatch {
                        expected: block.range.size,
                        actual: values.len(),
                    });
                }
                global
                    .rows_mut(block.range.start, block.range.size)
                    .copy_from(values);
            }
        }
        Ok(global)
    }

    /// Split a global vector into per-variable values and write them to the store.
    ///
    /// Fails without touching the store if the layout no longer reflects the registry, or if the
    /// vector length differs from the number of degrees of freedom.
    pub fn distribute<T: Real>(
        &self,
        variables: &VariableRegistry,
        solution: &DVector<T>,
        store: &mut VariableStore<T>,
    ) -> Result<(), AssemblyError> {
        if self.revision != variables.revision() {
            return Err(AssemblyError::configuration(format!(
                "the dof layout was computed for revision {} of the variable declarations, \
                 but the current revision is {}",
                self.revision,
                variables.revision()
            )));
        }
        if !self.matches_declarations(variables) {
            return Err(AssemblyError::configuration(
                "the dof layout does not match the variable declarations",
            ));
        }
        if solution.len() != self.total_dofs {
            return Err(AssemblyError::DimensionMismatch {
                expected: self.total_dofs,
                actual: solution.len(),
            });
        }
        for block in &self.blocks {
            let values = solution
                .rows(block.range.start, block.range.size)
                .into_owned();
            store.insert(block.owner, &block.variable, values);
        }
        Ok(())
    }
}

fn overflow_error(owner: Owner, variable: &str) -> AssemblyError {
    AssemblyError::configuration_at(
        owner,
        format!(
            "the number of degrees of freedom overflows when laying out variable '{}'",
            variable
        ),
    )
}
