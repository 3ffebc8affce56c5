//! Declarations of the primary variables living on nodes and edges.
use crate::error::AssemblyError;
use crate::graph::Owner;
use crate::grid::EntityCounts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of degrees of freedom a variable occupies per cell, face and node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DofSpec {
    pub cells: usize,
    pub faces: usize,
    pub nodes: usize,
}

impl DofSpec {
    pub fn new(cells: usize, faces: usize, nodes: usize) -> Self {
        Self { cells, faces, nodes }
    }

    /// `n` degrees of freedom per cell and none elsewhere.
    pub fn cells(n: usize) -> Self {
        Self::new(n, 0, 0)
    }

    /// `n` degrees of freedom per face and none elsewhere.
    pub fn faces(n: usize) -> Self {
        Self::new(0, n, 0)
    }

    /// `n` degrees of freedom per node and none elsewhere.
    pub fn nodes(n: usize) -> Self {
        Self::new(0, 0, n)
    }

    pub fn with_cells(self, cells: usize) -> Self {
        Self { cells, ..self }
    }

    pub fn with_faces(self, faces: usize) -> Self {
        Self { faces, ..self }
    }

    pub fn with_nodes(self, nodes: usize) -> Self {
        Self { nodes, ..self }
    }

    /// Whether at least one of the per-entity counts is positive.
    pub fn is_valid(&self) -> bool {
        self.cells > 0 || self.faces > 0 || self.nodes > 0
    }

    /// Total number of degrees of freedom on a mesh with the given entity counts.
    ///
    /// Returns `None` on overflow.
    pub fn block_size(&self, counts: &EntityCounts) -> Option<usize> {
        let cells = self.cells.checked_mul(counts.cells)?;
        let faces = self.faces.checked_mul(counts.faces)?;
        let nodes = self.nodes.checked_mul(counts.nodes)?;
        cells.checked_add(faces)?.checked_add(nodes)
    }

    /// Offset of the first face degree of freedom within the variable's block.
    ///
    /// Within a block, all cell degrees of freedom come first (entity by entity),
    /// followed by face and then node degrees of freedom.
    pub fn face_offset(&self, counts: &EntityCounts) -> usize {
        self.cells * counts.cells
    }

    /// Offset of the first node degree of freedom within the variable's block.
    pub fn node_offset(&self, counts: &EntityCounts) -> usize {
        self.cells * counts.cells + self.faces * counts.faces
    }
}

/// A named variable declared on some owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub name: String,
    pub dofs: DofSpec,
}

/// Registry of the variables declared on every node and edge.
///
/// Names are unique per owner but may repeat across owners. Variables are kept in declaration
/// order. Every change bumps the [revision](VariableRegistry::revision), which allows DOF layouts
/// computed from an earlier state to be detected as stale.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    declarations: BTreeMap<Owner, Vec<VariableDeclaration>>,
    revision: u64,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable on a node or an edge.
    ///
    /// Fails if the owner already has a variable with the same name, if no per-entity count is
    /// positive, or if a variable on an edge declares face or node degrees of freedom
    /// (mortar grids only expose cells).
    pub fn declare(
        &mut self,
        owner: impl Into<Owner>,
        name: impl Into<String>,
        dofs: DofSpec,
    ) -> Result<(), AssemblyError> {
        let owner = owner.into();
        let name = name.into();
        if !dofs.is_valid() {
            return Err(AssemblyError::configuration_at(
                owner,
                format!("variable '{}' must have a positive number of dofs per cell, face or node", name),
            ));
        }
        if matches!(owner, Owner::Edge(_)) && (dofs.faces > 0 || dofs.nodes > 0) {
            return Err(AssemblyError::configuration_at(
                owner,
                format!("mortar variable '{}' can only carry cell dofs", name),
            ));
        }

        let variables = self.declarations.entry(owner).or_default();
        if variables.iter().any(|v| v.name == name) {
            return Err(AssemblyError::configuration_at(
                owner,
                format!("variable '{}' is declared twice", name),
            ));
        }
        variables.push(VariableDeclaration { name, dofs });
        self.revision += 1;
        Ok(())
    }

    /// Remove a variable declaration, returning its dof specification if it existed.
    pub fn remove(&mut self, owner: impl Into<Owner>, name: &str) -> Option<DofSpec> {
        let owner = owner.into();
        let variables = self.declarations.get_mut(&owner)?;
        let position = variables.iter().position(|v| v.name == name)?;
        let removed = variables.remove(position);
        if variables.is_empty() {
            self.declarations.remove(&owner);
        }
        self.revision += 1;
        Some(removed.dofs)
    }

    /// Variables declared on the owner, in declaration order.
    pub fn variables(&self, owner: impl Into<Owner>) -> &[VariableDeclaration] {
        self.declarations
            .get(&owner.into())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, owner: impl Into<Owner>, name: &str) -> Option<DofSpec> {
        self.variables(owner)
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.dofs)
    }

    pub fn has_variables(&self, owner: impl Into<Owner>) -> bool {
        !self.variables(owner).is_empty()
    }

    /// All owners with at least one declaration, nodes before edges.
    pub fn owners(&self) -> impl Iterator<Item = Owner> + '_ {
        self.declarations.keys().copied()
    }

    /// Counter incremented on every change to the declarations.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
