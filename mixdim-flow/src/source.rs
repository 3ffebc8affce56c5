use mixdim::discretization::{LocalContext, LocalOperator, LocalSystem};
use mixdim::grid::Grid;
use mixdim::params::names;
use mixdim::Real;
use eyre::eyre;

/// An integrated scalar source term, added to the right-hand side of the first dof of every cell.
///
/// Reads the required `source` parameter (scalar or per-cell array) under its keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarSource {
    keyword: String,
}

impl ScalarSource {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }
}

impl<T: Real, G: Grid> LocalOperator<T, G> for ScalarSource {
    fn assemble_local(&self, context: &LocalContext<T, G>) -> eyre::Result<LocalSystem<T>> {
        if context.dofs.cells == 0 {
            return Err(eyre!("a source term requires cell dofs on '{}'", context.variable));
        }
        let num_cells = context.grid.num_cells();
        let source = context
            .parameters
            .array(&self.keyword, names::SOURCE, num_cells)?;
        let mut system = LocalSystem::zeros(context.block_size);
        for (cell, &value) in source.iter().enumerate() {
            system.rhs[cell * context.dofs.cells] += value;
        }
        Ok(system)
    }
}
