//! Mortar grids living on the interface between two grids.
use crate::error::AssemblyError;
use crate::Real;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// The mesh of an interface together with its projections onto the two adjacent grids.
///
/// The *primary* grid is the higher-dimensional neighbor, whose faces touch the interface.
/// The *secondary* grid is the lower-dimensional neighbor, whose cells overlap the interface.
/// Both projections map *integrated* quantities onto the mortar cells, i.e. row `i` of
/// [`MortarGrid::primary_to_mortar`] holds the weights with which the primary faces contribute
/// to mortar cell `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct MortarGrid<T> {
    num_cells: usize,
    primary_to_mortar: CsrMatrix<T>,
    secondary_to_mortar: CsrMatrix<T>,
}

impl<T: Real> MortarGrid<T> {
    /// Construct a mortar grid from its two projection matrices.
    ///
    /// Both matrices must have one row per mortar cell. Their column counts are checked against
    /// the adjacent grids once the mortar grid is attached to an edge of a graph.
    pub fn from_projections(
        primary_to_mortar: CsrMatrix<T>,
        secondary_to_mortar: CsrMatrix<T>,
    ) -> Result<Self, AssemblyError> {
        let num_cells = primary_to_mortar.nrows();
        if secondary_to_mortar.nrows() != num_cells {
            return Err(AssemblyError::configuration(format!(
                "mortar projections disagree on the number of mortar cells ({} vs. {})",
                num_cells,
                secondary_to_mortar.nrows()
            )));
        }
        Ok(Self {
            num_cells,
            primary_to_mortar,
            secondary_to_mortar,
        })
    }

    /// A mortar grid whose cells match the given primary faces and the secondary cells one-to-one.
    ///
    /// Mortar cell `i` coincides with primary face `primary_faces[i]` and secondary cell `i`.
    pub fn matching(
        primary_faces: &[usize],
        num_primary_faces: usize,
        num_secondary_cells: usize,
    ) -> Result<Self, AssemblyError> {
        if primary_faces.len() != num_secondary_cells {
            return Err(AssemblyError::configuration(format!(
                "cannot match {} primary faces with {} secondary cells",
                primary_faces.len(),
                num_secondary_cells
            )));
        }
        if let Some(&face) = primary_faces.iter().find(|&&face| face >= num_primary_faces) {
            return Err(AssemblyError::configuration(format!(
                "primary face {} is out of bounds ({} faces)",
                face, num_primary_faces
            )));
        }

        let num_cells = primary_faces.len();
        let mut primary = CooMatrix::new(num_cells, num_primary_faces);
        let mut secondary = CooMatrix::new(num_cells, num_secondary_cells);
        for (cell, &face) in primary_faces.iter().enumerate() {
            primary.push(cell, face, T::one());
            secondary.push(cell, cell, T::one());
        }
        Self::from_projections(CsrMatrix::from(&primary), CsrMatrix::from(&secondary))
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Projection of integrated primary face quantities onto the mortar cells.
    pub fn primary_to_mortar(&self) -> &CsrMatrix<T> {
        &self.primary_to_mortar
    }

    /// Projection of integrated secondary cell quantities onto the mortar cells.
    pub fn secondary_to_mortar(&self) -> &CsrMatrix<T> {
        &self.secondary_to_mortar
    }

    pub fn mortar_to_primary(&self) -> CsrMatrix<T> {
        self.primary_to_mortar.transpose()
    }

    pub fn mortar_to_secondary(&self) -> CsrMatrix<T> {
        self.secondary_to_mortar.transpose()
    }

    /// Averaging projection of secondary cell quantities (e.g. apertures) onto the mortar cells.
    ///
    /// Each row of the integrated projection is scaled to sum to one. Rows without entries
    /// are left empty.
    pub fn secondary_to_mortar_avg(&self) -> CsrMatrix<T> {
        let mut averaged = self.secondary_to_mortar.clone();
        for mut row in averaged.row_iter_mut() {
            let sum = row.values().iter().fold(T::zero(), |acc, &v| acc + v);
            if sum != T::zero() {
                for v in row.values_mut() {
                    *v /= sum;
                }
            }
        }
        averaged
    }
}
