//! Post-processing of Darcy fluxes on a mixed-dimensional graph.
use eyre::eyre;
use log::debug;
use mixdim::coupling::RobinCoupling;
use mixdim::graph::MixedDimGraph;
use mixdim::grid::{CartesianGrid, Grid};
use mixdim::params::{ParameterStore, Parameters};
use mixdim::store::VariableStore;
use mixdim::Real;
use nalgebra::{DVector, Vector3};

/// Completes the face fluxes of the primary grids with the fluxes carried by the mortar
/// variables, and reconstructs a piecewise constant flux field in every cell.
///
/// Face fluxes are expected in the store under `face_flux` on every node, as produced by
/// extracting `"darcy_flux"` from a [`Tpfa`](crate::Tpfa) operator. Interface faces are left as
/// homogeneous Neumann faces by the operator, so their face flux only becomes meaningful once the
/// mortar flux `κ λ` is projected onto them.
#[derive(Debug, Clone)]
pub struct FluxProjection<'a> {
    pub coupling: &'a RobinCoupling,
    pub mortar_variable: &'a str,
    pub face_flux: &'a str,
    pub cell_flux: &'a str,
}

impl<'a> FluxProjection<'a> {
    /// Adds the mortar fluxes to the face fluxes of the primary grids, then stores the cell fluxes
    /// of every node with face fluxes under `cell_flux`.
    ///
    /// Cell fluxes are stored as `3 * num_cells` values, with the three components of each cell
    /// stored contiguously. Edges without stored mortar values are skipped.
    pub fn apply<T: Real>(
        &self,
        graph: &MixedDimGraph<CartesianGrid<T>, T>,
        parameters: &ParameterStore<T>,
        store: &mut VariableStore<T>,
    ) -> eyre::Result<()> {
        let no_parameters = Parameters::new();
        for (edge_idx, edge) in graph.edges() {
            let lambda = match store.get(edge_idx, self.mortar_variable) {
                Some(lambda) => lambda,
                None => continue,
            };
            let mortar = edge.mortar();
            if lambda.len() != mortar.num_cells() {
                return Err(eyre!(
                    "expected {} values of '{}' on {}, got {}",
                    mortar.num_cells(),
                    self.mortar_variable,
                    edge_idx,
                    lambda.len()
                ));
            }
            let edge_parameters = parameters.get(edge_idx).unwrap_or(&no_parameters);
            let kappa = self
                .coupling
                .transmissibility(edge_parameters, mortar.num_cells())?;
            let mortar_flux = kappa.component_mul(lambda);
            // Flux leaving the primary grid through each of its faces
            let mortar_to_primary = mortar.mortar_to_primary();
            let outflow = &mortar_to_primary * &mortar_flux;

            let primary = edge.primary();
            let grid = graph.node(primary);
            let mut flux = store
                .get(primary, self.face_flux)
                .ok_or_else(|| eyre!("no '{}' is stored on {}", self.face_flux, primary))?
                .clone();
            if flux.len() != grid.num_faces() {
                return Err(eyre!(
                    "expected {} values of '{}' on {}, got {}",
                    grid.num_faces(),
                    self.face_flux,
                    primary,
                    flux.len()
                ));
            }
            for (face, row) in mortar_to_primary.row_iter().enumerate() {
                if row.nnz() == 0 {
                    continue;
                }
                flux[face] += match grid.face_cells()[face] {
                    [Some(_), None] => outflow[face],
                    [None, Some(_)] => -outflow[face],
                    _ => return Err(eyre!("interface face {} of {} is not a boundary face", face, primary)),
                };
            }
            store.insert(primary, self.face_flux, flux);
            debug!(
                "Projected '{}' of {} onto the faces of {}",
                self.mortar_variable, edge_idx, primary
            );
        }

        for (node, grid) in graph.nodes() {
            let face_flux = match store.get(node, self.face_flux) {
                Some(face_flux) => face_flux,
                None => continue,
            };
            let cell_flux = reconstruct_cell_flux(grid, face_flux)?;
            let values = DVector::from_iterator(
                3 * cell_flux.len(),
                cell_flux.iter().flat_map(|u| u.iter().copied()),
            );
            store.insert(node, self.cell_flux, values);
        }
        Ok(())
    }
}

/// Reconstructs a constant flux vector in every cell from integrated face fluxes oriented along
/// the face normals.
///
/// The flux in cell `c` is `sum_f s_cf F_f (x_f - x_c) / |c|`, where `s_cf` is `1` if the normal
/// of face `f` points out of `c` and `-1` otherwise. The reconstruction is exact for uniform
/// flux fields.
pub fn reconstruct_cell_flux<T: Real>(
    grid: &CartesianGrid<T>,
    face_flux: &DVector<T>,
) -> eyre::Result<Vec<Vector3<T>>> {
    if face_flux.len() != grid.num_faces() {
        return Err(eyre!(
            "expected {} face fluxes, got {}",
            grid.num_faces(),
            face_flux.len()
        ));
    }
    let mut cell_flux = vec![Vector3::zeros(); grid.num_cells()];
    for (face, cells) in grid.face_cells().iter().enumerate() {
        let center = grid.face_centers()[face];
        for (side, cell) in cells.iter().enumerate() {
            if let Some(cell) = *cell {
                let sign = if side == 0 { T::one() } else { -T::one() };
                cell_flux[cell] += (center - grid.cell_centers()[cell]) * (sign * face_flux[face]);
            }
        }
    }
    for (cell, (u, &volume)) in cell_flux
        .iter_mut()
        .zip(grid.cell_volumes())
        .enumerate()
    {
        if volume <= T::zero() {
            return Err(eyre!("cell {} has non-positive volume {}", cell, volume));
        }
        *u /= volume;
    }
    Ok(cell_flux)
}
