//! Finite volume flow discretizations for `mixdim`.
//!
//! Provides a two-point flux approximation ([`Tpfa`]) of Darcy flow on the Cartesian grids of a
//! mixed-dimensional graph, a cell-wise [`ScalarSource`], helpers for computing the parameters
//! of the Robin coupling between fractures and the surrounding matrix, and the
//! [`FluxProjection`] of interface fluxes onto the faces and cells of the grids.
use eyre::eyre;
use mixdim::mortar::MortarGrid;
use mixdim::Real;
use nalgebra::DVector;

mod flux;
mod source;
mod tpfa;

pub use flux::*;
pub use source::*;
pub use tpfa::*;

/// Normal diffusivity on the mortar cells of an interface, given the apertures of the
/// lower-dimensional grid.
///
/// Computes `kn = kf / avg(a^(1 / (2 - dim)))`, where each secondary aperture `a` is raised to
/// the power before it is averaged onto the mortar cells, and `dim` is the dimension of the
/// secondary grid, which must be 0 or 1.
pub fn normal_diffusivity_from_aperture<T: Real>(
    normal_permeability: T,
    mortar: &MortarGrid<T>,
    secondary_apertures: &DVector<T>,
    secondary_dim: usize,
) -> eyre::Result<DVector<T>> {
    if secondary_dim >= 2 {
        return Err(eyre!(
            "normal diffusivity from aperture is only defined for grids of dimension 0 or 1, got {}",
            secondary_dim
        ));
    }
    let averaging = mortar.secondary_to_mortar_avg();
    if averaging.ncols() != secondary_apertures.len() {
        return Err(eyre!(
            "expected {} apertures, got {}",
            averaging.ncols(),
            secondary_apertures.len()
        ));
    }
    if let Some((cell, a)) = secondary_apertures
        .iter()
        .enumerate()
        .find(|&(_, &a)| a <= T::zero())
    {
        return Err(eyre!("non-positive aperture {} on secondary cell {}", a, cell));
    }
    let exponent = T::one() / nalgebra::convert::<f64, T>((2 - secondary_dim) as f64);
    let scaled_apertures = secondary_apertures.map(|a| a.powf(exponent));
    let mortar_apertures = &averaging * &scaled_apertures;
    mortar_apertures
        .iter()
        .enumerate()
        .map(|(cell, &a)| {
            if a > T::zero() {
                Ok(normal_permeability / a)
            } else {
                Err(eyre!("mortar cell {} does not overlap any secondary cell", cell))
            }
        })
        .collect::<eyre::Result<Vec<_>>>()
        .map(DVector::from_vec)
}
