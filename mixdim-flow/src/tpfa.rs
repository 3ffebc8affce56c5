//! Two-point flux approximation of Darcy flow on Cartesian grids.
use itertools::izip;
use mixdim::discretization::{LocalContext, LocalOperator, LocalSystem};
use mixdim::grid::{CartesianGrid, Grid};
use mixdim::params::{names, BoundaryCondition, Parameters};
use mixdim::variables::DofSpec;
use mixdim::Real;
use eyre::eyre;
use log::debug;
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use numeric_literals::replace_float_literals;

/// Cell-centered two-point flux approximation of `-div(K grad p) = f`.
///
/// The operator discretizes a pressure with one dof per cell. It reads the following parameters
/// under its keyword:
///
/// - `second_order_tensor` (required): the permeability, as scalar, per-cell array or tensor.
/// - `aperture` (optional): scales all half transmissibilities of a cell, which turns the
///   permeability of a fracture into its integrated conductivity.
/// - `bc` (optional): classification of boundary faces. Unclassified faces are Neumann faces.
/// - `bc_values` (optional): Dirichlet pressures, or Neumann fluxes integrated over the face
///   and oriented along the face normal. Defaults to zero.
///
/// Interface faces should be left as homogeneous Neumann faces. The flux across them is
/// provided by the coupling law through the mortar variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tpfa {
    keyword: String,
}

impl Tpfa {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// The transmissibility of every face.
    ///
    /// Interior faces get the harmonic mean of the half transmissibilities of their two cells,
    /// boundary faces the half transmissibility of their only cell.
    pub fn face_transmissibilities<T: Real>(
        &self,
        grid: &CartesianGrid<T>,
        parameters: &Parameters<T>,
    ) -> eyre::Result<DVector<T>> {
        let num_cells = grid.num_cells();
        let permeability = parameters.tensor(&self.keyword, names::PERMEABILITY, num_cells)?;
        let aperture = parameters.optional_array(&self.keyword, names::APERTURE, num_cells)?;

        let mut transmissibilities = DVector::zeros(grid.num_faces());
        let faces = izip!(
            grid.face_centers(),
            grid.face_areas(),
            grid.face_normals(),
            grid.face_cells()
        );
        for (face, (face_center, &area, normal, cells)) in faces.enumerate() {
            let mut inverse_sum = T::zero();
            for &cell in cells.iter().flatten() {
                let distance = (face_center - grid.cell_centers()[cell]).norm();
                if distance <= T::zero() {
                    return Err(eyre!("cell {} has its center on face {}", cell, face));
                }
                let k_normal = normal.dot(&(permeability.cell(cell) * normal));
                if k_normal <= T::zero() {
                    return Err(eyre!("permeability of cell {} is not positive normal to face {}", cell, face));
                }
                let mut half = area * k_normal / distance;
                if let Some(aperture) = &aperture {
                    half *= aperture[cell];
                }
                inverse_sum += T::one() / half;
            }
            if inverse_sum == T::zero() {
                return Err(eyre!("face {} is not adjacent to any cell", face));
            }
            transmissibilities[face] = T::one() / inverse_sum;
        }
        Ok(transmissibilities)
    }

    fn boundary_data<'p, T: Real>(
        &self,
        grid: &CartesianGrid<T>,
        parameters: &'p Parameters<T>,
    ) -> eyre::Result<(Option<&'p BoundaryCondition>, DVector<T>)> {
        let num_faces = grid.num_faces();
        let bc = match parameters.get(&self.keyword, names::BC) {
            Some(_) => Some(parameters.boundary_condition(&self.keyword, names::BC)?),
            None => None,
        };
        if let Some(bc) = bc {
            if bc.num_faces() != num_faces {
                return Err(eyre!(
                    "boundary condition covers {} faces, but the grid has {}",
                    bc.num_faces(),
                    num_faces
                ));
            }
        }
        let values = parameters
            .optional_array(&self.keyword, names::BC_VALUES, num_faces)?
            .unwrap_or_else(|| DVector::zeros(num_faces));
        Ok((bc, values))
    }

    fn darcy_flux<T: Real>(
        &self,
        grid: &CartesianGrid<T>,
        parameters: &Parameters<T>,
        pressure: DVectorView<T>,
    ) -> eyre::Result<DVector<T>> {
        let transmissibilities = self.face_transmissibilities(grid, parameters)?;
        let (bc, bc_values) = self.boundary_data(grid, parameters)?;
        let is_dirichlet = |face: usize| bc.map(|bc| bc.is_dirichlet(face)).unwrap_or(false);

        let mut flux = DVector::zeros(grid.num_faces());
        for (face, cells) in grid.face_cells().iter().enumerate() {
            let t = transmissibilities[face];
            let g = bc_values[face];
            flux[face] = match *cells {
                [Some(a), Some(b)] => t * (pressure[a] - pressure[b]),
                [Some(c), None] if is_dirichlet(face) => t * (pressure[c] - g),
                [None, Some(c)] if is_dirichlet(face) => t * (g - pressure[c]),
                _ => g,
            };
        }
        Ok(flux)
    }
}

fn check_pressure_dofs<T: Real>(context: &LocalContext<T, CartesianGrid<T>>) -> eyre::Result<()> {
    if context.dofs != DofSpec::cells(1) {
        return Err(eyre!(
            "two-point flux approximation requires one dof per cell, but '{}' has {:?}",
            context.variable,
            context.dofs
        ));
    }
    Ok(())
}

impl<T: Real> LocalOperator<T, CartesianGrid<T>> for Tpfa {
    fn assemble_local(&self, context: &LocalContext<T, CartesianGrid<T>>) -> eyre::Result<LocalSystem<T>> {
        check_pressure_dofs(context)?;
        let grid = context.grid;
        let n = grid.num_cells();
        let transmissibilities = self.face_transmissibilities(grid, context.parameters)?;
        let (bc, bc_values) = self.boundary_data(grid, context.parameters)?;

        let mut matrix = CooMatrix::new(n, n);
        let mut rhs = DVector::zeros(n);
        for (face, cells) in grid.face_cells().iter().enumerate() {
            let t = transmissibilities[face];
            match *cells {
                [Some(a), Some(b)] => {
                    matrix.push(a, a, t);
                    matrix.push(b, b, t);
                    matrix.push(a, b, -t);
                    matrix.push(b, a, -t);
                }
                [Some(c), None] | [None, Some(c)] => {
                    let g = bc_values[face];
                    if bc.map(|bc| bc.is_dirichlet(face)).unwrap_or(false) {
                        matrix.push(c, c, t);
                        rhs[c] += t * g;
                    } else if cells[0].is_some() {
                        // The normal points out of the domain
                        rhs[c] -= g;
                    } else {
                        rhs[c] += g;
                    }
                }
                [None, None] => return Err(eyre!("face {} is not adjacent to any cell", face)),
            }
        }
        debug!(
            "Two-point fluxes for '{}' on {}: {} cells, {} faces",
            context.variable,
            context.node,
            n,
            grid.num_faces()
        );
        Ok(LocalSystem::new(CsrMatrix::from(&matrix), rhs))
    }

    /// Face pressures, taken as the average of the adjacent cell pressures.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn face_trace(&self, context: &LocalContext<T, CartesianGrid<T>>) -> eyre::Result<CsrMatrix<T>> {
        check_pressure_dofs(context)?;
        let grid = context.grid;
        let mut trace = CooMatrix::new(grid.num_faces(), grid.num_cells());
        for (face, cells) in grid.face_cells().iter().enumerate() {
            match *cells {
                [Some(a), Some(b)] => {
                    trace.push(face, a, 0.5);
                    trace.push(face, b, 0.5);
                }
                [Some(c), None] | [None, Some(c)] => trace.push(face, c, 1.0),
                [None, None] => {}
            }
        }
        Ok(CsrMatrix::from(&trace))
    }

    /// Provides `"pressure"` (the cell values) and `"darcy_flux"` (integrated flux through every
    /// face along its normal).
    fn extract(
        &self,
        context: &LocalContext<T, CartesianGrid<T>>,
        quantity: &str,
        values: DVectorView<T>,
    ) -> eyre::Result<DVector<T>> {
        check_pressure_dofs(context)?;
        if values.len() != context.grid.num_cells() {
            return Err(eyre!(
                "expected {} pressure values, got {}",
                context.grid.num_cells(),
                values.len()
            ));
        }
        match quantity {
            "pressure" => Ok(values.into_owned()),
            "darcy_flux" => self.darcy_flux(context.grid, context.parameters, values),
            _ => Err(eyre!("the two-point flux approximation does not provide '{}'", quantity)),
        }
    }
}
