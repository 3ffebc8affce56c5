//! Procedural generation of simple grids and mixed-dimensional geometries.
use crate::error::AssemblyError;
use crate::graph::{EdgeIndex, MixedDimGraph, NodeIndex};
use crate::grid::{CartesianGrid, Grid};
use crate::mortar::MortarGrid;
use crate::Real;
use itertools::Itertools;
use nalgebra::{convert, Point3};

pub fn create_unit_interval_grid<T>(num_cells: usize) -> CartesianGrid<T>
where
    T: Real,
{
    CartesianGrid::line(Point3::origin(), Point3::new(T::one(), T::zero(), T::zero()), num_cells)
}

pub fn create_unit_square_grid<T>(cells_per_dim: usize) -> CartesianGrid<T>
where
    T: Real,
{
    create_rectangular_grid(T::one(), 1, 1, cells_per_dim)
}

/// Generates an axis-aligned rectangular grid with its lower left corner in the origin, given a
/// unit length, dimensions as multipliers of the unit length and the number of cells per unit length.
pub fn create_rectangular_grid<T>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
) -> CartesianGrid<T>
where
    T: Real,
{
    let lx = unit_length * convert::<f64, T>(units_x as f64);
    let ly = unit_length * convert::<f64, T>(units_y as f64);
    CartesianGrid::rectangle(
        Point3::origin(),
        [lx, ly],
        [units_x * cells_per_unit, units_y * cells_per_unit],
    )
}

/// A mortar grid matching every cell of `secondary` with the closest of the given primary faces.
///
/// Every secondary cell center must coincide with a distinct face center (up to `tolerance`).
pub fn create_matching_mortar<T>(
    primary: &CartesianGrid<T>,
    faces: &[usize],
    secondary: &CartesianGrid<T>,
    tolerance: T,
) -> Result<MortarGrid<T>, AssemblyError>
where
    T: Real,
{
    let mut matched = Vec::with_capacity(secondary.num_cells());
    for (cell, center) in secondary.cell_centers().iter().enumerate() {
        let closest = faces
            .iter()
            .copied()
            .map(|face| (face, (primary.face_centers()[face] - center).norm()))
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        match closest {
            Some((face, distance)) if distance <= tolerance => matched.push(face),
            _ => {
                return Err(AssemblyError::configuration(format!(
                    "secondary cell {} does not coincide with any of the {} candidate faces",
                    cell,
                    faces.len()
                )))
            }
        }
    }
    if !matched.iter().all_unique() {
        return Err(AssemblyError::configuration(
            "several secondary cells coincide with the same primary face",
        ));
    }
    MortarGrid::matching(&matched, primary.num_faces(), secondary.num_cells())
}

/// The unit square cut in half by a vertical fracture along `x = 1/2`.
///
/// The two halves are separate 2D nodes, each coupled to the 1D fracture node by an interface.
#[derive(Debug, Clone)]
pub struct FracturedSquare<T: Real> {
    pub graph: MixedDimGraph<CartesianGrid<T>, T>,
    pub left: NodeIndex,
    pub right: NodeIndex,
    pub fracture: NodeIndex,
    pub left_interface: EdgeIndex,
    pub right_interface: EdgeIndex,
}

/// Generate a [`FracturedSquare`] with `cells_per_dim` cells along each axis.
///
/// `cells_per_dim` must be even and positive, so that the fracture runs along cell faces.
pub fn create_fractured_unit_square<T>(cells_per_dim: usize) -> Result<FracturedSquare<T>, AssemblyError>
where
    T: Real,
{
    if cells_per_dim == 0 || cells_per_dim % 2 != 0 {
        return Err(AssemblyError::configuration(format!(
            "the fractured unit square needs a positive, even number of cells per dimension, got {}",
            cells_per_dim
        )));
    }
    let half: T = convert(0.5);
    let tolerance: T = convert(1e-10);
    let extents = [half, T::one()];
    let cells = [cells_per_dim / 2, cells_per_dim];

    let left_grid = CartesianGrid::rectangle(Point3::origin(), extents, cells);
    let right_grid = CartesianGrid::rectangle(Point3::new(half, T::zero(), T::zero()), extents, cells);
    let fracture_grid = CartesianGrid::line(
        Point3::new(half, T::zero(), T::zero()),
        Point3::new(half, T::one(), T::zero()),
        cells_per_dim,
    );

    let on_fracture = |p: &Point3<T>| (p.x - half).abs() <= tolerance;
    let left_mortar = create_matching_mortar(
        &left_grid,
        &left_grid.boundary_faces_where(on_fracture),
        &fracture_grid,
        tolerance,
    )?;
    let right_mortar = create_matching_mortar(
        &right_grid,
        &right_grid.boundary_faces_where(on_fracture),
        &fracture_grid,
        tolerance,
    )?;

    let mut graph = MixedDimGraph::new();
    let left = graph.add_node(left_grid);
    let right = graph.add_node(right_grid);
    let fracture = graph.add_node(fracture_grid);
    let left_interface = graph.add_edge(left, fracture, left_mortar)?;
    let right_interface = graph.add_edge(right, fracture, right_mortar)?;

    Ok(FracturedSquare {
        graph,
        left,
        right,
        fracture,
        left_interface,
        right_interface,
    })
}
