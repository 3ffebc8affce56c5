//! Grids attached to the nodes of a mixed-dimensional graph.
//!
//! The assembly engine only relies on the [`Grid`] trait. [`CartesianGrid`] is a structured
//! reference implementation carrying the geometric quantities needed by simple finite volume
//! discretizations.
use crate::Real;
use nalgebra::{convert, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A mesh of fixed topological dimension.
pub trait Grid {
    /// Topological dimension of the grid (0, 1, 2 or 3).
    fn dim(&self) -> usize;

    fn num_cells(&self) -> usize;

    fn num_faces(&self) -> usize;

    fn num_nodes(&self) -> usize;

    /// Faces located on the boundary of the computational domain.
    fn domain_boundary_faces(&self) -> &[usize];

    fn entity_counts(&self) -> EntityCounts {
        EntityCounts {
            cells: self.num_cells(),
            faces: self.num_faces(),
            nodes: self.num_nodes(),
        }
    }
}

/// Number of mesh entities that degrees of freedom can be attached to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityCounts {
    pub cells: usize,
    pub faces: usize,
    pub nodes: usize,
}

/// A structured, axis-aligned grid of dimension 0, 1 or 2 embedded in 3D space.
///
/// Faces carry a unit normal and the (up to) two cells sharing the face. The normal points from
/// the first cell to the second one, so a boundary face has exactly one of the two cells set.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianGrid<T: Real> {
    dim: usize,
    num_nodes: usize,
    cell_centers: Vec<Point3<T>>,
    cell_volumes: Vec<T>,
    face_centers: Vec<Point3<T>>,
    face_areas: Vec<T>,
    face_normals: Vec<Vector3<T>>,
    face_cells: Vec<[Option<usize>; 2]>,
    boundary_faces: Vec<usize>,
}

impl<T: Real> CartesianGrid<T> {
    /// A single 0-dimensional cell located at the given point.
    pub fn point(location: Point3<T>) -> Self {
        Self {
            dim: 0,
            num_nodes: 1,
            cell_centers: vec![location],
            cell_volumes: vec![T::one()],
            face_centers: Vec::new(),
            face_areas: Vec::new(),
            face_normals: Vec::new(),
            face_cells: Vec::new(),
            boundary_faces: Vec::new(),
        }
    }

    /// A straight 1D grid from `start` to `end`, subdivided into `num_cells` equal cells.
    ///
    /// Faces (which coincide with nodes in 1D) are numbered from `start` to `end`.
    ///
    /// # Panics
    ///
    /// Panics if `num_cells` is zero or `start == end`.
    pub fn line(start: Point3<T>, end: Point3<T>, num_cells: usize) -> Self {
        assert!(num_cells > 0, "A line grid needs at least one cell");
        let direction = end - start;
        let length = direction.norm();
        assert!(length > T::zero(), "Line grid must have positive length");

        let n: T = convert(num_cells as f64);
        let step = direction / n;
        let normal = direction / length;
        let h = length / n;

        let position = |i: usize| start + step * convert::<f64, T>(i as f64);
        let half: T = convert(0.5);

        let cell_centers = (0..num_cells)
            .map(|i| position(i) + step * half)
            .collect();
        let face_centers = (0..=num_cells).map(position).collect();
        let face_cells: Vec<_> = (0..=num_cells)
            .map(|i| {
                let before = (i > 0).then(|| i - 1);
                let after = (i < num_cells).then(|| i);
                [before, after]
            })
            .collect();

        Self {
            dim: 1,
            num_nodes: num_cells + 1,
            cell_centers,
            cell_volumes: vec![h; num_cells],
            face_centers,
            face_areas: vec![T::one(); num_cells + 1],
            face_normals: vec![normal; num_cells + 1],
            boundary_faces: boundary_faces_from(&face_cells),
            face_cells,
        }
    }

    /// A 2D grid covering the rectangle `[origin.x, origin.x + extents.x] x [origin.y, origin.y + extents.y]`
    /// in the plane `z = origin.z`, with `cells[0] x cells[1]` cells.
    ///
    /// Cells are numbered row by row, starting in the lower left corner. The faces normal to the
    /// x-axis come first (row by row), followed by the faces normal to the y-axis.
    ///
    /// # Panics
    ///
    /// Panics if either cell count is zero or either extent is not positive.
    pub fn rectangle(origin: Point3<T>, extents: [T; 2], cells: [usize; 2]) -> Self {
        let [nx, ny] = cells;
        let [lx, ly] = extents;
        assert!(nx > 0 && ny > 0, "A rectangular grid needs at least one cell in each direction");
        assert!(lx > T::zero() && ly > T::zero(), "Rectangle extents must be positive");

        let dx = lx / convert::<f64, T>(nx as f64);
        let dy = ly / convert::<f64, T>(ny as f64);
        let x = |i: f64| origin.x + dx * convert::<f64, T>(i);
        let y = |j: f64| origin.y + dy * convert::<f64, T>(j);
        let cell = |i: usize, j: usize| i + j * nx;

        let mut cell_centers = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                cell_centers.push(Point3::new(x(i as f64 + 0.5), y(j as f64 + 0.5), origin.z));
            }
        }

        let num_x_faces = (nx + 1) * ny;
        let num_faces = num_x_faces + nx * (ny + 1);
        let mut face_centers = Vec::with_capacity(num_faces);
        let mut face_areas = Vec::with_capacity(num_faces);
        let mut face_normals = Vec::with_capacity(num_faces);
        let mut face_cells = Vec::with_capacity(num_faces);

        for j in 0..ny {
            for i in 0..=nx {
                face_centers.push(Point3::new(x(i as f64), y(j as f64 + 0.5), origin.z));
                face_areas.push(dy);
                face_normals.push(Vector3::x());
                face_cells.push([(i > 0).then(|| cell(i - 1, j)), (i < nx).then(|| cell(i, j))]);
            }
        }
        for j in 0..=ny {
            for i in 0..nx {
                face_centers.push(Point3::new(x(i as f64 + 0.5), y(j as f64), origin.z));
                face_areas.push(dx);
                face_normals.push(Vector3::y());
                face_cells.push([(j > 0).then(|| cell(i, j - 1)), (j < ny).then(|| cell(i, j))]);
            }
        }

        Self {
            dim: 2,
            num_nodes: (nx + 1) * (ny + 1),
            cell_centers,
            cell_volumes: vec![dx * dy; nx * ny],
            face_centers,
            face_areas,
            face_normals,
            boundary_faces: boundary_faces_from(&face_cells),
            face_cells,
        }
    }

    pub fn cell_centers(&self) -> &[Point3<T>] {
        &self.cell_centers
    }

    pub fn cell_volumes(&self) -> &[T] {
        &self.cell_volumes
    }

    pub fn face_centers(&self) -> &[Point3<T>] {
        &self.face_centers
    }

    pub fn face_areas(&self) -> &[T] {
        &self.face_areas
    }

    /// Unit face normals, oriented from the first to the second cell of the face.
    pub fn face_normals(&self) -> &[Vector3<T>] {
        &self.face_normals
    }

    /// The cells on either side of each face, see [`CartesianGrid`] for the orientation.
    pub fn face_cells(&self) -> &[[Option<usize>; 2]] {
        &self.face_cells
    }

    /// Indices of all faces whose center satisfies the predicate.
    pub fn faces_where(&self, predicate: impl Fn(&Point3<T>) -> bool) -> Vec<usize> {
        self.face_centers
            .iter()
            .enumerate()
            .filter_map(|(idx, center)| predicate(center).then(|| idx))
            .collect()
    }

    /// Indices of domain boundary faces whose center satisfies the predicate.
    pub fn boundary_faces_where(&self, predicate: impl Fn(&Point3<T>) -> bool) -> Vec<usize> {
        self.boundary_faces
            .iter()
            .copied()
            .filter(|&idx| predicate(&self.face_centers[idx]))
            .collect()
    }
}

fn boundary_faces_from(face_cells: &[[Option<usize>; 2]]) -> Vec<usize> {
    face_cells
        .iter()
        .enumerate()
        .filter_map(|(idx, [a, b])| (a.is_none() || b.is_none()).then(|| idx))
        .collect()
}

impl<T: Real> Grid for CartesianGrid<T> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn num_cells(&self) -> usize {
        self.cell_centers.len()
    }

    fn num_faces(&self) -> usize {
        self.face_centers.len()
    }

    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn domain_boundary_faces(&self) -> &[usize] {
        &self.boundary_faces
    }
}
