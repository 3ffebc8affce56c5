use mixdim::coupling::{CouplingPolicy, CouplingSetup, RobinCoupling};
use mixdim::discretization::DiscretizationRegistry;
use mixdim::graph::{EdgeIndex, MixedDimGraph};
use mixdim::grid::{CartesianGrid, Grid};
use mixdim::params::{names, BoundaryCondition, ParamValue, ParameterStore, Parameters};
use mixdim::procedural::{create_fractured_unit_square, FracturedSquare};
use mixdim::variables::{DofSpec, VariableRegistry};
use mixdim_flow::Tpfa;
use nalgebra::DVector;
use std::sync::Arc;

mod multilayer;

pub const PRESSURE: &str = "pressure";
pub const MORTAR_FLUX: &str = "mortar_flux";

/// Darcy flow on the fractured unit square, driven by the pressure drop from `p = 1` at `x = 0`
/// to `p = 0` at `x = 1`. All other boundaries are impermeable.
pub struct FractureFlow {
    pub square: FracturedSquare<f64>,
    pub variables: VariableRegistry,
    pub discretizations: DiscretizationRegistry<f64, CartesianGrid<f64>>,
    pub parameters: ParameterStore<f64>,
}

/// Pressure held at `value` on the boundary faces where `on_boundary` holds.
pub fn dirichlet_where(
    grid: &CartesianGrid<f64>,
    value: f64,
    on_boundary: impl Fn(f64) -> bool,
) -> (BoundaryCondition, DVector<f64>) {
    let faces = grid.boundary_faces_where(|x| on_boundary(x.x));
    let mut values = DVector::zeros(grid.num_faces());
    for &face in &faces {
        values[face] = value;
    }
    (BoundaryCondition::neumann(grid.num_faces()).with_dirichlet(&faces), values)
}

impl FractureFlow {
    pub fn new(cells_per_dim: usize, fracture_permeability: f64, interface: Parameters<f64>) -> Self {
        let square = create_fractured_unit_square::<f64>(cells_per_dim).unwrap();
        let (problem, skipped) = Self::setup(square, fracture_permeability, interface, CouplingPolicy::Fail);
        assert!(skipped.is_empty());
        problem
    }

    /// Set up flow on a fractured square whose graph may have been extended with further nodes
    /// and edges. Additional nodes get unit permeability and impermeable boundaries.
    pub fn setup(
        square: FracturedSquare<f64>,
        fracture_permeability: f64,
        interface: Parameters<f64>,
        policy: CouplingPolicy,
    ) -> (Self, Vec<EdgeIndex>) {
        let graph = &square.graph;
        let mut variables = VariableRegistry::new();
        let mut discretizations = DiscretizationRegistry::new();
        let mut parameters = ParameterStore::new();

        for (node, _) in graph.nodes() {
            variables.declare(node, PRESSURE, DofSpec::cells(1)).unwrap();
            discretizations
                .register(node, PRESSURE, "flux", Arc::new(Tpfa::new("flow")))
                .unwrap();
        }

        let tol = 1e-10;
        let (left_bc, left_values) = dirichlet_where(graph.node(square.left), 1.0, |x| x.abs() < tol);
        let (right_bc, right_values) = dirichlet_where(graph.node(square.right), 0.0, |x| (x - 1.0).abs() < tol);
        for (node, bc, values) in [(square.left, left_bc, left_values), (square.right, right_bc, right_values)] {
            parameters.insert(
                node,
                Parameters::new()
                    .with("flow", names::BC, bc)
                    .with("flow", names::BC_VALUES, values),
            );
        }
        for (node, _) in graph.nodes() {
            let k = if node == square.fracture { fracture_permeability } else { 1.0 };
            parameters
                .entry(node)
                .insert("flow", names::PERMEABILITY, ParamValue::Scalar(k));
        }
        for (edge, _) in graph.edges() {
            parameters.insert(edge, interface.clone());
        }

        let skipped = CouplingSetup::new("robin", PRESSURE, "flux", MORTAR_FLUX, Arc::new(RobinCoupling::new("flow")))
            .apply(graph, &mut variables, &mut discretizations, policy)
            .unwrap();

        let problem = Self {
            square,
            variables,
            discretizations,
            parameters,
        };
        (problem, skipped)
    }

    pub fn graph(&self) -> &MixedDimGraph<CartesianGrid<f64>, f64> {
        &self.square.graph
    }
}
