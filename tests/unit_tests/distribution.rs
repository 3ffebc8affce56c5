use crate::{ScaledIdentity, SquareAndLine};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use mixdim::assembly::{MixedDimAssembler, MixedDimAssemblerBuilder};
use mixdim::discretization::DiscretizationRegistry;
use mixdim::error::AssemblyError;
use mixdim::graph::{EdgeIndex, Owner};
use mixdim::grid::{CartesianGrid, Grid};
use mixdim::params::{names, BoundaryCondition, ParamValue, ParameterStore, Parameters};
use mixdim::store::VariableStore;
use mixdim::variables::{DofSpec, VariableRegistry};
use mixdim_flow::Tpfa;
use nalgebra::DVector;
use std::sync::Arc;

type Grid2 = CartesianGrid<f64>;

fn pressure_and_mortar(problem: &SquareAndLine) -> VariableRegistry {
    let mut variables = VariableRegistry::new();
    variables.declare(problem.square, "p", DofSpec::cells(1)).unwrap();
    variables.declare(problem.line, "p", DofSpec::cells(1)).unwrap();
    variables.declare(EdgeIndex(0), "lambda", DofSpec::cells(1)).unwrap();
    variables
}

fn assembler<'a>(
    problem: &'a SquareAndLine,
    variables: &'a VariableRegistry,
    discretizations: &'a DiscretizationRegistry<f64, Grid2>,
    parameters: &'a ParameterStore<f64>,
) -> MixedDimAssembler<'a, f64, Grid2> {
    MixedDimAssemblerBuilder::new()
        .with_graph(&problem.graph)
        .with_variables(variables)
        .with_discretizations(discretizations)
        .with_parameters(parameters)
        .build()
}

#[test]
fn distribute_splits_solution_by_layout() {
    let problem = SquareAndLine::new();
    let variables = pressure_and_mortar(&problem);
    let discretizations = DiscretizationRegistry::new();
    let parameters = ParameterStore::new();
    let assembler = assembler(&problem, &variables, &discretizations, &parameters);

    let solution = DVector::from_fn(8, |i, _| 10.0 * i as f64);
    let mut store = VariableStore::new();
    assembler.distribute(&solution, &mut store).unwrap();

    assert_eq!(store.len(), 3);
    assert_eq!(
        store.get(problem.square, "p").unwrap(),
        &DVector::from_vec(vec![0.0, 10.0, 20.0, 30.0])
    );
    assert_eq!(store.get(problem.line, "p").unwrap(), &DVector::from_vec(vec![40.0, 50.0]));
    assert_eq!(store.get(EdgeIndex(0), "lambda").unwrap(), &DVector::from_vec(vec![60.0, 70.0]));

    let gathered = assembler.dof_map().unwrap().gather(&store).unwrap();
    assert_eq!(gathered, solution);
}

#[test]
fn distribute_rejects_solution_of_wrong_length() {
    let problem = SquareAndLine::new();
    let variables = pressure_and_mortar(&problem);
    let discretizations = DiscretizationRegistry::new();
    let parameters = ParameterStore::new();
    let assembler = assembler(&problem, &variables, &discretizations, &parameters);

    let mut store = VariableStore::new();
    let too_long = DVector::zeros(9);
    let err = assembler.distribute(&too_long, &mut store).unwrap_err();
    assert!(matches!(err, AssemblyError::DimensionMismatch { expected: 8, actual: 9 }));
    assert!(store.is_empty());

    let too_short = DVector::zeros(7);
    assert!(matches!(
        assembler.distribute(&too_short, &mut store),
        Err(AssemblyError::DimensionMismatch { expected: 8, actual: 7 })
    ));
    assert!(store.is_empty());
}

#[test]
fn distribute_overwrites_previous_values() {
    let problem = SquareAndLine::new();
    let variables = pressure_and_mortar(&problem);
    let discretizations = DiscretizationRegistry::new();
    let parameters = ParameterStore::new();
    let assembler = assembler(&problem, &variables, &discretizations, &parameters);

    let mut store = VariableStore::new();
    store.insert(problem.line, "p", DVector::from_vec(vec![-1.0, -1.0]));
    store.insert(problem.line, "temperature", DVector::from_vec(vec![5.0, 5.0]));
    assembler
        .distribute(&DVector::repeat(8, 2.0), &mut store)
        .unwrap();

    assert_eq!(store.get(problem.line, "p").unwrap(), &DVector::repeat(2, 2.0));
    // Values that are not part of the layout are left alone
    assert_eq!(store.get(problem.line, "temperature").unwrap(), &DVector::repeat(2, 5.0));
}

#[test]
fn solve_and_distribute_round_trip() {
    let problem = SquareAndLine::new();
    let variables = pressure_and_mortar(&problem);
    let mut discretizations = DiscretizationRegistry::new();
    discretizations
        .register(problem.square, "p", "identity", Arc::new(ScaledIdentity(2.0)))
        .unwrap();
    discretizations
        .register(problem.line, "p", "identity", Arc::new(ScaledIdentity(4.0)))
        .unwrap();
    let parameters = ParameterStore::new();
    let assembler = assembler(&problem, &variables, &discretizations, &parameters);

    let system = assembler.assemble().unwrap();
    // Only the node blocks are populated, so solve them separately
    let square = system.block(problem.square, "p").unwrap();
    let line = system.block(problem.line, "p").unwrap();
    let mut solution = DVector::zeros(system.num_dofs());
    for block in [square, line] {
        let diagonal = util::dense_block(&system.matrix, block.range(), block.range());
        let rhs = system.rhs.rows(block.start, block.size).into_owned();
        let x = diagonal.lu().solve(&rhs).unwrap();
        solution.rows_mut(block.start, block.size).copy_from(&x);
    }

    let mut store = VariableStore::new();
    assembler.distribute(&solution, &mut store).unwrap();
    assert_matrix_eq!(store.get(problem.square, "p").unwrap().clone(), DVector::repeat(4, 1.0), comp = float);
    assert_matrix_eq!(store.get(problem.line, "p").unwrap().clone(), DVector::repeat(2, 1.0), comp = float);
    assert_matrix_eq!(store.get(EdgeIndex(0), "lambda").unwrap().clone(), DVector::repeat(2, 0.0), comp = float);
}

#[test]
fn stale_layout_cannot_distribute() {
    let problem = SquareAndLine::new();
    let mut variables = pressure_and_mortar(&problem);
    let dof_map = {
        let discretizations = DiscretizationRegistry::<f64, Grid2>::new();
        let parameters = ParameterStore::new();
        assembler(&problem, &variables, &discretizations, &parameters)
            .dof_map()
            .unwrap()
    };
    variables.remove(EdgeIndex(0), "lambda");

    let mut store = VariableStore::new();
    let solution = DVector::<f64>::zeros(8);
    let err = dof_map.distribute(&variables, &solution, &mut store).unwrap_err();
    assert!(matches!(err, AssemblyError::Configuration { .. }));
    assert!(store.is_empty());
}

fn linear_pressure_parameters(grid: &Grid2) -> Parameters<f64> {
    let boundary = grid.domain_boundary_faces().to_vec();
    let bc_values = DVector::from_iterator(grid.num_faces(), grid.face_centers().iter().map(|x| x.x));
    Parameters::new()
        .with("flow", names::PERMEABILITY, ParamValue::Scalar(1.0))
        .with(
            "flow",
            names::BC,
            BoundaryCondition::neumann(grid.num_faces()).with_dirichlet(&boundary),
        )
        .with("flow", names::BC_VALUES, bc_values)
}

#[test]
fn extract_derives_fluxes_from_distributed_pressure() {
    let problem = SquareAndLine::new();
    let variables = pressure_and_mortar(&problem);
    let mut discretizations = DiscretizationRegistry::new();
    discretizations
        .register(problem.square, "p", "flux", Arc::new(Tpfa::new("flow")))
        .unwrap();
    let square_grid = problem.graph.node(problem.square);
    let mut parameters = ParameterStore::new();
    parameters.insert(problem.square, linear_pressure_parameters(square_grid));
    let assembler = assembler(&problem, &variables, &discretizations, &parameters);

    // p = x on the square
    let mut store = VariableStore::new();
    let pressure = DVector::from_iterator(4, square_grid.cell_centers().iter().map(|x| x.x));
    store.insert(problem.square, "p", pressure);
    store.insert(problem.line, "p", DVector::zeros(2));

    assembler
        .extract(&mut store, "p", "flux", "darcy_flux")
        .unwrap();

    // Only nodes where the operator is registered get the derived quantity
    assert!(!store.contains(problem.line, "darcy_flux"));
    let flux = store.get(problem.square, "darcy_flux").unwrap();
    assert_eq!(flux.len(), square_grid.num_faces());
    // -dp/dx = -1 integrated over faces of length 1/2
    for (face, normal) in square_grid.face_normals().iter().enumerate() {
        let expected = if normal.x > 0.5 { -0.5 } else { 0.0 };
        assert_scalar_eq!(flux[face], expected, comp = abs, tol = 1e-12);
    }
}

#[test]
fn extract_failures_are_reported() {
    let problem = SquareAndLine::new();
    let variables = pressure_and_mortar(&problem);
    let mut discretizations = DiscretizationRegistry::new();
    discretizations
        .register(problem.square, "p", "flux", Arc::new(Tpfa::new("flow")))
        .unwrap();
    let mut parameters = ParameterStore::new();
    parameters.insert(
        problem.square,
        linear_pressure_parameters(problem.graph.node(problem.square)),
    );
    let assembler = assembler(&problem, &variables, &discretizations, &parameters);

    let mut store = VariableStore::new();
    let err = assembler
        .extract(&mut store, "p", "flux", "darcy_flux")
        .unwrap_err();
    assert!(matches!(err, AssemblyError::Configuration { .. }));
    assert_eq!(err.owner(), Some(Owner::Node(problem.square)));

    store.insert(problem.square, "p", DVector::zeros(4));
    let err = assembler
        .extract(&mut store, "p", "flux", "velocity")
        .unwrap_err();
    assert!(matches!(err, AssemblyError::Discretization { .. }));
    assert!(!store.contains(problem.square, "velocity"));
}
