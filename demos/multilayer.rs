use eyre::eyre;
use mixdim::assembly::MixedDimAssemblerBuilder;
use mixdim::coupling::{CouplingPolicy, CouplingSetup, RobinCoupling};
use mixdim::discretization::DiscretizationRegistry;
use mixdim::grid::{CartesianGrid, Grid};
use mixdim::mortar::MortarGrid;
use mixdim::params::{names, BoundaryCondition, ParamValue, ParameterStore};
use mixdim::procedural::create_fractured_unit_square;
use mixdim::store::VariableStore;
use mixdim::variables::{DofSpec, VariableRegistry};
use mixdim_flow::{ScalarSource, Tpfa};
use nalgebra::{DMatrix, Point3};
use std::sync::Arc;

/// A well (0D) intersecting a fracture (1D) embedded in a matrix (2D).
///
/// The well is also connected directly to the left half of the matrix. No Robin law applies to an
/// interface between a 2D and a 0D grid, so that connection is skipped and its mortar variable
/// removed before assembly.
fn main() -> eyre::Result<()> {
    let cells_per_dim = 8;
    let mut square = create_fractured_unit_square::<f64>(cells_per_dim)?;

    let well = CartesianGrid::point(Point3::new(0.5, 0.5, 0.0));
    let fracture_grid = square.graph.node(square.fracture);
    let well_face = fracture_grid
        .faces_where(|x| (x.y - 0.5).abs() < 1e-10)
        .first()
        .copied()
        .ok_or_else(|| eyre!("The fracture has no face at the well location"))?;
    let fracture_to_well = MortarGrid::matching(&[well_face], fracture_grid.num_faces(), 1)?;
    let left_grid = square.graph.node(square.left);
    let left_face = left_grid
        .boundary_faces_where(|x| (x.x - 0.5).abs() < 1e-10 && x.y > 0.5)
        .first()
        .copied()
        .ok_or_else(|| eyre!("The left half has no face next to the well"))?;
    let left_to_well = MortarGrid::matching(&[left_face], left_grid.num_faces(), 1)?;

    let well = square.graph.add_node(well);
    square.graph.add_edge(square.fracture, well, fracture_to_well)?;
    square.graph.add_edge(square.left, well, left_to_well)?;
    let graph = &square.graph;

    let mut variables = VariableRegistry::new();
    let mut discretizations = DiscretizationRegistry::new();
    let mut parameters = ParameterStore::new();
    for (node, grid) in graph.nodes() {
        variables.declare(node, "pressure", DofSpec::cells(1))?;
        discretizations.register(node, "pressure", "flux", Arc::new(Tpfa::new("flow")))?;
        let k = match grid.dim() {
            2 => 1.0,
            1 => 1e2,
            _ => 1.0,
        };
        // Fixed pressure on the outer boundary, but not on the faces along the fracture
        let boundary = match grid.dim() {
            2 => grid.boundary_faces_where(|x| (x.x - 0.5).abs() > 1e-10),
            _ => grid.domain_boundary_faces().to_vec(),
        };
        parameters
            .entry(node)
            .insert("flow", names::PERMEABILITY, ParamValue::Scalar(k))
            .insert(
                "flow",
                names::BC,
                BoundaryCondition::neumann(grid.num_faces()).with_dirichlet(&boundary),
            );
    }
    discretizations.register(well, "pressure", "injection", Arc::new(ScalarSource::new("flow")))?;
    parameters
        .entry(well)
        .insert("flow", names::SOURCE, ParamValue::Scalar(1.0));
    for (edge, _) in graph.edges() {
        parameters
            .entry(edge)
            .insert("flow", names::NORMAL_DIFFUSIVITY, ParamValue::Scalar(10.0));
    }

    let skipped = CouplingSetup::new("robin", "pressure", "flux", "mortar_flux", Arc::new(RobinCoupling::new("flow")))
        .apply(graph, &mut variables, &mut discretizations, CouplingPolicy::SkipWithWarning)?;
    for &edge in &skipped {
        let (primary, secondary) = graph.nodes_of_edge(edge);
        println!("Skipped {} between {} and {}", edge, primary, secondary);
        variables.remove(edge, "mortar_flux");
    }

    let assembler = MixedDimAssemblerBuilder::new()
        .with_graph(graph)
        .with_variables(&variables)
        .with_discretizations(&discretizations)
        .with_parameters(&parameters)
        .build();
    let system = assembler.assemble()?;
    for block in system.dof_map.blocks() {
        println!(
            "{:>10} {:>12} dofs {:>4}..{:<4}",
            block.owner.to_string(),
            block.variable,
            block.range.start,
            block.range.end()
        );
    }

    // TODO: Use a sparse solver
    let solution = DMatrix::from(&system.matrix)
        .lu()
        .solve(&system.rhs)
        .ok_or_else(|| eyre!("Failed to solve linear system"))?;
    let mut store = VariableStore::new();
    assembler.distribute(&solution, &mut store)?;

    let well_pressure = store
        .get(well, "pressure")
        .ok_or_else(|| eyre!("No well pressure"))?;
    let fracture_pressure = store
        .get(square.fracture, "pressure")
        .ok_or_else(|| eyre!("No fracture pressure"))?;
    println!("Well pressure: {}", well_pressure[0]);
    println!("Fracture pressure: {}", fracture_pressure.transpose());

    Ok(())
}
