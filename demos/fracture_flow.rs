use eyre::eyre;
use mixdim::assembly::MixedDimAssemblerBuilder;
use mixdim::coupling::{CouplingPolicy, CouplingSetup, RobinCoupling};
use mixdim::discretization::DiscretizationRegistry;
use mixdim::grid::Grid;
use mixdim::params::{names, BoundaryCondition, ParamValue, ParameterStore, Parameters};
use mixdim::procedural::create_fractured_unit_square;
use mixdim::store::VariableStore;
use mixdim::variables::{DofSpec, VariableRegistry};
use mixdim_flow::{normal_diffusivity_from_aperture, FluxProjection, ScalarSource, Tpfa};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

fn main() -> eyre::Result<()> {
    let cells_per_dim = 16;
    let aperture = 1e-3;
    let matrix_permeability = 1.0;
    let fracture_permeability = 1e4;

    let square = create_fractured_unit_square::<f64>(cells_per_dim)?;
    let graph = &square.graph;

    let mut variables = VariableRegistry::new();
    let mut discretizations = DiscretizationRegistry::new();
    let mut parameters = ParameterStore::new();

    for (node, grid) in graph.nodes() {
        variables.declare(node, "pressure", DofSpec::cells(1))?;
        discretizations.register(node, "pressure", "flux", Arc::new(Tpfa::new("flow")))?;
        let node_parameters = parameters.entry(node);
        if grid.dim() == 2 {
            node_parameters.insert("flow", names::PERMEABILITY, ParamValue::Scalar(matrix_permeability));
        } else {
            // Tangential conductivity of the fracture is the permeability integrated over the aperture
            node_parameters
                .insert("flow", names::PERMEABILITY, ParamValue::Scalar(fracture_permeability))
                .insert("flow", names::APERTURE, ParamValue::Scalar(aperture));
        }
    }

    // Pressure drop from bottom to top, applied to both halves and the fracture tips
    for (node, grid) in graph.nodes() {
        let bottom = grid.boundary_faces_where(|x| x.y < 1e-10);
        let top = grid.boundary_faces_where(|x| x.y > 1.0 - 1e-10);
        let mut values = DVector::zeros(grid.num_faces());
        for &face in &bottom {
            values[face] = 1.0;
        }
        let dirichlet: Vec<_> = bottom.iter().chain(&top).copied().collect();
        parameters
            .entry(node)
            .insert(
                "flow",
                names::BC,
                BoundaryCondition::neumann(grid.num_faces()).with_dirichlet(&dirichlet),
            )
            .insert("flow", names::BC_VALUES, values);
    }

    discretizations.register(square.fracture, "pressure", "injection", Arc::new(ScalarSource::new("flow")))?;
    let mut injection = DVector::zeros(cells_per_dim);
    injection[cells_per_dim / 2] = 0.1;
    parameters
        .entry(square.fracture)
        .insert("flow", names::SOURCE, injection);

    for (edge_idx, edge) in graph.edges() {
        let secondary = graph.node(edge.secondary());
        let apertures = DVector::repeat(secondary.num_cells(), aperture);
        let kn = normal_diffusivity_from_aperture(matrix_permeability, edge.mortar(), &apertures, secondary.dim())?;
        parameters
            .entry(edge_idx)
            .insert("flow", names::NORMAL_DIFFUSIVITY, kn);
    }

    let robin = Arc::new(RobinCoupling::new("flow"));
    CouplingSetup::new("robin", "pressure", "flux", "mortar_flux", robin.clone())
        .apply(graph, &mut variables, &mut discretizations, CouplingPolicy::Fail)?;

    let assembler = MixedDimAssemblerBuilder::new()
        .with_graph(graph)
        .with_variables(&variables)
        .with_discretizations(&discretizations)
        .with_parameters(&parameters)
        .build();
    let system = assembler.par_assemble()?;
    println!(
        "Assembled {} dofs in {} blocks, {} stored entries",
        system.num_dofs(),
        system.dof_map.num_blocks(),
        system.matrix.nnz()
    );

    // TODO: Use a sparse solver
    let solution = DMatrix::from(&system.matrix)
        .lu()
        .solve(&system.rhs)
        .ok_or_else(|| eyre!("Failed to solve linear system"))?;

    let mut store = VariableStore::new();
    assembler.distribute(&solution, &mut store)?;
    assembler.extract(&mut store, "pressure", "flux", "darcy_flux")?;
    FluxProjection {
        coupling: &robin,
        mortar_variable: "mortar_flux",
        face_flux: "darcy_flux",
        cell_flux: "cell_flux",
    }
    .apply(graph, &parameters, &mut store)?;

    let fracture_pressure = store
        .get(square.fracture, "pressure")
        .ok_or_else(|| eyre!("No fracture pressure"))?;
    println!("Fracture pressure: {}", fracture_pressure.transpose());
    for (name, interface) in [("left", square.left_interface), ("right", square.right_interface)] {
        let jump = store
            .get(interface, "mortar_flux")
            .ok_or_else(|| eyre!("No mortar values on the {} interface", name))?;
        println!("Pressure jump across {} interface: {}", name, jump.transpose());
    }
    let fracture_flux = store
        .get(square.fracture, "darcy_flux")
        .ok_or_else(|| eyre!("No fracture flux"))?;
    println!("Flux along the fracture: {}", fracture_flux.transpose());

    // Interface fluxes, oriented along +x
    for (name, node) in [("left", square.left), ("right", square.right)] {
        let grid = graph.node(node);
        let face_flux = store
            .get(node, "darcy_flux")
            .ok_or_else(|| eyre!("No face fluxes on the {} half", name))?;
        let through_fracture: f64 = grid
            .faces_where(|x| (x.x - 0.5).abs() < 1e-10)
            .iter()
            .map(|&face| face_flux[face])
            .sum();
        println!("Flux from the {} half across x = 0.5: {:.3e}", name, through_fracture);
    }

    Ok(())
}
