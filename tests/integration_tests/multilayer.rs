use super::{FractureFlow, MORTAR_FLUX, PRESSURE};
use matrixcompare::assert_matrix_eq;
use mixdim::assembly::{AssembledSystem, MixedDimAssemblerBuilder};
use mixdim::coupling::CouplingPolicy;
use mixdim::graph::Owner;
use mixdim::grid::{CartesianGrid, Grid};
use mixdim::mortar::MortarGrid;
use mixdim::params::{names, ParamValue, Parameters};
use mixdim::procedural::create_fractured_unit_square;
use nalgebra::{DMatrix, Point3};
use util::dense_block;

fn interface_parameters() -> Parameters<f64> {
    Parameters::new().with("flow", names::NORMAL_DIFFUSIVITY, ParamValue::Scalar(2.0))
}

fn assemble(problem: &FractureFlow) -> AssembledSystem<f64> {
    MixedDimAssemblerBuilder::new()
        .with_graph(problem.graph())
        .with_variables(&problem.variables)
        .with_discretizations(&problem.discretizations)
        .with_parameters(&problem.parameters)
        .build()
        .assemble()
        .unwrap()
}

/// A second fracture layer glued to the first one has the same dimension, so no Robin law
/// applies between them. The interface is skipped, and the rest of the problem is assembled
/// exactly as without the extra layer.
#[test]
fn equal_dimension_layers_are_skipped() {
    let n = 4;
    let mut square = create_fractured_unit_square::<f64>(n).unwrap();
    let layer_grid = CartesianGrid::line(Point3::new(0.5, 0.0, 0.01), Point3::new(0.5, 1.0, 0.01), n);
    let fracture_faces: Vec<_> = (0..n).collect();
    let num_fracture_faces = square.graph.node(square.fracture).num_faces();
    let mortar = MortarGrid::matching(&fracture_faces, num_fracture_faces, layer_grid.num_cells()).unwrap();
    let layer = square.graph.add_node(layer_grid);
    let layer_edge = square.graph.add_edge(square.fracture, layer, mortar).unwrap();

    let (layered, skipped) = FractureFlow::setup(square, 1.0, interface_parameters(), CouplingPolicy::SkipWithWarning);
    assert_eq!(skipped, vec![layer_edge]);
    assert!(layered.discretizations.coupling_entries(layer_edge).is_empty());

    let system = assemble(&layered);
    let n_total = system.num_dofs();
    assert_eq!(n_total, n * n + n + n + 3 * n);

    // Neither the skipped mortar nor the layer is coupled to anything
    let layer_mortar = system.block(layer_edge, MORTAR_FLUX).unwrap();
    assert_eq!(
        dense_block(&system.matrix, layer_mortar.range(), 0..n_total),
        DMatrix::zeros(n, n_total)
    );
    assert_eq!(
        dense_block(&system.matrix, 0..n_total, layer_mortar.range()),
        DMatrix::zeros(n_total, n)
    );
    let layer_pressure = system.block(layer, PRESSURE).unwrap();
    for block in system.dof_map.blocks() {
        if block.owner != Owner::from(layer) {
            assert_eq!(
                dense_block(&system.matrix, layer_pressure.range(), block.range.range()),
                DMatrix::zeros(n, block.range.size)
            );
        }
    }

    // Every other block matches the system without the extra layer
    let reference = assemble(&FractureFlow::new(n, 1.0, interface_parameters()));
    for row in reference.dof_map.blocks() {
        for col in reference.dof_map.blocks() {
            let layered_row = system.block(row.owner, &row.variable).unwrap();
            let layered_col = system.block(col.owner, &col.variable).unwrap();
            assert_matrix_eq!(
                dense_block(&system.matrix, layered_row.range(), layered_col.range()),
                dense_block(&reference.matrix, row.range.range(), col.range.range()),
                comp = abs,
                tol = 1e-14
            );
        }
        let layered_row = system.block(row.owner, &row.variable).unwrap();
        assert_eq!(
            system.rhs.rows(layered_row.start, layered_row.size),
            reference.rhs.rows(row.range.start, row.range.size)
        );
    }
}
