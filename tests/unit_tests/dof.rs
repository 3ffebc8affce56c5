use crate::SquareAndLine;
use itertools::Itertools;
use mixdim::dof::{BlockRange, DofMap};
use mixdim::error::AssemblyError;
use mixdim::graph::{EdgeIndex, MixedDimGraph, NodeIndex, Owner};
use mixdim::grid::CartesianGrid;
use mixdim::proptest::declared_fractured_square;
use mixdim::store::VariableStore;
use mixdim::variables::{DofSpec, VariableRegistry};
use nalgebra::{DVector, Point3};
use proptest::prelude::*;
use util::prefix_sum;

/// Declarations on the square-and-line problem, deliberately made out of layout order.
fn scrambled_declarations(problem: &SquareAndLine) -> VariableRegistry {
    let mut registry = VariableRegistry::new();
    registry.declare(EdgeIndex(0), "lambda", DofSpec::cells(1)).unwrap();
    registry.declare(problem.line, "p", DofSpec::cells(1)).unwrap();
    registry.declare(problem.square, "p", DofSpec::cells(1)).unwrap();
    registry.declare(problem.square, "u", DofSpec::faces(1)).unwrap();
    registry.declare(problem.line, "q", DofSpec::cells(2)).unwrap();
    registry
}

#[test]
fn layout_follows_graph_order_then_declaration_order() {
    let problem = SquareAndLine::new();
    let registry = scrambled_declarations(&problem);
    let dof_map = DofMap::from_declarations(&problem.graph, &registry).unwrap();

    assert_eq!(dof_map.total_dofs(), 24);
    assert_eq!(dof_map.block_sizes(), vec![4, 12, 2, 4, 2]);
    assert_eq!(dof_map.block(problem.square, "p"), Some(BlockRange::new(0, 4)));
    assert_eq!(dof_map.block(problem.square, "u"), Some(BlockRange::new(4, 12)));
    assert_eq!(dof_map.block(problem.line, "p"), Some(BlockRange::new(16, 2)));
    assert_eq!(dof_map.block(problem.line, "q"), Some(BlockRange::new(18, 4)));
    assert_eq!(dof_map.block(EdgeIndex(0), "lambda"), Some(BlockRange::new(22, 2)));
    assert_eq!(dof_map.block(problem.line, "u"), None);
    assert_eq!(dof_map.blocks_of(problem.square).len(), 2);

    let (block, local) = dof_map.locate(19).unwrap();
    assert_eq!((block.owner, block.variable.as_str(), local), (problem.line.into(), "q", 1));
    assert!(dof_map.locate(24).is_none());
}

#[test]
fn layout_is_deterministic() {
    let problem = SquareAndLine::new();
    let registry = scrambled_declarations(&problem);
    let first = DofMap::from_declarations(&problem.graph, &registry).unwrap();
    let second = DofMap::from_declarations(&problem.graph, &registry).unwrap();
    assert_eq!(first, second);
}

#[test]
fn layout_round_trips_through_json() {
    let problem = SquareAndLine::new();
    let registry = scrambled_declarations(&problem);
    let dof_map = DofMap::from_declarations(&problem.graph, &registry).unwrap();

    let json = serde_json::to_string(&dof_map).unwrap();
    let deserialized: DofMap = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, dof_map);
}

#[test]
fn locate_skips_empty_blocks() {
    let mut graph: MixedDimGraph<CartesianGrid<f64>, f64> = MixedDimGraph::new();
    let point = graph.add_node(CartesianGrid::point(Point3::origin()));
    let mut registry = VariableRegistry::new();
    // A point has no faces, so this variable occupies no dofs
    registry.declare(point, "trace", DofSpec::faces(1)).unwrap();
    registry.declare(point, "p", DofSpec::cells(1)).unwrap();

    let dof_map = DofMap::from_declarations(&graph, &registry).unwrap();
    assert_eq!(dof_map.block_sizes(), vec![0, 1]);
    let (block, local) = dof_map.locate(0).unwrap();
    assert_eq!((block.variable.as_str(), local), ("p", 0));
}

#[test]
fn declarations_on_unknown_owners_are_rejected() {
    let problem = SquareAndLine::new();
    let mut registry = scrambled_declarations(&problem);
    registry.declare(NodeIndex(5), "p", DofSpec::cells(1)).unwrap();

    let err = DofMap::from_declarations(&problem.graph, &registry).unwrap_err();
    assert!(matches!(err, AssemblyError::Configuration { .. }));
    assert_eq!(err.owner(), Some(Owner::Node(NodeIndex(5))));
}

#[test]
fn overflowing_layouts_are_rejected() {
    let problem = SquareAndLine::new();
    let mut registry = VariableRegistry::new();
    registry
        .declare(problem.square, "p", DofSpec::cells(usize::MAX / 2))
        .unwrap();

    let err = DofMap::from_declarations(&problem.graph, &registry).unwrap_err();
    assert!(matches!(err, AssemblyError::Configuration { .. }));
}

#[test]
fn gather_inverts_distribute() {
    let problem = SquareAndLine::new();
    let registry = scrambled_declarations(&problem);
    let dof_map = DofMap::from_declarations(&problem.graph, &registry).unwrap();

    let solution = DVector::from_fn(24, |i, _| i as f64);
    let mut store = VariableStore::new();
    dof_map.distribute(&registry, &solution, &mut store).unwrap();
    assert_eq!(store.len(), 5);
    assert_eq!(store.get(problem.line, "p").unwrap(), &DVector::from_vec(vec![16.0, 17.0]));
    assert_eq!(dof_map.gather(&store).unwrap(), solution);

    // Missing values gather as zeros, values of the wrong length are rejected
    store.remove(EdgeIndex(0), "lambda");
    let gathered = dof_map.gather(&store).unwrap();
    assert_eq!(gathered.rows(22, 2).sum(), 0.0);
    store.insert(EdgeIndex(0), "lambda", DVector::zeros(3));
    assert!(matches!(
        dof_map.gather(&store),
        Err(AssemblyError::DimensionMismatch { expected: 2, actual: 3 })
    ));
}

#[test]
fn stale_layouts_are_detected() {
    let problem = SquareAndLine::new();
    let mut registry = scrambled_declarations(&problem);
    let dof_map = DofMap::from_declarations(&problem.graph, &registry).unwrap();
    assert!(dof_map.is_current(&registry));

    registry.declare(problem.line, "temperature", DofSpec::cells(1)).unwrap();
    assert!(!dof_map.is_current(&registry));

    let mut store = VariableStore::<f64>::new();
    let result = dof_map.distribute(&registry, &DVector::zeros(24), &mut store);
    assert!(matches!(result, Err(AssemblyError::Configuration { .. })));
    assert!(store.is_empty());
}

#[test]
fn layouts_of_diverged_registry_clones_are_detected() {
    let problem = SquareAndLine::new();
    let mut registry = scrambled_declarations(&problem);
    let mut diverged = registry.clone();
    registry.declare(problem.line, "temperature", DofSpec::cells(1)).unwrap();
    diverged.declare(problem.line, "salinity", DofSpec::cells(1)).unwrap();
    assert_eq!(registry.revision(), diverged.revision());

    let dof_map = DofMap::from_declarations(&problem.graph, &registry).unwrap();
    assert!(dof_map.is_current(&registry));
    assert!(!dof_map.is_current(&diverged));

    let mut store = VariableStore::<f64>::new();
    let result = dof_map.distribute(&diverged, &DVector::zeros(26), &mut store);
    assert!(matches!(result, Err(AssemblyError::Configuration { .. })));
    assert!(store.is_empty());
}

proptest! {
    #[test]
    fn blocks_partition_the_global_range((graph, registry) in declared_fractured_square()) {
        let dof_map = DofMap::from_declarations(&graph, &registry).unwrap();
        let blocks = dof_map.blocks();

        // Blocks are contiguous, start at zero and cover all dofs
        let starts: Vec<_> = prefix_sum(dof_map.block_sizes(), 0).collect();
        let actual_starts: Vec<_> = blocks.iter().map(|block| block.range.start).collect();
        prop_assert_eq!(starts, actual_starts);
        prop_assert_eq!(dof_map.block_sizes().iter().sum::<usize>(), dof_map.total_dofs());

        // Nodes precede edges, owners follow insertion order
        let owners: Vec<_> = blocks.iter().map(|block| block.owner).dedup().collect();
        let expected_owners: Vec<_> = graph.owners().filter(|&owner| registry.has_variables(owner)).collect();
        prop_assert_eq!(owners, expected_owners);

        // Within an owner, variables follow declaration order and have the declared size
        for owner in graph.owners() {
            let declared: Vec<_> = registry.variables(owner).iter().map(|v| v.name.clone()).collect();
            let laid_out: Vec<_> = dof_map.blocks_of(owner).iter().map(|block| block.variable.clone()).collect();
            prop_assert_eq!(declared, laid_out);
            for block in dof_map.blocks_of(owner) {
                let expected_size = block.dofs.block_size(&graph.entity_counts(owner));
                prop_assert_eq!(Some(block.range.size), expected_size);
            }
        }
    }

    #[test]
    fn every_global_index_is_located_in_exactly_one_block((graph, registry) in declared_fractured_square()) {
        let dof_map = DofMap::from_declarations(&graph, &registry).unwrap();
        for index in 0..dof_map.total_dofs() {
            let containing = dof_map.blocks().iter().filter(|block| block.range.contains(index)).count();
            prop_assert_eq!(containing, 1);

            let (block, local) = dof_map.locate(index).unwrap();
            prop_assert!(block.range.contains(index));
            prop_assert_eq!(block.range.start + local, index);
        }
    }

    #[test]
    fn distribute_then_gather_is_identity((graph, registry) in declared_fractured_square()) {
        let dof_map = DofMap::from_declarations(&graph, &registry).unwrap();
        let solution = DVector::from_fn(dof_map.total_dofs(), |i, _| (i as f64).sin());
        let mut store = VariableStore::new();
        dof_map.distribute(&registry, &solution, &mut store).unwrap();
        prop_assert_eq!(dof_map.gather(&store).unwrap(), solution);
    }
}
