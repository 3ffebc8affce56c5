use crate::graph::{MixedDimGraph, Owner};
use crate::grid::CartesianGrid;
use crate::procedural::create_fractured_unit_square;
use crate::variables::{DofSpec, VariableRegistry};
use ::proptest::collection::{btree_set, vec};
use ::proptest::prelude::*;

/// Any valid dof specification with at most two dofs per cell, face and node.
pub fn dof_spec() -> impl Strategy<Value = DofSpec> + Clone {
    (0..3usize, 0..3usize, 0..3usize)
        .prop_map(|(cells, faces, nodes)| DofSpec::new(cells, faces, nodes))
        .prop_filter("at least one dof count must be positive", DofSpec::is_valid)
}

/// A dof specification suitable for mortar variables, which only live on cells.
pub fn mortar_dof_spec() -> impl Strategy<Value = DofSpec> + Clone {
    (1..3usize).prop_map(DofSpec::cells)
}

/// Between one and `max_variables` variables with distinct names.
pub fn declarations(
    max_variables: usize,
    dofs: impl Strategy<Value = DofSpec> + Clone,
) -> impl Strategy<Value = Vec<(String, DofSpec)>> {
    btree_set("[a-z]{1,6}", 1..=max_variables.max(1)).prop_flat_map(move |names| {
        let n = names.len();
        let names: Vec<_> = names.into_iter().collect();
        vec(dofs.clone(), n).prop_map(move |specs| names.iter().cloned().zip(specs).collect())
    })
}

/// A fractured unit square with random variable declarations on some of its nodes and edges.
///
/// Declarations are made in a random order over the owners, so that the layout cannot simply
/// follow the order of declaration.
pub fn declared_fractured_square() -> impl Strategy<Value = (MixedDimGraph<CartesianGrid<f64>, f64>, VariableRegistry)>
{
    let node_declarations = vec(prop::option::of(declarations(3, dof_spec())), 3);
    let edge_declarations = vec(prop::option::of(declarations(2, mortar_dof_spec())), 2);
    (1..4usize, node_declarations, edge_declarations)
        .prop_flat_map(|(half_cells, nodes, edges)| {
            let num_owners = nodes.len() + edges.len();
            let order = Just((0..num_owners).collect::<Vec<_>>()).prop_shuffle();
            (Just(half_cells), Just(nodes), Just(edges), order)
        })
        .prop_map(|(half_cells, nodes, edges, order)| {
            let square = create_fractured_unit_square(2 * half_cells).expect("cell count is even");
            let graph = square.graph;
            let mut registry = VariableRegistry::new();
            for owner_idx in order {
                let (owner, declarations) = if owner_idx < nodes.len() {
                    let (node, _) = graph.nodes().nth(owner_idx).expect("node exists");
                    (Owner::from(node), &nodes[owner_idx])
                } else {
                    let edge_idx = owner_idx - nodes.len();
                    let (edge, _) = graph.edges().nth(edge_idx).expect("edge exists");
                    (Owner::from(edge), &edges[edge_idx])
                };
                for (name, dofs) in declarations.iter().flatten() {
                    registry
                        .declare(owner, name.as_str(), *dofs)
                        .expect("declarations are valid");
                }
            }
            (graph, registry)
        })
}
