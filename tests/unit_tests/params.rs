use matrixcompare::assert_matrix_eq;
use mixdim::error::AssemblyError;
use mixdim::graph::{EdgeIndex, NodeIndex};
use mixdim::params::{names, BoundaryCondition, BoundaryKind, ParamValue, ParameterStore, Parameters, SecondOrderTensor};
use nalgebra::{DVector, Matrix3};

#[test]
fn scalar_parameters_are_broadcast() {
    let parameters = Parameters::new().with("flow", names::APERTURE, ParamValue::Scalar(0.1));
    let aperture = parameters.array("flow", names::APERTURE, 3).unwrap();
    assert_matrix_eq!(aperture, DVector::from_element(3, 0.1), comp = float);

    assert!(parameters.optional_array("flow", names::SOURCE, 3).unwrap().is_none());
    assert!(parameters.array("flow", names::SOURCE, 3).is_err());
    assert!(parameters.array("transport", names::APERTURE, 3).is_err());
}

#[test]
fn array_parameters_must_have_the_requested_length() {
    let parameters = Parameters::new().with("flow", names::SOURCE, DVector::from_vec(vec![1.0, 2.0]));
    assert!(parameters.array("flow", names::SOURCE, 2).is_ok());
    assert!(parameters.array("flow", names::SOURCE, 3).is_err());
    assert!(parameters.boundary_condition("flow", names::SOURCE).is_err());
}

#[test]
fn tensors_accept_scalars_arrays_and_matrices() {
    let scalar = Parameters::new().with("flow", names::PERMEABILITY, ParamValue::Scalar(2.0));
    let tensor = scalar.tensor("flow", names::PERMEABILITY, 2).unwrap();
    assert_eq!(tensor.len(), 2);
    assert_eq!(tensor.cell(1), &Matrix3::from_diagonal_element(2.0));

    let anisotropic = SecondOrderTensor::diagonal(&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]);
    let parameters = Parameters::new().with("flow", names::PERMEABILITY, anisotropic.clone());
    assert_eq!(parameters.tensor("flow", names::PERMEABILITY, 2).unwrap(), anisotropic);
    assert!(parameters.tensor("flow", names::PERMEABILITY, 3).is_err());
    assert_eq!(anisotropic.cell(1)[(1, 1)], 4.0);
}

#[test]
fn boundary_conditions_from_labels() {
    let bc = BoundaryCondition::from_labels(5, &[0, 4], &[BoundaryKind::Dirichlet, BoundaryKind::Neumann]).unwrap();
    assert!(bc.is_dirichlet(0));
    assert!(bc.is_neumann(4));
    assert!(bc.is_neumann(2));
    assert_eq!(bc.dirichlet_faces().collect::<Vec<_>>(), vec![0]);

    let mismatch = BoundaryCondition::from_labels(5, &[0, 4], &[BoundaryKind::Dirichlet]);
    assert!(matches!(mismatch, Err(AssemblyError::Configuration { .. })));
    let out_of_bounds = BoundaryCondition::from_labels(5, &[5], &[BoundaryKind::Dirichlet]);
    assert!(matches!(out_of_bounds, Err(AssemblyError::Configuration { .. })));
}

#[test]
fn parameter_store_is_keyed_by_owner() {
    let mut store = ParameterStore::new();
    store.insert(NodeIndex(0), Parameters::new().with("flow", names::SOURCE, ParamValue::Scalar(1.0)));
    store
        .entry(EdgeIndex(0))
        .insert("flow", names::NORMAL_DIFFUSIVITY, ParamValue::Scalar(5.0));

    assert!(store.get(NodeIndex(0)).unwrap().get("flow", names::SOURCE).is_some());
    assert!(store.get(NodeIndex(1)).is_none());
    let edge = store.get(EdgeIndex(0)).unwrap();
    assert_eq!(edge.get("flow", names::NORMAL_DIFFUSIVITY), Some(&ParamValue::Scalar(5.0)));
    assert_eq!(edge.keywords().collect::<Vec<_>>(), vec!["flow"]);
}
