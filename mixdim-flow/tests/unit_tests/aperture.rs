use matrixcompare::assert_matrix_eq;
use mixdim::mortar::MortarGrid;
use mixdim_flow::normal_diffusivity_from_aperture;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[test]
fn normal_diffusivity_of_line_fracture_is_inversely_proportional_to_aperture() {
    let mortar = MortarGrid::<f64>::matching(&[1, 3], 4, 2).unwrap();
    let apertures = DVector::from_vec(vec![0.5, 0.25]);

    let kn = normal_diffusivity_from_aperture(2.0, &mortar, &apertures, 1).unwrap();
    assert_matrix_eq!(kn, DVector::from_vec(vec![4.0, 8.0]), comp = float);
}

#[test]
fn normal_diffusivity_of_point_intersection_uses_square_root() {
    let mortar = MortarGrid::<f64>::matching(&[0], 2, 1).unwrap();
    let apertures = DVector::from_vec(vec![0.25]);

    let kn = normal_diffusivity_from_aperture(1.0, &mortar, &apertures, 0).unwrap();
    assert_matrix_eq!(kn, DVector::from_vec(vec![2.0]), comp = abs, tol = 1e-14);
}

#[test]
fn normal_diffusivity_rejects_invalid_input() {
    let mortar = MortarGrid::<f64>::matching(&[0, 1], 2, 2).unwrap();

    let zero_aperture = DVector::from_vec(vec![1.0, 0.0]);
    assert!(normal_diffusivity_from_aperture(1.0, &mortar, &zero_aperture, 1).is_err());

    let wrong_length = DVector::from_vec(vec![1.0]);
    assert!(normal_diffusivity_from_aperture(1.0, &mortar, &wrong_length, 1).is_err());

    let apertures = DVector::from_vec(vec![1.0, 1.0]);
    assert!(normal_diffusivity_from_aperture(1.0, &mortar, &apertures, 2).is_err());
}

#[test]
fn apertures_are_raised_to_the_power_before_averaging() {
    // One mortar cell overlapping two secondary cells with equal weight
    let mut primary = CooMatrix::new(1, 2);
    primary.push(0, 0, 1.0);
    let mut secondary = CooMatrix::new(1, 2);
    secondary.push(0, 0, 1.0);
    secondary.push(0, 1, 1.0);
    let mortar = MortarGrid::from_projections(CsrMatrix::from(&primary), CsrMatrix::from(&secondary)).unwrap();
    let apertures = DVector::from_vec(vec![0.25, 1.0]);

    // sqrt(0.25) and sqrt(1) average to 0.75, whereas sqrt of the averaged aperture would be
    // sqrt(0.625)
    let kn = normal_diffusivity_from_aperture(1.0, &mortar, &apertures, 0).unwrap();
    assert_matrix_eq!(kn, DVector::from_vec(vec![4.0 / 3.0]), comp = abs, tol = 1e-14);
}
