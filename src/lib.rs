//! Degree-of-freedom management and global assembly for PDEs posed on mixed-dimensional domains.
//!
//! A mixed-dimensional domain is a network of grids of different topological dimension
//! (e.g. a 2D porous matrix and the 1D fractures running through it), glued together pairwise
//! by lower-dimensional *mortar* interfaces. The [`graph::MixedDimGraph`] stores this network,
//! the [`variables::VariableRegistry`] records which unknowns live where, and the
//! [`discretization::DiscretizationRegistry`] records which operators produce the local systems.
//! The [`assembly::MixedDimAssembler`] lays out a single global numbering ([`dof::DofMap`]),
//! collects all local and interface contributions into one sparse system and scatters solutions
//! back into a [`store::VariableStore`].
//!
//! Grids, discretization kernels and linear solvers are external collaborators. The crate
//! ships a structured [`grid::CartesianGrid`] and the standard [`coupling::RobinCoupling`] law,
//! concrete flow operators live in the `mixdim-flow` crate.
use nalgebra::RealField;

pub mod assembly;
pub mod coupling;
pub mod discretization;
pub mod dof;
pub mod error;
pub mod graph;
pub mod grid;
pub mod mortar;
pub mod params;
pub mod procedural;
pub mod store;
pub mod variables;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// A real scalar type usable throughout `mixdim`.
///
/// Used as a trait alias for the bounds frequently needed by generic routines.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
