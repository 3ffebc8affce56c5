//! Parameters attached to nodes and edges.
//!
//! Parameters are kept in an explicit [`ParameterStore`] keyed by node or edge identity and are
//! passed unmodified to the discretization operators. Within the parameters of one owner, values
//! are grouped under a *keyword* (the namespace of a model, e.g. `"flow"`), so that several
//! models can share a graph without name clashes.
use crate::error::AssemblyError;
use crate::graph::Owner;
use crate::Real;
use eyre::eyre;
use nalgebra::{DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter names understood by the operators shipped with `mixdim` and `mixdim-flow`.
pub mod names {
    /// Permeability (scalar, per-cell array or [`SecondOrderTensor`](super::SecondOrderTensor)).
    pub const PERMEABILITY: &str = "second_order_tensor";
    /// Aperture of lower-dimensional grids or interfaces (scalar or array).
    pub const APERTURE: &str = "aperture";
    /// Integrated source per cell (scalar or array).
    pub const SOURCE: &str = "source";
    /// Boundary condition classification ([`BoundaryCondition`](super::BoundaryCondition)).
    pub const BC: &str = "bc";
    /// Boundary values per face (scalar or array).
    pub const BC_VALUES: &str = "bc_values";
    /// Diffusivity normal to an interface (scalar or per mortar cell).
    pub const NORMAL_DIFFUSIVITY: &str = "normal_diffusivity";
}

/// Type of a boundary condition on a single face.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    Neumann,
    Dirichlet,
}

/// Classification of the faces of a grid into Dirichlet and Neumann faces.
///
/// Faces that are not explicitly classified are Neumann faces. Interior faces are never
/// consulted by the operators, so their classification is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    kinds: Vec<BoundaryKind>,
}

impl BoundaryCondition {
    /// All faces are Neumann faces.
    pub fn neumann(num_faces: usize) -> Self {
        Self {
            kinds: vec![BoundaryKind::Neumann; num_faces],
        }
    }

    /// Classify the given faces, leaving all other faces as Neumann faces.
    pub fn from_labels(num_faces: usize, faces: &[usize], kinds: &[BoundaryKind]) -> Result<Self, AssemblyError> {
        if faces.len() != kinds.len() {
            return Err(AssemblyError::configuration(format!(
                "{} boundary faces but {} boundary labels",
                faces.len(),
                kinds.len()
            )));
        }
        let mut bc = Self::neumann(num_faces);
        for (&face, &kind) in faces.iter().zip(kinds) {
            let slot = bc.kinds.get_mut(face).ok_or_else(|| {
                AssemblyError::configuration(format!(
                    "boundary face {} is out of bounds ({} faces)",
                    face, num_faces
                ))
            })?;
            *slot = kind;
        }
        Ok(bc)
    }

    /// Mark the given faces as Dirichlet faces.
    ///
    /// # Panics
    ///
    /// Panics if a face index is out of bounds.
    pub fn with_dirichlet(mut self, faces: &[usize]) -> Self {
        for &face in faces {
            self.kinds[face] = BoundaryKind::Dirichlet;
        }
        self
    }

    pub fn num_faces(&self) -> usize {
        self.kinds.len()
    }

    pub fn kind(&self, face: usize) -> BoundaryKind {
        self.kinds[face]
    }

    pub fn is_dirichlet(&self, face: usize) -> bool {
        self.kinds[face] == BoundaryKind::Dirichlet
    }

    pub fn is_neumann(&self, face: usize) -> bool {
        self.kinds[face] == BoundaryKind::Neumann
    }

    pub fn dirichlet_faces(&self) -> impl Iterator<Item = usize> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter_map(|(idx, &kind)| (kind == BoundaryKind::Dirichlet).then(|| idx))
    }
}

/// A cell-wise symmetric second order tensor, e.g. a permeability.
///
/// Lower-dimensional grids use the leading block of each 3x3 matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondOrderTensor<T: Real> {
    values: Vec<Matrix3<T>>,
}

impl<T: Real> SecondOrderTensor<T> {
    pub fn isotropic(k: &[T]) -> Self {
        Self {
            values: k.iter().map(|&k| Matrix3::from_diagonal_element(k)).collect(),
        }
    }

    /// A diagonal tensor per cell.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length.
    pub fn diagonal(kxx: &[T], kyy: &[T], kzz: &[T]) -> Self {
        assert_eq!(kxx.len(), kyy.len(), "Tensor components must have equal length");
        assert_eq!(kxx.len(), kzz.len(), "Tensor components must have equal length");
        let values = kxx
            .iter()
            .zip(kyy)
            .zip(kzz)
            .map(|((&xx, &yy), &zz)| Matrix3::from_diagonal(&Vector3::new(xx, yy, zz)))
            .collect();
        Self { values }
    }

    pub fn from_matrices(values: Vec<Matrix3<T>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn cell(&self, cell: usize) -> &Matrix3<T> {
        &self.values[cell]
    }
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue<T: Real> {
    Scalar(T),
    Array(DVector<T>),
    Tensor(SecondOrderTensor<T>),
    BoundaryCondition(BoundaryCondition),
}

impl<T: Real> From<DVector<T>> for ParamValue<T> {
    fn from(value: DVector<T>) -> Self {
        ParamValue::Array(value)
    }
}

impl<T: Real> From<SecondOrderTensor<T>> for ParamValue<T> {
    fn from(value: SecondOrderTensor<T>) -> Self {
        ParamValue::Tensor(value)
    }
}

impl<T: Real> From<BoundaryCondition> for ParamValue<T> {
    fn from(value: BoundaryCondition) -> Self {
        ParamValue::BoundaryCondition(value)
    }
}

/// The parameters of a single node or edge, grouped by keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters<T: Real> {
    values: BTreeMap<String, BTreeMap<String, ParamValue<T>>>,
}

impl<T: Real> Default for Parameters<T> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<T: Real> Parameters<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keyword: &str, name: &str, value: impl Into<ParamValue<T>>) -> &mut Self {
        self.values
            .entry(keyword.to_string())
            .or_default()
            .insert(name.to_string(), value.into());
        self
    }

    pub fn with(mut self, keyword: &str, name: &str, value: impl Into<ParamValue<T>>) -> Self {
        self.insert(keyword, name, value);
        self
    }

    pub fn get(&self, keyword: &str, name: &str) -> Option<&ParamValue<T>> {
        self.values.get(keyword)?.get(name)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Look up a parameter that must be present.
    pub fn require(&self, keyword: &str, name: &str) -> eyre::Result<&ParamValue<T>> {
        self.get(keyword, name)
            .ok_or_else(|| eyre!("missing parameter '{}' under keyword '{}'", name, keyword))
    }

    /// An array of the given length, broadcasting scalar values.
    pub fn array(&self, keyword: &str, name: &str, len: usize) -> eyre::Result<DVector<T>> {
        self.optional_array(keyword, name, len)?
            .ok_or_else(|| eyre!("missing parameter '{}' under keyword '{}'", name, keyword))
    }

    /// Like [`Parameters::array`], but returns `None` if the parameter is absent.
    pub fn optional_array(&self, keyword: &str, name: &str, len: usize) -> eyre::Result<Option<DVector<T>>> {
        match self.get(keyword, name) {
            None => Ok(None),
            Some(ParamValue::Scalar(value)) => Ok(Some(DVector::from_element(len, *value))),
            Some(ParamValue::Array(values)) if values.len() == len => Ok(Some(values.clone())),
            Some(ParamValue::Array(values)) => Err(eyre!(
                "parameter '{}' has length {}, expected {}",
                name,
                values.len(),
                len
            )),
            Some(_) => Err(eyre!("parameter '{}' is not a scalar or an array", name)),
        }
    }

    /// A cell-wise tensor of the given length.
    ///
    /// Scalars and arrays are interpreted as isotropic tensors.
    pub fn tensor(&self, keyword: &str, name: &str, len: usize) -> eyre::Result<SecondOrderTensor<T>> {
        match self.require(keyword, name)? {
            ParamValue::Tensor(tensor) if tensor.len() == len => Ok(tensor.clone()),
            ParamValue::Tensor(tensor) => Err(eyre!(
                "tensor '{}' has {} entries, expected {}",
                name,
                tensor.len(),
                len
            )),
            _ => {
                let k = self.array(keyword, name, len)?;
                Ok(SecondOrderTensor::isotropic(k.as_slice()))
            }
        }
    }

    pub fn boundary_condition(&self, keyword: &str, name: &str) -> eyre::Result<&BoundaryCondition> {
        match self.require(keyword, name)? {
            ParamValue::BoundaryCondition(bc) => Ok(bc),
            _ => Err(eyre!("parameter '{}' is not a boundary condition", name)),
        }
    }
}

/// Parameters of all nodes and edges of a graph, keyed by owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore<T: Real> {
    parameters: BTreeMap<Owner, Parameters<T>>,
}

impl<T: Real> Default for ParameterStore<T> {
    fn default() -> Self {
        Self {
            parameters: BTreeMap::new(),
        }
    }
}

impl<T: Real> ParameterStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the parameters of an owner, returning the previous ones.
    pub fn insert(&mut self, owner: impl Into<Owner>, parameters: Parameters<T>) -> Option<Parameters<T>> {
        self.parameters.insert(owner.into(), parameters)
    }

    pub fn get(&self, owner: impl Into<Owner>) -> Option<&Parameters<T>> {
        self.parameters.get(&owner.into())
    }

    /// Mutable access to the parameters of an owner, creating empty parameters if needed.
    pub fn entry(&mut self, owner: impl Into<Owner>) -> &mut Parameters<T> {
        self.parameters.entry(owner.into()).or_default()
    }
}
