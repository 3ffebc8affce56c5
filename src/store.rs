//! Storage for variable values distributed from a global solution vector.
use crate::graph::Owner;
use crate::Real;
use nalgebra::DVector;
use std::collections::BTreeMap;

/// Values of variables (and derived quantities) keyed by owner and name.
///
/// This is where solutions end up after distribution, and where the current iterate is read
/// from when operators need it during assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableStore<T: Real> {
    values: BTreeMap<(Owner, String), DVector<T>>,
}

impl<T: Real> Default for VariableStore<T> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<T: Real> VariableStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store values, returning the previously stored values if any.
    pub fn insert(&mut self, owner: impl Into<Owner>, name: &str, values: DVector<T>) -> Option<DVector<T>> {
        self.values.insert((owner.into(), name.to_string()), values)
    }

    pub fn get(&self, owner: impl Into<Owner>, name: &str) -> Option<&DVector<T>> {
        // BTreeMap lookups with a borrowed (Owner, &str) key are not possible, hence the allocation
        self.values.get(&(owner.into(), name.to_string()))
    }

    pub fn remove(&mut self, owner: impl Into<Owner>, name: &str) -> Option<DVector<T>> {
        self.values.remove(&(owner.into(), name.to_string()))
    }

    pub fn contains(&self, owner: impl Into<Owner>, name: &str) -> bool {
        self.get(owner, name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Owner, &str, &DVector<T>)> {
        self.values
            .iter()
            .map(|((owner, name), values)| (*owner, name.as_str(), values))
    }
}
