use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD, ArrayViewMutD};

use super::ParameterLayout;
use crate::{MlError, Result};

/// An ordered collection of named tensors with a fixed flatten order.
///
/// Shapes are frozen at construction: mutable access only hands out views, so
/// the layout and the tensors can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    layout: ParameterLayout,
    tensors: Vec<ArrayD<f64>>,
}

impl ParameterSet {
    /// Creates a new `ParameterSet` from named tensors.
    ///
    /// # Args
    /// * `named` - The tensors in flatten order, paired with their names.
    ///
    /// # Returns
    /// A new `ParameterSet` or an error if the set would be empty or a name repeats.
    pub fn new<I, S>(named: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ArrayD<f64>)>,
        S: Into<String>,
    {
        let (names, tensors): (Vec<String>, Vec<ArrayD<f64>>) = named
            .into_iter()
            .map(|(name, tensor)| (name.into(), tensor))
            .unzip();

        let shapes = tensors.iter().map(|t| t.shape().to_vec());
        let layout = ParameterLayout::new(names.into_iter().zip(shapes))?;

        Ok(Self { layout, tensors })
    }

    /// Creates a zeroed `ParameterSet` following `layout`.
    pub fn zeros(layout: &ParameterLayout) -> Self {
        Self {
            tensors: layout.zeros(),
            layout: layout.clone(),
        }
    }

    /// Rebuilds a `ParameterSet` from a flat vector.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if `flat` does not have `layout.len()` elements.
    pub fn from_flat(layout: &ParameterLayout, flat: ArrayView1<'_, f64>) -> Result<Self> {
        let mut set = Self::zeros(layout);
        set.unflatten(flat)?;
        Ok(set)
    }

    /// A zeroed shadow with the same names and shapes.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(&self.layout)
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Total number of scalar parameters.
    #[inline]
    pub fn num_params(&self) -> usize {
        self.layout.len()
    }

    #[inline]
    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    #[inline]
    pub fn tensors(&self) -> &[ArrayD<f64>] {
        &self.tensors
    }

    /// Read-only view of the tensor called `name`.
    pub fn get(&self, name: &str) -> Option<ArrayViewD<'_, f64>> {
        let idx = self.index_of(name)?;
        Some(self.tensors[idx].view())
    }

    /// Mutable view of the tensor called `name`. The view cannot change its shape.
    pub fn get_mut(&mut self, name: &str) -> Option<ArrayViewMutD<'_, f64>> {
        let idx = self.index_of(name)?;
        Some(self.tensors[idx].view_mut())
    }

    /// Iterates `(name, tensor)` pairs in flatten order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f64>)> {
        self.layout
            .slots()
            .iter()
            .map(|slot| slot.name())
            .zip(&self.tensors)
    }

    /// Concatenates every tensor into a single vector of length `num_params()`.
    pub fn flatten(&self) -> Array1<f64> {
        self.layout.flatten_unchecked(&self.tensors)
    }

    /// Writes `flat` back into the tensors.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if `flat.len() != num_params()`; the set is
    /// left untouched in that case.
    pub fn unflatten(&mut self, flat: ArrayView1<'_, f64>) -> Result<()> {
        self.layout.unflatten(flat, &mut self.tensors)
    }

    /// Overwrites every tensor with `tensors`, which must match the layout.
    ///
    /// # Errors
    /// Fails without writing anything if `tensors` do not match the layout.
    pub fn assign(&mut self, tensors: &[ArrayD<f64>]) -> Result<()> {
        self.layout.validate(tensors)?;
        for (dst, src) in self.tensors.iter_mut().zip(tensors) {
            dst.assign(src);
        }
        Ok(())
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: f64) {
        self.tensors.iter_mut().for_each(|t| t.fill(value));
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.layout.slots().iter().position(|slot| slot.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::IxDyn;

    use super::*;

    fn tensor(shape: &[usize], start: f64) -> ArrayD<f64> {
        let len = shape.iter().product::<usize>();
        let values = (0..len).map(|i| start + i as f64 * 0.5).collect();
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
    }

    fn params() -> ParameterSet {
        ParameterSet::new([
            ("conv", tensor(&[2, 2, 3], -3.0)),
            ("scale", tensor(&[], 0.25)),
            ("bias", tensor(&[4], 10.0)),
        ])
        .unwrap()
    }

    #[test]
    fn unflatten_of_flatten_is_identity() {
        let ps = params();
        let mut restored = ps.zeros_like();

        restored.unflatten(ps.flatten().view()).unwrap();

        assert_eq!(restored, ps);
        for ((_, a), (_, b)) in ps.iter().zip(restored.iter()) {
            assert_eq!(a.shape(), b.shape());
        }
    }

    #[test]
    fn flatten_of_unflatten_is_bitwise_identity() {
        let mut ps = params();
        let flat: Array1<f64> = (0..ps.num_params())
            .map(|i| (i as f64).sin() * 1e-3 + 1.0 / 3.0)
            .collect();

        ps.unflatten(flat.view()).unwrap();
        let again = ps.flatten();

        assert_eq!(again.len(), flat.len());
        for (a, b) in again.iter().zip(flat.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn mismatched_unflatten_leaves_set_untouched() {
        let mut ps = params();
        let before = ps.clone();
        let long = Array1::from(vec![0.0; ps.num_params() + 1]);

        let err = ps.unflatten(long.view()).unwrap_err();

        assert!(matches!(err, MlError::ShapeMismatch { got: 18, expected: 17, .. }));
        assert_eq!(ps, before);
    }

    #[test]
    fn named_access_and_views() {
        let mut ps = params();
        assert_eq!(ps.num_tensors(), 3);
        assert_eq!(ps.get("scale").unwrap().iter().next(), Some(&0.25));

        ps.get_mut("bias").unwrap().fill(1.0);
        assert!(ps.get("bias").unwrap().iter().all(|&v| v == 1.0));
        assert!(ps.get("missing").is_none());
    }

    #[test]
    fn from_flat_rebuilds_values() {
        let ps = params();
        let rebuilt = ParameterSet::from_flat(ps.layout(), ps.flatten().view()).unwrap();
        assert_eq!(rebuilt, ps);
    }
}
