use std::ops::Range;

use ndarray::{Array1, ArrayD, ArrayView1, IxDyn};

use crate::{MlError, Result};

/// Where a single named tensor lives inside the flat parameter vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSlot {
    name: String,
    shape: Vec<usize>,
    range: Range<usize>,
}

impl TensorSlot {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The flat range `[start, end)` this tensor occupies.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Number of scalar elements in the tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Maps a flat parameter vector into named tensors.
///
/// This is the "offsets + shapes" mechanism behind flatten/unflatten: tensors
/// are laid out in insertion order and, inside each tensor, in logical
/// row-major order. The layout is immutable once built, so the flatten order
/// is stable for as long as the layout lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLayout {
    slots: Vec<TensorSlot>,
    total: usize,
}

impl ParameterLayout {
    /// Creates a new `ParameterLayout`.
    ///
    /// # Args
    /// * `entries` - The name and shape of every tensor, in flatten order.
    ///
    /// # Returns
    /// A new `ParameterLayout` or an error if there are no tensors, a name
    /// repeats or the layout has no elements at all.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<usize>)>,
        S: Into<String>,
    {
        let mut slots: Vec<TensorSlot> = Vec::new();
        let mut offset = 0;

        for (name, shape) in entries {
            let name = name.into();
            if slots.iter().any(|slot| slot.name == name) {
                return Err(MlError::InvalidInput("duplicated tensor name in layout"));
            }

            let len = shape.iter().product::<usize>();
            slots.push(TensorSlot {
                name,
                shape,
                range: offset..offset + len,
            });
            offset += len;
        }

        if slots.is_empty() || offset == 0 {
            return Err(MlError::InvalidInput("parameter layout must not be empty"));
        }

        Ok(Self {
            slots,
            total: offset,
        })
    }

    /// Total number of scalar parameters, the `d` of the flat vector.
    #[inline]
    pub fn len(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[inline]
    pub fn num_tensors(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slots(&self) -> &[TensorSlot] {
        &self.slots
    }

    /// Looks a slot up by tensor name.
    pub fn slot(&self, name: &str) -> Option<&TensorSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    /// Allocates one zeroed tensor per slot.
    pub fn zeros(&self) -> Vec<ArrayD<f64>> {
        self.slots
            .iter()
            .map(|slot| ArrayD::zeros(IxDyn(&slot.shape)))
            .collect()
    }

    /// Checks that `tensors` match this layout one to one.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if the tensor count or any tensor's element
    /// count differs, `MlError::InvalidInput` if a tensor has the right size
    /// but the wrong shape.
    pub fn validate(&self, tensors: &[ArrayD<f64>]) -> Result<()> {
        if tensors.len() != self.slots.len() {
            return Err(MlError::ShapeMismatch {
                what: "tensor count",
                got: tensors.len(),
                expected: self.slots.len(),
            });
        }

        for (slot, tensor) in self.slots.iter().zip(tensors) {
            if tensor.len() != slot.len() {
                return Err(MlError::ShapeMismatch {
                    what: "tensor elements",
                    got: tensor.len(),
                    expected: slot.len(),
                });
            }
            if tensor.shape() != slot.shape.as_slice() {
                return Err(MlError::InvalidInput("tensor shape differs from layout"));
            }
        }

        Ok(())
    }

    /// Concatenates `tensors` into a single vector following the layout.
    ///
    /// # Errors
    /// Fails when `tensors` do not match the layout, see [`Self::validate`].
    pub fn flatten(&self, tensors: &[ArrayD<f64>]) -> Result<Array1<f64>> {
        self.validate(tensors)?;
        Ok(self.flatten_unchecked(tensors))
    }

    pub(crate) fn flatten_unchecked(&self, tensors: &[ArrayD<f64>]) -> Array1<f64> {
        let mut flat = Vec::with_capacity(self.total);
        for tensor in tensors {
            flat.extend(tensor.iter().copied());
        }
        Array1::from(flat)
    }

    /// Writes consecutive slices of `flat` back into `tensors`.
    ///
    /// Every check runs before the first write, so on error `tensors` are
    /// left exactly as they were.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if `flat.len() != self.len()` or `tensors`
    /// do not match the layout.
    pub fn unflatten(&self, flat: ArrayView1<'_, f64>, tensors: &mut [ArrayD<f64>]) -> Result<()> {
        if flat.len() != self.total {
            return Err(MlError::ShapeMismatch {
                what: "flat vector",
                got: flat.len(),
                expected: self.total,
            });
        }
        self.validate(tensors)?;

        for (slot, tensor) in self.slots.iter().zip(tensors.iter_mut()) {
            let src = flat.slice(ndarray::s![slot.range.clone()]);
            for (dst, &value) in tensor.iter_mut().zip(src.iter()) {
                *dst = value;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ParameterLayout {
        ParameterLayout::new([("weight", vec![2, 3]), ("bias", vec![2])]).unwrap()
    }

    #[test]
    fn slots_are_contiguous_and_ordered() {
        let layout = layout();

        assert_eq!(layout.len(), 8);
        assert_eq!(layout.num_tensors(), 2);
        assert_eq!(layout.slots()[0].range(), 0..6);
        assert_eq!(layout.slots()[1].range(), 6..8);
        assert_eq!(layout.slot("bias").unwrap().shape(), &[2]);
        assert!(layout.slot("missing").is_none());
    }

    #[test]
    fn scalar_tensors_take_one_slot() {
        let layout = ParameterLayout::new([("scale", vec![]), ("w", vec![3])]).unwrap();
        assert_eq!(layout.len(), 4);
        assert_eq!(layout.slots()[0].range(), 0..1);
    }

    #[test]
    fn empty_or_duplicated_layouts_are_rejected() {
        let none: [(&str, Vec<usize>); 0] = [];
        assert!(ParameterLayout::new(none).is_err());
        assert!(ParameterLayout::new([("w", vec![0])]).is_err());
        assert!(ParameterLayout::new([("w", vec![1]), ("w", vec![2])]).is_err());
    }

    #[test]
    fn flatten_follows_row_major_order() {
        let layout = layout();
        let mut tensors = layout.zeros();
        tensors[0] = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1., 2., 3., 4., 5., 6.]).unwrap();
        tensors[1] = ArrayD::from_shape_vec(IxDyn(&[2]), vec![7., 8.]).unwrap();

        let flat = layout.flatten(&tensors).unwrap();
        assert_eq!(flat.to_vec(), vec![1., 2., 3., 4., 5., 6., 7., 8.]);
    }

    #[test]
    fn flatten_of_transposed_tensor_uses_logical_order() {
        let layout = ParameterLayout::new([("m", vec![2, 2])]).unwrap();
        let base = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1., 2., 3., 4.]).unwrap();
        let transposed = base.t().to_owned();

        let flat = layout.flatten(&[transposed]).unwrap();
        assert_eq!(flat.to_vec(), vec![1., 3., 2., 4.]);
    }

    #[test]
    fn unflatten_rejects_wrong_length_without_writing() {
        let layout = layout();
        let mut tensors = layout.zeros();
        tensors[1].fill(9.0);
        let before = tensors.clone();

        let short = Array1::from(vec![1.0; 7]);
        let err = layout.unflatten(short.view(), &mut tensors).unwrap_err();

        assert_eq!(
            err,
            MlError::ShapeMismatch {
                what: "flat vector",
                got: 7,
                expected: 8
            }
        );
        assert_eq!(tensors, before);
    }

    #[test]
    fn validate_catches_wrong_shapes() {
        let layout = layout();
        let mut tensors = layout.zeros();
        tensors[0] = ArrayD::zeros(IxDyn(&[3, 2]));

        assert_eq!(
            layout.validate(&tensors),
            Err(MlError::InvalidInput("tensor shape differs from layout"))
        );
        assert!(matches!(
            layout.validate(&tensors[..1]),
            Err(MlError::ShapeMismatch {
                what: "tensor count",
                ..
            })
        ));
    }
}
