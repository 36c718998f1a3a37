use std::sync::Arc;

use derive_more::Display;
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("shape error: rank must be at least 1")]
    Rank,
    #[error("shape error: extent of axis {axis} must be positive")]
    Extent { axis: usize },
    #[error("shape error: size of {0:?} overflows")]
    Overflow(Vec<usize>),
    #[error("shape error: shape {0} needs {1} bytes but the buffer holds {2}")]
    Size(Shape, usize, usize),
    #[error("shape error: shape {0} needs {1} elements but got {2}")]
    Count(Shape, usize, usize),
    #[error("shape error: expected shape {0}, found {1}")]
    Mismatch(Shape, Shape),
}

/// Per-axis extents of a row-major tensor.
///
/// A `Shape` always has rank ≥ 1, positive extents, and an element count that fits in `usize`.
/// Two shapes are equal iff they have the same rank and the same extents in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("[{}]", _0.iter().format(", "))]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "Vec<usize>", into = "Vec<usize>")
)]
pub struct Shape(Arc<[usize]>);

impl Shape {
    pub fn new(extents: &[usize]) -> Result<Self, ShapeError> {
        if extents.is_empty() {
            return Err(ShapeError::Rank);
        }
        if let Some(axis) = extents.iter().position(|&extent| extent == 0) {
            return Err(ShapeError::Extent { axis });
        }
        if Self::product(extents).is_none() {
            return Err(ShapeError::Overflow(extents.to_vec()));
        }
        Ok(Self(extents.into()))
    }

    /// Returns `true` if `extents` describe a valid shape.
    #[inline]
    pub fn validate(extents: &[usize]) -> bool {
        Self::new(extents).is_ok()
    }

    #[inline]
    fn product(extents: &[usize]) -> Option<usize> {
        extents
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
    }

    #[inline]
    pub fn extents(&self) -> &[usize] {
        &self.0
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// Total number of bytes for elements of `T`, checked against `usize` overflow.
    pub fn byte_size<T>(&self) -> Result<usize, ShapeError> {
        self.size()
            .checked_mul(size_of::<T>())
            .ok_or_else(|| ShapeError::Overflow(self.0.to_vec()))
    }

    /// Extent of `axis`, or `None` if the axis is out of range.
    #[inline]
    pub fn extent(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied()
    }

    /// Row-major strides in elements. The last axis has stride 1.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.rank()];
        for axis in (0..self.rank() - 1).rev() {
            strides[axis] = strides[axis + 1] * self.0[axis + 1];
        }
        strides
    }

    /// Splits the shape around `axis` into `(outer, mid, inner)`, where `outer` is the product of
    /// the extents before `axis`, `mid` is the extent of `axis` and `inner` the product after it.
    pub fn split_at(&self, axis: usize) -> Option<(usize, usize, usize)> {
        let mid = self.extent(axis)?;
        let outer = self.0[..axis].iter().product();
        let inner = self.0[axis + 1..].iter().product();
        Some((outer, mid, inner))
    }

    /// Replaces the extent of `axis`. The caller guarantees `axis < rank` and
    /// `0 < extent <= self.extent(axis)`, so the result stays valid.
    pub(crate) fn with_extent(&self, axis: usize, extent: usize) -> Self {
        debug_assert!(extent > 0 && extent <= self.0[axis]);
        let mut extents = self.0.to_vec();
        extents[axis] = extent;
        Self(extents.into())
    }

    /// Prepends a leading axis of `extent`.
    pub(crate) fn stacked(&self, extent: usize) -> Result<Self, ShapeError> {
        let extents = std::iter::once(extent)
            .chain(self.0.iter().copied())
            .collect_vec();
        Self::new(&extents)
    }
}

impl TryFrom<Vec<usize>> for Shape {
    type Error = ShapeError;

    #[inline]
    fn try_from(value: Vec<usize>) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Shape> for Vec<usize> {
    #[inline]
    fn from(value: Shape) -> Self {
        value.0.to_vec()
    }
}

pub trait IntoShape {
    fn into_shape(self) -> Result<Shape, ShapeError>;
}

impl IntoShape for Shape {
    #[inline]
    fn into_shape(self) -> Result<Shape, ShapeError> {
        Ok(self)
    }
}

impl IntoShape for &Shape {
    #[inline]
    fn into_shape(self) -> Result<Shape, ShapeError> {
        Ok(self.clone())
    }
}

impl IntoShape for &[usize] {
    #[inline]
    fn into_shape(self) -> Result<Shape, ShapeError> {
        Shape::new(self)
    }
}

impl IntoShape for Vec<usize> {
    #[inline]
    fn into_shape(self) -> Result<Shape, ShapeError> {
        Shape::new(&self)
    }
}

impl<const N: usize> IntoShape for [usize; N] {
    #[inline]
    fn into_shape(self) -> Result<Shape, ShapeError> {
        Shape::new(&self)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{IntoShape, Shape, ShapeError};

    #[test]
    fn test_size() -> Result<(), Box<dyn Error>> {
        let shape = Shape::new(&[1, 3, 2, 3])?;
        assert_eq!(shape.rank(), 4);
        assert_eq!(shape.size(), 18);
        assert_eq!(shape.to_string(), "[1, 3, 2, 3]");

        for _ in 0..32 {
            let extents: Vec<_> = (0..fastrand::usize(1..6))
                .map(|_| fastrand::usize(1..8))
                .collect();
            let shape = Shape::new(&extents)?;
            assert_eq!(shape.size(), extents.iter().product::<usize>());
        }
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(Shape::validate(&[4]));
        assert!(Shape::validate(&[2, 1, 5]));
        assert!(!Shape::validate(&[]));
        assert!(!Shape::validate(&[2, 0, 5]));
        assert!(!Shape::validate(&[usize::MAX, 2]));

        assert!(matches!(Shape::new(&[]), Err(ShapeError::Rank)));
        assert!(matches!(
            Shape::new(&[3, 4, 0]),
            Err(ShapeError::Extent { axis: 2 })
        ));
        assert!(matches!(
            Shape::new(&[usize::MAX, 2]),
            Err(ShapeError::Overflow(_))
        ));
    }

    #[test]
    fn test_shape_eq() -> Result<(), Box<dyn Error>> {
        let a = [2, 3, 4].into_shape()?;
        let b = vec![2, 3, 4].into_shape()?;
        let c = [2, 4, 3].into_shape()?;
        let d = [2, 3, 4, 1].into_shape()?;
        let e = [24].into_shape()?;

        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_ne!(a, c);
        assert_ne!(a, d);
        // same element count is not enough
        assert_eq!(a.size(), e.size());
        assert_ne!(a, e);
        Ok(())
    }

    #[test]
    fn test_byte_size() -> Result<(), Box<dyn Error>> {
        let shape = Shape::new(&[1, 3, 2, 3])?;
        assert_eq!(shape.byte_size::<f32>()?, 72);
        assert_eq!(shape.byte_size::<u8>()?, 18);

        // the element count fits but the byte count does not
        let shape = Shape::new(&[usize::MAX / 4 + 1])?;
        assert!(shape.byte_size::<u16>().is_ok());
        assert!(matches!(
            shape.byte_size::<f32>(),
            Err(ShapeError::Overflow(_))
        ));
        Ok(())
    }

    #[test]
    fn test_strides() -> Result<(), Box<dyn Error>> {
        assert_eq!(Shape::new(&[2, 3, 4])?.strides(), vec![12, 4, 1]);
        assert_eq!(Shape::new(&[7])?.strides(), vec![1]);
        Ok(())
    }

    #[test]
    fn test_split_at() -> Result<(), Box<dyn Error>> {
        let shape = Shape::new(&[1, 3, 2, 3])?;
        assert_eq!(shape.split_at(0), Some((1, 1, 18)));
        assert_eq!(shape.split_at(1), Some((1, 3, 6)));
        assert_eq!(shape.split_at(3), Some((6, 3, 1)));
        assert_eq!(shape.split_at(4), None);
        Ok(())
    }

    #[test]
    fn test_stacked() -> Result<(), Box<dyn Error>> {
        let shape = Shape::new(&[2, 3])?;
        assert_eq!(shape.stacked(4)?, Shape::new(&[4, 2, 3])?);
        assert!(matches!(
            shape.stacked(0),
            Err(ShapeError::Extent { axis: 0 })
        ));
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde() -> Result<(), Box<dyn Error>> {
        let shape = Shape::new(&[1, 3, 2])?;
        let json = serde_json::to_string(&shape)?;
        assert_eq!(json, "[1,3,2]");
        let back: Shape = serde_json::from_str(&json)?;
        assert_eq!(back, shape);
        assert!(serde_json::from_str::<Shape>("[1,0]").is_err());
        Ok(())
    }
}
