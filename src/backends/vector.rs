//! Point inputs for loss evaluation.
//!
//! A point holds one value per loss variable, in variable index order. Anything
//! that can be read as a run of `f64` works: slices, `Vec<f64>`, fixed-size
//! arrays and, behind the `ndarray` and `nalgebra` features, their vector types.

use std::borrow::Cow;

/// A trait for vector-like types that can be passed as a point to a loss function.
///
/// # Examples
///
/// ```rust
/// use powexpand::prelude::Vector;
///
/// let point = vec![1.0, 2.0, 3.0];
/// assert_eq!(Vector::len(&point), 3);
/// assert_eq!(point.values()[1], 2.0);
/// ```
pub trait Vector {
    /// The values of the point, borrowed when the storage is contiguous.
    fn values(&self) -> Cow<'_, [f64]>;

    /// Returns the length of the vector.
    fn len(&self) -> usize;

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Vector for [f64] {
    fn values(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self)
    }

    fn len(&self) -> usize {
        <[f64]>::len(self)
    }
}

impl Vector for Vec<f64> {
    fn values(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self)
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

impl<const N: usize> Vector for [f64; N] {
    fn values(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self)
    }

    fn len(&self) -> usize {
        N
    }
}

/// Strided arrays are copied, contiguous ones are borrowed.
///
/// ```rust
/// use powexpand::prelude::Vector;
/// use ndarray::Array1;
///
/// let point = Array1::from(vec![1.0, 2.0]);
/// assert_eq!(&*point.values(), &[1.0, 2.0]);
/// ```
#[cfg(feature = "ndarray")]
impl Vector for ndarray::Array1<f64> {
    fn values(&self) -> Cow<'_, [f64]> {
        match self.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(self.iter().copied().collect()),
        }
    }

    fn len(&self) -> usize {
        ndarray::Array1::len(self)
    }
}

/// ```rust
/// use powexpand::prelude::Vector;
/// use nalgebra::DVector;
///
/// let point = DVector::from_vec(vec![1.0, 2.0]);
/// assert_eq!(&*point.values(), &[1.0, 2.0]);
/// ```
#[cfg(feature = "nalgebra")]
impl Vector for nalgebra::DVector<f64> {
    fn values(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self.as_slice())
    }

    fn len(&self) -> usize {
        self.nrows()
    }
}

impl<V: Vector + ?Sized> Vector for &V {
    fn values(&self) -> Cow<'_, [f64]> {
        (**self).values()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
