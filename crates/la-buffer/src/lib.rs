#![forbid(unsafe_code)]

use la_types::{
    DType, Scalar, TypeError, cast_scalar, coerce_fill, infer_dtype, missing_marker,
    widened_for_missing,
};
use ndarray::{ArrayD, Axis, IxDyn};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BufferError {
    #[error("shape {shape:?} holds {expected} values but {actual} were given")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("axis {axis} out of bounds for buffer of rank {ndim}")]
    AxisOutOfBounds { axis: usize, ndim: usize },
    #[error("index {index} out of bounds for axis {axis} with extent {extent}")]
    IndexOutOfBounds {
        axis: usize,
        index: usize,
        extent: usize,
    },
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Dense N-dimensional buffer whose elements all share one dtype.
///
/// Missing values are always stored as the dtype's marker, so a buffer of a
/// dtype without a marker never holds a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct NdBuffer {
    dtype: DType,
    values: ArrayD<Scalar>,
}

impl NdBuffer {
    /// Construct a buffer, coercing every element to `dtype`.
    pub fn new(dtype: DType, values: ArrayD<Scalar>) -> Result<Self, BufferError> {
        let marker = missing_marker(dtype);
        let needs_coercion = values.iter().any(|value| {
            let stored = value.dtype() == dtype && !value.is_missing();
            !stored && marker.as_ref() != Some(value)
        });
        if !needs_coercion {
            return Ok(Self { dtype, values });
        }

        let shape = values.shape().to_vec();
        let coerced = values
            .iter()
            .map(|value| cast_scalar(value, dtype))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dtype,
            values: shaped(&shape, coerced)?,
        })
    }

    /// Construct from a flat row-major vector, inferring the dtype. Missing
    /// values in a dtype without a marker promote the buffer to `Float64`.
    pub fn from_shape_vec(shape: &[usize], values: Vec<Scalar>) -> Result<Self, BufferError> {
        let mut dtype = infer_dtype(&values)?;
        if values.iter().any(Scalar::is_missing) {
            dtype = widened_for_missing(dtype);
        }
        Self::new(dtype, shaped(shape, values)?)
    }

    /// Construct from a flat row-major vector with an explicit dtype.
    pub fn from_vec(
        dtype: DType,
        shape: &[usize],
        values: Vec<Scalar>,
    ) -> Result<Self, BufferError> {
        Self::new(dtype, shaped(shape, values)?)
    }

    pub fn from_f64(shape: &[usize], values: Vec<f64>) -> Result<Self, BufferError> {
        let values = values.into_iter().map(Scalar::Float64).collect();
        Self::new(DType::Float64, shaped(shape, values)?)
    }

    pub fn from_i64(shape: &[usize], values: Vec<i64>) -> Result<Self, BufferError> {
        let values = values.into_iter().map(Scalar::Int64).collect();
        Self::new(DType::Int64, shaped(shape, values)?)
    }

    /// Buffer of the given shape with every element set to `value`.
    pub fn full(shape: &[usize], dtype: DType, value: &Scalar) -> Result<Self, BufferError> {
        let value = coerce_fill(value, dtype)?;
        Ok(Self {
            dtype,
            values: ArrayD::from_elem(IxDyn(shape), value),
        })
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.values.ndim()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &ArrayD<Scalar> {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> ArrayD<Scalar> {
        self.values
    }

    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<&Scalar> {
        self.values.get(index)
    }

    /// Elements in row-major order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Scalar> {
        self.values.iter().cloned().collect()
    }

    #[must_use]
    pub fn missing_marker(&self) -> Option<Scalar> {
        missing_marker(self.dtype)
    }

    #[must_use]
    pub fn missing_mask(&self) -> ArrayD<bool> {
        self.values.map(Scalar::is_missing)
    }

    pub fn astype(&self, target: DType) -> Result<Self, BufferError> {
        if target == self.dtype {
            return Ok(self.clone());
        }
        let cast = self
            .values
            .iter()
            .map(|value| cast_scalar(value, target))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dtype: target,
            values: shaped(self.shape(), cast)?,
        })
    }

    /// Gather along `axis`: output position `i` holds source position
    /// `indices[i]`. Always produces a fresh buffer.
    pub fn take(&self, axis: usize, indices: &[usize]) -> Result<Self, BufferError> {
        let extent = self.extent(axis)?;
        if let Some(&index) = indices.iter().find(|&&index| index >= extent) {
            return Err(BufferError::IndexOutOfBounds {
                axis,
                index,
                extent,
            });
        }
        Ok(Self {
            dtype: self.dtype,
            values: self.values.select(Axis(axis), indices),
        })
    }

    /// Write `marker` into every listed position along `axis`.
    ///
    /// The marker is coerced and every position bounds-checked before the
    /// first write, so an error leaves the buffer untouched.
    pub fn fill_missing(
        &mut self,
        axis: usize,
        positions: &[usize],
        marker: &Scalar,
    ) -> Result<(), BufferError> {
        let extent = self.extent(axis)?;
        if let Some(&index) = positions.iter().find(|&&index| index >= extent) {
            return Err(BufferError::IndexOutOfBounds {
                axis,
                index,
                extent,
            });
        }
        let fill = coerce_fill(marker, self.dtype)?;
        for &position in positions {
            self.values
                .index_axis_mut(Axis(axis), position)
                .fill(fill.clone());
        }
        Ok(())
    }

    /// Gather along `axis`, then write `marker` at the `missing` output
    /// positions. Indices at missing positions are placeholders; they are
    /// never read when the source axis is empty.
    pub fn take_with_fill(
        &self,
        axis: usize,
        indices: &[usize],
        missing: &[usize],
        marker: &Scalar,
    ) -> Result<Self, BufferError> {
        let extent = self.extent(axis)?;
        if missing.is_empty() {
            return self.take(axis, indices);
        }
        let fill = coerce_fill(marker, self.dtype)?;
        if extent == 0 {
            let mut shape = self.shape().to_vec();
            shape[axis] = indices.len();
            return Ok(Self {
                dtype: self.dtype,
                values: ArrayD::from_elem(IxDyn(&shape), fill),
            });
        }
        let mut out = self.take(axis, indices)?;
        out.fill_missing(axis, missing, &fill)?;
        Ok(out)
    }

    fn extent(&self, axis: usize) -> Result<usize, BufferError> {
        self.shape()
            .get(axis)
            .copied()
            .ok_or(BufferError::AxisOutOfBounds {
                axis,
                ndim: self.ndim(),
            })
    }
}

fn shaped(shape: &[usize], values: Vec<Scalar>) -> Result<ArrayD<Scalar>, BufferError> {
    let actual = values.len();
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| BufferError::ShapeMismatch {
        shape: shape.to_vec(),
        expected: shape.iter().product(),
        actual,
    })
}

#[cfg(test)]
mod tests {
    use la_types::{DType, NullKind, Scalar, TypeError};

    use super::{BufferError, NdBuffer};

    #[test]
    fn missing_values_promote_int_buffers_to_float() {
        let buffer = NdBuffer::from_shape_vec(
            &[3],
            vec![
                Scalar::Int64(1),
                Scalar::Null(NullKind::Null),
                Scalar::Int64(3),
            ],
        )
        .expect("buffer");
        assert_eq!(buffer.dtype(), DType::Float64);
        assert_eq!(
            buffer.to_vec(),
            vec![
                Scalar::Float64(1.0),
                Scalar::Null(NullKind::NaN),
                Scalar::Float64(3.0)
            ]
        );
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let err = NdBuffer::from_f64(&[2, 2], vec![1.0, 2.0, 3.0]).expect_err("bad shape");
        assert_eq!(
            err,
            BufferError::ShapeMismatch {
                shape: vec![2, 2],
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn take_reorders_and_resizes_one_axis() {
        let buffer = NdBuffer::from_i64(&[2, 3], vec![1, 2, 3, 4, 5, 6]).expect("buffer");
        let out = buffer.take(1, &[2, 0, 0, 1]).expect("take");
        assert_eq!(out.shape(), &[2, 4]);
        assert_eq!(
            out.to_vec(),
            [3, 1, 1, 2, 6, 4, 4, 5].map(Scalar::Int64).to_vec()
        );

        let empty = buffer.take(0, &[]).expect("empty take");
        assert_eq!(empty.shape(), &[0, 3]);
    }

    #[test]
    fn take_rejects_out_of_range_indices() {
        let buffer = NdBuffer::from_i64(&[2], vec![1, 2]).expect("buffer");
        let err = buffer.take(0, &[0, 2]).expect_err("oob");
        assert_eq!(
            err,
            BufferError::IndexOutOfBounds {
                axis: 0,
                index: 2,
                extent: 2
            }
        );
        assert!(matches!(
            buffer.take(1, &[0]),
            Err(BufferError::AxisOutOfBounds { axis: 1, ndim: 1 })
        ));
    }

    #[test]
    fn fill_missing_writes_whole_hyperplanes() {
        let mut buffer = NdBuffer::from_f64(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .expect("buffer");
        buffer
            .fill_missing(1, &[1], &Scalar::Null(NullKind::NaN))
            .expect("fill");
        let mask = buffer.missing_mask();
        assert_eq!(
            mask.iter().copied().collect::<Vec<_>>(),
            vec![false, true, false, false, true, false]
        );
    }

    #[test]
    fn incompatible_fill_leaves_buffer_untouched() {
        let mut buffer = NdBuffer::from_i64(&[3], vec![1, 2, 3]).expect("buffer");
        let before = buffer.clone();
        let err = buffer
            .fill_missing(0, &[0, 2], &Scalar::Float64(f64::NAN))
            .expect_err("nan into int");
        assert_eq!(
            err,
            BufferError::Type(TypeError::NoMissingMarker {
                dtype: DType::Int64
            })
        );
        assert_eq!(buffer, before);
    }

    #[test]
    fn take_with_fill_handles_empty_source_axis() {
        let buffer = NdBuffer::from_f64(&[0, 2], Vec::new()).expect("empty rows");
        let out = buffer
            .take_with_fill(0, &[0, 0], &[0, 1], &Scalar::Null(NullKind::NaN))
            .expect("fill from nothing");
        assert_eq!(out.shape(), &[2, 2]);
        assert!(out.missing_mask().iter().all(|&missing| missing));
    }

    #[test]
    fn take_with_fill_validates_marker_before_gathering() {
        let buffer = NdBuffer::from_i64(&[2], vec![1, 2]).expect("buffer");
        let err = buffer
            .take_with_fill(0, &[1, 0, 0], &[2], &Scalar::from("x"))
            .expect_err("utf8 into int");
        assert!(matches!(err, BufferError::Type(TypeError::InvalidCast { .. })));

        let out = buffer
            .take_with_fill(0, &[1, 0, 0], &[2], &Scalar::Int64(-1))
            .expect("int fill");
        assert_eq!(out.to_vec(), [2, 1, -1].map(Scalar::Int64).to_vec());
    }

    #[test]
    fn astype_widens_bool_to_float() {
        let buffer = NdBuffer::from_shape_vec(&[2], vec![Scalar::Bool(true), Scalar::Bool(false)])
            .expect("buffer");
        let out = buffer.astype(DType::Float64).expect("cast");
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(out.to_vec(), vec![Scalar::Float64(1.0), Scalar::Float64(0.0)]);
        assert_eq!(out.missing_marker(), Some(Scalar::Null(NullKind::NaN)));
        assert_eq!(buffer.missing_marker(), None);
    }

    #[test]
    fn full_coerces_the_fill_value() {
        let buffer = NdBuffer::full(&[2, 2], DType::Utf8, &Scalar::Null(NullKind::Null))
            .expect("full");
        assert!(
            buffer
                .to_vec()
                .iter()
                .all(|value| value == &Scalar::Utf8(String::new()))
        );
    }
}
