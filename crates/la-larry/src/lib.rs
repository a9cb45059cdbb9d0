#![forbid(unsafe_code)]

use std::str::FromStr;

use la_buffer::{BufferError, NdBuffer};
use la_label::{
    Label, LabelError, LabelList, flatten_labels, map_positions_with_fill, sorted_intersection,
    sorted_union,
};
use la_types::{DType, Scalar, TypeError, widened_for_missing};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LarryError {
    #[error("buffer rank ({ndim}) does not match number of label lists ({label_count})")]
    RankMismatch { ndim: usize, label_count: usize },
    #[error("label list for axis {axis} has length {label_len} but the axis extent is {extent}")]
    LabelLengthMismatch {
        axis: usize,
        label_len: usize,
        extent: usize,
    },
    #[error("axis {axis} out of bounds for labeled array of rank {ndim}")]
    AxisOutOfBounds { axis: usize, ndim: usize },
    #[error("{operation} requires {expected}d labeled arrays, found rank {ndim}")]
    WrongRank {
        operation: &'static str,
        expected: usize,
        ndim: usize,
    },
    #[error("stack requires at least one labeled array")]
    EmptyStack,
    #[error("stack mode not recognized: {0:?}")]
    UnknownStackMode(String),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Labeled array: a dense buffer plus one unique label list per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Larry {
    buffer: NdBuffer,
    labels: Vec<LabelList>,
}

impl Larry {
    pub fn new(buffer: NdBuffer, labels: Vec<LabelList>) -> Result<Self, LarryError> {
        if buffer.ndim() != labels.len() {
            return Err(LarryError::RankMismatch {
                ndim: buffer.ndim(),
                label_count: labels.len(),
            });
        }
        for (axis, (list, &extent)) in labels.iter().zip(buffer.shape()).enumerate() {
            if list.len() != extent {
                return Err(LarryError::LabelLengthMismatch {
                    axis,
                    label_len: list.len(),
                    extent,
                });
            }
        }
        Ok(Self { buffer, labels })
    }

    /// Labels `0..extent` on every axis.
    #[must_use]
    pub fn with_default_labels(buffer: NdBuffer) -> Self {
        let labels = buffer.shape().iter().map(|&n| LabelList::range(n)).collect();
        Self { buffer, labels }
    }

    pub fn from_values(
        shape: &[usize],
        values: Vec<Scalar>,
        labels: Vec<Vec<Label>>,
    ) -> Result<Self, LarryError> {
        let buffer = NdBuffer::from_shape_vec(shape, values)?;
        let labels = labels
            .into_iter()
            .map(LabelList::new)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(buffer, labels)
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.buffer.ndim()
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.buffer.shape()
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    #[must_use]
    pub fn buffer(&self) -> &NdBuffer {
        &self.buffer
    }

    /// Mutable access to the values. Shape and dtype stay fixed, so the
    /// labels remain valid.
    pub fn buffer_mut(&mut self) -> &mut NdBuffer {
        &mut self.buffer
    }

    #[must_use]
    pub fn labels(&self) -> &[LabelList] {
        &self.labels
    }

    #[must_use]
    pub fn label(&self, axis: usize) -> Option<&LabelList> {
        self.labels.get(axis)
    }

    pub fn axis_labels(&self, axis: usize) -> Result<&LabelList, LarryError> {
        self.labels.get(axis).ok_or(LarryError::AxisOutOfBounds {
            axis,
            ndim: self.ndim(),
        })
    }

    #[must_use]
    pub fn into_parts(self) -> (NdBuffer, Vec<LabelList>) {
        (self.buffer, self.labels)
    }

    /// Element addressed by one label per axis.
    #[must_use]
    pub fn get(&self, labels: &[Label]) -> Option<&Scalar> {
        if labels.len() != self.ndim() {
            return None;
        }
        let index = labels
            .iter()
            .zip(&self.labels)
            .map(|(label, list)| list.position(label))
            .collect::<Option<Vec<_>>>()?;
        self.buffer.get(&index)
    }

    #[must_use]
    pub fn missing_marker(&self) -> Option<Scalar> {
        self.buffer.missing_marker()
    }

    pub fn astype(&self, dtype: DType) -> Result<Self, LarryError> {
        Ok(Self {
            buffer: self.buffer.astype(dtype)?,
            labels: self.labels.clone(),
        })
    }

    /// Reorder and resize `axis` to `target`. Labels absent from the
    /// current axis get the missing marker; dtypes without one are widened
    /// first.
    pub fn morph(&self, target: &LabelList, axis: usize) -> Result<Self, LarryError> {
        let source = self.axis_labels(axis)?;
        if source == target {
            return Ok(self.clone());
        }

        let (indices, missing) = map_positions_with_fill(source, target, 0);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            axis,
            source_len = source.len(),
            target_len = target.len(),
            filled = missing.len(),
            "morph"
        );

        let buffer = if missing.is_empty() {
            self.buffer.take(axis, &indices)?
        } else {
            let widened = widened_for_missing(self.dtype());
            let base = self.buffer.astype(widened)?;
            let marker = base
                .missing_marker()
                .ok_or(TypeError::NoMissingMarker { dtype: widened })?;
            base.take_with_fill(axis, &indices, &missing, &marker)?
        };

        let mut labels = self.labels.clone();
        labels[axis] = target.clone();
        Self::new(buffer, labels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackMode {
    Union,
    Intersection,
}

impl FromStr for StackMode {
    type Err = LarryError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "union" => Ok(Self::Union),
            "intersection" => Ok(Self::Intersection),
            other => Err(LarryError::UnknownStackMode(other.to_owned())),
        }
    }
}

/// Stack named 2d labeled arrays into a 3d `Float64` labeled array.
///
/// Rows and columns are the union or intersection of every input's rows
/// and columns; axis 0 carries the names in input order.
pub fn stack(mode: StackMode, named: &[(Label, &Larry)]) -> Result<Larry, LarryError> {
    if named.is_empty() {
        return Err(LarryError::EmptyStack);
    }
    if let Some((_, bad)) = named.iter().find(|(_, larry)| larry.ndim() != 2) {
        return Err(LarryError::WrongRank {
            operation: "stack",
            expected: 2,
            ndim: bad.ndim(),
        });
    }

    let row_lists: Vec<&LabelList> = named.iter().map(|(_, larry)| &larry.labels[0]).collect();
    let col_lists: Vec<&LabelList> = named.iter().map(|(_, larry)| &larry.labels[1]).collect();
    let (rows, cols) = match mode {
        StackMode::Union => (sorted_union(&row_lists), sorted_union(&col_lists)),
        StackMode::Intersection => (
            sorted_intersection(&row_lists),
            sorted_intersection(&col_lists),
        ),
    };

    let mut values = Vec::with_capacity(named.len() * rows.len() * cols.len());
    for (_, larry) in named {
        let slice = larry
            .astype(DType::Float64)?
            .morph(&rows, 0)?
            .morph(&cols, 1)?;
        values.extend(slice.buffer.to_vec());
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(
        layers = named.len(),
        rows = rows.len(),
        cols = cols.len(),
        "stack"
    );

    let names = LabelList::new(named.iter().map(|(name, _)| name.clone()).collect())?;
    let buffer = NdBuffer::from_vec(
        DType::Float64,
        &[named.len(), rows.len(), cols.len()],
        values,
    )?;
    Larry::new(buffer, vec![names, rows, cols])
}

/// Convert a 3d `(n, m, k)` labeled array into a 2d `(m*k, n)` one.
///
/// Row `(j, i)` holds `x[:, j, i]`; axis 1 varies slowest.
pub fn panel(larry: &Larry) -> Result<Larry, LarryError> {
    let &[n, m, k] = larry.shape() else {
        return Err(LarryError::WrongRank {
            operation: "panel",
            expected: 3,
            ndim: larry.ndim(),
        });
    };

    let source = larry.buffer.values();
    let mut values = Vec::with_capacity(n * m * k);
    for j in 0..m {
        for i in 0..k {
            for z in 0..n {
                values.push(source[[z, j, i].as_slice()].clone());
            }
        }
    }

    let rows = flatten_labels(&[&larry.labels[1], &larry.labels[2]]);
    let buffer = NdBuffer::from_vec(larry.dtype(), &[m * k, n], values)?;
    Larry::new(buffer, vec![rows, larry.labels[0].clone()])
}
