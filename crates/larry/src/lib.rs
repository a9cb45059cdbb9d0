#![forbid(unsafe_code)]

//! Labeled N-dimensional arrays.
//!
//! A [`Larry`] pairs a dense buffer with one unique label list per axis.
//! [`align`] makes two labeled arrays agree on every axis:
//!
//! ```
//! use larry::{AlignOptions, JoinMode, Larry, NdBuffer, LabelList, align};
//!
//! let left = Larry::new(
//!     NdBuffer::from_f64(&[3], vec![1.0, 2.0, 3.0])?,
//!     vec![LabelList::from_utf8(vec!["a", "b", "c"])?],
//! )?;
//! let right = Larry::new(
//!     NdBuffer::from_f64(&[2], vec![10.0, 20.0])?,
//!     vec![LabelList::from_utf8(vec!["b", "dd"])?],
//! )?;
//!
//! let options = AlignOptions::new().with_join(JoinMode::Outer);
//! let (left, right) = align(&left, &right, &options)?;
//! assert_eq!(left.labels(), right.labels());
//! assert_eq!(left.shape(), &[4]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use la_align::{
    AlignError, AlignOptions, AxisJoin, AxisMapping, FillPolicy, JoinMode, JoinSpec, Side,
    align, intersection, resolve_axis, resolve_missing, union,
};
pub use la_buffer::{BufferError, NdBuffer};
pub use la_label::{
    Label, LabelError, LabelList, flatten_labels, map_positions, map_positions_with_fill,
    sorted_intersection, sorted_union,
};
pub use la_larry::{Larry, LarryError, StackMode, panel, stack};
pub use la_types::{DType, NullKind, Scalar, TypeError, missing_marker};
