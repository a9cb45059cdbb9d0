#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use la_buffer::{BufferError, NdBuffer};
use la_label::{LabelList, map_positions_with_fill, sorted_intersection, sorted_union};
use la_larry::{Larry, LarryError};
use la_types::{DType, Scalar, TypeError, coerce_fill, widened_for_missing};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gather index used for output positions that have no source.
const PLACEHOLDER: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Sorted intersection of both label lists.
    Inner,
    /// Sorted union of both label lists; both sides may need fills.
    Outer,
    /// First input's labels, in their original order.
    Left,
    /// Second input's labels, in their original order.
    Right,
}

impl JoinMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Outer => "outer",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for JoinMode {
    type Err = AlignError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "inner" => Ok(Self::Inner),
            "outer" => Ok(Self::Outer),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(AlignError::UnknownJoin(other.to_owned())),
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One join mode for every axis, or one per axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinSpec {
    Uniform(JoinMode),
    PerAxis(Vec<JoinMode>),
}

impl JoinSpec {
    /// Normalize to exactly one mode per axis.
    pub fn modes(&self, ndim: usize) -> Result<Vec<JoinMode>, AlignError> {
        match self {
            Self::Uniform(mode) => Ok(vec![*mode; ndim]),
            Self::PerAxis(modes) if modes.len() == ndim => Ok(modes.clone()),
            Self::PerAxis(modes) => Err(AlignError::JoinLengthMismatch {
                len: modes.len(),
                ndim,
            }),
        }
    }
}

impl Default for JoinSpec {
    fn default() -> Self {
        Self::Uniform(JoinMode::Inner)
    }
}

impl From<JoinMode> for JoinSpec {
    fn from(mode: JoinMode) -> Self {
        Self::Uniform(mode)
    }
}

impl From<Vec<JoinMode>> for JoinSpec {
    fn from(modes: Vec<JoinMode>) -> Self {
        Self::PerAxis(modes)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Each input's own missing marker, widening its dtype when allowed.
    #[default]
    Default,
    /// Use this value for both inputs; casting is skipped.
    Explicit(Scalar),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignOptions {
    pub join: JoinSpec,
    pub fill: FillPolicy,
    pub allow_cast: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            join: JoinSpec::default(),
            fill: FillPolicy::Default,
            allow_cast: true,
        }
    }
}

impl AlignOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_join(mut self, join: impl Into<JoinSpec>) -> Self {
        self.join = join.into();
        self
    }

    #[must_use]
    pub fn with_fill(mut self, value: impl Into<Scalar>) -> Self {
        self.fill = FillPolicy::Explicit(value.into());
        self
    }

    #[must_use]
    pub fn with_allow_cast(mut self, allow_cast: bool) -> Self {
        self.allow_cast = allow_cast;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlignError {
    #[error(
        "'left' and 'right' must have the same number of dimensions (left={left}, right={right})"
    )]
    RankMismatch { left: usize, right: usize },
    #[error("length of join list ({len}) must equal the number of dimensions ({ndim})")]
    JoinLengthMismatch { len: usize, ndim: usize },
    #[error("join type not recognized: {0:?}")]
    UnknownJoin(String),
    #[error("axis {axis} out of bounds for labeled array of rank {ndim}")]
    AxisOutOfBounds { axis: usize, ndim: usize },
    #[error("intersection requires at least one labeled array")]
    NoArrays,
    #[error("{side} input dtype {dtype:?} has no missing marker and casting is disabled")]
    NoMissingMarker { side: Side, dtype: DType },
    #[error(
        "fill type not compatible with array element type ({side} input, axis {axis}: {fill} into {dtype:?})"
    )]
    FillIncompatible {
        side: Side,
        axis: usize,
        fill: Scalar,
        dtype: DType,
        source: TypeError,
    },
    #[error(transparent)]
    Larry(#[from] LarryError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Gather plan for one input along one axis.
///
/// `indices[i]` is the source position feeding output position `i`;
/// positions listed in `missing` hold a placeholder index and must be
/// overwritten with the missing marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub indices: Vec<usize>,
    pub missing: Vec<usize>,
}

impl AxisMapping {
    fn between(source: &LabelList, target: &LabelList) -> Self {
        let (indices, missing) = map_positions_with_fill(source, target, PLACEHOLDER);
        Self { indices, missing }
    }

    #[must_use]
    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Output labels for one axis plus each side's gather plan. A side with no
/// mapping passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisJoin {
    pub labels: LabelList,
    pub left: Option<AxisMapping>,
    pub right: Option<AxisMapping>,
}

impl AxisJoin {
    fn passthrough(labels: LabelList) -> Self {
        Self {
            labels,
            left: None,
            right: None,
        }
    }

    #[must_use]
    pub fn mapping(&self, side: Side) -> Option<&AxisMapping> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    #[must_use]
    pub fn needs_fill(&self, side: Side) -> bool {
        self.mapping(side).is_some_and(AxisMapping::has_missing)
    }
}

/// Resolve one axis: output labels and a gather plan per input.
#[must_use]
pub fn resolve_axis(list1: &LabelList, list2: &LabelList, mode: JoinMode) -> AxisJoin {
    if list1 == list2 {
        return AxisJoin::passthrough(list1.clone());
    }

    match mode {
        JoinMode::Inner => {
            let labels = sorted_intersection(&[list1, list2]);
            AxisJoin {
                left: Some(AxisMapping::between(list1, &labels)),
                right: Some(AxisMapping::between(list2, &labels)),
                labels,
            }
        }
        JoinMode::Outer => {
            let labels = sorted_union(&[list1, list2]);
            AxisJoin {
                left: Some(AxisMapping::between(list1, &labels)),
                right: Some(AxisMapping::between(list2, &labels)),
                labels,
            }
        }
        JoinMode::Left => AxisJoin {
            labels: list1.clone(),
            left: None,
            right: Some(AxisMapping::between(list2, list1)),
        },
        JoinMode::Right => AxisJoin {
            labels: list2.clone(),
            left: Some(AxisMapping::between(list1, list2)),
            right: None,
        },
    }
}

/// An input's working buffer and its resolved missing marker.
///
/// `Cow::Borrowed` means the buffer still aliases the caller's array; any
/// gather, fill or cast replaces it with `Cow::Owned`.
#[derive(Debug, Clone)]
pub struct ResolvedMissing<'a> {
    pub buffer: Cow<'a, NdBuffer>,
    pub marker: Option<Scalar>,
}

impl ResolvedMissing<'_> {
    #[must_use]
    pub fn is_view(&self) -> bool {
        matches!(self.buffer, Cow::Borrowed(_))
    }
}

/// Determine the missing marker for one input.
///
/// An explicit fill is used verbatim and never casts. Otherwise a dtype
/// without a marker is widened when `allow_cast` is set, and rejected when
/// it is not.
pub fn resolve_missing<'a>(
    larry: &'a Larry,
    side: Side,
    fill: &FillPolicy,
    allow_cast: bool,
) -> Result<ResolvedMissing<'a>, AlignError> {
    let buffer = larry.buffer();
    if let FillPolicy::Explicit(value) = fill {
        return Ok(ResolvedMissing {
            buffer: Cow::Borrowed(buffer),
            marker: Some(value.clone()),
        });
    }
    if let Some(marker) = buffer.missing_marker() {
        return Ok(ResolvedMissing {
            buffer: Cow::Borrowed(buffer),
            marker: Some(marker),
        });
    }
    if !allow_cast {
        return Err(AlignError::NoMissingMarker {
            side,
            dtype: buffer.dtype(),
        });
    }

    let widened = buffer.astype(widened_for_missing(buffer.dtype()))?;
    let marker = widened
        .missing_marker()
        .ok_or(AlignError::NoMissingMarker {
            side,
            dtype: widened.dtype(),
        })?;
    Ok(ResolvedMissing {
        buffer: Cow::Owned(widened),
        marker: Some(marker),
    })
}

/// Align two labeled arrays so that every axis carries identical labels.
///
/// Axes are processed in increasing order, each one gathering from the
/// buffers produced by the previous axis. All validation (rank, join list,
/// markers and fill compatibility) happens before the first gather, so an
/// error never leaves partially aligned state behind. Both outputs own
/// their buffers.
pub fn align(
    left: &Larry,
    right: &Larry,
    options: &AlignOptions,
) -> Result<(Larry, Larry), AlignError> {
    let ndim = right.ndim();
    if left.ndim() != ndim {
        return Err(AlignError::RankMismatch {
            left: left.ndim(),
            right: ndim,
        });
    }
    let modes = options.join.modes(ndim)?;
    #[cfg(feature = "tracing")]
    tracing::debug!(
        ndim,
        ?modes,
        fill = ?options.fill,
        allow_cast = options.allow_cast,
        "align"
    );

    let plans: Vec<AxisJoin> = modes
        .iter()
        .zip(left.labels().iter().zip(right.labels()))
        .map(|(&mode, (list1, list2))| resolve_axis(list1, list2, mode))
        .collect();

    let ResolvedMissing {
        buffer: mut x1,
        marker: marker1,
    } = working_buffer(left, Side::Left, options, &plans)?;
    let ResolvedMissing {
        buffer: mut x2,
        marker: marker2,
    } = working_buffer(right, Side::Right, options, &plans)?;
    let fill1 = checked_fill(&x1, marker1.as_ref(), Side::Left, &plans)?;
    let fill2 = checked_fill(&x2, marker2.as_ref(), Side::Right, &plans)?;

    let mut labels = Vec::with_capacity(ndim);
    for (axis, plan) in plans.into_iter().enumerate() {
        if let Some(mapping) = &plan.left {
            x1 = Cow::Owned(apply_mapping(&x1, axis, mapping, fill1.as_ref())?);
        }
        if let Some(mapping) = &plan.right {
            x2 = Cow::Owned(apply_mapping(&x2, axis, mapping, fill2.as_ref())?);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            axis,
            mode = %modes[axis],
            extent = plan.labels.len(),
            left_gathered = plan.left.is_some(),
            right_gathered = plan.right.is_some(),
            "aligned axis"
        );
        labels.push(plan.labels);
    }

    // `into_owned` duplicates any buffer that is still a view of an input.
    let out1 = Larry::new(x1.into_owned(), labels.clone())?;
    let out2 = Larry::new(x2.into_owned(), labels)?;
    Ok((out1, out2))
}

/// Resolve an input's marker. A missing marker only matters when some
/// axis will actually write one, so without casting an unfilled input
/// keeps its dtype instead of failing.
fn working_buffer<'a>(
    larry: &'a Larry,
    side: Side,
    options: &AlignOptions,
    plans: &[AxisJoin],
) -> Result<ResolvedMissing<'a>, AlignError> {
    let needs_fill = plans.iter().any(|plan| plan.needs_fill(side));
    match resolve_missing(larry, side, &options.fill, options.allow_cast) {
        Err(AlignError::NoMissingMarker { .. }) if !needs_fill => Ok(ResolvedMissing {
            buffer: Cow::Borrowed(larry.buffer()),
            marker: None,
        }),
        resolved => resolved,
    }
}

/// Coerce the marker into the working dtype once, up front, naming the
/// first axis that would write it.
fn checked_fill(
    buffer: &NdBuffer,
    marker: Option<&Scalar>,
    side: Side,
    plans: &[AxisJoin],
) -> Result<Option<Scalar>, AlignError> {
    let Some(axis) = plans.iter().position(|plan| plan.needs_fill(side)) else {
        return Ok(None);
    };
    let dtype = buffer.dtype();
    let marker = marker.ok_or(AlignError::NoMissingMarker { side, dtype })?;
    coerce_fill(marker, dtype)
        .map(Some)
        .map_err(|source| AlignError::FillIncompatible {
            side,
            axis,
            fill: marker.clone(),
            dtype,
            source,
        })
}

fn apply_mapping(
    buffer: &NdBuffer,
    axis: usize,
    mapping: &AxisMapping,
    fill: Option<&Scalar>,
) -> Result<NdBuffer, AlignError> {
    let out = match fill {
        Some(fill) if mapping.has_missing() => {
            buffer.take_with_fill(axis, &mapping.indices, &mapping.missing, fill)?
        }
        _ => buffer.take(axis, &mapping.indices)?,
    };
    Ok(out)
}

/// Sorted union of the labels along `axis` of every array.
pub fn union(axis: usize, arrays: &[&Larry]) -> Result<LabelList, AlignError> {
    let lists = axis_lists(axis, arrays)?;
    Ok(sorted_union(&lists))
}

/// Sorted intersection of the labels along `axis`, folding from the first
/// array in argument order.
pub fn intersection(axis: usize, arrays: &[&Larry]) -> Result<LabelList, AlignError> {
    if arrays.is_empty() {
        return Err(AlignError::NoArrays);
    }
    let lists = axis_lists(axis, arrays)?;
    Ok(sorted_intersection(&lists))
}

fn axis_lists<'a>(axis: usize, arrays: &[&'a Larry]) -> Result<Vec<&'a LabelList>, AlignError> {
    arrays
        .iter()
        .map(|larry| {
            larry.label(axis).ok_or(AlignError::AxisOutOfBounds {
                axis,
                ndim: larry.ndim(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use la_buffer::NdBuffer;
    use la_label::{Label, LabelList};
    use la_larry::Larry;
    use la_types::{DType, NullKind, Scalar, TypeError};

    use super::{
        AlignError, AlignOptions, FillPolicy, JoinMode, JoinSpec, Side, align, intersection,
        resolve_axis, resolve_missing, union,
    };

    fn utf8(values: &[&str]) -> LabelList {
        LabelList::from_utf8(values.to_vec()).expect("labels")
    }

    fn vector(values: Vec<f64>, labels: &[&str]) -> Larry {
        let buffer = NdBuffer::from_f64(&[values.len()], values).expect("buffer");
        Larry::new(buffer, vec![utf8(labels)]).expect("larry")
    }

    fn ints(values: Vec<i64>, labels: &[&str]) -> Larry {
        let buffer = NdBuffer::from_i64(&[values.len()], values).expect("buffer");
        Larry::new(buffer, vec![utf8(labels)]).expect("larry")
    }

    fn grid(values: Vec<f64>, rows: &[&str], cols: &[&str]) -> Larry {
        let buffer = NdBuffer::from_f64(&[rows.len(), cols.len()], values).expect("buffer");
        Larry::new(buffer, vec![utf8(rows), utf8(cols)]).expect("larry")
    }

    fn floats(larry: &Larry) -> Vec<f64> {
        larry
            .buffer()
            .to_vec()
            .iter()
            .map(|value| value.to_f64().expect("numeric"))
            .collect()
    }

    fn assert_floats(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (a.is_nan() && e.is_nan()) || a == e,
                "{actual:?} vs {expected:?}"
            );
        }
    }

    #[test]
    fn inner_join_keeps_shared_labels_sorted() {
        let lar1 = vector(vec![1.0, 2.0, f64::NAN], &["a", "b", "c"]);
        let lar2 = vector(vec![1.0, f64::NAN, f64::NAN], &["a", "b", "dd"]);

        let (out1, out2) = align(&lar1, &lar2, &AlignOptions::default()).expect("align");
        assert_eq!(out1.labels(), &[utf8(&["a", "b"])]);
        assert_eq!(out2.labels(), out1.labels());
        assert_floats(&floats(&out1), &[1.0, 2.0]);
        assert_floats(&floats(&out2), &[1.0, f64::NAN]);
    }

    #[test]
    fn outer_join_fills_gaps_on_both_sides() {
        let lar1 = vector(vec![1.0, 2.0, f64::NAN], &["a", "b", "c"]);
        let lar2 = vector(vec![1.0, f64::NAN, f64::NAN], &["a", "b", "dd"]);
        let options = AlignOptions::new().with_join(JoinMode::Outer);

        let (out1, out2) = align(&lar1, &lar2, &options).expect("align");
        assert_eq!(out1.labels(), &[utf8(&["a", "b", "c", "dd"])]);
        assert_floats(&floats(&out1), &[1.0, 2.0, f64::NAN, f64::NAN]);
        assert_floats(&floats(&out2), &[1.0, f64::NAN, f64::NAN, f64::NAN]);

        let (out1, out2) = align(&lar1, &lar2, &options.with_fill(0.0)).expect("align");
        assert_floats(&floats(&out1), &[1.0, 2.0, f64::NAN, 0.0]);
        assert_floats(&floats(&out2), &[1.0, f64::NAN, 0.0, f64::NAN]);
    }

    #[test]
    fn left_and_right_preserve_the_privileged_order() {
        let lar1 = vector(vec![1.0, 2.0, 3.0], &["z", "a", "m"]);
        let lar2 = vector(vec![10.0, 20.0], &["m", "q"]);

        let left = AlignOptions::new().with_join(JoinMode::Left);
        let (out1, out2) = align(&lar1, &lar2, &left).expect("left");
        assert_eq!(out1.labels(), &[utf8(&["z", "a", "m"])]);
        assert_floats(&floats(&out1), &[1.0, 2.0, 3.0]);
        assert_floats(&floats(&out2), &[f64::NAN, f64::NAN, 10.0]);

        let right = AlignOptions::new().with_join(JoinMode::Right);
        let (out1, out2) = align(&lar1, &lar2, &right).expect("right");
        assert_eq!(out2.labels(), &[utf8(&["m", "q"])]);
        assert_floats(&floats(&out1), &[3.0, f64::NAN]);
        assert_floats(&floats(&out2), &[10.0, 20.0]);
    }

    #[test]
    fn axes_fold_left_to_right_with_per_axis_modes() {
        let lar1 = grid(vec![1.0, 2.0, 3.0, 4.0], &["a", "b"], &["x", "y"]);
        let lar2 = grid(vec![10.0, 20.0, 30.0, 40.0], &["b", "c"], &["y", "z"]);
        let options =
            AlignOptions::new().with_join(vec![JoinMode::Outer, JoinMode::Left]);

        let (out1, out2) = align(&lar1, &lar2, &options).expect("align");
        assert_eq!(out1.labels(), &[utf8(&["a", "b", "c"]), utf8(&["x", "y"])]);
        assert_eq!(out1.shape(), &[3, 2]);
        assert_floats(&floats(&out1), &[1.0, 2.0, 3.0, 4.0, f64::NAN, f64::NAN]);
        assert_floats(
            &floats(&out2),
            &[f64::NAN, f64::NAN, f64::NAN, 10.0, f64::NAN, 30.0],
        );
    }

    #[test]
    fn aligning_with_itself_is_the_identity() {
        let lar = grid(vec![1.0, 2.0, 3.0, 4.0], &["b", "a"], &["y", "x"]);
        for mode in [JoinMode::Inner, JoinMode::Outer, JoinMode::Left, JoinMode::Right] {
            let (out1, out2) =
                align(&lar, &lar, &AlignOptions::new().with_join(mode)).expect("align");
            assert_eq!(out1, lar);
            assert_eq!(out2, lar);
        }
    }

    #[test]
    fn outputs_never_alias_inputs_or_each_other() {
        let lar1 = vector(vec![1.0, 2.0], &["a", "b"]);
        let lar2 = vector(vec![3.0, 4.0], &["a", "b"]);
        let (mut out1, out2) = align(&lar1, &lar2, &AlignOptions::default()).expect("align");

        out1.buffer_mut()
            .fill_missing(0, &[0, 1], &Scalar::Float64(99.0))
            .expect("mutate");
        assert_floats(&floats(&out1), &[99.0, 99.0]);
        assert_floats(&floats(&out2), &[3.0, 4.0]);
        assert_floats(&floats(&lar1), &[1.0, 2.0]);
        assert_floats(&floats(&lar2), &[3.0, 4.0]);
    }

    #[test]
    fn int_inputs_are_widened_when_casting_is_allowed() {
        let lar1 = ints(vec![1, 2], &["a", "b"]);
        let lar2 = ints(vec![3], &["b"]);

        let (out1, out2) = align(&lar1, &lar2, &AlignOptions::default()).expect("inner");
        assert_eq!(out1.dtype(), DType::Float64);
        assert_eq!(out2.dtype(), DType::Float64);

        let outer = AlignOptions::new().with_join(JoinMode::Outer);
        let (_, out2) = align(&lar1, &lar2, &outer).expect("outer");
        assert_floats(&floats(&out2), &[f64::NAN, 3.0]);
    }

    #[test]
    fn int_inputs_without_casting_only_fail_when_a_fill_is_needed() {
        let lar1 = ints(vec![1, 2], &["a", "b"]);
        let lar2 = ints(vec![3], &["b"]);
        let no_cast = AlignOptions::new().with_allow_cast(false);

        let (out1, _) = align(&lar1, &lar2, &no_cast).expect("inner needs no fill");
        assert_eq!(out1.dtype(), DType::Int64);
        assert_eq!(out1.buffer().to_vec(), vec![Scalar::Int64(2)]);

        let err = align(&lar1, &lar2, &no_cast.clone().with_join(JoinMode::Outer))
            .expect_err("outer needs a marker");
        assert_eq!(
            err,
            AlignError::NoMissingMarker {
                side: Side::Right,
                dtype: DType::Int64
            }
        );
    }

    #[test]
    fn nan_fill_into_int_is_a_type_error() {
        let lar1 = ints(vec![1, 2], &["a", "b"]);
        let lar2 = ints(vec![3], &["b"]);
        let options = AlignOptions::new()
            .with_join(JoinMode::Outer)
            .with_fill(f64::NAN)
            .with_allow_cast(false);

        let err = align(&lar1, &lar2, &options).expect_err("nan into int");
        assert!(matches!(
            err,
            AlignError::FillIncompatible {
                side: Side::Right,
                axis: 0,
                dtype: DType::Int64,
                source: TypeError::NoMissingMarker { .. },
                ..
            }
        ));
        assert!(err.to_string().starts_with("fill type not compatible"));
    }

    #[test]
    fn explicit_fill_skips_casting() {
        let lar1 = ints(vec![1, 2], &["a", "b"]);
        let lar2 = ints(vec![3], &["c"]);
        let options = AlignOptions::new().with_join(JoinMode::Outer).with_fill(0_i64);

        let (out1, out2) = align(&lar1, &lar2, &options).expect("align");
        assert_eq!(out1.dtype(), DType::Int64);
        assert_eq!(
            out1.buffer().to_vec(),
            [1, 2, 0].map(Scalar::Int64).to_vec()
        );
        assert_eq!(
            out2.buffer().to_vec(),
            [0, 0, 3].map(Scalar::Int64).to_vec()
        );
    }

    #[test]
    fn string_arrays_fill_with_empty_strings() {
        let buffer = NdBuffer::from_shape_vec(&[2], vec!["p".into(), "q".into()]).expect("utf8");
        let lar1 = Larry::new(buffer, vec![utf8(&["a", "b"])]).expect("larry");
        let lar2 = vector(vec![1.0], &["c"]);
        let options = AlignOptions::new().with_join(JoinMode::Left);

        let (out1, out2) = align(&lar1, &lar2, &options).expect("align");
        assert_eq!(out1.dtype(), DType::Utf8);
        assert_eq!(out2.buffer().to_vec().len(), 2);
        assert!(out2.buffer().to_vec().iter().all(Scalar::is_nan));

        let (_, out1) = align(&lar2, &lar1, &options).expect("align");
        assert_eq!(out1.buffer().to_vec(), vec![Scalar::Utf8(String::new())]);
    }

    #[test]
    fn argument_validation_errors() {
        let flat = vector(vec![1.0], &["a"]);
        let square = grid(vec![1.0, 2.0, 3.0, 4.0], &["a", "b"], &["c", "d"]);

        let err = align(&flat, &square, &AlignOptions::default()).expect_err("rank");
        assert_eq!(err, AlignError::RankMismatch { left: 1, right: 2 });

        let options = AlignOptions::new().with_join(vec![JoinMode::Inner]);
        let err = align(&square, &square, &options).expect_err("join length");
        assert_eq!(err, AlignError::JoinLengthMismatch { len: 1, ndim: 2 });

        let err = "cross".parse::<JoinMode>().expect_err("unknown");
        assert_eq!(err.to_string(), "join type not recognized: \"cross\"");
        assert_eq!("right".parse::<JoinMode>().expect("right"), JoinMode::Right);
    }

    #[test]
    fn union_and_intersection_over_labeled_arrays() {
        let y1 = grid(vec![1.0, 2.0, 3.0, 4.0], &["a", "b"], &["c", "d"]);
        let y2 = grid(vec![1.0, 2.0, 3.0, 4.0], &["e", "b"], &["f", "d"]);

        assert_eq!(union(0, &[&y1, &y2]).expect("union"), utf8(&["a", "b", "e"]));
        assert_eq!(union(1, &[&y1, &y2]).expect("union"), utf8(&["c", "d", "f"]));
        assert_eq!(intersection(0, &[&y1, &y2]).expect("meet"), utf8(&["b"]));
        assert_eq!(intersection(1, &[&y1, &y2]).expect("meet"), utf8(&["d"]));

        assert_eq!(
            union(2, &[&y1]).expect_err("axis"),
            AlignError::AxisOutOfBounds { axis: 2, ndim: 2 }
        );
        assert_eq!(intersection(0, &[]).expect_err("empty"), AlignError::NoArrays);
        assert!(union(0, &[]).expect("empty union").is_empty());
    }

    #[test]
    fn resolver_skips_gathers_for_identical_labels() {
        let labels = utf8(&["b", "a"]);
        let plan = resolve_axis(&labels, &labels, JoinMode::Outer);
        assert_eq!(plan.labels, labels);
        assert!(plan.left.is_none() && plan.right.is_none());

        let plan = resolve_axis(&utf8(&["a", "b"]), &utf8(&["b", "c"]), JoinMode::Left);
        assert!(plan.left.is_none());
        let right = plan.right.expect("right gathers");
        assert_eq!(right.indices, vec![0, 0]);
        assert_eq!(right.missing, vec![0]);
    }

    #[test]
    fn missing_resolver_widens_or_rejects() {
        let lar = ints(vec![1], &["a"]);
        let resolved = resolve_missing(&lar, Side::Left, &FillPolicy::Default, true).expect("cast");
        assert!(!resolved.is_view());
        assert_eq!(resolved.marker, Some(Scalar::Null(NullKind::NaN)));

        let err = resolve_missing(&lar, Side::Left, &FillPolicy::Default, false).expect_err("no cast");
        assert_eq!(
            err,
            AlignError::NoMissingMarker {
                side: Side::Left,
                dtype: DType::Int64
            }
        );

        let explicit = FillPolicy::Explicit(Scalar::Int64(-1));
        let resolved = resolve_missing(&lar, Side::Left, &explicit, false).expect("explicit");
        assert!(resolved.is_view());
        assert_eq!(resolved.marker, Some(Scalar::Int64(-1)));
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: AlignOptions = serde_json::from_str(
            r#"{"join": ["outer", "left"], "fill": {"explicit": {"kind": "float64", "value": 0.0}}, "allow_cast": false}"#,
        )
        .expect("options");
        assert_eq!(
            options.join,
            JoinSpec::PerAxis(vec![JoinMode::Outer, JoinMode::Left])
        );
        assert_eq!(options.fill, FillPolicy::Explicit(Scalar::Float64(0.0)));
        assert!(!options.allow_cast);

        let defaults: AlignOptions = serde_json::from_str(r#"{"join": "right"}"#).expect("partial");
        assert_eq!(defaults.join, JoinSpec::Uniform(JoinMode::Right));
        assert!(defaults.allow_cast);

        assert!(serde_json::from_str::<AlignOptions>(r#"{"join": "sideways"}"#).is_err());
        assert!(serde_json::from_str::<AlignOptions>(r#"{"join": 3}"#).is_err());
    }

    #[test]
    fn empty_source_axis_is_filled_entirely() {
        let buffer = NdBuffer::from_f64(&[0], Vec::new()).expect("empty");
        let empty = Larry::new(buffer, vec![LabelList::range(0)]).expect("larry");
        let lar = Larry::new(
            NdBuffer::from_f64(&[2], vec![1.0, 2.0]).expect("buffer"),
            vec![LabelList::new(vec![Label::Int64(4), Label::Int64(7)]).expect("labels")],
        )
        .expect("larry");

        let (out1, out2) =
            align(&empty, &lar, &AlignOptions::new().with_join(JoinMode::Outer)).expect("align");
        assert_eq!(out1.shape(), &[2]);
        assert!(out1.buffer().to_vec().iter().all(Scalar::is_nan));
        assert_floats(&floats(&out2), &[1.0, 2.0]);
    }
}
