#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One addressable key along an axis.
///
/// The derived order is total: `Int64 < Utf8 < Tuple`, then by value, so
/// label lists of mixed kinds still sort deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int64(i64),
    Utf8(String),
    Tuple(Vec<Label>),
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<usize> for Label {
    fn from(value: usize) -> Self {
        Self::Int64(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Tuple(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("duplicate label {label} in label list")]
    DuplicateLabel { label: Label },
    #[error("label {label} not found in source label list")]
    LabelNotFound { label: Label },
}

/// Ordered sequence of unique labels for one axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Label>", into = "Vec<Label>")]
pub struct LabelList {
    labels: Vec<Label>,
}

impl LabelList {
    pub fn new(labels: Vec<Label>) -> Result<Self, LabelError> {
        let mut seen = HashMap::<&Label, ()>::with_capacity(labels.len());
        for label in &labels {
            if seen.insert(label, ()).is_some() {
                return Err(LabelError::DuplicateLabel {
                    label: label.clone(),
                });
            }
        }
        Ok(Self { labels })
    }

    /// Default labels `0..len`.
    #[must_use]
    pub fn range(len: usize) -> Self {
        Self {
            labels: (0..len).map(Label::from).collect(),
        }
    }

    pub fn from_i64(values: Vec<i64>) -> Result<Self, LabelError> {
        Self::new(values.into_iter().map(Label::from).collect())
    }

    pub fn from_utf8<S: Into<String>>(values: Vec<S>) -> Result<Self, LabelError> {
        Self::new(values.into_iter().map(|v| Label::Utf8(v.into())).collect())
    }

    /// Build from labels already known to be unique (the output of a set
    /// operation or of a subset of an existing list).
    fn from_unique(labels: Vec<Label>) -> Self {
        Self { labels }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[must_use]
    pub fn into_labels(self) -> Vec<Label> {
        self.labels
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Label> {
        self.labels.get(position)
    }

    #[must_use]
    pub fn contains(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    #[must_use]
    pub fn position(&self, needle: &Label) -> Option<usize> {
        self.labels.iter().position(|label| label == needle)
    }

    #[must_use]
    pub fn position_map(&self) -> HashMap<&Label, usize> {
        self.labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label, idx))
            .collect()
    }

    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.labels.windows(2).all(|pair| pair[0] <= pair[1])
    }

    #[must_use]
    pub fn sorted(&self) -> Self {
        let mut labels = self.labels.clone();
        labels.sort();
        Self::from_unique(labels)
    }
}

impl TryFrom<Vec<Label>> for LabelList {
    type Error = LabelError;

    fn try_from(labels: Vec<Label>) -> Result<Self, Self::Error> {
        Self::new(labels)
    }
}

impl From<LabelList> for Vec<Label> {
    fn from(list: LabelList) -> Self {
        list.labels
    }
}

impl<'a> IntoIterator for &'a LabelList {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter()
    }
}

/// Gather indices into `source` that produce `target`.
///
/// Identical lists short-circuit to the identity.
pub fn map_positions(source: &LabelList, target: &LabelList) -> Result<Vec<usize>, LabelError> {
    if source == target {
        return Ok((0..source.len()).collect());
    }
    let positions = source.position_map();
    target
        .labels
        .iter()
        .map(|label| {
            positions
                .get(label)
                .copied()
                .ok_or_else(|| LabelError::LabelNotFound {
                    label: label.clone(),
                })
        })
        .collect()
}

/// Like [`map_positions`], but target labels absent from `source` get
/// `placeholder` as their gather index and are reported in the second
/// vector (ascending target positions).
#[must_use]
pub fn map_positions_with_fill(
    source: &LabelList,
    target: &LabelList,
    placeholder: usize,
) -> (Vec<usize>, Vec<usize>) {
    let positions = source.position_map();
    let mut indices = Vec::with_capacity(target.len());
    let mut missing = Vec::new();
    for (out_pos, label) in target.labels.iter().enumerate() {
        match positions.get(label) {
            Some(&src) => indices.push(src),
            None => {
                indices.push(placeholder);
                missing.push(out_pos);
            }
        }
    }
    (indices, missing)
}

/// Sorted set union of all lists.
#[must_use]
pub fn sorted_union(lists: &[&LabelList]) -> LabelList {
    let merged: BTreeSet<&Label> = lists.iter().flat_map(|list| list.labels.iter()).collect();
    LabelList::from_unique(merged.into_iter().cloned().collect())
}

/// Sorted set intersection of all lists, using the first list as the
/// running accumulator. An empty slice yields an empty list.
#[must_use]
pub fn sorted_intersection(lists: &[&LabelList]) -> LabelList {
    let Some((first, rest)) = lists.split_first() else {
        return LabelList::from_unique(Vec::new());
    };
    let mut acc: BTreeSet<&Label> = first.labels.iter().collect();
    for list in rest {
        let other: BTreeSet<&Label> = list.labels.iter().collect();
        acc = acc.intersection(&other).copied().collect();
    }
    LabelList::from_unique(acc.into_iter().cloned().collect())
}

/// Cartesian product of label lists as tuple labels, first list varying
/// slowest.
#[must_use]
pub fn flatten_labels(lists: &[&LabelList]) -> LabelList {
    if lists.is_empty() {
        return LabelList::from_unique(Vec::new());
    }
    let mut product: Vec<Vec<Label>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(product.len() * list.len());
        for prefix in &product {
            for label in &list.labels {
                let mut combo = prefix.clone();
                combo.push(label.clone());
                next.push(combo);
            }
        }
        product = next;
    }
    LabelList::from_unique(product.into_iter().map(Label::Tuple).collect())
}
