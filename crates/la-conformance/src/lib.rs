#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use la_align::{AlignOptions, align, intersection, union};
use la_buffer::NdBuffer;
use la_label::{Label, LabelList};
use la_larry::Larry;
use la_types::{DType, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
        }
    }

    #[must_use]
    pub fn case_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("cases")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub fixture_root_present: bool,
    pub fixture_count: usize,
}

#[must_use]
pub fn run_smoke(config: &HarnessConfig) -> HarnessReport {
    let fixture_count = list_fixture_files(&config.case_fixture_root())
        .map(|files| files.len())
        .unwrap_or(0);

    HarnessReport {
        suite: "smoke",
        fixture_root_present: config.fixture_root.exists(),
        fixture_count,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOperation {
    Align,
    Union,
    Intersection,
}

/// Labeled array as written in a fixture. Without `dtype` the element
/// type is inferred from `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureArray {
    pub shape: Vec<usize>,
    pub values: Vec<Scalar>,
    pub labels: Vec<Vec<Label>>,
    #[serde(default)]
    pub dtype: Option<DType>,
}

impl FixtureArray {
    pub fn build(&self) -> Result<Larry, String> {
        let buffer = match self.dtype {
            Some(dtype) => NdBuffer::from_vec(dtype, &self.shape, self.values.clone()),
            None => NdBuffer::from_shape_vec(&self.shape, self.values.clone()),
        }
        .map_err(|err| err.to_string())?;
        let labels = self
            .labels
            .iter()
            .map(|labels| LabelList::new(labels.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| err.to_string())?;
        Larry::new(buffer, labels).map_err(|err| err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignFixture {
    pub case_id: String,
    pub operation: FixtureOperation,
    pub left: FixtureArray,
    pub right: FixtureArray,
    #[serde(default)]
    pub options: AlignOptions,
    #[serde(default)]
    pub axis: usize,
    #[serde(default)]
    pub expected_left: Option<FixtureArray>,
    #[serde(default)]
    pub expected_right: Option<FixtureArray>,
    #[serde(default)]
    pub expected_labels: Option<Vec<Label>>,
    /// Substring the error message must contain.
    #[serde(default)]
    pub expected_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub operation: FixtureOperation,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl ParityReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
    #[error("no fixture with case_id {0:?}")]
    CaseNotFound(String),
}

pub fn run_fixture_suite(config: &HarnessConfig) -> Result<ParityReport, HarnessError> {
    let fixtures = load_fixtures(config)?;
    Ok(build_report("align_cases".to_owned(), &fixtures))
}

pub fn run_case_by_id(config: &HarnessConfig, case_id: &str) -> Result<ParityReport, HarnessError> {
    let fixtures: Vec<AlignFixture> = load_fixtures(config)?
        .into_iter()
        .filter(|fixture| fixture.case_id == case_id)
        .collect();
    if fixtures.is_empty() {
        return Err(HarnessError::CaseNotFound(case_id.to_owned()));
    }
    Ok(build_report(format!("align_cases:{case_id}"), &fixtures))
}

/// Parse one fixture from raw bytes and run it. Malformed input is an
/// error, never a panic.
pub fn run_fixture_bytes(bytes: &[u8]) -> Result<CaseResult, HarnessError> {
    let fixture: AlignFixture = serde_json::from_slice(bytes)?;
    Ok(run_fixture(&fixture))
}

#[must_use]
pub fn run_fixture(fixture: &AlignFixture) -> CaseResult {
    let mismatch = run_fixture_operation(fixture).err();
    CaseResult {
        case_id: fixture.case_id.clone(),
        operation: fixture.operation,
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
    }
}

fn build_report(suite: String, fixtures: &[AlignFixture]) -> ParityReport {
    let results: Vec<CaseResult> = fixtures.iter().map(run_fixture).collect();
    let failed = results
        .iter()
        .filter(|result| matches!(result.status, CaseStatus::Fail))
        .count();

    ParityReport {
        suite,
        fixture_count: results.len(),
        passed: results.len().saturating_sub(failed),
        failed,
        results,
    }
}

pub fn load_fixtures(config: &HarnessConfig) -> Result<Vec<AlignFixture>, HarnessError> {
    let fixture_files = list_fixture_files(&config.case_fixture_root())?;
    let mut fixtures = Vec::with_capacity(fixture_files.len());
    for fixture_path in fixture_files {
        fixtures.push(load_fixture(&fixture_path)?);
    }
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(fixtures)
}

fn load_fixture(path: &Path) -> Result<AlignFixture, HarnessError> {
    let body = fs::read_to_string(path)?;
    serde_json::from_str(&body)
        .map_err(|err| HarnessError::FixtureFormat(format!("{}: {err}", path.display())))
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn run_fixture_operation(fixture: &AlignFixture) -> Result<(), String> {
    let left = fixture
        .left
        .build()
        .map_err(|err| format!("left array build failed: {err}"))?;
    let right = fixture
        .right
        .build()
        .map_err(|err| format!("right array build failed: {err}"))?;

    match fixture.operation {
        FixtureOperation::Align => {
            let outcome = align(&left, &right, &fixture.options);
            let (out1, out2) = match (outcome, &fixture.expected_error) {
                (Err(err), Some(expected)) => return compare_error(&err.to_string(), expected),
                (Err(err), None) => return Err(format!("align failed: {err}")),
                (Ok(_), Some(expected)) => {
                    return Err(format!("expected error containing {expected:?}, align succeeded"));
                }
                (Ok(pair), None) => pair,
            };
            let expected_left = fixture
                .expected_left
                .as_ref()
                .ok_or("expected_left is required for align")?;
            let expected_right = fixture
                .expected_right
                .as_ref()
                .ok_or("expected_right is required for align")?;
            compare_array("left", &out1, expected_left)?;
            compare_array("right", &out2, expected_right)
        }
        FixtureOperation::Union | FixtureOperation::Intersection => {
            let arrays = [&left, &right];
            let outcome = if fixture.operation == FixtureOperation::Union {
                union(fixture.axis, &arrays)
            } else {
                intersection(fixture.axis, &arrays)
            };
            let actual = match (outcome, &fixture.expected_error) {
                (Err(err), Some(expected)) => return compare_error(&err.to_string(), expected),
                (Err(err), None) => return Err(format!("label set operation failed: {err}")),
                (Ok(_), Some(expected)) => {
                    return Err(format!("expected error containing {expected:?}, operation succeeded"));
                }
                (Ok(labels), None) => labels,
            };
            let expected = fixture
                .expected_labels
                .as_ref()
                .ok_or("expected_labels is required for union/intersection")?;
            if actual.labels() != expected.as_slice() {
                return Err(format!(
                    "labels mismatch: actual={:?}, expected={expected:?}",
                    actual.labels()
                ));
            }
            Ok(())
        }
    }
}

fn compare_error(actual: &str, expected: &str) -> Result<(), String> {
    if actual.contains(expected) {
        Ok(())
    } else {
        Err(format!(
            "error mismatch: actual={actual:?}, expected substring={expected:?}"
        ))
    }
}

fn compare_array(side: &str, actual: &Larry, expected: &FixtureArray) -> Result<(), String> {
    if actual.shape() != expected.shape.as_slice() {
        return Err(format!(
            "{side} shape mismatch: actual={:?}, expected={:?}",
            actual.shape(),
            expected.shape
        ));
    }
    if let Some(dtype) = expected.dtype
        && actual.dtype() != dtype
    {
        return Err(format!(
            "{side} dtype mismatch: actual={:?}, expected={dtype:?}",
            actual.dtype()
        ));
    }

    let actual_labels: Vec<&[Label]> = actual.labels().iter().map(LabelList::labels).collect();
    let expected_labels: Vec<&[Label]> = expected.labels.iter().map(Vec::as_slice).collect();
    if actual_labels != expected_labels {
        return Err(format!(
            "{side} labels mismatch: actual={actual_labels:?}, expected={expected_labels:?}"
        ));
    }

    let values = actual.buffer().to_vec();
    if values.len() != expected.values.len() {
        return Err(format!(
            "{side} value length mismatch: actual={}, expected={}",
            values.len(),
            expected.values.len()
        ));
    }
    for (idx, (left, right)) in values.iter().zip(&expected.values).enumerate() {
        let equal = left.semantic_eq(right) || (left.is_missing() && right.is_missing());
        if !equal {
            return Err(format!(
                "{side} value mismatch at idx={idx}: actual={left:?}, expected={right:?}"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CaseStatus, FixtureOperation, run_fixture_bytes};

    #[test]
    fn malformed_bytes_are_reported_not_panicked() {
        assert!(run_fixture_bytes(b"{").is_err());
        assert!(run_fixture_bytes(br#"{"case_id": "x"}"#).is_err());
    }

    #[test]
    fn inline_fixture_runs_to_a_verdict() {
        let body = br#"{
            "case_id": "inline_union",
            "operation": "union",
            "left": {"shape": [1], "values": [{"kind": "int64", "value": 1}], "labels": [["b"]]},
            "right": {"shape": [1], "values": [{"kind": "int64", "value": 2}], "labels": [["a"]]},
            "expected_labels": ["a", "b"]
        }"#;
        let result = run_fixture_bytes(body).expect("parse");
        assert_eq!(result.operation, FixtureOperation::Union);
        assert_eq!(result.status, CaseStatus::Pass, "{:?}", result.mismatch);
    }

    #[test]
    fn wrong_expectation_is_a_failure_with_a_reason() {
        let body = br#"{
            "case_id": "inline_bad",
            "operation": "intersection",
            "left": {"shape": [1], "values": [{"kind": "int64", "value": 1}], "labels": [["b"]]},
            "right": {"shape": [1], "values": [{"kind": "int64", "value": 2}], "labels": [["a"]]},
            "expected_labels": ["a"]
        }"#;
        let result = run_fixture_bytes(body).expect("parse");
        assert_eq!(result.status, CaseStatus::Fail);
        assert!(
            result
                .mismatch
                .as_deref()
                .is_some_and(|reason| reason.starts_with("labels mismatch"))
        );
    }
}
