//! Golden fixture checks for transforms

use crate::loader::TransformSpec;
use crate::meta::TestFixture;
use crate::runtime::{RunOptions, TransformRuntime, spec_label};
use crate::{Error, Result};
use canon_mapping::ExpressionEngine;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of running one fixture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureReport {
    pub input: PathBuf,
    pub expect: PathBuf,
    #[serde(flatten)]
    pub status: FixtureStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FixtureStatus {
    Passed,
    Failed { expected: Value, actual: Value },
    Errored { message: String },
}

impl FixtureReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == FixtureStatus::Passed
    }
}

impl<E: ExpressionEngine> TransformRuntime<E> {
    /// Run every golden fixture declared by `spec`.
    ///
    /// A failing or unreadable fixture is reported, not raised; the
    /// remaining fixtures still run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] when the body was modified, since
    /// no fixture result would be meaningful.
    pub fn check_fixtures(&self, spec: &TransformSpec, options: &RunOptions) -> Result<Vec<FixtureReport>> {
        let label = spec_label(spec);
        self.verify(&label, spec, options)?;

        let mut compiled = None;
        let mut reports = Vec::with_capacity(spec.tests.len());
        for fixture in &spec.tests {
            let report = match (
                spec.resolve_relative(&fixture.input),
                spec.resolve_relative(&fixture.expect),
            ) {
                (Ok(input), Ok(expect)) => {
                    let status = self.run_fixture(&label, spec, &mut compiled, &input, &expect, options);
                    FixtureReport { input, expect, status }
                }
                (Err(err), _) | (_, Err(err)) => unresolved_report(
                    fixture,
                    FixtureStatus::Errored {
                        message: err.to_string(),
                    },
                ),
            };
            reports.push(report);
        }

        let passed = reports.iter().filter(|r| r.passed()).count();
        info!(transform = %label, passed, total = reports.len(), "Fixtures checked");
        Ok(reports)
    }

    fn run_fixture(
        &self,
        label: &str,
        spec: &TransformSpec,
        compiled: &mut Option<E::Compiled>,
        input_path: &Path,
        expect_path: &Path,
        options: &RunOptions,
    ) -> FixtureStatus {
        let outcome = read_json(input_path).and_then(|input| {
            let expected = read_json(expect_path)?;
            let actual = self.apply(label, spec, compiled, &input, options)?;
            Ok((expected, actual))
        });

        match outcome {
            Ok((expected, actual)) if expected == actual => {
                debug!(fixture = %input_path.display(), "Fixture passed");
                FixtureStatus::Passed
            }
            Ok((expected, actual)) => FixtureStatus::Failed { expected, actual },
            Err(err) => FixtureStatus::Errored {
                message: err.to_string(),
            },
        }
    }
}

fn unresolved_report(fixture: &TestFixture, status: FixtureStatus) -> FixtureReport {
    FixtureReport {
        input: PathBuf::from(&fixture.input),
        expect: PathBuf::from(&fixture.expect),
        status,
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::not_found("fixture", path)
        } else {
            Error::Io(err)
        }
    })?;
    serde_json::from_str(&text).map_err(|e| Error::parse(format!("fixture {} is not valid JSON: {e}", path.display())))
}
