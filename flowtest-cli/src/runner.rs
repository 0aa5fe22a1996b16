//! Sequential test execution loop.
//!
//! Each test runs to completion before the next starts; a failing test is
//! recorded and the loop continues. Registers are reset exactly once after
//! every test, whatever its outcome.

use std::future::Future;
use std::time::Instant;

use tracing::{info, warn};

use flowtest_cluster::{ExecutionGraph, RegisterReset, TestEngine};
use flowtest_core::catalog::TestCase;
use flowtest_core::error::FlowtestError;
use flowtest_core::metrics as m;
use flowtest_core::result::{Summary, TestOutcome, TestResult};

use crate::reporter::Reporter;

/// Runs `tests` in declared order and reports the summary.
///
/// If `interrupt` resolves, the in-flight test is abandoned, remaining tests
/// are skipped, and [`FlowtestError::Interrupted`] is returned with the
/// resolved signal name.
pub async fn run_tests<C, E, R, I>(
    engine: &E,
    graph: &ExecutionGraph,
    cluster: &C,
    tests: &[TestCase],
    reporter: &mut R,
    interrupt: I,
) -> Result<Summary, FlowtestError>
where
    C: RegisterReset,
    E: TestEngine<C>,
    R: Reporter + ?Sized,
    I: Future<Output = String>,
{
    tokio::pin!(interrupt);
    let mut results = Vec::with_capacity(tests.len());

    for test in tests {
        reporter.report_start(test)?;
        let started = Instant::now();

        let outcome = tokio::select! {
            signal = &mut interrupt => {
                warn!(test = %test.test, signal = %signal, "interrupted; abandoning test");
                return Err(FlowtestError::Interrupted { signal });
            }
            outcome = engine.run_test_case(graph, cluster, test) => outcome,
        };
        cluster.clear_registers_for_test();

        let result = TestResult {
            test: test.test.clone(),
            outcome: match outcome {
                Ok(_) => TestOutcome::Passed,
                Err(failure) => TestOutcome::Failed {
                    scope: failure.scope,
                    error: failure.error.to_string(),
                },
            },
            duration: started.elapsed(),
        };

        metrics::counter!(m::TESTS_TOTAL, m::LABEL_OUTCOME => result.outcome.label()).increment(1);
        metrics::histogram!(m::TEST_DURATION_SECONDS).record(result.duration.as_secs_f64());

        match &result.outcome {
            TestOutcome::Passed => {
                info!(test = %result.test, "test passed");
                reporter.report_pass(&result)?;
            }
            TestOutcome::Failed { scope, error } => {
                info!(test = %result.test, scope = %scope, error = %error, "test failed");
                reporter.report_fail(&result)?;
            }
        }
        results.push(result);
    }

    let summary = Summary::from_results(&results);
    info!(
        ran = summary.ran,
        passed = summary.passed,
        failed = summary.failed,
        "test run complete"
    );
    reporter.report_summary(&summary)?;
    Ok(summary)
}
