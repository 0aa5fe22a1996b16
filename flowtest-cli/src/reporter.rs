//! Test result reporting
//!
//! All test output flows through a [`Reporter`], injected into the runner.
//! [`TextReporter`] writes colored lines as tests finish; [`JsonReporter`]
//! collects results and writes one summary document at the end.

use std::io::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use flowtest_core::catalog::TestCase;
use flowtest_core::result::{Summary, TestOutcome, TestResult};

use crate::cli::OutputFormat;

/// Sink for test progress and the final summary.
pub trait Reporter: Send {
    fn report_start(&mut self, test: &TestCase) -> std::io::Result<()>;
    fn report_pass(&mut self, result: &TestResult) -> std::io::Result<()>;
    fn report_fail(&mut self, result: &TestResult) -> std::io::Result<()>;
    fn report_summary(&mut self, summary: &Summary) -> std::io::Result<()>;
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report_start(&mut self, test: &TestCase) -> std::io::Result<()> {
        (**self).report_start(test)
    }

    fn report_pass(&mut self, result: &TestResult) -> std::io::Result<()> {
        (**self).report_pass(result)
    }

    fn report_fail(&mut self, result: &TestResult) -> std::io::Result<()> {
        (**self).report_fail(result)
    }

    fn report_summary(&mut self, summary: &Summary) -> std::io::Result<()> {
        (**self).report_summary(summary)
    }
}

/// Reporter for `format`, writing to stdout.
pub fn stdout_reporter(format: OutputFormat, color: bool) -> Box<dyn Reporter> {
    match format {
        OutputFormat::Text => Box::new(TextReporter::new(std::io::stdout(), color)),
        OutputFormat::Json => Box::new(JsonReporter::new(std::io::stdout())),
    }
}

/// Human-readable reporter.
///
/// Color is decided per instance; nothing touches the `colored` global override.
pub struct TextReporter<W> {
    out: W,
    color: bool,
    failures: Vec<(String, String, String)>,
}

impl<W: Write + Send> TextReporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            failures: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn paint(color: bool, text: &str, style: fn(&str) -> ColoredString) -> String {
    if color {
        style(text).to_string()
    } else {
        text.to_owned()
    }
}

impl<W: Write + Send> Reporter for TextReporter<W> {
    fn report_start(&mut self, test: &TestCase) -> std::io::Result<()> {
        write!(self.out, "test {} ... ", test.test)?;
        self.out.flush()
    }

    fn report_pass(&mut self, result: &TestResult) -> std::io::Result<()> {
        let ok = paint(self.color, "ok", |s| s.green());
        writeln!(self.out, "{ok} ({}ms)", result.duration.as_millis())
    }

    fn report_fail(&mut self, result: &TestResult) -> std::io::Result<()> {
        let failed = paint(self.color, "FAILED", |s| s.red().bold());
        writeln!(self.out, "{failed}")?;
        if let TestOutcome::Failed { scope, error } = &result.outcome {
            self.failures
                .push((result.test.clone(), scope.clone(), error.clone()));
        }
        Ok(())
    }

    fn report_summary(&mut self, summary: &Summary) -> std::io::Result<()> {
        writeln!(self.out)?;
        if !self.failures.is_empty() {
            writeln!(self.out, "{}", paint(self.color, "failures:", |s| s.bold()))?;
            for (test, scope, error) in &self.failures {
                let name = paint(self.color, test, |s| s.red());
                writeln!(self.out, "  {name}")?;
                writeln!(self.out, "    at {}", paint(self.color, scope, |s| s.dimmed()))?;
                writeln!(self.out, "    {error}")?;
            }
            writeln!(self.out)?;
        }
        let line = summary.to_string();
        let line = if summary.failed == 0 {
            paint(self.color, &line, |s| s.green().bold())
        } else {
            paint(self.color, &line, |s| s.red().bold())
        };
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    summary: &'a Summary,
    exit_code: u8,
    results: &'a [TestResult],
}

/// Reporter that emits a single JSON document once the summary is known.
pub struct JsonReporter<W> {
    out: W,
    results: Vec<TestResult>,
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            results: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Reporter for JsonReporter<W> {
    fn report_start(&mut self, _test: &TestCase) -> std::io::Result<()> {
        Ok(())
    }

    fn report_pass(&mut self, result: &TestResult) -> std::io::Result<()> {
        self.results.push(result.clone());
        Ok(())
    }

    fn report_fail(&mut self, result: &TestResult) -> std::io::Result<()> {
        self.results.push(result.clone());
        Ok(())
    }

    fn report_summary(&mut self, summary: &Summary) -> std::io::Result<()> {
        let report = JsonReport {
            summary,
            exit_code: summary.exit_code(),
            results: &self.results,
        };
        serde_json::to_writer_pretty(&mut self.out, &report)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}
