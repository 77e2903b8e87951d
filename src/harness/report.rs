//! Per-test diagnostics.
//!
//! Every assertion made while a test body runs lands in the collector of
//! that test as a [`Record`]. Assertions never unwind; a failed check is
//! recorded and the body keeps going.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::Hresult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Failure,
    /// Known-broken check that failed as expected.
    Todo,
    /// Known-broken check that unexpectedly passed.
    TodoPassed,
    Skip,
    Trace,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Failure => "Test failed",
            Severity::Todo => "Test marked todo",
            Severity::TodoPassed => "Test succeeded inside todo block",
            Severity::Skip => "Tests skipped",
            Severity::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub file: &'static str,
    pub line: u32,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}: {}", self.file, self.line, self.severity.label(), self.message)
    }
}

/// Result of one test body.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub checks: u32,
    pub failures: u32,
    pub todos: u32,
    pub todo_passed: u32,
    pub skips: u32,
    pub records: Vec<Record>,
}

impl Outcome {
    /// A todo that starts passing fails the test only when asked to.
    pub fn failed(&self, fail_on_todo_pass: bool) -> bool {
        self.failures > 0 || (fail_on_todo_pass && self.todo_passed > 0)
    }

    /// Skipped without making a single check.
    pub fn skipped(&self) -> bool {
        self.skips > 0 && self.checks == 0 && self.failures == 0
    }
}

#[derive(Default)]
struct Collector {
    checks: AtomicU32,
    records: Mutex<Vec<Record>>,
}

impl Collector {
    fn push(&self, location: &'static Location<'static>, severity: Severity, message: String) {
        let record = Record {
            file: location.file(),
            line: location.line(),
            severity,
            message,
        };
        match severity {
            Severity::Failure => warn!("{}", record),
            Severity::TodoPassed => warn!("{}", record),
            _ => debug!("{}", record),
        }
        self.records.lock().push(record);
    }

    fn outcome(&self) -> Outcome {
        let records = self.records.lock().clone();
        let count = |s: Severity| records.iter().filter(|r| r.severity == s).count() as u32;
        Outcome {
            checks: self.checks.load(Ordering::Acquire),
            failures: count(Severity::Failure),
            todos: count(Severity::Todo),
            todo_passed: count(Severity::TodoPassed),
            skips: count(Severity::Skip),
            records,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<Collector>>> = const { RefCell::new(None) };
}

fn with_current(f: impl FnOnce(&Collector)) {
    let collector = CURRENT.with(|c| c.borrow().clone());
    match collector {
        Some(collector) => f(&collector),
        None => f(&Collector::default()),
    }
}

/// Restores the previous collector of this thread on drop.
struct Installed(Option<Arc<Collector>>);

impl Installed {
    fn new(collector: Option<Arc<Collector>>) -> Self {
        Self(CURRENT.with(|c| c.replace(collector)))
    }
}

impl Drop for Installed {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

/// Run a test body inside a fresh collector.
///
/// A panic escaping the body is recorded as a failure at the call site.
#[track_caller]
pub fn run_test<F: FnOnce()>(body: F) -> Outcome {
    let location = Location::caller();
    let collector = Arc::new(Collector::default());
    {
        let _installed = Installed::new(Some(collector.clone()));
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Test body panicked: {}", message);
            collector.push(location, Severity::Failure, format!("Panic: {}", message));
        }
    }
    collector.outcome()
}

/// Wrap `f` so that it reports into the collector of the calling thread
/// when run elsewhere.
pub fn inherit<F>(f: F) -> impl FnOnce() + Send + 'static
where
    F: FnOnce() + Send + 'static,
{
    let collector = CURRENT.with(|c| c.borrow().clone());
    move || {
        let _installed = Installed::new(collector);
        f()
    }
}

/// Record a failure unless `condition` holds. Returns `condition`.
#[track_caller]
pub fn check(condition: bool, message: impl Into<String>) -> bool {
    check_at(Location::caller(), condition, message)
}

/// Unwrap a result, recording a failure for `Err`.
#[track_caller]
pub fn check_ok<T, E: fmt::Display>(result: Result<T, E>, what: &str) -> Option<T> {
    match result {
        Ok(value) => {
            check(true, "");
            Some(value)
        }
        Err(e) => {
            check(false, format!("{}: {}.", what, e));
            None
        }
    }
}

/// [`check`] with an explicit source location.
pub fn check_at(location: &'static Location<'static>, condition: bool, message: impl Into<String>) -> bool {
    with_current(|c| {
        c.checks.fetch_add(1, Ordering::AcqRel);
        if !condition {
            c.push(location, Severity::Failure, message.into());
        }
    });
    condition
}

/// A check that is known to fail on the implementation under test.
#[track_caller]
pub fn check_todo(condition: bool, message: impl Into<String>) -> bool {
    let location = Location::caller();
    with_current(|c| {
        c.checks.fetch_add(1, Ordering::AcqRel);
        let severity = if condition {
            Severity::TodoPassed
        } else {
            Severity::Todo
        };
        c.push(location, severity, message.into());
    });
    condition
}

/// Check that a call returned `expected`.
#[track_caller]
pub fn check_hr(hr: Hresult, expected: Hresult, what: &str) -> bool {
    check(hr == expected, format!("{}: got hr {}, expected {}.", what, hr, expected))
}

/// Unconditional failure.
#[track_caller]
pub fn fail(message: impl Into<String>) {
    check(false, message);
}

#[track_caller]
pub fn skip(message: impl Into<String>) {
    let location = Location::caller();
    with_current(|c| c.push(location, Severity::Skip, message.into()));
}

#[track_caller]
pub fn trace(message: impl Into<String>) {
    let location = Location::caller();
    with_current(|c| c.push(location, Severity::Trace, message.into()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_counted_and_located() {
        let outcome = run_test(|| {
            check(true, "fine");
            check(1 + 1 == 3, "arithmetic");
            trace("note");
        });
        assert_eq!(outcome.checks, 2);
        assert_eq!(outcome.failures, 1);
        assert!(outcome.failed(false));
        let failure = &outcome.records[0];
        assert_eq!(failure.file, file!());
        assert_eq!(failure.message, "arithmetic");
        assert!(failure.to_string().contains("Test failed: arithmetic"));
    }

    #[test]
    fn test_todo_directions() {
        let outcome = run_test(|| {
            check_todo(false, "still broken");
            check_todo(true, "fixed");
        });
        assert_eq!(outcome.failures, 0);
        assert_eq!(outcome.todos, 1);
        assert_eq!(outcome.todo_passed, 1);
        assert!(!outcome.failed(false));
        assert!(outcome.failed(true));
    }

    #[test]
    fn test_skip_without_checks() {
        let outcome = run_test(|| skip("no device"));
        assert!(outcome.skipped());
        assert!(!outcome.failed(true));
    }

    #[test]
    fn test_panic_becomes_failure() {
        let outcome = run_test(|| panic!("boom"));
        assert_eq!(outcome.failures, 1);
        assert!(outcome.records[0].message.contains("boom"));
    }

    #[test]
    fn test_inherited_collector() {
        let outcome = run_test(|| {
            let body = inherit(|| {
                check(false, "from worker");
            });
            std::thread::spawn(body).join().unwrap();
        });
        assert_eq!(outcome.failures, 1);
        assert_eq!(outcome.records[0].message, "from worker");
    }

    #[test]
    fn test_collectors_do_not_leak_between_tests() {
        let first = run_test(|| {
            check(false, "first");
        });
        let second = run_test(|| {
            check(true, "second");
        });
        assert_eq!(first.failures, 1);
        assert_eq!(second.failures, 0);
        assert_eq!(second.checks, 1);
    }
}
