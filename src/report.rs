//! Result reporting
//!
//! Drivers notify a [`Reporter`] as cases finish. The engine itself never
//! formats console output; [`LogReporter`] forwards to the `log` facade.

use crate::model::{Outcome, TestCase, TestGroup, TestResult};
use log::{info, warn};
use std::sync::Arc;

/// Receives results as they are recorded
///
/// Called from driver threads, possibly concurrently.
pub trait Reporter: Send + Sync {
    /// A case finished; its result is already recorded in the tree, so the
    /// parent group's tally includes it
    fn case_finished(&self, case: &TestCase, result: &TestResult);

    /// The driver has nothing left to run
    fn suite_finished(&self, root: &Arc<TestGroup>);
}

/// Reporter that writes through `log`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn case_finished(&self, case: &TestCase, result: &TestResult) {
        let progress = case
            .parent()
            .map(|g| format!(" [{} {}/{}]", g.section(), g.tally().total(), g.leaf_count()))
            .unwrap_or_default();

        match &result.outcome {
            Outcome::Failed(reason) => {
                warn!("{} {}: failed: {}{}", case.id(), case.desc(), reason, progress);
                warn!("  requirement: {}", case.requirement());
            }
            outcome => info!(
                "{} {}: {} ({:?}){}",
                case.id(),
                case.desc(),
                outcome.label(),
                result.duration,
                progress
            ),
        }
    }

    fn suite_finished(&self, root: &Arc<TestGroup>) {
        let tally = root.tally();
        if tally.failed > 0 {
            warn!("{}: {}", root.name(), tally);
        } else {
            info!("{}: {}", root.name(), tally);
        }
    }
}

/// Reporter that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn case_finished(&self, _case: &TestCase, _result: &TestResult) {}

    fn suite_finished(&self, _root: &Arc<TestGroup>) {}
}
