//! Test groups and result aggregation
//!
//! Groups form a tree keyed by RFC section. Every group keeps a running
//! [`Tally`] of its subtree that is updated by delta when a case result is
//! recorded, never recomputed.

use super::case::{Outcome, TestCase, TestResult};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// Pass/fail/skip counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    /// Contribution of a single outcome
    pub fn of(outcome: &Outcome) -> Self {
        let mut tally = Tally::default();
        match outcome {
            Outcome::Passed => tally.passed = 1,
            Outcome::Failed(_) => tally.failed = 1,
            Outcome::Skipped => tally.skipped = 1,
        }
        tally
    }

    /// Every recorded leaf
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Leaves that actually ran
    pub fn executed(&self) -> usize {
        self.passed + self.failed
    }

    fn add(&mut self, other: &Tally) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    fn sub(&mut self, other: &Tally) {
        self.passed -= other.passed;
        self.failed -= other.failed;
        self.skipped -= other.skipped;
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tests, {} passed, {} skipped, {} failed",
            self.total(),
            self.passed,
            self.skipped,
            self.failed
        )
    }
}

/// Child of a group
#[derive(Debug, Clone)]
pub enum Node {
    Group(Arc<TestGroup>),
    Case(Arc<TestCase>),
}

/// A section of the suite
pub struct TestGroup {
    section: String,
    name: String,
    parent: Weak<TestGroup>,
    children: RwLock<Vec<Node>>,
    tally: Mutex<Tally>,
}

impl TestGroup {
    /// Create a root group
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Self::new(String::new(), name.into(), Weak::new())
    }

    fn new(section: String, name: String, parent: Weak<TestGroup>) -> Arc<Self> {
        Arc::new(TestGroup {
            section,
            name,
            parent,
            children: RwLock::new(Vec::new()),
            tally: Mutex::new(Tally::default()),
        })
    }

    /// Append a subgroup
    pub fn add_test_group(self: &Arc<Self>, section: impl Into<String>, name: impl Into<String>) -> Arc<TestGroup> {
        let group = Self::new(section.into(), name.into(), Arc::downgrade(self));
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Node::Group(group.clone()));
        group
    }

    /// Append a case; it becomes `"<section>/<n>"` with `n` counting cases only
    pub fn add_test_case(self: &Arc<Self>, mut case: TestCase) -> Arc<TestCase> {
        let mut children = self.children.write().unwrap_or_else(PoisonError::into_inner);

        let cases = children.iter().filter(|n| matches!(n, Node::Case(_))).count();
        case.parent = Arc::downgrade(self);
        case.index = cases + 1;

        let case = Arc::new(case);
        children.push(Node::Case(case.clone()));
        case
    }

    /// Dotted section, empty for the root
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<Arc<TestGroup>> {
        self.parent.upgrade()
    }

    /// Direct children in declaration order
    pub fn children(&self) -> Vec<Node> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the subtree counters
    pub fn tally(&self) -> Tally {
        *self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of cases in the subtree
    pub fn leaf_count(&self) -> usize {
        self.children()
            .iter()
            .map(|node| match node {
                Node::Group(g) => g.leaf_count(),
                Node::Case(_) => 1,
            })
            .sum()
    }

    /// Depth-first, declaration-order list of the cases matching `filter`
    ///
    /// A case's position in the returned list is its dispatch index.
    pub fn collect_test_cases<F>(&self, filter: F) -> Vec<Arc<TestCase>>
    where
        F: Fn(&TestCase) -> bool,
    {
        let mut out = Vec::new();
        self.collect_into(&filter, &mut out);
        out
    }

    fn collect_into<F>(&self, filter: &F, out: &mut Vec<Arc<TestCase>>)
    where
        F: Fn(&TestCase) -> bool,
    {
        for node in self.children() {
            match node {
                Node::Group(g) => g.collect_into(filter, out),
                Node::Case(c) if filter(c.as_ref()) => out.push(c),
                Node::Case(_) => {}
            }
        }
    }

    /// Look up a case by its `"<section>/<n>"` id
    pub fn find_case(&self, id: &str) -> Option<Arc<TestCase>> {
        self.collect_test_cases(|c| c.id() == id).into_iter().next()
    }

    fn apply(&self, old: &Tally, new: &Tally) {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        tally.sub(old);
        tally.add(new);
    }
}

impl fmt::Debug for TestGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestGroup")
            .field("section", &self.section)
            .field("name", &self.name)
            .field("tally", &self.tally())
            .finish()
    }
}

/// Record a case result and propagate it to every ancestor
///
/// A previous result is subtracted first, so each leaf contributes exactly
/// once. The case's own lock is held for the whole update, so concurrent
/// recordings of the same case serialize; ancestor counters are locked one
/// at a time.
pub fn record_result(case: &TestCase, result: TestResult) {
    let mut slot = case.lock_result();

    let old = slot
        .as_ref()
        .map(|r| Tally::of(&r.outcome))
        .unwrap_or_default();
    let new = Tally::of(&result.outcome);
    *slot = Some(result);

    let mut group = case.parent();
    while let Some(g) = group {
        g.apply(&old, &new);
        group = g.parent();
    }
}
