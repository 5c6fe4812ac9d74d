//! Test tree
//!
//! Groups mirror RFC sections and own their cases. Results flow upward
//! through non-owning parent links.

mod case;
mod group;

pub use case::{ClientRunFn, Outcome, Run, ServerRunFn, TestCase, TestResult};
pub use group::{record_result, Node, Tally, TestGroup};
