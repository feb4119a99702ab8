//! fleetrun-core: Result model for remote execution
//!
//! Reduces the raw output of any transport (exit code, stdout/stderr bytes,
//! task JSON) into one uniform [`TargetResult`], and aggregates many of them
//! into a [`ResultSet`].

pub mod action;
pub mod error;
pub mod issue;
pub mod result;
pub mod result_set;
pub mod status;
pub mod target;

pub use action::Action;
pub use error::CoreError;
pub use issue::{ErrorRecord, IssueKind, Reportable};
pub use result::{ERROR_KEY, OUTPUT_KEY, TargetResult, Value};
pub use result_set::ResultSet;
pub use status::{Status, StatusHash};
pub use target::Target;
