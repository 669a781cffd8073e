//! contentgate - content compliance governance.
//!
//! Tracks compliance issues found in published content (funding amounts,
//! immigration and visa claims, career outcomes, rankings) from detection to
//! resolution, and gates deployment on the ones flagged as blocking.
//!
//! # Architecture
//!
//! - `detect`: rule-driven detection over content, producing candidates
//! - `rules`: versioned YAML rule-set schema and templates
//! - `store`: durable JSON-Lines ledger with advisory file locking
//! - `lifecycle`: pending / in-progress / resolved / deferred state machine
//! - `gate`: strict and advisory deployment gate, fail-closed
//! - `report`: filtered views, summaries and output formatting
//! - `config`, `observability`, `cli`: the ambient shell around the engine

pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod gate;
pub mod issue;
pub mod lifecycle;
pub mod observability;
pub mod report;
pub mod rules;
pub mod store;

pub use config::Config;
pub use detect::{detect, Candidate, Detection, Scanner};
pub use error::{GovernanceError, Result};
pub use gate::{GateResult, Verdict};
pub use issue::{Issue, IssueDraft, IssueId, Severity, Status};
pub use lifecycle::{Lifecycle, Resolution};
pub use rules::RuleSet;
pub use store::{Ledger, LockPolicy, Snapshot};
