//! Detection engine: rule matching over content.

mod patterns;
mod runner;
mod suppress;
mod types;

pub use patterns::{detect, CompiledRules};
pub use runner::{ingest, IngestOutcome, ScanResult, Scanner};
pub use suppress::{parse_suppressions, Suppression, SuppressionType};
pub use types::{Candidate, Detection, SuppressedRule};
