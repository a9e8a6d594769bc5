//! Persisted record types.
//!
//! Each record has a raw `*Row` twin mapped with `sqlx::FromRow`; rows hold
//! the on-disk column types (unix millis, decimal strings, integer flags) and
//! are converted into the typed record on read.

pub mod analysis;
pub mod outcome;
pub mod price;

pub use analysis::{AnalysisRecord, SignalStatistics, StoredSignal};
pub use outcome::{ClosedOutcome, CloseReason, OpenOutcome, OutcomeClose};
pub use price::PriceRecord;
