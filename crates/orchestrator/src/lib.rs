//! Analysis orchestration for market sentinel.
//!
//! - [`Workflow`] runs one collect, detect, gate, reason pass
//! - [`LlmReasoner`] is the reasoning client behind the gate
//! - [`CompositeAlerter`] fans alerts out to console and webhook
//! - [`AccuracyTracker`] closes outcome rows and reports accuracy
//! - [`Monitor`] ties the workflow to storage and alerting

pub mod alert;
pub mod monitor;
pub mod reasoner;
pub mod tracker;
pub mod workflow;

pub use alert::{CompositeAlerter, ConsoleAlerter, WebhookAlerter};
pub use monitor::{CycleOutcome, Monitor};
pub use reasoner::LlmReasoner;
pub use tracker::{evaluate, AccuracyReport, AccuracyTracker, Evaluation, TrackerUpdate, TrendStats};
pub use workflow::{missing_factors, RunState, Workflow, NO_ANALYSIS_TEXT};
