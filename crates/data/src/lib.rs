//! Persistence for market sentinel.
//!
//! This crate provides:
//! - `SQLite` database handle with embedded migrations
//! - Record models for analyses, prices, signals and outcomes
//! - Repositories for typed database access
//! - Best-effort parsing of reasoning text into advice fields
//! - CSV export of analysis history

pub mod database;
pub mod export;
pub mod models;
pub mod parser;
pub mod repositories;

// Re-export commonly used types
pub use database::Database;
pub use export::CsvExporter;
pub use parser::ResultParser;

// Re-export models
pub use models::{
    AnalysisRecord, ClosedOutcome, CloseReason, OpenOutcome, OutcomeClose, PriceRecord,
    SignalStatistics, StoredSignal,
};

// Re-export repositories
pub use repositories::{AnalysisRepository, OutcomeRepository, PriceRepository, Repositories};
