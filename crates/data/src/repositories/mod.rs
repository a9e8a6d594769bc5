//! Database repositories for market sentinel.
//!
//! Each repository provides typed access to one table family over a shared
//! `SQLite` pool.

pub mod analysis_repo;
pub mod outcome_repo;
pub mod price_repo;

pub use analysis_repo::AnalysisRepository;
pub use outcome_repo::OutcomeRepository;
pub use price_repo::PriceRepository;

use sqlx::SqlitePool;

/// Creates all repositories from a single database pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub analyses: AnalysisRepository,
    pub prices: PriceRepository,
    pub outcomes: OutcomeRepository,
}

impl Repositories {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            analyses: AnalysisRepository::new(pool.clone()),
            prices: PriceRepository::new(pool.clone()),
            outcomes: OutcomeRepository::new(pool),
        }
    }
}
