use anyhow::Result;
use sqlx::SqlitePool;

use crate::models::price::PriceRow;
use crate::models::PriceRecord;

/// Repository for prices observed at analysis time.
#[derive(Debug, Clone)]
pub struct PriceRepository {
    pool: SqlitePool,
}

impl PriceRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Gets the most recent price records for a symbol, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_recent(&self, symbol: &str, limit: i64) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            r"
            SELECT id, analysis_id, symbol, timestamp, price, volume_24h, funding_rate
            FROM price_records
            WHERE symbol = ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PriceRecord::try_from).collect()
    }
}
