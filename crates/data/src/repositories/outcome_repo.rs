//! Outcome tracker repository.
//!
//! Rows are opened by [`AnalysisRepository::save_analysis`](super::AnalysisRepository::save_analysis)
//! and closed here. Closing is guarded on `exit_price IS NULL`, so a row
//! reaches its terminal state at most once.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::to_millis;
use crate::models::outcome::{ClosedOutcomeRow, OpenOutcomeRow};
use crate::models::{ClosedOutcome, OpenOutcome, OutcomeClose};

#[derive(Debug, Clone)]
pub struct OutcomeRepository {
    pool: SqlitePool,
}

impl OutcomeRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open rows for a symbol entered at or after `since`, newest first,
    /// joined with the advised trend, target and stop of their analysis.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn open_with_analysis(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<OpenOutcome>> {
        let rows = sqlx::query_as::<_, OpenOutcomeRow>(
            r"
            SELECT o.id, o.analysis_id, o.symbol, o.entry_price, o.timestamp AS entry_time,
                   a.trend, a.target_price, a.stop_loss
            FROM outcome_trackers o
            JOIN analysis_records a ON o.analysis_id = a.id
            WHERE o.symbol = ?1 AND o.timestamp >= ?2 AND o.exit_price IS NULL
            ORDER BY o.timestamp DESC
            ",
        )
        .bind(symbol)
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OpenOutcome::try_from).collect()
    }

    /// Closes an open row. Returns `false` when the row was already closed
    /// (or does not exist), leaving it untouched.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn close(&self, id: i64, close: &OutcomeClose) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE outcome_trackers
            SET exit_price = ?1,
                exit_timestamp = ?2,
                price_change_pct = ?3,
                hit_target = ?4,
                hit_stop_loss = ?5,
                is_profitable = ?6,
                close_reason = ?7
            WHERE id = ?8 AND exit_price IS NULL
            ",
        )
        .bind(close.exit_price.to_string())
        .bind(to_millis(close.exit_time))
        .bind(close.price_change_pct)
        .bind(close.hit_target)
        .bind(close.hit_stop_loss)
        .bind(close.is_profitable)
        .bind(close.reason.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Closed rows entered at or after `since`, for one symbol or all.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn closed_since(
        &self,
        symbol: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClosedOutcome>> {
        let rows = sqlx::query_as::<_, ClosedOutcomeRow>(
            r"
            SELECT o.id, o.analysis_id, o.symbol, o.entry_price, o.timestamp AS entry_time,
                   o.exit_price, o.exit_timestamp, o.price_change_pct, o.hit_target,
                   o.hit_stop_loss, o.is_profitable, o.close_reason, a.trend
            FROM outcome_trackers o
            JOIN analysis_records a ON o.analysis_id = a.id
            WHERE (?1 IS NULL OR o.symbol = ?1) AND o.timestamp >= ?2
              AND o.exit_price IS NOT NULL
            ORDER BY o.timestamp DESC
            ",
        )
        .bind(symbol)
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ClosedOutcome::try_from).collect()
    }

    /// Rows (open or closed) entered at or after `since`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn count_since(&self, symbol: Option<&str>, since: DateTime<Utc>) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM outcome_trackers WHERE (?1 IS NULL OR symbol = ?1) AND timestamp >= ?2",
        )
        .bind(symbol)
        .bind(to_millis(since))
        .fetch_one(&self.pool)
        .await?;

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::CloseReason;
    use crate::repositories::AnalysisRepository;
    use chrono::Duration;
    use market_sentinel_core::{
        AnalysisResult, Detection, ParsedAdvice, SignalEvent, SignalKind, SignalStrength, Trend,
    };
    use rust_decimal_macros::dec;

    async fn seed(db: &Database, symbol: &str, entered: DateTime<Utc>) -> i64 {
        let repo = AnalysisRepository::new(db.pool().clone());
        let result = AnalysisResult {
            symbol: symbol.to_string(),
            timestamp: entered,
            current_price: Some(dec!(100)),
            price_change_pct: Some(6.0),
            volume_24h: None,
            funding_rate: Some(0.0012),
            detection: Detection {
                has_opportunity: true,
                signals: [SignalEvent::new(
                    SignalKind::PriceSurge,
                    SignalStrength::Strong,
                    6.0,
                    "surge",
                )]
                .into_iter()
                .collect(),
                bypassed: false,
            },
            advice: ParsedAdvice {
                trend: Some(Trend::Bullish),
                target: Some(dec!(110)),
                stop_loss: Some(dec!(95)),
                ..ParsedAdvice::default()
            },
            text: "analysis".to_string(),
            reasoned: true,
        };
        repo.save_analysis(&result).await.unwrap()
    }

    fn close_at(price: rust_decimal::Decimal) -> OutcomeClose {
        OutcomeClose {
            exit_price: price,
            exit_time: Utc::now(),
            price_change_pct: 11.0,
            hit_target: true,
            hit_stop_loss: false,
            is_profitable: true,
            reason: CloseReason::TargetHit,
        }
    }

    #[tokio::test]
    async fn test_open_rows_joined_with_advice() {
        let db = Database::in_memory().await.unwrap();
        let analysis_id = seed(&db, "BTCUSDT", Utc::now()).await;
        let repo = OutcomeRepository::new(db.pool().clone());

        let open = repo
            .open_with_analysis("BTCUSDT", Utc::now() - Duration::hours(48))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].analysis_id, analysis_id);
        assert_eq!(open[0].entry_price, dec!(100));
        assert_eq!(open[0].trend, Some(Trend::Bullish));
        assert_eq!(open[0].target_price, Some(dec!(110)));
        assert_eq!(open[0].stop_loss, Some(dec!(95)));
    }

    #[tokio::test]
    async fn test_lookback_excludes_old_rows() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, "BTCUSDT", Utc::now() - Duration::hours(72)).await;
        let repo = OutcomeRepository::new(db.pool().clone());

        let open = repo
            .open_with_analysis("BTCUSDT", Utc::now() - Duration::hours(48))
            .await
            .unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, "BTCUSDT", Utc::now()).await;
        let repo = OutcomeRepository::new(db.pool().clone());
        let since = Utc::now() - Duration::hours(48);
        let id = repo.open_with_analysis("BTCUSDT", since).await.unwrap()[0].id;

        assert!(repo.close(id, &close_at(dec!(111))).await.unwrap());

        let mut second = close_at(dec!(90));
        second.is_profitable = false;
        assert!(!repo.close(id, &second).await.unwrap());

        let closed = repo.closed_since(Some("BTCUSDT"), since).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_price, dec!(111));
        assert!(closed[0].is_profitable);
        assert_eq!(closed[0].reason, Some(CloseReason::TargetHit));
        assert!(repo.open_with_analysis("BTCUSDT", since).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counts_include_open_rows() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, "BTCUSDT", Utc::now()).await;
        seed(&db, "BTCUSDT", Utc::now()).await;
        seed(&db, "ETHUSDT", Utc::now()).await;
        let repo = OutcomeRepository::new(db.pool().clone());
        let since = Utc::now() - Duration::days(30);

        assert_eq!(repo.count_since(Some("BTCUSDT"), since).await.unwrap(), 2);
        assert_eq!(repo.count_since(None, since).await.unwrap(), 3);
        assert!(repo.closed_since(None, since).await.unwrap().is_empty());
    }
}
