//! Analysis repository.
//!
//! Persists one analysis run together with its signal events, price record
//! and outcome tracker in a single transaction.

use anyhow::Result;
use chrono::{Duration, Utc};
use market_sentinel_core::{AnalysisResult, SignalKind};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::database::to_millis;
use crate::models::analysis::{join_signal_list, AnalysisRow, SignalRow};
use crate::models::{AnalysisRecord, SignalStatistics, StoredSignal};

/// Repository for analysis records and their signal events.
#[derive(Debug, Clone)]
pub struct AnalysisRepository {
    pool: SqlitePool,
}

impl AnalysisRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Saves an analysis result and returns the new record id.
    ///
    /// Signal events are written only when an opportunity was flagged. A
    /// price record is written when a price is known; an outcome tracker is
    /// opened when both hold. Nothing is written if any insert fails.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; it is rolled back.
    pub async fn save_analysis(&self, result: &AnalysisResult) -> Result<i64> {
        let timestamp = to_millis(result.timestamp);
        let triggered = result.triggered_signals();
        let advice = &result.advice;

        let mut tx = self.pool.begin().await?;

        let analysis_id = sqlx::query(
            r"
            INSERT INTO analysis_records
                (symbol, timestamp, current_price, price_change_pct, has_opportunity,
                 detection_bypassed, signal_count, triggered_signals, trend, confidence,
                 support_level, resistance_level, stop_loss, target_price, position_size,
                 analysis_text, reasoned, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ",
        )
        .bind(&result.symbol)
        .bind(timestamp)
        .bind(result.current_price.map(|p| p.to_string()))
        .bind(result.price_change_pct)
        .bind(result.has_opportunity())
        .bind(result.detection.bypassed)
        .bind(i64::try_from(result.signal_count())?)
        .bind(join_signal_list(&triggered))
        .bind(advice.trend.map(|t| t.as_str()))
        .bind(advice.confidence)
        .bind(advice.support.map(|p| p.to_string()))
        .bind(advice.resistance.map(|p| p.to_string()))
        .bind(advice.stop_loss.map(|p| p.to_string()))
        .bind(advice.target.map(|p| p.to_string()))
        .bind(advice.position_size.map(|p| p.as_str()))
        .bind(&result.text)
        .bind(result.reasoned)
        .bind(to_millis(Utc::now()))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if result.has_opportunity() {
            for signal in &result.detection.signals {
                sqlx::query(
                    r"
                    INSERT INTO signal_events
                        (analysis_id, symbol, timestamp, kind, strength, value, description)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                )
                .bind(analysis_id)
                .bind(&result.symbol)
                .bind(timestamp)
                .bind(signal.kind.as_str())
                .bind(signal.strength.as_str())
                .bind(signal.value)
                .bind(&signal.description)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(price) = result.current_price {
            sqlx::query(
                r"
                INSERT INTO price_records
                    (analysis_id, symbol, timestamp, price, volume_24h, funding_rate)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(analysis_id)
            .bind(&result.symbol)
            .bind(timestamp)
            .bind(price.to_string())
            .bind(result.volume_24h)
            .bind(result.funding_rate)
            .execute(&mut *tx)
            .await?;

            if result.has_opportunity() {
                sqlx::query(
                    r"
                    INSERT INTO outcome_trackers (analysis_id, symbol, timestamp, entry_price)
                    VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(analysis_id)
                .bind(&result.symbol)
                .bind(timestamp)
                .bind(price.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        tracing::info!(symbol = %result.symbol, analysis_id, "Analysis saved");
        Ok(analysis_id)
    }

    /// Gets the most recent analyses for a symbol, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_recent(&self, symbol: &str, limit: i64) -> Result<Vec<AnalysisRecord>> {
        let sql = format!(
            "SELECT {} FROM analysis_records WHERE symbol = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
            AnalysisRow::COLUMNS
        );
        let rows = sqlx::query_as::<_, AnalysisRow>(&sql)
            .bind(symbol)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AnalysisRecord::try_from).collect()
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<AnalysisRecord>> {
        let sql = format!("SELECT {} FROM analysis_records WHERE id = ?1", AnalysisRow::COLUMNS);
        let row = sqlx::query_as::<_, AnalysisRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AnalysisRecord::try_from).transpose()
    }

    /// Signal events recorded for one analysis, in canonical kind order.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn signals_for(&self, analysis_id: i64) -> Result<Vec<StoredSignal>> {
        let rows = sqlx::query_as::<_, SignalRow>(
            r"
            SELECT id, analysis_id, symbol, timestamp, kind, strength, value, description
            FROM signal_events
            WHERE analysis_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        let mut signals = rows
            .into_iter()
            .map(StoredSignal::try_from)
            .collect::<Result<Vec<_>>>()?;
        signals.sort_by_key(|s| s.kind);
        Ok(signals)
    }

    /// Aggregates analyses over the last `days`, for one symbol or all of them.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_signal_statistics(
        &self,
        symbol: Option<&str>,
        days: i64,
    ) -> Result<SignalStatistics> {
        let since = to_millis(Utc::now() - Duration::days(days));

        let (total_analyses, opportunity_count, avg_confidence): (i64, i64, Option<f64>) =
            sqlx::query_as(
                r"
                SELECT COUNT(*),
                       COALESCE(SUM(CASE WHEN has_opportunity = 1 THEN 1 ELSE 0 END), 0),
                       AVG(confidence)
                FROM analysis_records
                WHERE (?1 IS NULL OR symbol = ?1) AND timestamp >= ?2
                ",
            )
            .bind(symbol)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        let trend_rows: Vec<(String, i64)> = sqlx::query_as(
            r"
            SELECT trend, COUNT(*)
            FROM analysis_records
            WHERE (?1 IS NULL OR symbol = ?1) AND timestamp >= ?2 AND trend IS NOT NULL
            GROUP BY trend
            ",
        )
        .bind(symbol)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let opportunity_rate = if total_analyses > 0 {
            opportunity_count as f64 / total_analyses as f64
        } else {
            0.0
        };

        Ok(SignalStatistics {
            symbol: symbol.map(str::to_string),
            period_days: days,
            total_analyses,
            opportunity_count,
            opportunity_rate,
            trend_distribution: trend_rows.into_iter().collect::<BTreeMap<_, _>>(),
            avg_confidence,
        })
    }

    /// Counts signal events by kind over the last `days`, most frequent first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn signal_kind_counts(&self, days: i64) -> Result<Vec<(SignalKind, i64)>> {
        let since = to_millis(Utc::now() - Duration::days(days));
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r"
            SELECT kind, COUNT(*) AS n
            FROM signal_events
            WHERE timestamp >= ?1
            GROUP BY kind
            ORDER BY n DESC, kind ASC
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, n)| SignalKind::parse(&kind).ok().map(|k| (k, n)))
            .collect())
    }
}
