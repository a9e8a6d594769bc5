use anyhow::{Context, Result};
use csv::Writer;
use std::fs::File;
use std::path::Path;

use crate::models::AnalysisRecord;

pub struct CsvExporter;

impl CsvExporter {
    /// Writes analysis records to a CSV file, oldest first.
    ///
    /// Format: id,symbol,timestamp,current_price,price_change_pct,has_opportunity,
    /// signal_count,triggered_signals,trend,confidence,support,resistance,stop_loss,
    /// target_price,position_size
    ///
    /// # Errors
    /// Returns error if the file cannot be created or writing fails
    pub fn export(records: &[AnalysisRecord], path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        let mut writer = Writer::from_writer(file);

        writer.write_record([
            "id",
            "symbol",
            "timestamp",
            "current_price",
            "price_change_pct",
            "has_opportunity",
            "signal_count",
            "triggered_signals",
            "trend",
            "confidence",
            "support",
            "resistance",
            "stop_loss",
            "target_price",
            "position_size",
        ])?;

        let mut sorted: Vec<&AnalysisRecord> = records.iter().collect();
        sorted.sort_by_key(|r| (r.timestamp, r.id));

        for record in &sorted {
            writer.write_record(&[
                record.id.to_string(),
                record.symbol.clone(),
                record.timestamp.to_rfc3339(),
                opt(record.current_price),
                opt(record.price_change_pct.map(|p| format!("{p:.2}"))),
                record.has_opportunity.to_string(),
                record.signal_count.to_string(),
                record
                    .triggered_signals
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(";"),
                opt(record.trend),
                opt(record.confidence),
                opt(record.support_level),
                opt(record.resistance_level),
                opt(record.stop_loss),
                opt(record.target_price),
                opt(record.position_size.map(|p| p.as_str())),
            ])?;
        }

        writer.flush()?;
        tracing::info!(path = %path.display(), rows = sorted.len(), "Exported analyses");
        Ok(sorted.len())
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
