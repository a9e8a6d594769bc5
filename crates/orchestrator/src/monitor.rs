//! Monitor facade: workflow, then persistence, then alerting.

use anyhow::{bail, Result};
use chrono::Utc;
use market_sentinel_core::{
    Alerter, AnalysisResult, AppConfig, FactorKind, PipelineError, PriceSource, Reasoner,
};
use market_sentinel_data::{Database, Repositories, ResultParser};
use market_sentinel_signals::{CollectorSet, MarketDataClient, SignalDetector};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::alert::CompositeAlerter;
use crate::reasoner::LlmReasoner;
use crate::tracker::{AccuracyReport, AccuracyTracker, TrackerUpdate};
use crate::workflow::{missing_factors, RunState, Workflow};

/// What one symbol's analysis cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub result: AnalysisResult,
    /// Id of the stored record; `None` when persistence failed.
    pub analysis_id: Option<i64>,
    /// Factors that were degraded rather than collected live.
    pub missing: Vec<FactorKind>,
    pub errors: Vec<String>,
}

pub struct Monitor {
    config: Arc<AppConfig>,
    workflow: Workflow,
    repos: Repositories,
    alerter: Arc<dyn Alerter>,
    tracker: AccuracyTracker,
}

impl Monitor {
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        workflow: Workflow,
        database: &Database,
        alerter: Arc<dyn Alerter>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        let repos = database.repositories();
        let tracker = AccuracyTracker::new(repos.outcomes.clone(), prices, &config.scheduler);
        Self {
            config,
            workflow,
            repos,
            alerter,
            tracker,
        }
    }

    /// Wires the live collaborators from configuration.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or an HTTP client
    /// cannot be built.
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self> {
        let database =
            Database::connect(&config.database.url, config.database.max_connections).await?;

        let client = Arc::new(MarketDataClient::new(&config.collector)?);
        let collectors = CollectorSet::with_client(&config, client.clone())?;
        let reasoner: Arc<dyn Reasoner> = Arc::new(LlmReasoner::new(&config.reasoner)?);
        let workflow = Workflow::new(
            collectors,
            SignalDetector::new(config.detector.clone()),
            reasoner,
            ResultParser::new()?,
        );
        let alerter = Arc::new(CompositeAlerter::from_config(&config.alert)?);

        Ok(Self::new(config, workflow, &database, alerter, client))
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    #[must_use]
    pub fn tracker(&self) -> &AccuracyTracker {
        &self.tracker
    }

    /// Runs one analysis cycle for a symbol.
    ///
    /// Returns `Ok(None)` when the run produced no result. Persistence and
    /// alert failures are logged and recorded in the outcome's error list.
    ///
    /// # Errors
    /// Stage failures never surface here; they are logged instead.
    pub async fn analyze_symbol(&self, symbol: &str) -> Result<Option<CycleOutcome>> {
        let state = self.workflow.run(symbol).await;
        let missing = missing_factors(&state);
        let RunState {
            run_id,
            analysis,
            mut errors,
            ..
        } = state;

        let Some(result) = analysis else {
            error!(symbol, %run_id, errors = ?errors, "Analysis produced no result");
            return Ok(None);
        };

        let analysis_id = match self.repos.analyses.save_analysis(&result).await {
            Ok(id) => Some(id),
            Err(e) => {
                let err = PipelineError::PersistenceFailed(format!("{e:#}"));
                error!(symbol, %run_id, "{}", err);
                errors.push(err.to_string());
                None
            }
        };

        info!(
            symbol,
            %run_id,
            analysis_id = ?analysis_id,
            opportunity = result.has_opportunity(),
            signals = result.signal_count(),
            missing = ?missing,
            trend = result.advice.trend.map_or("n/a", |t| t.as_str()),
            "{}",
            self.workflow.detector().summary(&result.detection)
        );

        if result.has_opportunity() {
            if let Err(e) = self.alerter.send(symbol, &result, &result.text).await {
                let err = PipelineError::AlertFailed(format!("{e:#}"));
                warn!(symbol, "{}", err);
                errors.push(err.to_string());
            }
        }

        Ok(Some(CycleOutcome {
            result,
            analysis_id,
            missing,
            errors,
        }))
    }

    /// Analyses every configured symbol in turn.
    ///
    /// # Errors
    /// Returns an error naming the symbols that produced no result.
    pub async fn analyze_all(&self) -> Result<Vec<CycleOutcome>> {
        let mut outcomes = Vec::with_capacity(self.config.symbols.len());
        let mut failed = Vec::new();

        for symbol in &self.config.symbols {
            match self.analyze_symbol(symbol).await? {
                Some(outcome) => outcomes.push(outcome),
                None => failed.push(symbol.as_str()),
            }
        }

        if !failed.is_empty() {
            bail!("analysis produced no result for: {}", failed.join(", "));
        }
        Ok(outcomes)
    }

    /// Tracks open outcomes for one symbol.
    ///
    /// # Errors
    /// Returns an error if the store or the price source fails.
    pub async fn update_outcomes(&self, symbol: &str) -> Result<TrackerUpdate> {
        self.tracker.update(symbol, Utc::now()).await
    }

    /// Tracks open outcomes entered within the last `hours`.
    ///
    /// # Errors
    /// Returns an error if the store or the price source fails.
    pub async fn update_outcomes_within(&self, symbol: &str, hours: i64) -> Result<TrackerUpdate> {
        self.tracker
            .update_within(symbol, Utc::now(), chrono::Duration::hours(hours))
            .await
    }

    /// Tracks every configured symbol, continuing past failures.
    ///
    /// # Errors
    /// Returns an error naming the symbols that could not be tracked.
    pub async fn update_all_outcomes(&self) -> Result<TrackerUpdate> {
        let mut total = TrackerUpdate::default();
        let mut failed = Vec::new();

        for symbol in &self.config.symbols {
            match self.update_outcomes(symbol).await {
                Ok(update) => {
                    total.evaluated += update.evaluated;
                    total.closed += update.closed;
                }
                Err(e) => {
                    error!(symbol = %symbol, "Outcome tracking failed: {:#}", e);
                    failed.push(symbol.as_str());
                }
            }
        }

        if !failed.is_empty() {
            bail!("outcome tracking failed for: {}", failed.join(", "));
        }
        Ok(total)
    }

    /// Accuracy over the configured report window.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub async fn accuracy_report(&self, symbol: Option<&str>, days: i64) -> Result<AccuracyReport> {
        self.tracker.report(symbol, days, Utc::now()).await
    }

    /// Sends the accuracy report through the alerter.
    ///
    /// # Errors
    /// Returns an error if the report cannot be built.
    pub async fn send_daily_report(&self) -> Result<()> {
        let report = self
            .accuracy_report(None, self.config.report.accuracy_window_days)
            .await?;
        if let Err(e) = self.alerter.send_text("Daily accuracy report", &report.render()).await {
            warn!("{}", PipelineError::AlertFailed(format!("{e:#}")));
        }
        Ok(())
    }
}
