//! One analysis run: collect, detect, gate, reason.
//!
//! The four collectors run concurrently and are joined before anything else
//! happens. The detector runs once over whatever was collected. The reasoner
//! is only reached when the detector opens the gate. Every stage records its
//! failures in [`RunState::errors`]; [`Workflow::run`] itself never fails.

use chrono::{DateTime, Utc};
use market_sentinel_core::{
    AnalysisResult, Detection, FactorKind, FactorSnapshot, FundingSnapshot,
    MarketPressureSnapshot, ParsedAdvice, PipelineError, PriceVolumeSnapshot, Reasoner,
    SentimentSnapshot,
};
use market_sentinel_data::ResultParser;
use market_sentinel_signals::{CollectorSet, MarketBriefFormatter, SignalDetector};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Payload stored in place of reasoning text when the gate stays closed.
pub const NO_ANALYSIS_TEXT: &str = "No significant market signals detected; analysis skipped.";

/// Everything one run reached, including its failures.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub funding: Option<FundingSnapshot>,
    pub price_volume: Option<PriceVolumeSnapshot>,
    pub market_pressure: Option<MarketPressureSnapshot>,
    pub sentiment: Option<SentimentSnapshot>,
    pub detection: Option<Detection>,
    /// Market brief handed to the reasoner.
    pub formatted: Option<String>,
    pub analysis: Option<AnalysisResult>,
    /// Grows monotonically over the run.
    pub errors: Vec<String>,
}

impl RunState {
    fn new(symbol: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            started_at: Utc::now(),
            funding: None,
            price_volume: None,
            market_pressure: None,
            sentiment: None,
            detection: None,
            formatted: None,
            analysis: None,
            errors: Vec::new(),
        }
    }

    /// True when the run produced a result, real or synthetic.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.analysis.is_some()
    }

    /// Collected snapshots in factor order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<FactorSnapshot> {
        let mut out = Vec::with_capacity(4);
        if let Some(s) = &self.funding {
            out.push(FactorSnapshot::Funding(s.clone()));
        }
        if let Some(s) = &self.price_volume {
            out.push(FactorSnapshot::PriceVolume(s.clone()));
        }
        if let Some(s) = &self.market_pressure {
            out.push(FactorSnapshot::MarketPressure(s.clone()));
        }
        if let Some(s) = &self.sentiment {
            out.push(FactorSnapshot::Sentiment(s.clone()));
        }
        out
    }

    fn record(&mut self, err: &PipelineError) {
        self.errors.push(err.to_string());
    }

    fn store(&mut self, snapshot: FactorSnapshot) {
        match snapshot {
            FactorSnapshot::Funding(s) => self.funding = Some(s),
            FactorSnapshot::PriceVolume(s) => self.price_volume = Some(s),
            FactorSnapshot::MarketPressure(s) => self.market_pressure = Some(s),
            FactorSnapshot::Sentiment(s) => self.sentiment = Some(s),
        }
    }
}

/// The fixed-shape analysis pipeline.
pub struct Workflow {
    collectors: CollectorSet,
    detector: SignalDetector,
    formatter: MarketBriefFormatter,
    reasoner: Arc<dyn Reasoner>,
    parser: ResultParser,
}

impl Workflow {
    #[must_use]
    pub fn new(
        collectors: CollectorSet,
        detector: SignalDetector,
        reasoner: Arc<dyn Reasoner>,
        parser: ResultParser,
    ) -> Self {
        Self {
            collectors,
            detector,
            formatter: MarketBriefFormatter::new(),
            reasoner,
            parser,
        }
    }

    #[must_use]
    pub fn detector(&self) -> &SignalDetector {
        &self.detector
    }

    /// Runs the pipeline for one symbol and returns the state it reached.
    pub async fn run(&self, symbol: &str) -> RunState {
        let mut state = RunState::new(symbol);
        info!(symbol, run_id = %state.run_id, "Starting analysis run");

        if !self.collect(&mut state).await {
            warn!(
                symbol,
                run_id = %state.run_id,
                errors = state.errors.len(),
                "Load-bearing factor missing, run aborted"
            );
            return state;
        }

        let snapshots = state.snapshots();
        let (detection, detect_err) = self.detector.detect_or_open(&snapshots);
        if let Some(e) = detect_err {
            state.record(&e);
        }
        info!(
            symbol,
            signals = detection.signal_count(),
            has_opportunity = detection.has_opportunity,
            bypassed = detection.bypassed,
            "Detection complete"
        );

        let (text, advice, reasoned) = if detection.has_opportunity {
            match self.reason(&mut state, &snapshots, &detection).await {
                Some(text) => {
                    let advice = self.parser.parse(&text);
                    (text, advice, true)
                }
                None => {
                    state.detection = Some(detection);
                    return state;
                }
            }
        } else {
            let text = format!("{NO_ANALYSIS_TEXT}\n\n{}", self.detector.summary(&detection));
            (text, ParsedAdvice::default(), false)
        };

        let price = state.price_volume.as_ref().filter(|s| s.available);
        let funding = state.funding.as_ref().filter(|s| s.available);

        state.analysis = Some(AnalysisResult {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            current_price: price.map(|s| s.current_price),
            price_change_pct: price.map(|s| s.price_change_pct),
            volume_24h: price.map(|s| s.total_volume),
            funding_rate: funding.map(|s| s.current_rate),
            detection: detection.clone(),
            advice,
            text,
            reasoned,
        });
        state.detection = Some(detection);

        info!(symbol, run_id = %state.run_id, reasoned, "Analysis run complete");
        state
    }

    /// Fans out to all four collectors and waits for every one of them.
    /// Returns `false` when a load-bearing factor could not be collected.
    async fn collect(&self, state: &mut RunState) -> bool {
        let symbol = state.symbol.clone();
        let set = &self.collectors;

        let (funding, price_volume, market_pressure, sentiment) = tokio::join!(
            set.funding.collect(&symbol),
            set.price_volume.collect(&symbol),
            set.market_pressure.collect(&symbol),
            set.sentiment.collect(&symbol),
        );

        let mut complete = true;
        for (kind, outcome) in [
            (set.funding.kind(), funding),
            (set.price_volume.kind(), price_volume),
            (set.market_pressure.kind(), market_pressure),
            (set.sentiment.kind(), sentiment),
        ] {
            match outcome {
                Ok(snapshot) => {
                    if !snapshot.is_available() {
                        debug!(symbol = %symbol, factor = %kind, "Using degraded snapshot");
                        state.record(&PipelineError::collection(kind, snapshot.signal()));
                    }
                    state.store(snapshot);
                }
                Err(e) => {
                    error!(symbol = %symbol, factor = %kind, "Collection failed: {}", e);
                    state.record(&e);
                    if kind.is_load_bearing() {
                        complete = false;
                    } else {
                        state.store(FactorSnapshot::degraded(kind, &symbol, Utc::now()));
                    }
                }
            }
        }

        complete && state.funding.is_some() && state.price_volume.is_some()
    }

    async fn reason(
        &self,
        state: &mut RunState,
        snapshots: &[FactorSnapshot],
        detection: &Detection,
    ) -> Option<String> {
        let brief = match self.formatter.format_with_signals(snapshots, detection) {
            Ok(brief) => brief,
            Err(e) => {
                error!(symbol = %state.symbol, "Formatting failed: {}", e);
                state.record(&e);
                return None;
            }
        };
        state.formatted = Some(brief.clone());

        info!(symbol = %state.symbol, reasoner = self.reasoner.name(), "Invoking reasoner");
        match self.reasoner.reason(&brief).await {
            Ok(text) => Some(text),
            Err(e) => {
                let err = PipelineError::ReasoningFailed(format!("{e:#}"));
                error!(symbol = %state.symbol, "{}", err);
                state.record(&err);
                None
            }
        }
    }
}

/// Factor kinds a run could not collect live.
#[must_use]
pub fn missing_factors(state: &RunState) -> Vec<FactorKind> {
    let mut missing = Vec::new();
    if !state.funding.as_ref().is_some_and(|s| s.available) {
        missing.push(FactorKind::Funding);
    }
    if !state.price_volume.as_ref().is_some_and(|s| s.available) {
        missing.push(FactorKind::PriceVolume);
    }
    if !state.market_pressure.as_ref().is_some_and(|s| s.available) {
        missing.push(FactorKind::MarketPressure);
    }
    if !state.sentiment.as_ref().is_some_and(|s| s.available) {
        missing.push(FactorKind::Sentiment);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use market_sentinel_core::{
        DetectorConfig, FundingTrend, PriceTrend, SignalKind, Trend, VolumeTrend,
    };
    use market_sentinel_signals::Collector;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeCollector {
        kind: FactorKind,
        snapshot: Option<FactorSnapshot>,
        delay: Duration,
    }

    impl FakeCollector {
        fn ok(snapshot: FactorSnapshot) -> Arc<dyn Collector> {
            Arc::new(Self {
                kind: snapshot.kind(),
                snapshot: Some(snapshot),
                delay: Duration::ZERO,
            })
        }

        fn failing(kind: FactorKind) -> Arc<dyn Collector> {
            Arc::new(Self {
                kind,
                snapshot: None,
                delay: Duration::ZERO,
            })
        }

        fn slow(snapshot: FactorSnapshot, delay: Duration) -> Arc<dyn Collector> {
            Arc::new(Self {
                kind: snapshot.kind(),
                snapshot: Some(snapshot),
                delay,
            })
        }
    }

    #[async_trait]
    impl Collector for FakeCollector {
        fn kind(&self) -> FactorKind {
            self.kind
        }

        async fn collect(&self, _symbol: &str) -> Result<FactorSnapshot, PipelineError> {
            tokio::time::sleep(self.delay).await;
            self.snapshot
                .clone()
                .ok_or_else(|| PipelineError::collection(self.kind, "retries exhausted"))
        }
    }

    struct FakeReasoner {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeReasoner {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Reasoner for FakeReasoner {
        async fn reason(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| anyhow!("upstream timeout"))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn funding(rate: f64, trend: FundingTrend) -> FactorSnapshot {
        FactorSnapshot::Funding(FundingSnapshot {
            symbol: "BTCUSDT".to_string(),
            captured_at: Utc::now(),
            current_rate: rate,
            avg_rate: rate,
            max_rate: rate,
            min_rate: rate,
            is_extreme: rate.abs() > 0.001,
            trend,
            signal: "funding note".to_string(),
            available: true,
        })
    }

    fn price_volume(pct: f64) -> FactorSnapshot {
        FactorSnapshot::PriceVolume(PriceVolumeSnapshot {
            symbol: "BTCUSDT".to_string(),
            captured_at: Utc::now(),
            current_price: dec!(65000),
            high_price: dec!(65500),
            low_price: dec!(61000),
            price_change: dec!(3000),
            price_change_pct: pct,
            price_trend: PriceTrend::Up,
            avg_volume: 1_000.0,
            current_volume: 1_000.0,
            total_volume: 24_000.0,
            volume_trend: VolumeTrend::Contracting,
            support: dec!(61000),
            resistance: dec!(65500),
            signal: "volume note".to_string(),
            available: true,
        })
    }

    fn degraded(kind: FactorKind) -> FactorSnapshot {
        FactorSnapshot::degraded(kind, "BTCUSDT", Utc::now())
    }

    fn collectors(funding: Arc<dyn Collector>, price: Arc<dyn Collector>) -> CollectorSet {
        CollectorSet {
            funding,
            price_volume: price,
            market_pressure: FakeCollector::ok(degraded(FactorKind::MarketPressure)),
            sentiment: FakeCollector::ok(degraded(FactorKind::Sentiment)),
        }
    }

    fn workflow(set: CollectorSet, reasoner: Arc<FakeReasoner>) -> Workflow {
        Workflow::new(
            set,
            SignalDetector::new(DetectorConfig::default()),
            reasoner,
            ResultParser::new().unwrap(),
        )
    }

    const REPLY: &str = "Market trend: bullish\nConfidence: 70%\nTarget: $70,000\nStop-loss: $62,000";

    // ========== Gate Tests ==========

    #[tokio::test]
    async fn test_open_gate_calls_reasoner_once() {
        let reasoner = FakeReasoner::replying(REPLY);
        let wf = workflow(
            collectors(
                FakeCollector::ok(funding(0.0012, FundingTrend::Rising)),
                FakeCollector::ok(price_volume(6.0)),
            ),
            reasoner.clone(),
        );

        let state = wf.run("BTCUSDT").await;

        assert_eq!(reasoner.calls(), 1);
        assert!(state.formatted.as_deref().is_some_and(|b| b.contains("[Triggered Signals]")));
        let analysis = state.analysis.expect("analysis produced");
        assert!(analysis.reasoned);
        assert!(analysis.has_opportunity());
        assert!(analysis.detection.signals.contains(SignalKind::FundingExtremeLong));
        assert!(analysis.detection.signals.contains(SignalKind::PriceSurge));
        assert_eq!(analysis.advice.trend, Some(Trend::Bullish));
        assert_eq!(analysis.advice.target, Some(dec!(70000)));
        assert_eq!(analysis.current_price, Some(dec!(65000)));
        assert_eq!(analysis.volume_24h, Some(24_000.0));
        assert_eq!(analysis.funding_rate, Some(0.0012));
    }

    #[tokio::test]
    async fn test_closed_gate_skips_reasoner() {
        let reasoner = FakeReasoner::replying(REPLY);
        let wf = workflow(
            collectors(
                FakeCollector::ok(funding(0.0001, FundingTrend::Flat)),
                FakeCollector::ok(price_volume(1.0)),
            ),
            reasoner.clone(),
        );

        let state = wf.run("BTCUSDT").await;

        assert_eq!(reasoner.calls(), 0);
        assert!(state.formatted.is_none());
        let analysis = state.analysis.expect("synthetic result");
        assert!(!analysis.reasoned);
        assert!(!analysis.has_opportunity());
        assert!(analysis.text.starts_with(NO_ANALYSIS_TEXT));
        assert_eq!(analysis.advice, ParsedAdvice::default());
    }

    #[tokio::test]
    async fn test_disabled_detector_always_reasons() {
        let reasoner = FakeReasoner::replying(REPLY);
        let config = DetectorConfig {
            enabled: false,
            ..DetectorConfig::default()
        };
        let wf = Workflow::new(
            collectors(
                FakeCollector::ok(funding(0.0001, FundingTrend::Flat)),
                FakeCollector::ok(price_volume(1.0)),
            ),
            SignalDetector::new(config),
            reasoner.clone(),
            ResultParser::new().unwrap(),
        );

        let state = wf.run("BTCUSDT").await;
        assert_eq!(reasoner.calls(), 1);
        assert!(state.detection.is_some_and(|d| d.bypassed));
    }

    // ========== Failure Tests ==========

    #[tokio::test]
    async fn test_load_bearing_failure_aborts_before_detection() {
        let reasoner = FakeReasoner::replying(REPLY);
        let wf = workflow(
            collectors(
                FakeCollector::failing(FactorKind::Funding),
                FakeCollector::ok(price_volume(6.0)),
            ),
            reasoner.clone(),
        );

        let state = wf.run("BTCUSDT").await;

        assert!(!state.succeeded());
        assert!(state.detection.is_none());
        assert_eq!(reasoner.calls(), 0);
        assert!(state.errors.iter().any(|e| e.contains("funding_rate")));
        assert!(state.price_volume.is_some());
    }

    #[tokio::test]
    async fn test_optional_failure_is_absorbed() {
        let reasoner = FakeReasoner::replying(REPLY);
        let mut set = collectors(
            FakeCollector::ok(funding(0.0012, FundingTrend::Rising)),
            FakeCollector::ok(price_volume(6.0)),
        );
        set.sentiment = FakeCollector::failing(FactorKind::Sentiment);
        let wf = workflow(set, reasoner);

        let state = wf.run("BTCUSDT").await;

        assert!(state.succeeded());
        assert!(state.sentiment.as_ref().is_some_and(|s| !s.available));
        assert!(state.errors.iter().any(|e| e.contains("sentiment")));
        assert_eq!(
            missing_factors(&state),
            vec![FactorKind::MarketPressure, FactorKind::Sentiment]
        );
    }

    #[tokio::test]
    async fn test_reasoner_failure_yields_no_result() {
        let reasoner = FakeReasoner::failing();
        let wf = workflow(
            collectors(
                FakeCollector::ok(funding(0.0012, FundingTrend::Rising)),
                FakeCollector::ok(price_volume(6.0)),
            ),
            reasoner.clone(),
        );

        let state = wf.run("BTCUSDT").await;

        assert_eq!(reasoner.calls(), 1);
        assert!(state.analysis.is_none());
        assert!(state.detection.is_some());
        assert!(state.errors.iter().any(|e| e.starts_with("reasoning failed")));
    }

    // ========== Concurrency Tests ==========

    #[tokio::test(start_paused = true)]
    async fn test_collectors_run_concurrently() {
        let delay = Duration::from_secs(1);
        let set = CollectorSet {
            funding: FakeCollector::slow(funding(0.0001, FundingTrend::Flat), delay),
            price_volume: FakeCollector::slow(price_volume(1.0), delay),
            market_pressure: FakeCollector::slow(degraded(FactorKind::MarketPressure), delay),
            sentiment: FakeCollector::slow(degraded(FactorKind::Sentiment), delay),
        };
        let wf = workflow(set, FakeReasoner::replying(REPLY));

        let start = tokio::time::Instant::now();
        let state = wf.run("BTCUSDT").await;

        assert!(state.succeeded());
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
