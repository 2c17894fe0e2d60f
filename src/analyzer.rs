//! Score combiner.
//!
//! Fans out to all five engines concurrently, merges their findings, and
//! aggregates the weighted score under partial availability. Eligibility
//! (which engines participate) is kept separate from the arithmetic so
//! both are unit-testable on their own.

use crate::behavior_store::BehaviorStore;
use crate::config::{AnalyzerConfig, PatternConfig, ScoringWeights};
use crate::engines::behavior::{
    apply_interaction, apply_trust_confirmation, AuthSnapshot, BehaviorEngine, BehaviorRecord,
    Disposition, TrustedRecord,
};
use crate::engines::headers::HeaderEngine;
use crate::engines::ml::MlEngine;
use crate::engines::reputation::ReputationEngine;
use crate::engines::rules::RuleEngine;
use crate::engines::{EngineResult, Finding};
use crate::text_utils::extract_address;
use crate::threat_intel::ThreatIntelCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const LOW_THRESHOLD: f64 = 35.0;
const HIGH_THRESHOLD: f64 = 60.0;

/// The email-shaped input to one analysis call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailInput {
    pub from: String,
    pub subject: String,
    pub body: String,
    pub headers: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Canonical thresholds: Low < 35, Medium < 60, High >= 60.
    pub fn from_score(score: f64) -> Self {
        if score < LOW_THRESHOLD {
            RiskLevel::Low
        } else if score < HIGH_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Likely Safe",
            RiskLevel::Medium => "Suspicious",
            RiskLevel::High => "Phishing",
        }
    }
}

/// One engine's contribution to the weighted average.
#[derive(Debug, Clone)]
pub struct WeightedScore {
    pub name: &'static str,
    pub score: f64,
    pub weight: f64,
    pub active: bool,
}

/// Eligibility predicate: an engine participates only when it has a
/// positive configured weight and its precondition holds.
pub fn engine_active(weight: f64, precondition: bool) -> bool {
    weight > 0.0 && precondition
}

/// Pure aggregation over the active contributions, guarded against an
/// empty active set.
pub fn weighted_average(parts: &[WeightedScore]) -> f64 {
    let total_weight: f64 = parts.iter().filter(|p| p.active).map(|p| p.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    parts
        .iter()
        .filter(|p| p.active)
        .map(|p| p.score * p.weight)
        .sum::<f64>()
        / total_weight
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineBreakdown {
    pub score: f64,
    /// The engine's share of total active weight for this call, 0-100.
    pub percentage: f64,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub score: f64,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub findings: Vec<Finding>,
    pub breakdown: BTreeMap<String, EngineBreakdown>,
    pub processing_time_ms: u64,
}

const STATE_UNINITIALIZED: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;

/// Orchestrates the five engines and merges their results into one
/// verdict. All engine failures surface as findings, never as errors.
pub struct PhishingAnalyzer {
    config: AnalyzerConfig,
    patterns: Arc<PatternConfig>,
    rules: RuleEngine,
    headers: HeaderEngine,
    reputation: ReputationEngine,
    behavior: BehaviorEngine,
    ml: MlEngine,
    intel: ThreatIntelCache,
    store: Arc<dyn BehaviorStore>,
    state: AtomicU8,
}

impl PhishingAnalyzer {
    pub fn new(
        patterns: PatternConfig,
        store: Arc<dyn BehaviorStore>,
        config: AnalyzerConfig,
    ) -> Self {
        let patterns = Arc::new(patterns);
        Self {
            rules: RuleEngine::new(Arc::clone(&patterns)),
            headers: HeaderEngine::new(),
            reputation: ReputationEngine::new(Arc::clone(&patterns)),
            behavior: BehaviorEngine::new(Arc::clone(&store)),
            ml: MlEngine::new(Arc::clone(&patterns), config.ml.clone()),
            intel: ThreatIntelCache::new(patterns.threat_intel_sources.clone()),
            patterns,
            store,
            config,
            state: AtomicU8::new(STATE_UNINITIALIZED),
        }
    }

    /// One-time warm-up: trains/loads the ML model and populates the
    /// threat-intel cache. `analyze` calls made before this resolves
    /// treat the ML engine as inactive.
    pub async fn initialize(&self) {
        self.state.store(STATE_INITIALIZING, Ordering::SeqCst);
        if self.config.enable_ml {
            self.ml.initialize().await;
        }
        self.intel.get().await;
        self.state.store(STATE_READY, Ordering::SeqCst);
        log::debug!("analyzer initialized");
    }

    fn is_ready(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_READY
    }

    pub async fn analyze(&self, input: &EmailInput) -> AnalysisResult {
        let start = Instant::now();
        let intel = self.intel.get().await;
        let now = unix_now();

        let header_text = input.headers.as_deref().unwrap_or("");
        let headers_supplied = !header_text.trim().is_empty();
        let ml_eligible = self.is_ready() && self.config.enable_ml && self.ml.is_ready();

        let (rules_res, headers_res, reputation_res, behavior_out, ml_res) = tokio::join!(
            async { self.rules.analyze(&input.subject, &input.body, &input.from) },
            async { self.headers.analyze(header_text) },
            async {
                self.reputation
                    .analyze(&input.subject, &input.body, &input.from, &intel)
            },
            async {
                self.behavior
                    .analyze(&input.from, input.user_id.as_deref(), now)
            },
            async {
                if ml_eligible {
                    self.ml
                        .analyze(&input.subject, &input.body, &input.from)
                        .await
                } else {
                    EngineResult::empty()
                }
            },
        );

        let w: &ScoringWeights = &self.patterns.scoring_weights;
        let parts = [
            WeightedScore {
                name: "heuristics",
                score: rules_res.score,
                weight: w.heuristics,
                active: engine_active(w.heuristics, true),
            },
            WeightedScore {
                name: "headers",
                score: headers_res.score,
                weight: w.headers,
                active: engine_active(w.headers, headers_supplied),
            },
            WeightedScore {
                name: "reputation",
                score: reputation_res.score,
                weight: w.reputation,
                active: engine_active(w.reputation, true),
            },
            WeightedScore {
                name: "behavior",
                score: behavior_out.score,
                weight: w.behavior,
                active: engine_active(w.behavior, true),
            },
            WeightedScore {
                name: "ml",
                score: ml_res.score,
                weight: w.ml,
                active: engine_active(w.ml, ml_eligible),
            },
        ];

        let multiplier = self.config.sensitivity.multiplier();
        let mut combined = weighted_average(&parts) * multiplier;

        // Sender trust reduces the composite after weighting, floored at
        // zero so the result never goes negative.
        let behavior_active = parts[3].active;
        if behavior_active && behavior_out.bonus > 0.0 {
            combined -= behavior_out.bonus * w.behavior * multiplier;
        }
        let score = combined.clamp(0.0, 100.0);

        // Engine order fixes the findings order: rules, headers,
        // reputation, behavior risk, behavior bonus, ml.
        let mut findings = Vec::new();
        findings.extend(rules_res.findings.iter().cloned());
        findings.extend(headers_res.findings.iter().cloned());
        findings.extend(reputation_res.findings.iter().cloned());
        findings.extend(behavior_out.findings.iter().cloned());
        findings.extend(behavior_out.bonus_findings.iter().cloned());
        findings.extend(ml_res.findings.iter().cloned());

        let total_active: f64 = parts.iter().filter(|p| p.active).map(|p| p.weight).sum();
        let percentage = |part: &WeightedScore| {
            if part.active && total_active > 0.0 {
                part.weight / total_active * 100.0
            } else {
                0.0
            }
        };

        let mut breakdown = BTreeMap::new();
        for (part, details) in parts.iter().zip([
            rules_res.details.clone(),
            headers_res.details.clone(),
            reputation_res.details.clone(),
            behavior_out.details.clone(),
            ml_res.details.clone(),
        ]) {
            breakdown.insert(
                part.name.to_string(),
                EngineBreakdown {
                    score: part.score,
                    percentage: percentage(part),
                    details,
                },
            );
        }

        let risk_level = RiskLevel::from_score(score);
        log::debug!(
            "analysis complete: score {:.1} ({:?}), {} findings",
            score,
            risk_level,
            findings.len()
        );

        AnalysisResult {
            score,
            risk_level,
            summary: risk_level.summary().to_string(),
            findings,
            breakdown,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Record one observed interaction with a sender. The store performs
    /// the read-modify-write of the pure transition.
    pub fn record_interaction(
        &self,
        from: &str,
        user_id: Option<&str>,
        disposition: Disposition,
    ) -> anyhow::Result<BehaviorRecord> {
        let sender = normalize_sender(from);
        let prior = self.store.get_behavior(&sender, user_id);
        let record = apply_interaction(prior, &sender, user_id, disposition, unix_now());
        self.store.put_behavior(record.clone())?;
        Ok(record)
    }

    /// Mark a sender explicitly legitimate, optionally capturing the
    /// authentication results observed at confirmation time.
    pub fn mark_trusted(
        &self,
        from: &str,
        user_id: Option<&str>,
        auth_snapshot: Option<AuthSnapshot>,
    ) -> anyhow::Result<TrustedRecord> {
        let sender = normalize_sender(from);
        let prior = self.store.get_trusted(&sender, user_id);
        let record = apply_trust_confirmation(prior, &sender, user_id, auth_snapshot, unix_now());
        self.store.put_trusted(record.clone())?;
        Ok(record)
    }

    /// Drop the memoized threat-intel data; the next analysis refetches.
    pub async fn invalidate_threat_intel(&self) {
        self.intel.invalidate().await;
    }
}

fn normalize_sender(from: &str) -> String {
    extract_address(from).unwrap_or_else(|| from.trim().to_lowercase())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
