//! ML classification engine.
//!
//! Vectorizes message text into a fixed-length boolean feature vector and
//! scores it with a small feed-forward classifier (local mode), a remote
//! HTTP endpoint (remote mode), or not at all (disabled). The engine must
//! be explicitly initialized; before warm-up completes every caller
//! observes "not ready" and the combiner excludes the engine's weight.

use crate::config::{MlConfig, MlModelType, PatternConfig};
use crate::engines::{clamp_score, EngineResult, Finding, FindingCategory, Severity};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

const HIDDEN_UNITS: usize = 6;
const TRAIN_EPOCHS: usize = 300;
const LEARNING_RATE: f64 = 0.5;

const URGENCY_TOKENS: &[&str] = &["urgent", "immediately", "act now", "final notice"];
const VERIFICATION_TOKENS: &[&str] = &["verify", "confirm your"];
const CREDENTIAL_TOKENS: &[&str] = &["password", "credential", "login", "sign in"];

/// Explicit boolean features appended after the keyword slots.
const EXPLICIT_FEATURES: usize = 4;

#[derive(Debug, Deserialize)]
struct RemoteVerdict {
    probability: f64,
    confidence: f64,
}

/// Single-hidden-layer network with sigmoid activations.
#[derive(Debug, Clone)]
struct Classifier {
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Classifier {
    /// Deterministic pseudo-random initialization so training converges
    /// to the same weights on every process.
    fn init(inputs: usize) -> Self {
        let weight = |i: usize, j: usize| ((i * 31 + j * 17 + 7) as f64).sin() * 0.5;
        Self {
            w1: (0..HIDDEN_UNITS)
                .map(|j| (0..inputs).map(|i| weight(i, j)).collect())
                .collect(),
            b1: vec![0.0; HIDDEN_UNITS],
            w2: (0..HIDDEN_UNITS).map(|j| weight(j, HIDDEN_UNITS)).collect(),
            b2: 0.0,
        }
    }

    fn forward(&self, features: &[f64]) -> (Vec<f64>, f64) {
        let hidden: Vec<f64> = self
            .w1
            .iter()
            .zip(&self.b1)
            .map(|(row, b)| {
                sigmoid(row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + b)
            })
            .collect();
        let output = sigmoid(
            self.w2.iter().zip(&hidden).map(|(w, h)| w * h).sum::<f64>() + self.b2,
        );
        (hidden, output)
    }

    fn predict(&self, features: &[f64]) -> f64 {
        self.forward(features).1
    }

    /// Plain gradient-descent training on the embedded sample set.
    fn train(&mut self, samples: &[(Vec<f64>, f64)]) {
        for _ in 0..TRAIN_EPOCHS {
            for (features, label) in samples {
                let (hidden, output) = self.forward(features);
                let delta_out = output - label;

                for (j, h) in hidden.iter().enumerate() {
                    let delta_h = delta_out * self.w2[j] * h * (1.0 - h);
                    self.w2[j] -= LEARNING_RATE * delta_out * h;
                    for (i, x) in features.iter().enumerate() {
                        self.w1[j][i] -= LEARNING_RATE * delta_h * x;
                    }
                    self.b1[j] -= LEARNING_RATE * delta_h;
                }
                self.b2 -= LEARNING_RATE * delta_out;
            }
        }
    }
}

pub struct MlEngine {
    config: MlConfig,
    /// Keyword patterns in a fixed order; one feature slot each.
    feature_patterns: Vec<String>,
    model: RwLock<Option<Classifier>>,
    client: reqwest::Client,
}

impl MlEngine {
    pub fn new(patterns: Arc<PatternConfig>, config: MlConfig) -> Self {
        // BTreeMap iteration keeps the slot order stable across runs.
        let feature_patterns: Vec<String> = patterns
            .phishing_keywords
            .values()
            .flat_map(|cat| cat.patterns.iter().map(|p| p.to_lowercase()))
            .collect();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("phishscore/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            config,
            feature_patterns,
            model: RwLock::new(None),
            client,
        }
    }

    /// One-time awaitable warm-up. Local mode trains the embedded
    /// classifier; remote and disabled modes are no-ops.
    pub async fn initialize(&self) {
        match self.config.model_type {
            MlModelType::Local => {
                let dim = self.feature_patterns.len() + EXPLICIT_FEATURES;
                let samples = training_samples(self.feature_patterns.len());
                let mut classifier = Classifier::init(dim);
                classifier.train(&samples);
                if let Ok(mut slot) = self.model.write() {
                    *slot = Some(classifier);
                }
                log::debug!("local ml classifier trained ({} features)", dim);
            }
            MlModelType::Remote => {
                if self.config.api_endpoint.is_none() {
                    log::warn!("remote ml mode configured without an api endpoint");
                }
            }
            MlModelType::Disabled => {}
        }
    }

    pub fn is_ready(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.config.model_type {
            MlModelType::Local => self
                .model
                .read()
                .map(|slot| slot.is_some())
                .unwrap_or(false),
            MlModelType::Remote => self.config.api_endpoint.is_some(),
            MlModelType::Disabled => false,
        }
    }

    /// Fixed-length boolean vector: one slot per keyword pattern plus the
    /// explicit urgency/verification/credential/URL features.
    pub fn extract_features(&self, subject: &str, body: &str, from: &str) -> Vec<f64> {
        let text = format!("{} {} {}", subject, body, from).to_lowercase();
        let mut features: Vec<f64> = self
            .feature_patterns
            .iter()
            .map(|p| if text.contains(p.as_str()) { 1.0 } else { 0.0 })
            .collect();

        let contains_any = |tokens: &[&str]| tokens.iter().any(|t| text.contains(t));
        features.push(if contains_any(URGENCY_TOKENS) { 1.0 } else { 0.0 });
        features.push(if contains_any(VERIFICATION_TOKENS) { 1.0 } else { 0.0 });
        features.push(if contains_any(CREDENTIAL_TOKENS) { 1.0 } else { 0.0 });
        features.push(if text.contains("http") { 1.0 } else { 0.0 });
        features
    }

    pub async fn analyze(&self, subject: &str, body: &str, from: &str) -> EngineResult {
        if !self.config.enabled || self.config.model_type == MlModelType::Disabled {
            return EngineResult::empty();
        }

        match self.score(subject, body, from).await {
            Ok((score, confidence)) => {
                let mut findings = Vec::new();
                if score > 70.0 {
                    findings.push(Finding::new(
                        "ml-high-risk",
                        Severity::High,
                        FindingCategory::Ml,
                        format!("Classifier assigns high phishing probability ({:.0}%)", score),
                    ));
                } else if score > 40.0 {
                    findings.push(Finding::new(
                        "ml-medium-risk",
                        Severity::Medium,
                        FindingCategory::Ml,
                        format!(
                            "Classifier assigns moderate phishing probability ({:.0}%)",
                            score
                        ),
                    ));
                }

                EngineResult {
                    score: clamp_score(score),
                    findings,
                    details: json!({ "confidence": confidence, "mode": mode_label(&self.config.model_type) }),
                }
            }
            Err(e) => {
                log::warn!("ml scoring failed: {}", e);
                EngineResult {
                    score: 0.0,
                    findings: vec![Finding::new(
                        "ml-error",
                        Severity::Low,
                        FindingCategory::Ml,
                        "ML classifier unavailable for this analysis",
                    )],
                    details: json!({ "error": e.to_string() }),
                }
            }
        }
    }

    async fn score(&self, subject: &str, body: &str, from: &str) -> anyhow::Result<(f64, f64)> {
        match self.config.model_type {
            MlModelType::Local => {
                let features = self.extract_features(subject, body, from);
                let probability = {
                    let slot = self
                        .model
                        .read()
                        .map_err(|_| anyhow::anyhow!("model lock poisoned"))?;
                    let classifier = slot
                        .as_ref()
                        .ok_or_else(|| anyhow::anyhow!("local model not initialized"))?;
                    classifier.predict(&features)
                };
                let confidence = (probability - 0.5).abs() * 2.0;
                Ok((probability * 100.0, confidence))
            }
            MlModelType::Remote => {
                let endpoint = self
                    .config
                    .api_endpoint
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("remote endpoint not configured"))?;
                let verdict: RemoteVerdict = self
                    .client
                    .post(endpoint)
                    .json(&json!({ "subject": subject, "body": body, "from": from }))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;

                // Low-confidence remote verdicts are discarded.
                if verdict.confidence < self.config.confidence_threshold {
                    Ok((0.0, verdict.confidence))
                } else {
                    Ok((verdict.probability * 100.0, verdict.confidence))
                }
            }
            MlModelType::Disabled => Ok((0.0, 0.0)),
        }
    }
}

fn mode_label(mode: &MlModelType) -> &'static str {
    match mode {
        MlModelType::Local => "local",
        MlModelType::Remote => "remote",
        MlModelType::Disabled => "disabled",
    }
}

/// Embedded labeled samples over the feature layout: phishing vectors
/// light up keyword slots and the explicit features, ham vectors stay
/// mostly dark.
fn training_samples(keyword_slots: usize) -> Vec<(Vec<f64>, f64)> {
    let dim = keyword_slots + EXPLICIT_FEATURES;
    let mut samples = Vec::new();

    let mut with = |slots: &dyn Fn(usize) -> f64, explicit: [f64; EXPLICIT_FEATURES], label: f64| {
        let mut v: Vec<f64> = (0..keyword_slots).map(slots).collect();
        v.extend_from_slice(&explicit);
        debug_assert_eq!(v.len(), dim);
        samples.push((v, label));
    };

    // Phishing-shaped vectors.
    with(&|_| 1.0, [1.0, 1.0, 1.0, 1.0], 1.0);
    with(&|i| if i % 2 == 0 { 1.0 } else { 0.0 }, [1.0, 1.0, 0.0, 1.0], 1.0);
    with(&|i| if i % 3 == 0 { 1.0 } else { 0.0 }, [0.0, 1.0, 1.0, 1.0], 1.0);
    with(&|i| if i < 2 { 1.0 } else { 0.0 }, [1.0, 0.0, 1.0, 0.0], 1.0);

    // Ham-shaped vectors.
    with(&|_| 0.0, [0.0, 0.0, 0.0, 0.0], 0.0);
    with(&|_| 0.0, [0.0, 0.0, 0.0, 1.0], 0.0);
    with(&|i| if i == keyword_slots.saturating_sub(1) { 1.0 } else { 0.0 }, [0.0, 0.0, 0.0, 0.0], 0.0);
    with(&|_| 0.0, [1.0, 0.0, 0.0, 0.0], 0.0);

    samples
}
