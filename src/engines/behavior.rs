//! Sender behavior engine.
//!
//! Converts persisted sender-interaction history into risk findings and a
//! separate trust bonus. The bonus travels on its own channel because it
//! reduces the composite risk after weighting instead of contributing as
//! a negatively weighted engine.
//!
//! Record updates are pure `apply event to prior state` functions; the
//! store performs the actual read-modify-write.

use crate::behavior_store::BehaviorStore;
use crate::engines::{clamp_score, Finding, FindingCategory, Severity};
use crate::text_utils::{extract_address, extract_domain};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const DORMANT_SECS: u64 = 180 * 24 * 3600;
const MAX_BONUS: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Safe,
    Phishing,
    Suspicious,
}

/// Interaction history with one sender, keyed by (sender, user).
/// Counters only ever increase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub sender: String,
    pub user_id: Option<String>,
    pub domain: String,
    pub total: u64,
    pub phishing: u64,
    pub safe: u64,
    pub suspicious: u64,
    pub first_seen: u64,
    pub last_seen: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub spf_pass: bool,
    pub dkim_pass: bool,
    pub dmarc_pass: bool,
}

/// A sender the user explicitly confirmed legitimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedRecord {
    pub sender: String,
    pub user_id: Option<String>,
    pub domain: String,
    pub confirmations: u64,
    pub last_confirmed: u64,
    pub auth_snapshot: Option<AuthSnapshot>,
}

/// Apply one observed interaction to the prior record, producing the new
/// record. Creates the record on first contact.
pub fn apply_interaction(
    prior: Option<BehaviorRecord>,
    sender: &str,
    user_id: Option<&str>,
    disposition: Disposition,
    now: u64,
) -> BehaviorRecord {
    let mut record = prior.unwrap_or_else(|| BehaviorRecord {
        sender: sender.to_string(),
        user_id: user_id.map(|u| u.to_string()),
        domain: extract_domain(sender).unwrap_or_default(),
        total: 0,
        phishing: 0,
        safe: 0,
        suspicious: 0,
        first_seen: now,
        last_seen: now,
    });

    record.total += 1;
    match disposition {
        Disposition::Safe => record.safe += 1,
        Disposition::Phishing => record.phishing += 1,
        Disposition::Suspicious => record.suspicious += 1,
    }
    record.last_seen = now;
    record
}

/// Apply a trust confirmation, creating the record or incrementing its
/// confirmation count.
pub fn apply_trust_confirmation(
    prior: Option<TrustedRecord>,
    sender: &str,
    user_id: Option<&str>,
    auth_snapshot: Option<AuthSnapshot>,
    now: u64,
) -> TrustedRecord {
    match prior {
        Some(mut record) => {
            record.confirmations += 1;
            record.last_confirmed = now;
            if auth_snapshot.is_some() {
                record.auth_snapshot = auth_snapshot;
            }
            record
        }
        None => TrustedRecord {
            sender: sender.to_string(),
            user_id: user_id.map(|u| u.to_string()),
            domain: extract_domain(sender).unwrap_or_default(),
            confirmations: 1,
            last_confirmed: now,
            auth_snapshot,
        },
    }
}

/// Behavior output: risk score and findings plus the separate bonus
/// channel.
#[derive(Debug, Clone)]
pub struct BehaviorOutcome {
    pub score: f64,
    pub findings: Vec<Finding>,
    pub bonus: f64,
    pub bonus_findings: Vec<Finding>,
    pub details: serde_json::Value,
}

impl BehaviorOutcome {
    fn empty() -> Self {
        Self {
            score: 0.0,
            findings: Vec::new(),
            bonus: 0.0,
            bonus_findings: Vec::new(),
            details: serde_json::Value::Null,
        }
    }
}

pub struct BehaviorEngine {
    store: Arc<dyn BehaviorStore>,
}

impl BehaviorEngine {
    pub fn new(store: Arc<dyn BehaviorStore>) -> Self {
        Self { store }
    }

    pub fn analyze(&self, from: &str, user_id: Option<&str>, now: u64) -> BehaviorOutcome {
        // Anonymous analyses carry no history.
        let Some(user_id) = user_id else {
            return BehaviorOutcome::empty();
        };
        let Some(sender) = extract_address(from) else {
            return BehaviorOutcome::empty();
        };

        let record = self.store.get_behavior(&sender, Some(user_id));
        let trusted = self.store.get_trusted(&sender, Some(user_id));

        let mut score = 0.0;
        let mut findings = Vec::new();

        match &record {
            Some(r) if r.phishing > 0 => {
                score += 45.0;
                findings.push(Finding::new(
                    "prior-phishing",
                    Severity::High,
                    FindingCategory::Behavior,
                    format!(
                        "Sender was involved in {} earlier phishing interaction(s)",
                        r.phishing
                    ),
                ));
            }
            Some(r) if r.total <= 1 => {
                score += 25.0;
                findings.push(Finding::new(
                    "first-contact",
                    Severity::Medium,
                    FindingCategory::Behavior,
                    "First interaction with this sender",
                ));
            }
            None => {
                score += 25.0;
                findings.push(Finding::new(
                    "first-contact",
                    Severity::Medium,
                    FindingCategory::Behavior,
                    "No interaction history with this sender",
                ));
            }
            _ => {}
        }

        if let Some(r) = &record {
            if now.saturating_sub(r.last_seen) > DORMANT_SECS {
                score += 10.0;
                findings.push(Finding::new(
                    "dormant-sender",
                    Severity::Low,
                    FindingCategory::Behavior,
                    "Sender has been dormant for over 180 days",
                ));
            }
        }

        let mut bonus: f64 = 0.0;
        let mut bonus_findings = Vec::new();

        if trusted.is_some() {
            bonus += 20.0;
            bonus_findings.push(Finding::new(
                "trusted-sender",
                Severity::Low,
                FindingCategory::BehaviorPositive,
                "Sender was explicitly confirmed legitimate",
            ));
        }
        if let Some(r) = &record {
            if r.safe >= 3 && r.phishing == 0 {
                bonus += 15.0;
                bonus_findings.push(Finding::new(
                    "established-history",
                    Severity::Low,
                    FindingCategory::BehaviorPositive,
                    format!("{} prior safe interactions with this sender", r.safe),
                ));
            }
        }

        BehaviorOutcome {
            score: clamp_score(score),
            findings,
            bonus: bonus.min(MAX_BONUS),
            bonus_findings,
            details: json!({
                "sender": sender,
                "interactions": record.as_ref().map(|r| r.total).unwrap_or(0),
                "safe": record.as_ref().map(|r| r.safe).unwrap_or(0),
                "phishing": record.as_ref().map(|r| r.phishing).unwrap_or(0),
                "trusted": trusted.is_some(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior_store::MemoryStore;

    const NOW: u64 = 1_700_000_000;

    fn engine_with_store() -> (BehaviorEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (BehaviorEngine::new(store.clone()), store)
    }

    #[test]
    fn test_apply_interaction_creates_then_increments() {
        let first = apply_interaction(None, "a@b.com", Some("u1"), Disposition::Safe, NOW);
        assert_eq!(first.total, 1);
        assert_eq!(first.safe, 1);
        assert_eq!(first.domain, "b.com");

        let second = apply_interaction(
            Some(first.clone()),
            "a@b.com",
            Some("u1"),
            Disposition::Phishing,
            NOW + 10,
        );
        assert_eq!(second.total, 2);
        assert_eq!(second.phishing, 1);
        assert_eq!(second.first_seen, NOW);
        assert_eq!(second.last_seen, NOW + 10);
    }

    #[test]
    fn test_apply_trust_confirmation_increments() {
        let first = apply_trust_confirmation(None, "a@b.com", Some("u1"), None, NOW);
        assert_eq!(first.confirmations, 1);
        let second = apply_trust_confirmation(Some(first), "a@b.com", Some("u1"), None, NOW + 5);
        assert_eq!(second.confirmations, 2);
        assert_eq!(second.last_confirmed, NOW + 5);
    }

    #[test]
    fn test_anonymous_analysis_has_no_behavioral_score() {
        let (engine, store) = engine_with_store();
        store
            .put_behavior(apply_interaction(
                None,
                "a@b.com",
                None,
                Disposition::Phishing,
                NOW,
            ))
            .unwrap();
        let outcome = engine.analyze("a@b.com", None, NOW);
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn test_prior_phishing_outranks_first_contact() {
        let (engine, store) = engine_with_store();
        let rec = apply_interaction(None, "a@b.com", Some("u1"), Disposition::Phishing, NOW);
        store.put_behavior(rec).unwrap();

        let outcome = engine.analyze("a@b.com", Some("u1"), NOW);
        assert_eq!(outcome.score, 45.0);
        assert_eq!(outcome.findings[0].id, "prior-phishing");
    }

    #[test]
    fn test_unknown_sender_is_first_contact() {
        let (engine, _) = engine_with_store();
        let outcome = engine.analyze("new@sender.com", Some("u1"), NOW);
        assert_eq!(outcome.score, 25.0);
        assert_eq!(outcome.findings[0].id, "first-contact");
    }

    #[test]
    fn test_dormant_sender_flagged() {
        let (engine, store) = engine_with_store();
        let mut rec = apply_interaction(None, "a@b.com", Some("u1"), Disposition::Safe, NOW);
        rec = apply_interaction(Some(rec), "a@b.com", Some("u1"), Disposition::Safe, NOW);
        store.put_behavior(rec).unwrap();

        let later = NOW + DORMANT_SECS + 1;
        let outcome = engine.analyze("a@b.com", Some("u1"), later);
        assert!(outcome.findings.iter().any(|f| f.id == "dormant-sender"));
        assert_eq!(outcome.score, 10.0);
    }

    #[test]
    fn test_bonus_channels() {
        let (engine, store) = engine_with_store();
        let mut rec = apply_interaction(None, "a@b.com", Some("u1"), Disposition::Safe, NOW);
        for _ in 0..3 {
            rec = apply_interaction(Some(rec), "a@b.com", Some("u1"), Disposition::Safe, NOW);
        }
        store.put_behavior(rec).unwrap();
        store
            .put_trusted(apply_trust_confirmation(None, "a@b.com", Some("u1"), None, NOW))
            .unwrap();

        let outcome = engine.analyze("a@b.com", Some("u1"), NOW);
        assert_eq!(outcome.bonus, 35.0);
        assert_eq!(outcome.bonus_findings.len(), 2);
        // Risk findings stay separate from the bonus channel.
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.score, 0.0);
    }
}
