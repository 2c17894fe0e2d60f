//! End-to-end pipeline tests: scoring bounds, threshold consistency,
//! trusted-sender behavior, determinism and partial availability.

use phishscore::analyzer::EmailInput;
use phishscore::behavior_store::MemoryStore;
use phishscore::config::{AnalyzerConfig, PatternConfig, Sensitivity};
use phishscore::engines::{FindingCategory, Severity};
use phishscore::{Disposition, PhishingAnalyzer, RiskLevel};
use std::sync::Arc;

async fn analyzer() -> PhishingAnalyzer {
    let analyzer = PhishingAnalyzer::new(
        PatternConfig::default(),
        Arc::new(MemoryStore::new()),
        AnalyzerConfig::default(),
    );
    analyzer.initialize().await;
    analyzer
}

fn phishing_input() -> EmailInput {
    EmailInput {
        from: "\"PayPal Security\" <alerts@paypa1.com>".to_string(),
        subject: "Action required".to_string(),
        body: "You must verify your identity immediately or your account will be \
               permanently suspended. Click here: http://signin-alerts.com/verify"
            .to_string(),
        headers: None,
        user_id: None,
    }
}

fn benign_input() -> EmailInput {
    EmailInput {
        from: "Team Calendar <calendar@github.com>".to_string(),
        subject: "Weekly sync moved to 10am".to_string(),
        body: "The weekly sync moves to 10am on Thursday. Same room as always.".to_string(),
        headers: None,
        user_id: None,
    }
}

#[tokio::test]
async fn score_is_always_bounded_and_level_consistent() {
    let analyzer = analyzer().await;

    for input in [phishing_input(), benign_input(), EmailInput::default()] {
        let result = analyzer.analyze(&input).await;
        assert!(result.score >= 0.0 && result.score <= 100.0);
        assert_eq!(result.risk_level, RiskLevel::from_score(result.score));
        assert_eq!(result.summary, result.risk_level.summary());
    }
}

#[tokio::test]
async fn crafted_phishing_email_classifies_high() {
    let analyzer = PhishingAnalyzer::new(
        PatternConfig::default(),
        Arc::new(MemoryStore::new()),
        AnalyzerConfig {
            enable_ml: false,
            ..AnalyzerConfig::default()
        },
    );
    analyzer.initialize().await;

    let input = EmailInput {
        from: "\"PayPal Security\" <alerts@paypa1.com>".to_string(),
        subject: "Urgent: verify your identity".to_string(),
        body: "Your account will be permanently suspended immediately. \
               Click here to confirm your account: http://signin-alerts.com/verify"
            .to_string(),
        headers: Some(
            "Received-SPF: fail (sender not permitted)\n\
             Authentication-Results: mx.example.com; dkim=fail; dmarc=fail\n\
             From: alerts@paypa1.com\n\
             Return-Path: <bounce@mail-blast.example>\n"
                .to_string(),
        ),
        user_id: None,
    };
    let result = analyzer.analyze(&input).await;

    assert_eq!(result.risk_level, RiskLevel::High);
    assert!(result
        .findings
        .iter()
        .any(|f| f.category == FindingCategory::Keywords && f.severity == Severity::High));
    assert!(result
        .findings
        .iter()
        .any(|f| f.category == FindingCategory::Reputation && f.severity == Severity::High));
}

#[tokio::test]
async fn benign_internal_email_classifies_low() {
    let analyzer = analyzer().await;
    let result = analyzer.analyze(&benign_input()).await;

    assert_eq!(result.risk_level, RiskLevel::Low);
    // Only trusted-category findings, if any, are acceptable.
    assert!(result
        .findings
        .iter()
        .all(|f| f.category == FindingCategory::Trusted));
}

#[tokio::test]
async fn missing_headers_exclude_header_engine_weight() {
    let analyzer = analyzer().await;
    let result = analyzer.analyze(&phishing_input()).await;

    let headers = &result.breakdown["headers"];
    assert_eq!(headers.percentage, 0.0);
    assert_eq!(headers.score, 0.0);

    let mut with_headers = phishing_input();
    with_headers.headers = Some("Received-SPF: fail\nFrom: alerts@paypa1.com\n".to_string());
    let result = analyzer.analyze(&with_headers).await;
    assert!(result.breakdown["headers"].percentage > 0.0);
}

#[tokio::test]
async fn trusted_allowlist_sender_never_flagged_as_lookalike() {
    let analyzer = analyzer().await;
    let input = EmailInput {
        from: "\"PayPal\" <service@paypal.com>".to_string(),
        subject: "Your receipt".to_string(),
        body: "Thanks for your purchase. Details at https://www.paypal.com/receipt".to_string(),
        ..Default::default()
    };
    let result = analyzer.analyze(&input).await;

    assert!(!result.findings.iter().any(|f| {
        f.category == FindingCategory::Domains && f.severity != Severity::Low
            || f.id.starts_with("lookalike-domain")
            || f.id == "brand-display-mismatch"
    }));
}

#[tokio::test]
async fn analysis_is_deterministic_without_state_changes() {
    let analyzer = analyzer().await;
    let first = analyzer.analyze(&phishing_input()).await;
    let second = analyzer.analyze(&phishing_input()).await;

    assert_eq!(first.score, second.score);
    assert_eq!(first.risk_level, second.risk_level);
    assert_eq!(first.findings.len(), second.findings.len());
    for (a, b) in first.findings.iter().zip(&second.findings) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.start_index, b.start_index);
    }
}

#[tokio::test]
async fn marking_trusted_never_increases_the_score() {
    let analyzer = analyzer().await;
    let mut input = phishing_input();
    input.user_id = Some("u1".to_string());

    let before = analyzer.analyze(&input).await;
    analyzer
        .mark_trusted(&input.from, Some("u1"), None)
        .unwrap();
    let after = analyzer.analyze(&input).await;

    assert!(after.score <= before.score);
    assert!(after
        .findings
        .iter()
        .any(|f| f.category == FindingCategory::BehaviorPositive));
}

#[tokio::test]
async fn recorded_phishing_history_raises_behavior_score() {
    let analyzer = analyzer().await;
    let mut input = phishing_input();
    input.user_id = Some("u1".to_string());

    analyzer
        .record_interaction(&input.from, Some("u1"), Disposition::Phishing)
        .unwrap();
    let result = analyzer.analyze(&input).await;

    assert_eq!(result.breakdown["behavior"].score, 45.0);
    assert!(result.findings.iter().any(|f| f.id == "prior-phishing"));
}

#[tokio::test]
async fn anonymous_analysis_has_zero_behavior_score() {
    let analyzer = analyzer().await;
    let result = analyzer.analyze(&phishing_input()).await;
    assert_eq!(result.breakdown["behavior"].score, 0.0);
}

#[tokio::test]
async fn sensitivity_scales_the_verdict() {
    let store = Arc::new(MemoryStore::new());
    let strict = PhishingAnalyzer::new(
        PatternConfig::default(),
        store.clone(),
        AnalyzerConfig {
            sensitivity: Sensitivity::Strict,
            ..AnalyzerConfig::default()
        },
    );
    strict.initialize().await;
    let lenient = PhishingAnalyzer::new(
        PatternConfig::default(),
        store,
        AnalyzerConfig {
            sensitivity: Sensitivity::Lenient,
            ..AnalyzerConfig::default()
        },
    );
    lenient.initialize().await;

    let strict_score = strict.analyze(&phishing_input()).await.score;
    let lenient_score = lenient.analyze(&phishing_input()).await.score;
    assert!(strict_score >= lenient_score);
}

#[tokio::test]
async fn ml_engine_is_excluded_before_initialize() {
    let analyzer = PhishingAnalyzer::new(
        PatternConfig::default(),
        Arc::new(MemoryStore::new()),
        AnalyzerConfig::default(),
    );
    // No initialize() call: ML must be inactive and the analysis must
    // still return a complete result.
    let result = analyzer.analyze(&phishing_input()).await;
    assert_eq!(result.breakdown["ml"].percentage, 0.0);
    assert_eq!(result.breakdown["ml"].score, 0.0);
    assert!(result.score > 0.0);
}

#[tokio::test]
async fn breakdown_percentages_sum_to_one_hundred() {
    let analyzer = analyzer().await;
    let result = analyzer.analyze(&phishing_input()).await;
    let total: f64 = result.breakdown.values().map(|e| e.percentage).sum();
    assert!((total - 100.0).abs() < 1e-6);
}
