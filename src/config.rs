//! Pattern and analyzer configuration.
//!
//! The pattern configuration drives every heuristic in the pipeline:
//! keyword categories, domain lists, URL patterns, scoring weights and
//! threat-intel sources. It loads from YAML and ships a complete set of
//! bundled defaults so the analyzer works without any external files.

use crate::engines::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordCategory {
    pub weight: f64,
    pub severity: Severity,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPatterns {
    pub shorteners: Vec<String>,
    pub suspicious: Vec<String>,
    pub ip_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPatterns {
    pub suspicious: Vec<String>,
}

/// Relative weight of each engine in the combined average. Engines whose
/// precondition is not met for a call contribute nothing regardless of
/// their configured weight. `misc` is reserved and never consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub heuristics: f64,
    pub headers: f64,
    pub reputation: f64,
    pub behavior: f64,
    pub ml: f64,
    pub misc: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            heuristics: 0.30,
            headers: 0.20,
            reputation: 0.25,
            behavior: 0.10,
            ml: 0.15,
            misc: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub phishing_keywords: BTreeMap<String, KeywordCategory>,
    pub suspicious_domains: Vec<String>,
    pub url_patterns: UrlPatterns,
    pub attachment_patterns: AttachmentPatterns,
    pub html_indicators: BTreeMap<String, Vec<String>>,
    pub legitimate_domains: Vec<String>,
    /// brand name -> legitimate domains for that brand
    pub trusted_domains: BTreeMap<String, Vec<String>>,
    pub trusted_url_prefixes: Vec<String>,
    pub suspicious_tlds: Vec<String>,
    pub scoring_weights: ScoringWeights,
    /// External blocklist URLs (JSON or line-delimited text).
    pub threat_intel_sources: Vec<String>,
}

impl PatternConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PatternConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Every domain considered trusted: the legitimate-domain allowlist
    /// plus all per-brand domain lists.
    pub fn all_trusted_domains(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .legitimate_domains
            .iter()
            .map(|d| d.to_lowercase())
            .collect();
        for domains in self.trusted_domains.values() {
            out.extend(domains.iter().map(|d| d.to_lowercase()));
        }
        out.sort();
        out.dedup();
        out
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        let mut phishing_keywords = BTreeMap::new();
        phishing_keywords.insert(
            "credentials".to_string(),
            KeywordCategory {
                weight: 1.0,
                severity: Severity::High,
                patterns: vec![
                    "verify your identity".to_string(),
                    "confirm your password".to_string(),
                    "update your payment".to_string(),
                    "confirm your account".to_string(),
                    "unusual sign-in activity".to_string(),
                    "verify your account".to_string(),
                ],
            },
        );
        phishing_keywords.insert(
            "urgency".to_string(),
            KeywordCategory {
                weight: 0.8,
                severity: Severity::Medium,
                patterns: vec![
                    "immediately".to_string(),
                    "urgent".to_string(),
                    "act now".to_string(),
                    "within 24 hours".to_string(),
                    "final notice".to_string(),
                    "permanently suspended".to_string(),
                ],
            },
        );
        phishing_keywords.insert(
            "lure".to_string(),
            KeywordCategory {
                weight: 0.6,
                severity: Severity::Medium,
                patterns: vec![
                    "click here".to_string(),
                    "you have won".to_string(),
                    "claim your".to_string(),
                    "free gift".to_string(),
                    "congratulations".to_string(),
                ],
            },
        );

        let mut html_indicators = BTreeMap::new();
        html_indicators.insert(
            "scripting".to_string(),
            vec!["<script".to_string(), "javascript:".to_string()],
        );
        html_indicators.insert(
            "embedding".to_string(),
            vec![
                "<iframe".to_string(),
                "<embed".to_string(),
                "<object".to_string(),
            ],
        );
        html_indicators.insert(
            "forms".to_string(),
            vec!["<form".to_string(), "type=\"password\"".to_string()],
        );

        let mut trusted_domains = BTreeMap::new();
        trusted_domains.insert(
            "paypal".to_string(),
            vec![
                "paypal.com".to_string(),
                "paypal-communications.com".to_string(),
            ],
        );
        trusted_domains.insert(
            "microsoft".to_string(),
            vec![
                "microsoft.com".to_string(),
                "outlook.com".to_string(),
                "live.com".to_string(),
            ],
        );
        trusted_domains.insert(
            "google".to_string(),
            vec!["google.com".to_string(), "gmail.com".to_string()],
        );
        trusted_domains.insert(
            "apple".to_string(),
            vec!["apple.com".to_string(), "icloud.com".to_string()],
        );
        trusted_domains.insert(
            "amazon".to_string(),
            vec!["amazon.com".to_string(), "amazonses.com".to_string()],
        );
        trusted_domains.insert(
            "chase".to_string(),
            vec!["chase.com".to_string(), "jpmorgan.com".to_string()],
        );

        Self {
            phishing_keywords,
            suspicious_domains: vec![
                "secure-login-update.com".to_string(),
                "account-verification.net".to_string(),
                "signin-alerts.com".to_string(),
                "mail-support-center.com".to_string(),
            ],
            url_patterns: UrlPatterns {
                shorteners: vec![
                    "bit.ly".to_string(),
                    "tinyurl.com".to_string(),
                    "t.co".to_string(),
                    "goo.gl".to_string(),
                    "ow.ly".to_string(),
                    "is.gd".to_string(),
                    "cutt.ly".to_string(),
                ],
                suspicious: vec![
                    "login".to_string(),
                    "verify".to_string(),
                    "secure".to_string(),
                    "account".to_string(),
                    "update".to_string(),
                    "confirm".to_string(),
                ],
                ip_patterns: vec![r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$".to_string()],
            },
            attachment_patterns: AttachmentPatterns {
                suspicious: vec![
                    "exe".to_string(),
                    "scr".to_string(),
                    "bat".to_string(),
                    "cmd".to_string(),
                    "js".to_string(),
                    "vbs".to_string(),
                    "jar".to_string(),
                    "msi".to_string(),
                ],
            },
            html_indicators,
            legitimate_domains: vec![
                "github.com".to_string(),
                "wikipedia.org".to_string(),
                "linkedin.com".to_string(),
            ],
            trusted_domains,
            trusted_url_prefixes: vec![
                "https://www.paypal.com/".to_string(),
                "https://accounts.google.com/".to_string(),
                "https://login.microsoftonline.com/".to_string(),
                "https://github.com/".to_string(),
            ],
            suspicious_tlds: vec![
                "tk".to_string(),
                "ml".to_string(),
                "ga".to_string(),
                "cf".to_string(),
                "gq".to_string(),
                "top".to_string(),
                "xyz".to_string(),
                "zip".to_string(),
            ],
            scoring_weights: ScoringWeights::default(),
            threat_intel_sources: Vec::new(),
        }
    }
}

/// How aggressively the combiner scales the weighted average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Lenient,
    Balanced,
    Strict,
}

impl Sensitivity {
    pub fn multiplier(&self) -> f64 {
        match self {
            Sensitivity::Lenient => 0.8,
            Sensitivity::Balanced => 1.0,
            Sensitivity::Strict => 1.2,
        }
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(Sensitivity::Lenient),
            "balanced" => Ok(Sensitivity::Balanced),
            "strict" => Ok(Sensitivity::Strict),
            other => anyhow::bail!("unknown sensitivity: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MlModelType {
    Local,
    Remote,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    pub enabled: bool,
    pub model_type: MlModelType,
    pub api_endpoint: Option<String>,
    pub confidence_threshold: f64,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_type: MlModelType::Local,
            api_endpoint: None,
            confidence_threshold: 0.5,
        }
    }
}

/// Per-call analyzer options supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub enable_ml: bool,
    pub sensitivity: Sensitivity,
    pub ml: MlConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enable_ml: true,
            sensitivity: Sensitivity::Balanced,
            ml: MlConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trip() {
        let config = PatternConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: PatternConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.suspicious_domains, config.suspicious_domains);
        assert_eq!(parsed.scoring_weights.heuristics, 0.30);
    }

    #[test]
    fn test_missing_weights_fall_back_to_defaults() {
        let parsed: PatternConfig =
            serde_yaml::from_str("suspicious_domains: [bad.com]").unwrap();
        assert_eq!(parsed.scoring_weights.headers, 0.20);
        assert_eq!(parsed.suspicious_domains, vec!["bad.com".to_string()]);
    }

    #[test]
    fn test_all_trusted_domains_merges_lists() {
        let config = PatternConfig::default();
        let trusted = config.all_trusted_domains();
        assert!(trusted.contains(&"paypal.com".to_string()));
        assert!(trusted.contains(&"github.com".to_string()));
    }

    #[test]
    fn test_sensitivity_multiplier() {
        assert_eq!(Sensitivity::Lenient.multiplier(), 0.8);
        assert_eq!(Sensitivity::Balanced.multiplier(), 1.0);
        assert_eq!(Sensitivity::Strict.multiplier(), 1.2);
    }
}
