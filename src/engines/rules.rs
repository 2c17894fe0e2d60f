//! Heuristic rule engine.
//!
//! Five independent checks driven by the declarative pattern
//! configuration: keywords, URLs, sender domains, attachments and HTML
//! indicators. Category sub-scores blend 30/30/20/15/5 into the engine
//! score.

use crate::config::PatternConfig;
use crate::engines::{clamp_score, EngineResult, Finding, FindingCategory, Severity};
use crate::text_utils::{domain_matches_list, extract_address, extract_domain};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

const KEYWORD_WEIGHT: f64 = 0.30;
const URL_WEIGHT: f64 = 0.30;
const DOMAIN_WEIGHT: f64 = 0.20;
const ATTACHMENT_WEIGHT: f64 = 0.15;
const HTML_WEIGHT: f64 = 0.05;

fn severity_points(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 10.0,
        Severity::Medium => 25.0,
        Severity::High => 40.0,
    }
}

struct KeywordPattern {
    category: String,
    severity: Severity,
    weight: f64,
    pattern: String,
    re: Regex,
}

pub struct RuleEngine {
    config: Arc<PatternConfig>,
    trusted_domains: Vec<String>,
    keyword_res: Vec<KeywordPattern>,
    url_re: Regex,
    attachment_re: Option<Regex>,
    ip_res: Vec<Regex>,
}

impl RuleEngine {
    pub fn new(config: Arc<PatternConfig>) -> Self {
        let url_re = Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("url regex");

        // Case-insensitive literal matchers, compiled once. Matching runs
        // against the original text so finding offsets stay valid there.
        let mut keyword_res = Vec::new();
        for (category, cat) in &config.phishing_keywords {
            for pattern in &cat.patterns {
                if pattern.trim().is_empty() {
                    continue;
                }
                match Regex::new(&format!("(?i){}", regex::escape(pattern))) {
                    Ok(re) => keyword_res.push(KeywordPattern {
                        category: category.clone(),
                        severity: cat.severity,
                        weight: cat.weight,
                        pattern: pattern.clone(),
                        re,
                    }),
                    Err(e) => {
                        log::warn!("ignoring unusable keyword pattern {:?}: {}", pattern, e);
                    }
                }
            }
        }

        let attachment_re = if config.attachment_patterns.suspicious.is_empty() {
            None
        } else {
            let exts = config
                .attachment_patterns
                .suspicious
                .iter()
                .map(|e| regex::escape(e))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i)\b[\w\-]+\.(?:{})\b", exts)).ok()
        };

        let ip_res = config
            .url_patterns
            .ip_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("ignoring invalid ip pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();

        let trusted_domains = config.all_trusted_domains();

        Self {
            config,
            trusted_domains,
            keyword_res,
            url_re,
            attachment_re,
            ip_res,
        }
    }

    pub fn analyze(&self, subject: &str, body: &str, from: &str) -> EngineResult {
        // Findings carry byte offsets into this subject+body
        // concatenation so the caller can highlight matches.
        let haystack = format!("{}{}", subject, body);
        let haystack_lower = haystack.to_lowercase();

        let mut findings = Vec::new();
        let keyword_score = self.check_keywords(&haystack, &mut findings);
        let url_score = self.check_urls(&haystack, &mut findings);
        let domain_score = self.check_sender_domains(from, &mut findings);
        let attachment_score = self.check_attachments(&haystack, &mut findings);
        let html_score = self.check_html(&haystack_lower, &mut findings);

        let score = clamp_score(
            keyword_score * KEYWORD_WEIGHT
                + url_score * URL_WEIGHT
                + domain_score * DOMAIN_WEIGHT
                + attachment_score * ATTACHMENT_WEIGHT
                + html_score * HTML_WEIGHT,
        );

        EngineResult {
            score,
            findings,
            details: json!({
                "keywords": keyword_score,
                "urls": url_score,
                "domains": domain_score,
                "attachments": attachment_score,
                "html": html_score,
            }),
        }
    }

    /// Case-insensitive scan; every occurrence of every pattern yields
    /// one finding whose offsets slice the original text.
    fn check_keywords(&self, haystack: &str, findings: &mut Vec<Finding>) -> f64 {
        let mut score = 0.0;

        for kp in &self.keyword_res {
            for m in kp.re.find_iter(haystack) {
                score += severity_points(kp.severity) * kp.weight;
                findings.push(
                    Finding::new(
                        format!("keyword-{}", kp.category),
                        kp.severity,
                        FindingCategory::Keywords,
                        format!("Suspicious wording ({}): \"{}\"", kp.category, kp.pattern),
                    )
                    .with_span(m.start(), m.end()),
                );
            }
        }

        clamp_score(score)
    }

    fn check_urls(&self, haystack: &str, findings: &mut Vec<Finding>) -> f64 {
        let mut score = 0.0;

        for m in self.url_re.find_iter(haystack) {
            let raw_url = m.as_str().trim_end_matches(['.', ',', ';']);
            let url_lower = raw_url.to_lowercase();

            // Trusted prefixes short-circuit and never contribute score.
            if self
                .config
                .trusted_url_prefixes
                .iter()
                .any(|p| url_lower.starts_with(&p.to_lowercase()))
            {
                findings.push(
                    Finding::new(
                        "url-trusted",
                        Severity::Low,
                        FindingCategory::Trusted,
                        format!("Link to a trusted destination: {}", raw_url),
                    )
                    .with_span(m.start(), m.start() + raw_url.len()),
                );
                continue;
            }

            let host = url::Url::parse(raw_url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_lowercase()));

            if let Some(host) = &host {
                if domain_matches_list(host, &self.config.suspicious_domains) {
                    score += severity_points(Severity::High);
                    findings.push(
                        Finding::new(
                            "url-suspicious-domain",
                            Severity::High,
                            FindingCategory::Urls,
                            format!("Link points to a known suspicious domain: {}", host),
                        )
                        .with_span(m.start(), m.start() + raw_url.len()),
                    );
                    continue;
                }

                if domain_matches_list(host, &self.config.url_patterns.shorteners) {
                    score += severity_points(Severity::Medium);
                    findings.push(
                        Finding::new(
                            "url-shortener",
                            Severity::Medium,
                            FindingCategory::Urls,
                            format!("Link uses a URL shortener: {}", host),
                        )
                        .with_span(m.start(), m.start() + raw_url.len()),
                    );
                    continue;
                }
            }

            if let Some(keyword) = self
                .config
                .url_patterns
                .suspicious
                .iter()
                .find(|k| url_lower.contains(&k.to_lowercase()))
            {
                score += severity_points(Severity::Medium);
                findings.push(
                    Finding::new(
                        "url-suspicious-keyword",
                        Severity::Medium,
                        FindingCategory::Urls,
                        format!("Link contains a credential-bait token \"{}\"", keyword),
                    )
                    .with_span(m.start(), m.start() + raw_url.len()),
                );
            }
        }

        clamp_score(score)
    }

    fn check_sender_domains(&self, from: &str, findings: &mut Vec<Finding>) -> f64 {
        let mut score = 0.0;

        for part in from.split(',') {
            let Some(address) = extract_address(part) else {
                continue;
            };
            let Some(domain) = extract_domain(&address) else {
                continue;
            };

            if domain_matches_list(&domain, &self.trusted_domains) {
                findings.push(Finding::new(
                    "sender-trusted",
                    Severity::Low,
                    FindingCategory::Trusted,
                    format!("Sender domain {} is on the trusted allowlist", domain),
                ));
                continue;
            }

            if domain_matches_list(&domain, &self.config.suspicious_domains) {
                score += severity_points(Severity::High);
                findings.push(Finding::new(
                    "sender-suspicious-domain",
                    Severity::High,
                    FindingCategory::Domains,
                    format!("Sender domain {} is on the suspicious-domain list", domain),
                ));
                continue;
            }

            if self.ip_res.iter().any(|re| re.is_match(&domain)) {
                score += severity_points(Severity::Medium);
                findings.push(Finding::new(
                    "sender-ip-literal",
                    Severity::Medium,
                    FindingCategory::Domains,
                    format!("Sender address uses a raw IP instead of a domain: {}", domain),
                ));
            }
        }

        clamp_score(score)
    }

    /// URLs are stripped first so file extensions inside links do not
    /// masquerade as attachments.
    fn check_attachments(&self, haystack: &str, findings: &mut Vec<Finding>) -> f64 {
        let Some(re) = &self.attachment_re else {
            return 0.0;
        };

        let stripped = self.url_re.replace_all(haystack, " ");
        let mut score = 0.0;

        for m in re.find_iter(&stripped) {
            score += severity_points(Severity::High);
            findings.push(Finding::new(
                "attachment-suspicious",
                Severity::High,
                FindingCategory::Attachments,
                format!("Mentions a dangerous file type: {}", m.as_str()),
            ));
        }

        clamp_score(score)
    }

    fn check_html(&self, haystack_lower: &str, findings: &mut Vec<Finding>) -> f64 {
        let mut score = 0.0;

        for (kind, tokens) in &self.config.html_indicators {
            for token in tokens {
                if haystack_lower.contains(&token.to_lowercase()) {
                    score += severity_points(Severity::Low);
                    findings.push(Finding::new(
                        format!("html-{}", kind),
                        Severity::Low,
                        FindingCategory::Html,
                        format!("HTML indicator present ({}): {}", kind, token),
                    ));
                }
            }
        }

        clamp_score(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RuleEngine {
        RuleEngine::new(Arc::new(PatternConfig::default()))
    }

    #[test]
    fn test_keyword_findings_carry_offsets() {
        let result = engine().analyze("Urgent notice", "please verify your identity now", "a@b.com");
        let keyword: Vec<_> = result
            .findings
            .iter()
            .filter(|f| f.category == FindingCategory::Keywords)
            .collect();
        assert!(!keyword.is_empty());
        for f in keyword {
            assert!(f.start_index.is_some());
            assert!(f.end_index.unwrap() > f.start_index.unwrap());
        }
        assert!(result.score > 0.0);
    }

    #[test]
    fn test_keyword_offsets_slice_original_text() {
        // Uppercase letters whose lowercase form changes byte length
        // (Turkish dotted I) must not shift downstream offsets.
        let subject = "İmportant notice";
        let body = " please verify your identity now";
        let result = engine().analyze(subject, body, "a@b.com");

        let haystack = format!("{}{}", subject, body);
        let f = result
            .findings
            .iter()
            .find(|f| f.id == "keyword-credentials")
            .expect("credentials finding");
        let span = &haystack[f.start_index.unwrap()..f.end_index.unwrap()];
        assert!(span.eq_ignore_ascii_case("verify your identity"));
    }

    #[test]
    fn test_keyword_match_ignores_case() {
        let result = engine().analyze("", "VERIFY YOUR IDENTITY", "a@b.com");
        assert!(result
            .findings
            .iter()
            .any(|f| f.id == "keyword-credentials" && f.severity == Severity::High));
    }

    #[test]
    fn test_repeated_keyword_matches_each_count() {
        let result = engine().analyze("", "urgent urgent urgent", "a@b.com");
        let count = result
            .findings
            .iter()
            .filter(|f| f.id == "keyword-urgency")
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_trusted_url_short_circuits() {
        let result = engine().analyze(
            "",
            "see https://github.com/rust-lang/rust for details",
            "a@b.com",
        );
        assert!(result
            .findings
            .iter()
            .any(|f| f.id == "url-trusted" && f.category == FindingCategory::Trusted));
        // Trusted findings contribute nothing even though the URL
        // contains no other signals.
        assert_eq!(result.details["urls"], 0.0);
    }

    #[test]
    fn test_shortener_and_suspicious_keyword_urls() {
        let result = engine().analyze("", "click https://bit.ly/x and http://site.example/verify-now", "a@b.com");
        assert!(result.findings.iter().any(|f| f.id == "url-shortener"));
        assert!(result
            .findings
            .iter()
            .any(|f| f.id == "url-suspicious-keyword"));
    }

    #[test]
    fn test_trusted_sender_produces_no_domain_score() {
        let result = engine().analyze("", "", "\"Support\" <help@paypal.com>");
        assert!(result.findings.iter().any(|f| f.id == "sender-trusted"));
        assert_eq!(result.details["domains"], 0.0);
    }

    #[test]
    fn test_suspicious_sender_domain_flagged() {
        let result = engine().analyze("", "", "x@secure-login-update.com");
        assert!(result
            .findings
            .iter()
            .any(|f| f.id == "sender-suspicious-domain" && f.severity == Severity::High));
    }

    #[test]
    fn test_attachment_extension_inside_url_not_flagged() {
        let result = engine().analyze("", "download http://cdn.example/build/setup.exe today", "a@b.com");
        assert!(!result
            .findings
            .iter()
            .any(|f| f.id == "attachment-suspicious"));

        let result = engine().analyze("", "run invoice_march.exe attached", "a@b.com");
        assert!(result
            .findings
            .iter()
            .any(|f| f.id == "attachment-suspicious"));
    }

    #[test]
    fn test_html_indicators() {
        let result = engine().analyze("", "<script>alert(1)</script><iframe src=x>", "a@b.com");
        assert!(result.findings.iter().any(|f| f.id == "html-scripting"));
        assert!(result.findings.iter().any(|f| f.id == "html-embedding"));
    }

    #[test]
    fn test_score_is_clamped() {
        let body = "verify your identity ".repeat(50);
        let result = engine().analyze("urgent", &body, "x@secure-login-update.com");
        assert!(result.score <= 100.0);
    }
}
