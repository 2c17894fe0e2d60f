//! Header authentication engine.
//!
//! Interprets SPF/DKIM/DMARC results, counts delivery hops, flags headers
//! typical of scripted senders and checks From/Return-Path consistency.
//! Empty header text produces a zero result; unparseable text degrades to
//! a single low-severity finding instead of an error.

use crate::engines::{clamp_score, EngineResult, Finding, FindingCategory, Severity};
use crate::header_parser::{get_all_headers, get_header, parse_headers};
use crate::text_utils::{extract_address, extract_domain};
use serde::Serialize;
use serde_json::json;

const MAX_NORMAL_HOPS: usize = 5;

/// Header names associated with scripted or bulk-automation senders.
const SUSPICIOUS_HEADERS: &[&str] = &[
    "X-PHP-Originating-Script",
    "X-PHP-Script",
    "X-Authenticated-Sender",
    "X-AntiAbuse",
];

const SUSPICIOUS_AGENT_TOKENS: &[&str] = &["php", "python", "perl", "curl", "wget", "bot", "crawler"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Pass,
    Fail,
    SoftFail,
    Unknown,
}

impl AuthStatus {
    fn label(&self) -> &'static str {
        match self {
            AuthStatus::Pass => "pass",
            AuthStatus::Fail => "fail",
            AuthStatus::SoftFail => "softfail",
            AuthStatus::Unknown => "unknown",
        }
    }
}

pub struct HeaderEngine;

impl HeaderEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, raw_headers: &str) -> EngineResult {
        if raw_headers.trim().is_empty() {
            return EngineResult::empty();
        }

        let headers = parse_headers(raw_headers);
        if headers.is_empty() {
            // Non-empty text that yielded nothing parseable.
            return EngineResult {
                score: 0.0,
                findings: vec![Finding::new(
                    "header-error",
                    Severity::Low,
                    FindingCategory::Headers,
                    "Header text could not be parsed",
                )],
                details: json!({ "parse_error": true }),
            };
        }

        let mut score = 0.0;
        let mut findings = Vec::new();

        let spf = self.spf_status(&headers);
        match spf {
            AuthStatus::Fail => {
                score += 35.0;
                findings.push(Finding::new(
                    "spf-fail",
                    Severity::High,
                    FindingCategory::Authentication,
                    "SPF check failed for the sending server",
                ));
            }
            AuthStatus::SoftFail => {
                score += 20.0;
                findings.push(Finding::new(
                    "spf-softfail",
                    Severity::Medium,
                    FindingCategory::Authentication,
                    "SPF soft-failed for the sending server",
                ));
            }
            _ => {}
        }

        let dkim = self.dkim_status(&headers);
        if dkim == AuthStatus::Fail {
            score += 35.0;
            findings.push(Finding::new(
                "dkim-fail",
                Severity::High,
                FindingCategory::Authentication,
                "DKIM signature verification failed",
            ));
        }

        let dmarc = self.dmarc_status(&headers);
        if dmarc == AuthStatus::Fail {
            score += 25.0;
            findings.push(Finding::new(
                "dmarc-fail",
                Severity::Medium,
                FindingCategory::Authentication,
                "DMARC policy evaluation failed",
            ));
        }

        let hops = get_all_headers(&headers, "Received").len();
        if hops > MAX_NORMAL_HOPS {
            score += 15.0;
            findings.push(Finding::new(
                "excessive-hops",
                Severity::Medium,
                FindingCategory::Routing,
                format!("Unusual delivery path: {} relay hops", hops),
            ));
        }

        for name in SUSPICIOUS_HEADERS {
            if get_header(&headers, name).is_some() {
                score += 5.0;
                findings.push(Finding::new(
                    "suspicious-header",
                    Severity::Low,
                    FindingCategory::Headers,
                    format!("Header {} suggests a scripted sender", name),
                ));
            }
        }

        if let Some(agent) = get_header(&headers, "User-Agent") {
            let agent_lower = agent.to_lowercase();
            if let Some(token) = SUSPICIOUS_AGENT_TOKENS
                .iter()
                .find(|t| agent_lower.contains(**t))
            {
                score += 5.0;
                findings.push(Finding::new(
                    "suspicious-user-agent",
                    Severity::Low,
                    FindingCategory::Headers,
                    format!("User-Agent mentions \"{}\"", token),
                ));
            }
        }

        if let Some(finding) = self.check_domain_mismatch(&headers) {
            score += 20.0;
            findings.push(finding);
        }

        EngineResult {
            score: clamp_score(score),
            findings,
            details: json!({
                "spf": spf.label(),
                "dkim": dkim.label(),
                "dmarc": dmarc.label(),
                "hops": hops,
            }),
        }
    }

    fn spf_status(&self, headers: &[(String, String)]) -> AuthStatus {
        let Some(value) = get_header(headers, "Received-SPF") else {
            return AuthStatus::Unknown;
        };
        let value = value.to_lowercase();
        if value.contains("softfail") {
            AuthStatus::SoftFail
        } else if value.contains("fail") {
            AuthStatus::Fail
        } else if value.contains("pass") {
            AuthStatus::Pass
        } else {
            AuthStatus::Unknown
        }
    }

    fn dkim_status(&self, headers: &[(String, String)]) -> AuthStatus {
        // A present signature counts as pass; without one, fall back to
        // the receiving server's recorded verdict.
        if get_header(headers, "DKIM-Signature").is_some() {
            return AuthStatus::Pass;
        }
        if let Some(results) = get_header(headers, "Authentication-Results") {
            let results = results.to_lowercase();
            if results.contains("dkim=pass") {
                return AuthStatus::Pass;
            }
            if results.contains("dkim=fail") {
                return AuthStatus::Fail;
            }
        }
        AuthStatus::Unknown
    }

    fn dmarc_status(&self, headers: &[(String, String)]) -> AuthStatus {
        let Some(results) = get_header(headers, "Authentication-Results") else {
            return AuthStatus::Unknown;
        };
        let results = results.to_lowercase();
        if results.contains("dmarc=pass") {
            AuthStatus::Pass
        } else if results.contains("dmarc=fail") {
            AuthStatus::Fail
        } else {
            AuthStatus::Unknown
        }
    }

    fn check_domain_mismatch(&self, headers: &[(String, String)]) -> Option<Finding> {
        let from_domain = get_header(headers, "From")
            .and_then(extract_address)
            .and_then(|a| extract_domain(&a))?;
        let return_domain = get_header(headers, "Return-Path")
            .and_then(extract_address)
            .and_then(|a| extract_domain(&a))?;

        if from_domain != return_domain {
            Some(Finding::new(
                "return-path-mismatch",
                Severity::Medium,
                FindingCategory::Headers,
                format!(
                    "From domain {} does not match Return-Path domain {}",
                    from_domain, return_domain
                ),
            ))
        } else {
            None
        }
    }
}

impl Default for HeaderEngine {
    fn default() -> Self {
        Self::new()
    }
}
