//! Sender reputation engine: brand impersonation, lookalike domains,
//! unicode spoofing, risky TLDs and threat-intel matches.
//!
//! Brand profiles and the trusted-domain set are built once per engine
//! instance from the pattern configuration. Every check except the
//! threat-intel ones is bypassed for domains already trusted.

use crate::config::PatternConfig;
use crate::engines::{clamp_score, EngineResult, Finding, FindingCategory, Severity};
use crate::text_utils::{
    base_label, digit_homoglyph_variant, domain_matches_list, extract_address,
    extract_display_name, extract_domain, find_embedded_address, has_non_ascii, levenshtein, tld,
};
use crate::threat_intel::ThreatIntelData;
use serde_json::json;
use std::sync::Arc;

/// Brand-name targets commonly borrowed by phishing templates, used in
/// addition to the configured trusted-domain brands.
const TEMPLATE_TARGET_BRANDS: &[&str] = &["netflix", "dropbox", "docusign", "facebook"];

#[derive(Debug, Clone)]
struct BrandProfile {
    name: String,
    /// Lowercased alphanumeric form used for containment checks.
    alias: String,
    /// Domains the brand legitimately sends from; a domain reusing the
    /// brand label outside this set is treated as an impersonation.
    home_domains: Vec<String>,
}

pub struct ReputationEngine {
    trusted_domains: Vec<String>,
    brands: Vec<BrandProfile>,
    suspicious_tlds: Vec<String>,
}

impl ReputationEngine {
    pub fn new(config: Arc<PatternConfig>) -> Self {
        let mut brands: Vec<BrandProfile> = config
            .trusted_domains
            .iter()
            .map(|(name, domains)| BrandProfile {
                name: name.to_lowercase(),
                alias: alias_of(name),
                home_domains: domains.iter().map(|d| d.to_lowercase()).collect(),
            })
            .collect();
        for name in TEMPLATE_TARGET_BRANDS {
            if !brands.iter().any(|b| b.name == *name) {
                brands.push(BrandProfile {
                    name: name.to_string(),
                    alias: alias_of(name),
                    home_domains: vec![format!("{}.com", name)],
                });
            }
        }

        Self {
            trusted_domains: config.all_trusted_domains(),
            brands,
            suspicious_tlds: config
                .suspicious_tlds
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    pub fn analyze(
        &self,
        subject: &str,
        body: &str,
        from: &str,
        intel: &ThreatIntelData,
    ) -> EngineResult {
        let mut score = 0.0;
        let mut findings = Vec::new();

        let display_name = extract_display_name(from);
        let address = extract_address(from);
        let domain = address.as_deref().and_then(extract_domain);

        let Some(domain) = domain else {
            return EngineResult {
                score: 0.0,
                findings: vec![Finding::new(
                    "sender-unparseable",
                    Severity::Low,
                    FindingCategory::Reputation,
                    "Sender address could not be parsed",
                )],
                details: json!({ "domain": null }),
            };
        };

        let trusted = domain_matches_list(&domain, &self.trusted_domains);
        let mut matched_brand: Option<String> = None;

        // Threat-intel hits apply regardless of trust status.
        if intel.is_malicious_domain(&domain) {
            score += 40.0;
            findings.push(Finding::new(
                "intel-domain",
                Severity::High,
                FindingCategory::Reputation,
                format!("Sender domain {} appears on a threat-intel blocklist", domain),
            ));
        }

        if !trusted {
            let label = base_label(&domain);

            if let Some(name) = &display_name {
                let name_lower = name.to_lowercase();
                if let Some(brand) = self
                    .brands
                    .iter()
                    .find(|b| name_lower.contains(&b.name) && !domain.contains(&b.alias))
                {
                    score += 40.0;
                    matched_brand = Some(brand.name.clone());
                    findings.push(Finding::new(
                        "brand-display-mismatch",
                        Severity::High,
                        FindingCategory::Reputation,
                        format!(
                            "Display name mentions {} but the sender domain {} does not belong to it",
                            brand.name, domain
                        ),
                    ));
                }
            }

            for brand in &self.brands {
                if brand.name.len() <= 3 {
                    continue;
                }
                let distance = levenshtein(&label, &brand.name);
                if distance > 2 {
                    continue;
                }
                // An exact brand label on one of the brand's own domains
                // is the brand itself, not a lookalike.
                if distance == 0 && domain_matches_list(&domain, &brand.home_domains) {
                    continue;
                }
                let (severity, weight, id) = if distance <= 1 {
                    (Severity::High, 40.0, "lookalike-domain")
                } else {
                    (Severity::Medium, 25.0, "lookalike-domain-weak")
                };
                let text = if distance == 0 {
                    format!(
                        "Domain {} reuses brand \"{}\" under a different registration",
                        domain, brand.name
                    )
                } else {
                    format!(
                        "Domain {} is {} edit(s) away from brand \"{}\"",
                        domain, distance, brand.name
                    )
                };
                score += weight;
                matched_brand.get_or_insert_with(|| brand.name.clone());
                findings.push(
                    Finding::new(id, severity, FindingCategory::Reputation, text)
                        .with_meta(json!({ "brand": brand.name, "distance": distance })),
                );
                break;
            }

            if let Some(brand) = self
                .brands
                .iter()
                .find(|b| label != b.alias && label.contains(&b.alias))
            {
                score += 40.0;
                matched_brand.get_or_insert_with(|| brand.name.clone());
                findings.push(Finding::new(
                    "brand-embedded",
                    Severity::High,
                    FindingCategory::Reputation,
                    format!(
                        "Domain {} embeds brand \"{}\" alongside extra tokens",
                        domain, brand.name
                    ),
                ));
            }

            if has_non_ascii(&domain)
                || display_name.as_deref().map(has_non_ascii).unwrap_or(false)
            {
                score += 25.0;
                findings.push(Finding::new(
                    "unicode-spoof",
                    Severity::Medium,
                    FindingCategory::Reputation,
                    "Sender uses non-ASCII characters that can mimic latin letters",
                ));
            }

            if let Some(variant) = digit_homoglyph_variant(&label) {
                if self.brands.iter().any(|b| b.name == variant) {
                    score += 25.0;
                    findings.push(Finding::new(
                        "digit-homoglyph",
                        Severity::Medium,
                        FindingCategory::Reputation,
                        format!("Domain label \"{}\" uses digits in place of letters", label),
                    ));
                }
            }

            if let (Some(name), Some(addr)) = (&display_name, &address) {
                if let Some(embedded) = find_embedded_address(name) {
                    if &embedded != addr {
                        score += 25.0;
                        findings.push(Finding::new(
                            "display-embedded-address",
                            Severity::Medium,
                            FindingCategory::Reputation,
                            format!("Display name carries a different address: {}", embedded),
                        ));
                    }
                }
            }

            if let Some(domain_tld) = tld(&domain) {
                if self.suspicious_tlds.contains(&domain_tld) {
                    score += 25.0;
                    findings.push(Finding::new(
                        "risky-tld",
                        Severity::Medium,
                        FindingCategory::Reputation,
                        format!("Domain uses a high-abuse TLD: .{}", domain_tld),
                    ));
                }
            }
        }

        let content = format!("{} {}", subject, body);
        if let Some(url) = intel.find_malicious_url(&content) {
            score += 40.0;
            findings.push(Finding::new(
                "intel-url",
                Severity::High,
                FindingCategory::Reputation,
                format!("Message contains a blocklisted URL: {}", url),
            ));
        }

        EngineResult {
            score: clamp_score(score),
            findings,
            details: json!({
                "domain": domain,
                "display_name": display_name,
                "trusted": trusted,
                "matched_brand": matched_brand,
            }),
        }
    }
}

fn alias_of(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
