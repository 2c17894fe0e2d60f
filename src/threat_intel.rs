//! Threat intelligence cache.
//!
//! Lazily fetches external domain/URL blocklists and merges them over a
//! bundled fallback. The cache populates at most once per process: the
//! first caller performs the fetch while later callers await the same
//! result, and the merged data is immutable until explicitly invalidated.

use crate::text_utils::normalize_domain;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Domains shipped with the crate so the reputation checks still work
/// when every external source is unreachable.
const BUNDLED_MALICIOUS_DOMAINS: &[&str] = &[
    "paypal-account-security.com",
    "secure-paypal-login.net",
    "microsoft-verify.net",
    "appleid-confirm.com",
    "amazon-billing-update.com",
    "chase-secure-alerts.com",
    "login-verification-required.com",
];

const BUNDLED_MALICIOUS_URLS: &[&str] = &[
    "http://paypal-account-security.com/login",
    "http://microsoft-verify.net/signin",
    "http://appleid-confirm.com/verify",
];

#[derive(Debug, Clone, Serialize)]
pub struct ThreatIntelData {
    pub malicious_domains: HashSet<String>,
    pub malicious_urls: HashSet<String>,
    pub last_updated: u64,
}

impl ThreatIntelData {
    fn bundled() -> Self {
        Self {
            malicious_domains: BUNDLED_MALICIOUS_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            malicious_urls: BUNDLED_MALICIOUS_URLS.iter().map(|u| u.to_string()).collect(),
            last_updated: unix_now(),
        }
    }

    /// Suffix-aware membership test: a listed domain also covers its
    /// subdomains.
    pub fn is_malicious_domain(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        if self.malicious_domains.contains(&domain) {
            return true;
        }
        self.malicious_domains
            .iter()
            .any(|listed| domain.ends_with(&format!(".{}", listed)))
    }

    /// Check subject/body text for any listed malicious URL substring.
    pub fn find_malicious_url(&self, text: &str) -> Option<&str> {
        self.malicious_urls
            .iter()
            .find(|u| text.contains(u.as_str()))
            .map(|u| u.as_str())
    }
}

pub struct ThreatIntelCache {
    sources: Vec<String>,
    client: reqwest::Client,
    // Held across the fetch so concurrent callers await the in-flight
    // request instead of starting their own.
    state: Mutex<Option<Arc<ThreatIntelData>>>,
}

impl ThreatIntelCache {
    pub fn new(sources: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("phishscore/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            sources,
            client,
            state: Mutex::new(None),
        }
    }

    /// Get the merged blocklist data, fetching sources on first use.
    pub async fn get(&self) -> Arc<ThreatIntelData> {
        let mut state = self.state.lock().await;
        if let Some(data) = state.as_ref() {
            return Arc::clone(data);
        }

        let data = Arc::new(self.build().await);
        *state = Some(Arc::clone(&data));
        data
    }

    /// Drop the memoized data so the next `get` rebuilds it.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        *state = None;
    }

    async fn build(&self) -> ThreatIntelData {
        let mut data = ThreatIntelData::bundled();

        for source in &self.sources {
            match self.fetch_source(source).await {
                Ok((domains, urls)) => {
                    log::debug!(
                        "threat intel source {} contributed {} domains, {} urls",
                        source,
                        domains.len(),
                        urls.len()
                    );
                    data.malicious_domains.extend(domains);
                    data.malicious_urls.extend(urls);
                }
                Err(e) => {
                    log::warn!("skipping unreachable threat intel source {}: {}", source, e);
                }
            }
        }

        data.last_updated = unix_now();
        data
    }

    async fn fetch_source(&self, url: &str) -> anyhow::Result<(Vec<String>, Vec<String>)> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_source_body(&body))
    }
}

/// Parse a blocklist payload: either a JSON document with a recognized
/// list-shaped field, or line-delimited text with `#` comments and
/// optional trailing comma-metadata.
pub fn parse_source_body(body: &str) -> (Vec<String>, Vec<String>) {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(entries) = json_list_entries(&value) {
            return split_entries(entries);
        }
    }

    let entries = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split(',').next().unwrap_or(line).trim().to_string())
        .collect();
    split_entries(entries)
}

fn json_list_entries(value: &serde_json::Value) -> Option<Vec<String>> {
    let array = if let Some(array) = value.as_array() {
        array
    } else {
        const LIST_FIELDS: &[&str] = &[
            "domains",
            "urls",
            "sites",
            "blocklist",
            "malicious_domains",
            "malicious_urls",
        ];
        LIST_FIELDS
            .iter()
            .find_map(|field| value.get(field).and_then(|v| v.as_array()))?
    };

    Some(
        array
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

fn split_entries(entries: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut domains = Vec::new();
    let mut urls = Vec::new();
    for entry in entries {
        if entry.starts_with("http://") || entry.starts_with("https://") {
            urls.push(entry);
        } else {
            domains.push(normalize_domain(&entry));
        }
    }
    (domains, urls)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_delimited_source() {
        let body = "# comment\nbad-domain.com\nevil.net,2024-01-01,manual\n\nhttp://evil.net/login\n";
        let (domains, urls) = parse_source_body(body);
        assert_eq!(domains, vec!["bad-domain.com", "evil.net"]);
        assert_eq!(urls, vec!["http://evil.net/login"]);
    }

    #[test]
    fn test_parse_json_object_source() {
        let body = r#"{"domains": ["spoof.example", "http://spoof.example/x"]}"#;
        let (domains, urls) = parse_source_body(body);
        assert_eq!(domains, vec!["spoof.example"]);
        assert_eq!(urls, vec!["http://spoof.example/x"]);
    }

    #[test]
    fn test_parse_json_array_source() {
        let body = r#"["a.com", "b.org"]"#;
        let (domains, urls) = parse_source_body(body);
        assert_eq!(domains, vec!["a.com", "b.org"]);
        assert!(urls.is_empty());
    }

    #[test]
    fn test_bundled_fallback_suffix_match() {
        let data = ThreatIntelData::bundled();
        assert!(data.is_malicious_domain("paypal-account-security.com"));
        assert!(data.is_malicious_domain("mail.paypal-account-security.com"));
        assert!(!data.is_malicious_domain("paypal.com"));
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_result() {
        let cache = ThreatIntelCache::new(Vec::new());
        let (first, second) = tokio::join!(cache.get(), cache.get());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_cache_memoizes_without_sources() {
        let cache = ThreatIntelCache::new(Vec::new());
        let first = cache.get().await;
        let second = cache.get().await;
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate().await;
        let third = cache.get().await;
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.malicious_domains, third.malicious_domains);
    }
}
