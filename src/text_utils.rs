//! Lexical utilities: address and domain extraction, domain hierarchy
//! matching, edit distance, and unicode/homoglyph heuristics.

/// Extract the email address from a From-style value.
///
/// Supports `"Display Name" <addr@domain>` and bare-address forms.
pub fn extract_address(from: &str) -> Option<String> {
    if let (Some(start), Some(end)) = (from.find('<'), from.rfind('>')) {
        if start < end {
            let addr = from[start + 1..end].trim();
            if addr.contains('@') {
                return Some(addr.to_lowercase());
            }
        }
    }

    from.split_whitespace()
        .find(|token| token.contains('@'))
        .map(|token| {
            token
                .trim_matches(|c| c == '<' || c == '>' || c == '"' || c == ',')
                .to_lowercase()
        })
}

/// Extract the display name from a From-style value, if any.
pub fn extract_display_name(from: &str) -> Option<String> {
    let name = match from.find('<') {
        Some(pos) => from[..pos].trim(),
        None => return None,
    };
    let name = name.trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Extract the domain from an email address.
pub fn extract_domain(address: &str) -> Option<String> {
    let domain = address.rsplit_once('@')?.1;
    let domain = domain.trim_matches(|c| c == '>' || c == '<' || c == ' ' || c == '.');
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}

/// Canonicalize a domain: lowercase, strip a leading "www.".
pub fn normalize_domain(domain: &str) -> String {
    let lower = domain.trim().trim_end_matches('.').to_lowercase();
    match lower.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

/// Check if a domain matches any entry in a list, treating list entries
/// as suffixes so subdomains of a listed domain match too.
pub fn domain_matches_list(domain: &str, list: &[String]) -> bool {
    let domain_lower = normalize_domain(domain);
    list.iter().any(|pattern| {
        let pattern_lower = pattern.to_lowercase();
        domain_lower == pattern_lower || domain_lower.ends_with(&format!(".{}", pattern_lower))
    })
}

/// The label a lookalike check compares against a brand name: the label
/// immediately left of the public suffix ("paypa1" in "mail.paypa1.com").
pub fn base_label(domain: &str) -> String {
    let normalized = normalize_domain(domain);
    let labels: Vec<&str> = normalized.split('.').collect();
    match labels.len() {
        0 => String::new(),
        1 => labels[0].to_string(),
        n => labels[n - 2].to_string(),
    }
}

/// The top-level domain label, without the dot.
pub fn tld(domain: &str) -> Option<String> {
    let normalized = normalize_domain(domain);
    normalized.rsplit_once('.').map(|(_, t)| t.to_string())
}

/// Classic dynamic-programming Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// True if the string contains any non-ASCII character, the cheap signal
/// for IDN/unicode spoofing.
pub fn has_non_ascii(s: &str) -> bool {
    s.chars().any(|c| !c.is_ascii())
}

/// Substitute digits that commonly stand in for visually similar letters
/// ("paypa1" -> "paypal"). Returns None if the string has no digits.
pub fn digit_homoglyph_variant(s: &str) -> Option<String> {
    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let variant: String = s
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'l',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '8' => 'b',
            other => other,
        })
        .collect();
    Some(variant)
}

/// Find an email address embedded inside free text (display names that
/// smuggle a different address are a spoofing tell).
pub fn find_embedded_address(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|token| {
            let token = token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '@' && c != '.');
            token.matches('@').count() == 1 && token.contains('.')
        })
        .and_then(extract_address_token)
}

fn extract_address_token(token: &str) -> Option<String> {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-' | '_' | '+'))
        .collect();
    if cleaned.contains('@') && cleaned.contains('.') {
        Some(cleaned.to_lowercase())
    } else {
        None
    }
}
