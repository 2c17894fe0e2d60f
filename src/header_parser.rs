//! Raw email header parsing.
//!
//! Turns raw header text into an ordered list of (name, value) pairs,
//! folding RFC 5322 continuation lines into the preceding value. Order is
//! preserved because hop counting depends on it.

/// Parse raw header text into ordered (name, value) pairs.
///
/// Lines starting with whitespace continue the previous header value.
/// Lines without a colon that do not continue anything are skipped.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header.
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            _ => {
                log::debug!("skipping malformed header line: {:?}", line);
            }
        }
    }

    headers
}

/// First value of a header, matched case-insensitively.
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    let name_lower = name.to_lowercase();
    headers
        .iter()
        .find(|(k, _)| k.to_lowercase() == name_lower)
        .map(|(_, v)| v.as_str())
}

/// All values of a header, matched case-insensitively, in order.
pub fn get_all_headers<'a>(headers: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    let name_lower = name.to_lowercase();
    headers
        .iter()
        .filter(|(k, _)| k.to_lowercase() == name_lower)
        .map(|(_, v)| v.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_headers() {
        let raw = "From: alice@example.com\nSubject: hello\n";
        let headers = parse_headers(raw);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0], ("From".to_string(), "alice@example.com".to_string()));
        assert_eq!(get_header(&headers, "subject"), Some("hello"));
    }

    #[test]
    fn test_folded_continuation_lines() {
        let raw = "Received: from mx1.example.com\n\tby mx2.example.com;\n Mon, 1 Jan 2024\nSubject: x\n";
        let headers = parse_headers(raw);
        assert_eq!(headers.len(), 2);
        assert_eq!(
            headers[0].1,
            "from mx1.example.com by mx2.example.com; Mon, 1 Jan 2024"
        );
    }

    #[test]
    fn test_repeated_headers_preserve_order() {
        let raw = "Received: hop1\nReceived: hop2\nReceived: hop3\n";
        let headers = parse_headers(raw);
        let received = get_all_headers(&headers, "Received");
        assert_eq!(received, vec!["hop1", "hop2", "hop3"]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let raw = "garbage without colon\nFrom: a@b.com\n";
        let headers = parse_headers(raw);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_headers("").is_empty());
        assert!(parse_headers("\n\n").is_empty());
    }
}
