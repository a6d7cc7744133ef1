/// Normalize a phone number for duplicate detection.
/// Strips everything except ASCII digits ("010-1234-5678" -> "01012345678").
pub fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a user-supplied phone query. Returns None when nothing digit-like
/// remains, so callers can reject the search up front.
pub fn normalize_query(query: &str) -> Option<String> {
    let normalized = normalize(query.trim());
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_everything_but_digits() {
        assert_eq!(normalize("010-1234-5678"), "01012345678");
        assert_eq!(normalize("+82 (10) 1234.5678"), "821012345678");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("no digits"), "");
    }

    #[test]
    fn query_rejects_blank_and_digitless_input() {
        assert_eq!(normalize_query("  "), None);
        assert_eq!(normalize_query("abc"), None);
        assert_eq!(normalize_query(" 010-0000-0001 "), Some("01000000001".into()));
    }
}
