//! Fuzzy text matching for the non-quoted query path.
//!
//! Permissive by design: a query matches wherever its characters appear in
//! order, case-insensitively, anywhere in the line. Match location and gaps
//! are ignored; callers that need exact matching quote the query instead.

/// Case-insensitive subsequence match.
pub fn fuzzy_match(query: &str, target: &str) -> bool {
    if query.is_empty() {
        return true;
    }

    let mut pattern = query.chars().flat_map(|c| c.to_lowercase());
    let mut wanted = match pattern.next() {
        Some(c) => c,
        None => return true,
    };

    for c in target.chars().flat_map(|c| c.to_lowercase()) {
        if c == wanted {
            match pattern.next() {
                Some(next) => wanted = next,
                None => return true,
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_scattered_characters() {
        assert!(fuzzy_match("cutover", "2024 cutover scheduled"));
        assert!(fuzzy_match("ctvr", "cutover scheduled"));
    }

    #[test]
    fn is_case_insensitive() {
        assert!(fuzzy_match("ERROR", "transient error, retrying"));
        assert!(fuzzy_match("disk", "DISK COPY DONE"));
    }

    #[test]
    fn requires_order() {
        assert!(!fuzzy_match("ba", "abc"));
        assert!(fuzzy_match("ab", "a-x-b"));
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(fuzzy_match("", "anything"));
        assert!(fuzzy_match("", ""));
    }

    #[test]
    fn missing_characters_fail() {
        assert!(!fuzzy_match("xyz", "migration running"));
    }
}
