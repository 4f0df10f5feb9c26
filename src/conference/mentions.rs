//! Mention extraction
//!
//! An agent is mentioned when its id appears anywhere in the text, case
//! insensitively. `@id` is covered by the same match.

/// Known ids mentioned in `content`, ordered by first appearance.
/// `exclude` (the sender) is never returned.
pub fn extract_mentions(content: &str, known_ids: &[String], exclude: &str) -> Vec<String> {
    let lowered = content.to_lowercase();

    let mut hits: Vec<(usize, &String)> = known_ids
        .iter()
        .filter(|id| !id.trim().is_empty() && !id.eq_ignore_ascii_case(exclude))
        .filter_map(|id| lowered.find(&id.to_lowercase()).map(|pos| (pos, id)))
        .collect();
    hits.sort_by_key(|(pos, _)| *pos);
    hits.dedup_by(|a, b| a.1 == b.1);

    hits.into_iter().map(|(_, id)| id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_at_and_substring_mentions() {
        let known = ids(&["alden", "kimi-k2", "vault"]);
        let found = extract_mentions("@Kimi-K2 please sync with Alden", &known, "user");
        assert_eq!(found, vec!["kimi-k2", "alden"]);
    }

    #[test]
    fn test_sender_is_excluded() {
        let known = ids(&["alden", "alice"]);
        assert_eq!(extract_mentions("alden here, alice?", &known, "alden"), vec!["alice"]);
    }

    #[test]
    fn test_no_mentions() {
        let known = ids(&["vault"]);
        assert!(extract_mentions("nothing to see", &known, "user").is_empty());
    }
}
