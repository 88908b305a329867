//! MQTT-style topic matching: single-level `+` and multi-level `#` wildcards.
//!
//! Used both by the bus's own subscription bookkeeping and by `mecctl-handlers` to pick
//! the right handler for an inbound topic by longest-prefix match, per the §4.1
//! contract that callbacks are dispatched by the most specific registered pattern.

/// Does `topic` match `pattern`? Both are `/`-separated. `+` matches exactly one
/// segment, `#` (only legal as the final segment) matches zero or more remaining
/// segments.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut p = pattern.split('/');
    let mut t = topic.split('/');
    loop {
        match (p.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(ps), Some(ts)) if ps == ts => continue,
            (Some(_), _) => return false,
            (None, None) => return true,
            (None, Some(_)) => return false,
        }
    }
}

/// Number of non-wildcard leading segments a pattern fixes; used to rank candidate
/// patterns so the *most specific* match wins when more than one subscribed pattern
/// matches the same topic (§4.1: "longest-prefix match").
pub fn pattern_specificity(pattern: &str) -> usize {
    pattern
        .split('/')
        .take_while(|seg| *seg != "+" && *seg != "#")
        .count()
}

/// Picks the most specific pattern (and its associated value) that matches `topic`.
pub fn longest_prefix_match<'a, T>(
    candidates: impl IntoIterator<Item = (&'a str, T)>,
    topic: &str,
) -> Option<T> {
    candidates
        .into_iter()
        .filter(|(pattern, _)| topic_matches(pattern, topic))
        .max_by_key(|(pattern, _)| pattern_specificity(pattern))
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_matches_single_segment() {
        assert!(topic_matches("allocated/+", "allocated/U1"));
        assert!(!topic_matches("allocated/+", "allocated/U1/extra"));
    }

    #[test]
    fn hash_matches_multi_segment_tail() {
        assert!(topic_matches("monitor/#", "monitor/eu/U1"));
        assert!(topic_matches("monitor/#", "monitor"));
        assert!(topic_matches("LWT/#", "LWT/edge/edge01"));
    }

    #[test]
    fn exact_segments_must_match() {
        assert!(!topic_matches("discover", "discovers"));
        assert!(topic_matches("discover", "discover"));
    }

    #[test]
    fn longest_prefix_wins_over_wildcard() {
        let candidates = vec![("migrate_report/+/+", "generic"), ("migrate_report/source/+", "specific")];
        let picked = longest_prefix_match(candidates, "migrate_report/source/edge01");
        assert_eq!(picked, Some("specific"));
    }
}
