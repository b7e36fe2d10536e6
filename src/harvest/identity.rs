//! Canonical identity for harvested items.

use std::sync::OnceLock;

use regex::Regex;

/// Reduce a raw identity value to its canonical form.
///
/// Feeds rarely hand out clean identifiers: the identity field is usually a
/// permalink whose surrounding path varies between renders of the same item.
/// The durable part is the numeric identifier embedded in the path or query,
/// so that is what keys the collection. Values with no recognizable
/// identifier normalize to themselves, trimmed, making `normalize("42")` and
/// `normalize("/feed/status/42")` meet at the same key.
///
/// Pure and total. Empty or all-whitespace input yields an empty string,
/// which callers treat as "no identity".
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    for pattern in patterns() {
        if let Some(caps) = pattern.captures(trimmed) {
            if let Some(id) = caps.get(1) {
                return id.as_str().to_string();
            }
        }
    }
    trimmed.to_string()
}

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Timeline permalinks: /status/123, /statuses/123
            r"/status(?:es)?/(\d+)",
            // Query-string identifiers: ?id=123, &seq=123
            r"[?&](?:id|seq|no|idx|article_seq|articleNo)=(\d+)",
            // Path identifiers: /view/123, /notice/123
            r"/(?:view|notice|article|board)/(\d+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_links_reduce_to_their_id() {
        assert_eq!(normalize("/rustlang/status/1234567890"), "1234567890");
        assert_eq!(
            normalize("https://x.com/rustlang/status/1234567890?s=20"),
            "1234567890"
        );
        assert_eq!(normalize("/user/statuses/99"), "99");
    }

    #[test]
    fn query_and_path_identifiers_are_recognized() {
        assert_eq!(normalize("view.do?id=123&page=2"), "123");
        assert_eq!(normalize("/bbs/list?board_x=1&seq=456"), "456");
        assert_eq!(normalize("/notice/789"), "789");
        assert_eq!(normalize("/board/17"), "17");
    }

    #[test]
    fn bare_values_normalize_to_themselves() {
        assert_eq!(normalize("42"), "42");
        assert_eq!(normalize("  some plain title  "), "some plain title");
    }

    #[test]
    fn link_and_bare_forms_meet_at_the_same_key() {
        assert_eq!(normalize("/feed/status/42"), normalize("42"));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn earlier_patterns_win() {
        assert_eq!(normalize("/u/status/1?id=2"), "1");
    }
}
