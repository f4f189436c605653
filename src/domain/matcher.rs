//! URL pattern matching for site and keyword rules.
//!
//! A site pattern matches a URL whose hostname is exactly the pattern or the
//! pattern prefixed by `www.`. Subdomains other than `www` do not match, and
//! neither does a host that merely ends with the pattern (`electrolux.com` is
//! not `x.com`). Keywords match anywhere in the URL.

use crate::domain::models::{Rule, RuleKind};
use url::Url;

pub fn matches_site(url: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => host_matches(parsed.host_str().unwrap_or(""), pattern),
        Err(_) => contains_ignore_case(url, pattern),
    }
}

pub fn matches_keyword(url: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    contains_ignore_case(url, keyword)
}

impl Rule {
    pub fn matches(&self, url: &str) -> bool {
        match self.kind {
            RuleKind::Url => matches_site(url, &self.value),
            RuleKind::Keyword => matches_keyword(url, &self.value),
        }
    }
}

fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.to_lowercase();
    let pattern = pattern.to_lowercase();
    host == pattern || host.strip_prefix("www.") == Some(pattern.as_str())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn site_matches_exact_and_www_hosts() {
        assert!(matches_site("https://x.com/home", "x.com"));
        assert!(matches_site("https://www.x.com/", "x.com"));
        assert!(matches_site("http://X.COM", "x.com"));
        assert!(matches_site("https://x.com:8443/path?q=1", "X.com"));
    }

    #[test]
    fn site_does_not_match_suffix_or_other_subdomains() {
        assert!(!matches_site("https://electrolux.com/", "x.com"));
        assert!(!matches_site("https://mail.x.com/", "x.com"));
        assert!(!matches_site("https://x.com.evil.example/", "x.com"));
    }

    #[test]
    fn site_pattern_with_path_never_matches_a_host() {
        assert!(!matches_site("https://x.com/feed", "x.com/feed"));
    }

    #[test]
    fn site_pattern_metacharacters_are_literal() {
        assert!(!matches_site("https://xycom/", "x.com"));
        assert!(!matches_site("https://abc.example/", "a.*"));
    }

    #[test]
    fn unparseable_url_falls_back_to_substring() {
        assert!(matches_site("not a url but mentions X.com", "x.com"));
        assert!(!matches_site("not a url", "x.com"));
    }

    #[test]
    fn url_without_host_does_not_match_site() {
        assert!(!matches_site("about:blank", "blank"));
        assert!(!matches_site("javascript:x.com", "x.com"));
    }

    #[test]
    fn keyword_matches_anywhere_case_insensitive() {
        assert!(matches_keyword("https://news.example/Casino-Night", "casino"));
        assert!(matches_keyword("https://casino.example/", "CASINO"));
        assert!(!matches_keyword("https://news.example/", "casino"));
    }

    #[test]
    fn empty_patterns_never_match() {
        assert!(!matches_site("https://x.com/", ""));
        assert!(!matches_site("garbage", "  "));
        assert!(!matches_keyword("https://x.com/", " "));
    }

    #[test]
    fn rule_dispatches_on_kind() {
        assert!(Rule::url("x.com").matches("https://www.x.com/"));
        assert!(!Rule::url("x.com").matches("https://electrolux.com/"));
        assert!(Rule::keyword("x.com").matches("https://electrolux.com/"));
    }

    fn label() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,8}"
    }

    // Property: a host matches a pattern iff it equals the pattern or www. + pattern
    proptest! {
        #[test]
        fn property_host_anchoring(
            host_label in label(),
            pattern_label in label(),
            prefix in prop::option::of(label()),
            tld in prop::sample::select(vec!["com", "org", "io"]),
        ) {
            let pattern = format!("{pattern_label}.{tld}");
            let host = match &prefix {
                Some(prefix) => format!("{prefix}.{host_label}.{tld}"),
                None => format!("{host_label}.{tld}"),
            };
            let url = format!("https://{}/path", host.to_uppercase());
            let expected = host == pattern || host == format!("www.{pattern}");
            prop_assert_eq!(matches_site(&url, &pattern), expected);
        }

        #[test]
        fn property_keyword_is_case_insensitive_substring(
            before in "[a-z/]{0,8}",
            keyword in "[a-z]{1,6}",
            after in "[a-z/]{0,8}",
        ) {
            let url = format!("https://site.example/{before}{}{after}", keyword.to_uppercase());
            prop_assert!(matches_keyword(&url, &keyword));
        }
    }
}
