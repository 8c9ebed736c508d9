//! Subject/resource/action matchers: exact strings, `*` wildcard, and prefix globs
//! (`"prefix*"`). No regex dependency — glob syntax is limited to a prefix match, so
//! byte-prefix comparison is sufficient.

/// A single matcher pattern, with a specificity ranking used for tie-breaking:
/// exact match is more specific than any prefix glob, and a longer prefix glob is
/// more specific than a shorter one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Exact(String),
    Prefix(String),
    Wildcard,
}

impl Matcher {
    /// Parses `"*"` as [`Matcher::Wildcard`], `"foo*"` as `Matcher::Prefix("foo")`,
    /// and anything else as an exact match.
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Matcher::Wildcard
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            Matcher::Prefix(prefix.to_string())
        } else {
            Matcher::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(s) => s == value,
            Matcher::Prefix(prefix) => value.starts_with(prefix.as_str()),
            Matcher::Wildcard => true,
        }
    }

    /// Specificity score for tie-breaking: higher wins. Exact beats every prefix
    /// length; among prefixes, longer beats shorter; wildcard is least specific.
    pub fn specificity(&self) -> usize {
        match self {
            Matcher::Exact(s) => s.len() + 1_000_000,
            Matcher::Prefix(prefix) => prefix.len(),
            Matcher::Wildcard => 0,
        }
    }
}

/// The most specific matcher in `matchers` that matches `value`, if any.
pub fn best_match<'a>(matchers: &'a [Matcher], value: &str) -> Option<&'a Matcher> {
    matchers.iter().filter(|m| m.matches(value)).max_by_key(|m| m.specificity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_wildcard_and_prefix() {
        assert_eq!(Matcher::parse("foo"), Matcher::Exact("foo".to_string()));
        assert_eq!(Matcher::parse("*"), Matcher::Wildcard);
        assert_eq!(Matcher::parse("foo*"), Matcher::Prefix("foo".to_string()));
    }

    #[test]
    fn exact_matches_only_itself() {
        let m = Matcher::parse("read");
        assert!(m.matches("read"));
        assert!(!m.matches("readonly"));
    }

    #[test]
    fn prefix_matches_anything_starting_with_it() {
        let m = Matcher::parse("docs/*");
        assert!(m.matches("docs/intro"));
        assert!(!m.matches("images/intro"));
    }

    #[test]
    fn wildcard_matches_everything() {
        let m = Matcher::parse("*");
        assert!(m.matches("anything"));
        assert!(m.matches(""));
    }

    #[test]
    fn best_match_prefers_exact_over_wildcard() {
        let matchers = vec![Matcher::parse("*"), Matcher::parse("read")];
        let best = best_match(&matchers, "read").unwrap();
        assert_eq!(*best, Matcher::Exact("read".to_string()));
    }

    #[test]
    fn best_match_prefers_longer_prefix() {
        let matchers = vec![Matcher::parse("docs*"), Matcher::parse("docs/private*")];
        let best = best_match(&matchers, "docs/private/file").unwrap();
        assert_eq!(*best, Matcher::Prefix("docs/private".to_string()));
    }

    #[test]
    fn best_match_returns_none_when_nothing_matches() {
        let matchers = vec![Matcher::parse("docs*")];
        assert!(best_match(&matchers, "images/foo").is_none());
    }
}
