//! Case-insensitive, Unicode-aware pattern matching over candidate text.

use regex::{Regex, RegexBuilder};

use crate::app::{Result, SluiceError};

pub struct RegexMatcher {
    patterns: Vec<Regex>,
}

impl RegexMatcher {
    /// Compile every pattern, failing on the first invalid one.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Compile what compiles; invalid patterns are returned alongside so
    /// callers can report them without losing the valid ones.
    pub fn lenient(patterns: &[String]) -> (Self, Vec<SluiceError>) {
        let mut compiled = Vec::new();
        let mut errors = Vec::new();
        for pattern in patterns {
            match compile(pattern) {
                Ok(re) => compiled.push(re),
                Err(e) => errors.push(e),
            }
        }
        (Self { patterns: compiled }, errors)
    }

    /// True iff at least one pattern matches anywhere in `text`.
    ///
    /// No patterns means no match.
    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .unicode(true)
        .build()
        .map_err(|e| SluiceError::InvalidConfiguration(format!("Invalid pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_pattern_list_matches_nothing() {
        let matcher = RegexMatcher::new(&[]).unwrap();
        assert!(!matcher.is_match("anything at all"));
        assert!(!matcher.is_match(""));
    }

    #[test]
    fn test_any_pattern_matches() {
        let matcher = RegexMatcher::new(&patterns(&["security", "release"])).unwrap();
        assert!(matcher.is_match("New release available"));
        assert!(matcher.is_match("security advisory"));
        assert!(!matcher.is_match("weekly digest"));
    }

    #[test]
    fn test_case_insensitive_unicode() {
        let matcher = RegexMatcher::new(&patterns(&["ÜBERSICHT", r"\bcafé\b"])).unwrap();
        assert!(matcher.is_match("eine übersicht"));
        assert!(matcher.is_match("Le CAFÉ est ouvert"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(RegexMatcher::new(&patterns(&["ok", "(unclosed"])).is_err());
    }

    #[test]
    fn test_lenient_keeps_valid_patterns() {
        let (matcher, errors) = RegexMatcher::lenient(&patterns(&["(unclosed", "release"]));
        assert_eq!(errors.len(), 1);
        assert!(matcher.is_match("release notes"));
    }
}
