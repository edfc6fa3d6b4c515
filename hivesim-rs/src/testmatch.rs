use regex::Regex;

/// Selects suites and tests from a `suite/test` pattern, as given in
/// HIVE_TEST_PATTERN. Both halves are case insensitive regular expressions.
#[derive(Clone, Debug)]
pub struct TestMatcher {
    pub suite: Regex,
    pub test: Regex,
    pub pattern: String,
}

impl TestMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let parts = Self::split_regexp(pattern);
        let (suite, test) = match parts.split_first() {
            Some((suite, rest)) if !rest.is_empty() => (*suite, rest.join("/")),
            Some((suite, _)) => (*suite, String::new()),
            None => ("", String::new()),
        };
        Ok(Self {
            suite: Regex::new(&format!("(?i:{suite})"))?,
            test: Regex::new(&format!("(?i:{test})"))?,
            pattern: pattern.to_string(),
        })
    }

    /// An empty `test` only checks the suite half.
    pub fn match_test(&self, suite: &str, test: &str) -> bool {
        if !self.suite.is_match(suite) {
            return false;
        }
        test.is_empty() || self.test.is_match(test)
    }

    /// Splits the pattern on `/`, except inside `[...]`, `(...)` or after a `\`.
    fn split_regexp(pattern: &str) -> Vec<&str> {
        let bytes = pattern.as_bytes();
        let mut parts = Vec::with_capacity(pattern.matches('/').count() + 1);
        let mut start = 0;
        let mut brackets = 0usize;
        let mut parens = 0isize;
        let mut index = 0;
        while index < bytes.len() {
            match bytes[index] {
                b'[' => brackets += 1,
                b']' => brackets = brackets.saturating_sub(1),
                b'(' if brackets == 0 => parens += 1,
                b')' if brackets == 0 => parens -= 1,
                b'\\' => index += 1,
                b'/' if brackets == 0 && parens == 0 => {
                    parts.push(&pattern[start..index]);
                    start = index + 1;
                }
                _ => {}
            }
            index += 1;
        }
        parts.push(&pattern[start.min(pattern.len())..]);
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_regexp() {
        assert_eq!(TestMatcher::split_regexp("suite/test"), vec!["suite", "test"]);
        assert_eq!(
            TestMatcher::split_regexp("suite/test/1/2"),
            vec!["suite", "test", "1", "2"]
        );
        assert_eq!(TestMatcher::split_regexp("[a/b]/c"), vec!["[a/b]", "c"]);
        assert_eq!(TestMatcher::split_regexp("(a/b)/c"), vec!["(a/b)", "c"]);
        assert_eq!(TestMatcher::split_regexp(r"a\/b/c"), vec![r"a\/b", "c"]);
        assert_eq!(TestMatcher::split_regexp("suite"), vec!["suite"]);
    }

    #[test]
    fn test_match_test() {
        let matcher = TestMatcher::new("p2p/testnet").unwrap();

        assert!(matcher.match_test("optimism p2p", "simple p2p testnet"));
        assert!(matcher.match_test("Optimism P2P", "TESTNET"));
        assert!(!matcher.match_test("optimism p2p", "sync"));
        assert!(!matcher.match_test("engine", "testnet"));

        let matcher = TestMatcher::new("/testnet").unwrap();
        assert!(matcher.match_test("anything", "simple p2p testnet"));
        assert!(matcher.match_test("", "Testnet"));
    }

    #[test]
    fn test_match_suite() {
        let matcher = TestMatcher::new("p2p").unwrap();

        assert!(matcher.match_test("optimism p2p", ""));
        assert!(matcher.match_test("optimism P2P", "any test"));
        assert!(!matcher.match_test("optimism engine", ""));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(TestMatcher::new("suite/(").is_err());
    }
}
