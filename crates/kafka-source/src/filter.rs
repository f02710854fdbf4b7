use regex::bytes::Regex;

use crate::error::Result;

/// Regex search over marshalled output.
///
/// Keeps matching output, or with `reverse` only output that does not match.
#[derive(Debug, Clone)]
pub struct Filter {
    pattern: Regex,
    reverse: bool,
}

impl Filter {
    pub fn new(pattern: &str, reverse: bool) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            reverse,
        })
    }

    /// `None` when no search query was given.
    pub fn from_query(query: Option<&str>, reverse: bool) -> Result<Option<Self>> {
        query.map(|q| Self::new(q, reverse)).transpose()
    }

    pub fn keep(&self, output: &[u8]) -> bool {
        self.pattern.is_match(output) != self.reverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_kept_unless_reversed() {
        let filter = Filter::new("ok", false).unwrap();
        assert!(filter.keep(b"status=ok"));
        assert!(!filter.keep(b"status=failed"));

        let filter = Filter::new("ok", true).unwrap();
        assert!(!filter.keep(b"status=ok"));
        assert!(filter.keep(b"status=failed"));
    }

    #[test]
    fn test_no_query_means_no_filter() {
        assert!(Filter::from_query(None, true).unwrap().is_none());
        assert!(Filter::from_query(Some("ok"), false).unwrap().is_some());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Filter::new("(unclosed", false).unwrap_err();
        assert!(matches!(err, crate::Error::Filter(_)));
    }
}
