//! Builds one combined regex from a set of [`UrlPattern`]s, matching the
//! CDX line grammar: SURT key, whitespace, 14-digit timestamp, whitespace,
//! JSON headers blob.

use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::collections::BTreeSet;

use crate::error::AppError;
use crate::model::UrlPattern;

/// A single compiled regex over the CDX line grammar, either text- or
/// byte-oriented depending on whether an encoding was supplied.
pub enum PatternRegex {
    Text(Regex),
    Bytes(BytesRegex),
}

pub struct Match {
    pub tld: String,
    pub domain: String,
    pub subdomain: String,
    pub path: String,
    pub timestamp: String,
    pub headers: String,
}

impl PatternRegex {
    /// Builds and compiles a regex from `patterns`. `encoding` selects a
    /// byte-string regex (currently only meaningful as a marker: named
    /// byte encodings beyond UTF-8 are not implemented, matching this
    /// crate's Non-goal of supporting only gzip/UTF-8 CDX content; a
    /// caller passing `Some(_)` gets a `regex::bytes::Regex` compiled
    /// against the same pattern, for matching against raw bytes instead
    /// of a decoded `&str`).
    pub fn build(patterns: &[UrlPattern], encoding: Option<&str>) -> Result<Self, AppError> {
        let source = Self::assemble(patterns);
        if encoding.is_some() {
            let re = BytesRegex::new(&source)
                .map_err(|e| AppError::Invariant(format!("bad pattern regex: {e}")))?;
            Ok(PatternRegex::Bytes(re))
        } else {
            let re = Regex::new(&source)
                .map_err(|e| AppError::Invariant(format!("bad pattern regex: {e}")))?;
            Ok(PatternRegex::Text(re))
        }
    }

    fn assemble(patterns: &[UrlPattern]) -> String {
        let tlds = Self::unique_sorted(patterns, |p| p.tld.as_deref());
        let domains = Self::unique_sorted(patterns, |p| p.domain.as_deref());
        let subdomains = Self::unique_sorted(patterns, |p| p.subdomain.as_deref());
        let paths = Self::unique_sorted(patterns, |p| p.path.as_deref());

        let tld_alt = if tlds.is_empty() {
            ".*".to_string()
        } else {
            tlds.into_iter().collect::<Vec<_>>().join("|")
        };
        let domain_alt = if domains.is_empty() {
            ".*".to_string()
        } else {
            domains.into_iter().collect::<Vec<_>>().join("|")
        };

        let mut out = format!("(?i)^(?P<tld>{tld_alt}),(?P<domain>{domain_alt}),?");

        if !subdomains.is_empty() {
            let alt = subdomains.into_iter().collect::<Vec<_>>().join("|");
            out.push_str(&format!("(?P<subdomain>{alt})\\)"));
        } else {
            out.push_str(r"[^)]*\)");
        }

        if !paths.is_empty() {
            let alt = paths.into_iter().collect::<Vec<_>>().join("|");
            out.push_str(&format!("(?P<path>/?(?:{alt}).*)"));
        } else {
            out.push_str(".*");
        }

        out.push_str(r"\s+(?P<timestamp>\d+).*?\s+(?P<headers>\{.*\})$");
        out
    }

    fn unique_sorted<'a>(
        patterns: &'a [UrlPattern],
        field: impl Fn(&'a UrlPattern) -> Option<&'a str>,
    ) -> BTreeSet<&'a str> {
        patterns.iter().filter_map(field).collect()
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            PatternRegex::Text(re) => re.is_match(line),
            PatternRegex::Bytes(re) => re.is_match(line.as_bytes()),
        }
    }

    /// Full-string match, returning the named groups the scanner needs.
    pub fn match_line(&self, line: &str) -> Option<Match> {
        match self {
            PatternRegex::Text(re) => {
                let caps = re.captures(line)?;
                Some(Match {
                    tld: caps.name("tld")?.as_str().to_string(),
                    domain: caps.name("domain")?.as_str().to_string(),
                    subdomain: caps
                        .name("subdomain")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                    path: caps
                        .name("path")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                    timestamp: caps.name("timestamp")?.as_str().to_string(),
                    headers: caps.name("headers")?.as_str().to_string(),
                })
            }
            PatternRegex::Bytes(re) => {
                let caps = re.captures(line.as_bytes())?;
                let as_str = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
                Some(Match {
                    tld: as_str(caps.name("tld")?.as_bytes()),
                    domain: as_str(caps.name("domain")?.as_bytes()),
                    subdomain: caps
                        .name("subdomain")
                        .map(|m| as_str(m.as_bytes()))
                        .unwrap_or_default(),
                    path: caps
                        .name("path")
                        .map(|m| as_str(m.as_bytes()))
                        .unwrap_or_default(),
                    timestamp: as_str(caps.name("timestamp")?.as_bytes()),
                    headers: as_str(caps.name("headers")?.as_bytes()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_line() -> &'static str {
        r#"com,example,www)/ 20240101120000 {"url":"http://www.example.com/","filename":"crawl-data/X.warc.gz","length":"100","status":"200"}"#
    }

    #[test]
    fn matches_single_pattern() {
        let patterns = vec![UrlPattern::new("com", "example")];
        let regex = PatternRegex::build(&patterns, None).unwrap();
        let m = regex.match_line(example_line()).expect("should match");
        assert_eq!(m.tld, "com");
        assert_eq!(m.domain, "example");
        assert_eq!(m.subdomain, "www");
        assert_eq!(m.timestamp, "20240101120000");
    }

    #[test]
    fn no_match_for_other_domain() {
        let patterns = vec![UrlPattern::new("com", "other")];
        let regex = PatternRegex::build(&patterns, None).unwrap();
        assert!(!regex.is_match(example_line()));
    }

    #[test]
    fn omits_subdomain_group_when_absent_everywhere() {
        let patterns = vec![UrlPattern::new("com", "example")];
        let source = PatternRegex::assemble(&patterns);
        assert!(!source.contains("(?P<subdomain>"));
    }

    #[test]
    fn collapses_path_to_wildcard_when_absent() {
        let patterns = vec![UrlPattern::new("com", "example")];
        let source = PatternRegex::assemble(&patterns);
        assert!(!source.contains("(?P<path>"));
    }
}
