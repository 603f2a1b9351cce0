use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use url::Url;

use crate::error::MinerError;

/// An absolute http(s) URL that passed validation.
///
/// Keeps the trimmed input string alongside the parsed form: store paths are
/// derived from what the user wrote, not from the normalised `Url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceUrl {
    raw: String,
    parsed: Url,
}

impl SourceUrl {
    pub fn parse(input: &str) -> Result<Self, MinerError> {
        let raw = input.trim();
        let invalid = |reason: &str| MinerError::InvalidInput {
            input: raw.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        match parsed.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(invalid("missing host")),
        }

        Ok(Self {
            raw: raw.to_string(),
            parsed,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.parsed
    }

    pub fn host(&self) -> &str {
        self.parsed.host_str().unwrap_or_default()
    }

    /// The input with its scheme prefix (`https://`) removed.
    pub fn without_scheme(&self) -> &str {
        self.raw
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.raw)
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a newline-delimited URL list into trimmed, non-blank lines.
///
/// Lines are not validated here; the acquisition pipeline rejects bad ones
/// individually so one typo never sinks the batch.
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list {}", path.display()))?;
    Ok(parse_url_list(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(SourceUrl::parse("https://example.com/a").is_ok());
        assert!(SourceUrl::parse("http://example.com").is_ok());
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let url = SourceUrl::parse("  https://example.com/a \n").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["not a url", "", "example.com/a", "ftp://example.com/file", "https://"] {
            let err = SourceUrl::parse(bad).unwrap_err();
            assert!(
                matches!(err, MinerError::InvalidInput { .. }),
                "expected InvalidInput for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn strips_only_the_scheme() {
        let url = SourceUrl::parse("https://example.com/blog/post").unwrap();
        assert_eq!(url.without_scheme(), "example.com/blog/post");
        assert_eq!(url.host(), "example.com");
    }

    #[test]
    fn url_list_skips_blank_lines() {
        let lines = parse_url_list("https://a.com\n\n  https://b.com/x  \n   \nnot a url\n");
        assert_eq!(lines, vec!["https://a.com", "https://b.com/x", "not a url"]);
    }
}
