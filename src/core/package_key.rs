//! Package keys - WHERE an external package lives.
//!
//! A package key names a git repository as `owner/repo` (on the default host)
//! or `host/owner/repo`. Full `https://` URLs are accepted on input and
//! normalized to the same key.

use std::fmt;
use std::str::FromStr;

use glob::Pattern;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::error::{Error, Result};

/// Host assumed when a key only names `owner/repo`.
pub const DEFAULT_HOST: &str = "github.com";

/// A normalized reference to a git-hosted package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    host: String,
    owner: String,
    repo: String,
}

impl PackageKey {
    /// Create a key from its parts, validating each segment.
    pub fn new(host: &str, owner: &str, repo: &str) -> Result<Self> {
        let host = host.to_ascii_lowercase();
        for (label, segment) in [("host", host.as_str()), ("owner", owner), ("repository", repo)] {
            if !is_valid_segment(segment) {
                return Err(Error::config(format!(
                    "invalid {} segment `{}` in package key",
                    label, segment
                )));
            }
        }
        Ok(PackageKey {
            host,
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The clone URL for this package.
    pub fn url(&self) -> String {
        format!("https://{}/{}/{}.git", self.host, self.owner, self.repo)
    }

    /// The fully qualified `host/owner/repo` form.
    pub fn qualified(&self) -> String {
        format!("{}/{}/{}", self.host, self.owner, self.repo)
    }

    /// Check the key against an allow-list pattern (see [`source_pattern`]).
    ///
    /// A pattern that does not compile matches nothing.
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        source_pattern(pattern).is_ok_and(|p| p.matches(&self.qualified()))
    }
}

/// Compile an allow-list pattern such as `acme/core`, `acme/*` or `gitlab.com/*`.
///
/// Patterns without a host are qualified with the default host. `*` also
/// matches `/`, so `gitlab.com/*` admits every repository on that host.
pub fn source_pattern(pattern: &str) -> Result<Pattern> {
    let pattern = pattern.trim().trim_end_matches(".git");
    let first = pattern.split('/').next().unwrap_or_default();
    let qualified = if pattern == "*" || first.contains('.') {
        pattern.to_string()
    } else {
        format!("{}/{}", DEFAULT_HOST, pattern)
    };
    Pattern::new(&qualified)
        .map_err(|e| Error::config(format!("invalid source pattern `{}`: {}", pattern, e)))
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl FromStr for PackageKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let path = without_scheme
            .trim_end_matches('/')
            .trim_end_matches(".git");

        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [owner, repo] if trimmed == without_scheme => {
                PackageKey::new(DEFAULT_HOST, owner, repo)
            }
            [host, owner, repo] if host.contains('.') => PackageKey::new(host, owner, repo),
            _ => Err(Error::config(format!(
                "invalid package key `{}` (expected `owner/repo` or `host/owner/repo`)",
                s
            ))),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host == DEFAULT_HOST {
            write!(f, "{}/{}", self.owner, self.repo)
        } else {
            write!(f, "{}/{}/{}", self.host, self.owner, self.repo)
        }
    }
}

impl Serialize for PackageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
