//! Ref policies: `latest`, `stable`, or a pinned literal.
//!
//! Resolution is pure: given the refs a remote advertises, pick one.

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::core::dependency::DEFAULT_REF;

/// How a declared ref is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Highest semantic version, pre-releases included.
    Latest,
    /// Highest semantic version without a pre-release qualifier.
    Stable,
    /// A literal tag, branch or commit.
    Pinned,
}

impl Policy {
    /// Classify a declared ref.
    pub fn of(declared: &str) -> Policy {
        match declared {
            "latest" => Policy::Latest,
            "stable" => Policy::Stable,
            _ => Policy::Pinned,
        }
    }

    /// Whether resolving this policy needs the remote's tag list.
    pub fn is_floating(self) -> bool {
        !matches!(self, Policy::Pinned)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Latest => write!(f, "latest"),
            Policy::Stable => write!(f, "stable"),
            Policy::Pinned => write!(f, "pinned"),
        }
    }
}

/// Result of resolving a policy against available refs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResolution {
    pub policy: Policy,
    pub git_ref: String,
    pub available_refs: Vec<String>,
}

/// Parse a ref as a semantic version, tolerating a leading `v`.
pub fn parse_version(git_ref: &str) -> Option<Version> {
    let bare = git_ref.strip_prefix('v').unwrap_or(git_ref);
    Version::parse(bare).ok()
}

/// Whether a semver ref carries a pre-release qualifier (`v2.0.0-beta`).
/// Other refs never count, however they are spelled.
pub fn is_prerelease(git_ref: &str) -> bool {
    parse_version(git_ref).is_some_and(|v| !v.pre.is_empty())
}

/// Semver-descending order; non-semver refs sort last, by name.
fn compare_refs(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => vb.cmp(&va).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Resolve a declared ref against the refs a remote advertises.
pub fn resolve_policy(declared: &str, available_refs: &[String]) -> PolicyResolution {
    let policy = Policy::of(declared);
    let mut sorted: Vec<String> = available_refs.to_vec();
    sorted.sort_by(|a, b| compare_refs(a, b));

    let git_ref = match policy {
        Policy::Pinned => declared.to_string(),
        Policy::Latest => sorted
            .iter()
            .find(|r| parse_version(r).is_some())
            .cloned()
            .unwrap_or_else(|| DEFAULT_REF.to_string()),
        Policy::Stable => sorted
            .iter()
            .find(|r| parse_version(r).is_some() && !is_prerelease(r))
            .cloned()
            .unwrap_or_else(|| DEFAULT_REF.to_string()),
    };

    tracing::debug!("policy {} for `{}` resolved to `{}`", policy, declared, git_ref);

    PolicyResolution {
        policy,
        git_ref,
        available_refs: sorted,
    }
}
