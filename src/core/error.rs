//! Error taxonomy for resolution, fetching and loading.
//!
//! Errors are structured values. The library does not log them; callers turn
//! them into [`Diagnostic`]s and decide how to render them and which exit code
//! to use.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::package_key::PackageKey;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Result alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the resolution core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed manifest, mutually exclusive fields, sandbox violation,
    /// unknown ref, or a missing manifest for an external import.
    #[error("{message}")]
    Config {
        message: String,
        help: Option<String>,
    },

    /// Remote unreachable or authentication failure.
    ///
    /// `transient` is set for connection-level faults worth retrying; auth
    /// failures and missing repositories are not.
    #[error("failed to reach `{package}`: {message}")]
    Network {
        package: String,
        message: String,
        transient: bool,
    },

    /// Malformed source, manifest or lock file syntax.
    #[error("failed to parse {location}: {message}")]
    Parse { location: String, message: String },

    /// Package-level circular dependency.
    #[error("circular package dependency: {}", format_cycles(.cycles))]
    Cycle { cycles: Vec<Vec<PackageKey>> },

    /// Missing package, file or lock entry.
    #[error("{what} not found: {name}")]
    NotFound {
        what: &'static str,
        name: String,
        help: Option<String>,
    },

    /// Local filesystem failure.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_cycles(cycles: &[Vec<PackageKey>]) -> String {
    cycles
        .iter()
        .map(|cycle| format_cycle(cycle))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render a cycle as `a -> b -> c -> a`.
pub fn format_cycle(cycle: &[PackageKey]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(|k| k.to_string()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

impl Error {
    /// A configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            help: None,
        }
    }

    /// A configuration error with a suggested fix.
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// A transient network error for a package.
    pub fn network(package: impl ToString, message: impl Into<String>) -> Self {
        Error::Network {
            package: package.to_string(),
            message: message.into(),
            transient: true,
        }
    }

    /// A network error that retrying will not fix.
    pub fn network_permanent(package: impl ToString, message: impl Into<String>) -> Self {
        Error::Network {
            package: package.to_string(),
            message: message.into(),
            transient: false,
        }
    }

    /// A parse error at a location (file path or URI).
    pub fn parse(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            location: location.into(),
            message: message.into(),
        }
    }

    /// A not-found error.
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            what,
            name: name.into(),
            help: None,
        }
    }

    /// A not-found error with a suggested fix.
    pub fn not_found_with_help(
        what: &'static str,
        name: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        Error::NotFound {
            what,
            name: name.into(),
            help: Some(help.into()),
        }
    }

    /// An I/O error at a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network { transient: true, .. })
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Error::Config { message, help } => {
                let diag = Diagnostic::error(message.clone());
                match help {
                    Some(help) => diag.with_suggestion(help.clone()),
                    None => diag,
                }
            }
            Error::Network {
                package, message, ..
            } => {
                Diagnostic::error(format!("could not reach the remote for `{}`", package))
                    .with_context(message.clone())
                    .with_suggestion(suggestions::FETCH_FAILED)
            }
            Error::Parse { location, message } => {
                Diagnostic::error(format!("failed to parse {}", location))
                    .with_context(message.clone())
            }
            Error::Cycle { cycles } => {
                let mut diag = Diagnostic::error("circular package dependency");
                for cycle in cycles {
                    diag = diag.with_context(format!("cycle: {}", format_cycle(cycle)));
                }
                diag.with_suggestion(suggestions::BREAK_CYCLE)
            }
            Error::NotFound { what, name, help } => {
                let diag = Diagnostic::error(format!("{} not found: {}", what, name));
                match help {
                    Some(help) => diag.with_suggestion(help.clone()),
                    None => diag,
                }
            }
            Error::Io { path, source } => {
                Diagnostic::error(source.to_string()).with_location(path.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_reports_full_path() {
        let cycle: Vec<PackageKey> = ["acme/a", "acme/b", "acme/c"]
            .iter()
            .map(|k| k.parse().unwrap())
            .collect();
        let err = Error::Cycle {
            cycles: vec![cycle],
        };

        assert_eq!(
            err.to_string(),
            "circular package dependency: acme/a -> acme/b -> acme/c -> acme/a"
        );
        let output = err.to_diagnostic().format(false);
        assert!(output.contains("cycle: acme/a -> acme/b -> acme/c -> acme/a"));
    }

    #[test]
    fn test_config_help_becomes_suggestion() {
        let err = Error::config_with_help("external import `acme/core` needs a manifest", suggestions::NO_MANIFEST);
        let output = err.to_diagnostic().format(false);
        assert!(output.contains("needs a manifest"));
        assert!(output.contains("help: Create a model.yaml"));
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(Error::network("acme/core", "timeout").is_transient());
        assert!(!Error::network_permanent("acme/core", "authentication required").is_transient());
        assert!(!Error::config("bad").is_transient());
        assert!(!Error::not_found("ref", "v9").is_transient());
    }
}
