//! User-facing diagnostic messages.
//!
//! The library never prints errors itself. Every [`crate::Error`] converts to a
//! [`Diagnostic`] carrying the root cause, context lines and suggested fixes,
//! and the caller decides how (and whether) to render it.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no manifest file is found.
    pub const NO_MANIFEST: &str =
        "Create a model.yaml manifest in the workspace root to declare dependencies";

    /// Suggestion when the lockfile is stale or missing.
    pub const STALE_LOCK: &str = "Run `modelkit install` to refresh model.lock";

    /// Suggestion when a package is not found.
    pub const PACKAGE_NOT_FOUND: &str = "Run `modelkit tree` to see all dependencies";

    /// Suggestion when a dependency is missing.
    pub const MISSING_DEPENDENCY: &str =
        "Run `modelkit add <owner/repo>` to add it as a dependency";

    /// Suggestion for fetch failures.
    pub const FETCH_FAILED: &str = "Check your network connection and credentials, then retry";

    /// Suggestion for package cycles.
    pub const BREAK_CYCLE: &str = "Break the cycle by removing or restructuring dependencies";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn with_severity(message: impl Into<String>, severity: Severity) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(message, Severity::Error)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(message, Severity::Warning)
    }

    /// Create a new note.
    pub fn note(message: impl Into<String>) -> Self {
        Self::with_severity(message, Severity::Note)
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Render for a terminal.
    ///
    /// A single suggestion is shown inline as `help: ...`; several are
    /// numbered under `help: try one of:`.
    pub fn format(&self, color: bool) -> String {
        let paint = |code: &str, text: &str| {
            if color {
                format!("\x1b[1;{}m{}\x1b[0m", code, text)
            } else {
                text.to_string()
            }
        };
        let label = match self.severity {
            Severity::Error => paint("31", "error"),
            Severity::Warning => paint("33", "warning"),
            Severity::Note => paint("36", "note"),
        };

        let mut out = format!("{}: {}\n", label, self.message);
        if let Some(path) = &self.location {
            out += &format!("  --> {}\n", path.display());
        }
        for line in &self.context {
            out += &format!("  = {}\n", line);
        }

        let help = paint("32", "help");
        match self.suggestions.as_slice() {
            [] => {}
            [only] => out += &format!("{}: {}\n", help, only),
            many => {
                out += &format!("{}: try one of:\n", help);
                for (i, suggestion) in many.iter().enumerate() {
                    out += &format!("  {}. {}\n", i + 1, suggestion);
                }
            }
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
