use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a single diagnostic, as reported by libxml2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Map a native `xmlErrorLevel`. Unknown levels (including `XML_ERR_NONE`)
    /// are treated as errors so they are never silently downgraded.
    pub(crate) fn from_level(level: i32) -> Self {
        match level {
            1 => Severity::Warning,
            3 => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// One structured record describing a single parse or validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Native error code (`xmlParserErrors`).
    pub code: i32,
    /// Message text with trailing newlines removed.
    pub message: String,
    pub severity: Severity,
    /// Line of the offending node, 0 when unknown.
    pub line: u32,
    /// Name of the offending node, empty when the engine reported none.
    pub node_name: String,
    /// Slash-joined names from the document root down to the offending node.
    pub path: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: {}", self.line, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}
