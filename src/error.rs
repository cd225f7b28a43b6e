use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::diagnostic::Diagnostic;

/// Main error type: exactly one classification applies per failing call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XsdError {
    /// Internal or allocation failure inside libxml2, not attributable to input.
    #[error("Native engine error: {0}")]
    NativeEngine(String),

    #[error("Schema compile error: {}", single_line(.message))]
    SchemaCompile { message: String },

    #[error("Document parse error: {}", single_line(.message))]
    DocumentParse {
        kind: DocumentParseKind,
        message: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl XsdError {
    /// Diagnostics of a validation failure, empty for every other classification.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            XsdError::Validation(err) => err.diagnostics(),
            _ => &[],
        }
    }
}

/// Misuse of the engine or of a handle
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Libxml2 not initialized")]
    NotInitialized,

    #[error("Libxml2 already initialized")]
    AlreadyInitialized,

    #[error("Xsd handler not properly initialized")]
    SchemaNotInitialized,

    #[error("Xml handler not properly initialized")]
    DocumentNotInitialized,
}

/// Why a document could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentParseKind {
    /// Zero-length input, rejected before reaching the parser.
    Empty,
    /// Not well-formed XML.
    Malformed,
    /// Larger than the native parser's `int` length limit.
    TooLarge,
}

/// Schema violations found while validating one document, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    diagnostics: Vec<Diagnostic>,
}

impl ValidationError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Render with a caller-supplied formatter.
    ///
    /// The formatter is applied only when the returned value is displayed; the
    /// error itself is left untouched.
    ///
    /// ```
    /// use std::fmt;
    /// use xsd_validate::{Diagnostic, ValidationError};
    ///
    /// let err = ValidationError::new(Vec::new());
    /// let rendered = err
    ///     .display_with(|d: &[Diagnostic], f: &mut fmt::Formatter<'_>| write!(f, "{} problem(s)", d.len()))
    ///     .to_string();
    /// assert_eq!(rendered, "0 problem(s)");
    /// ```
    pub fn display_with<F: DiagnosticFormatter>(&self, formatter: F) -> Rendered<'_, F> {
        Rendered {
            error: self,
            formatter,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Custom rendering for [`ValidationError`]
pub trait DiagnosticFormatter {
    fn format(&self, diagnostics: &[Diagnostic], f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<F> DiagnosticFormatter for F
where
    F: Fn(&[Diagnostic], &mut fmt::Formatter<'_>) -> fmt::Result,
{
    fn format(&self, diagnostics: &[Diagnostic], f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self(diagnostics, f)
    }
}

/// A [`ValidationError`] paired with the formatter that displays it
pub struct Rendered<'a, F> {
    error: &'a ValidationError,
    formatter: F,
}

impl<F: DiagnosticFormatter> fmt::Display for Rendered<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.formatter.format(self.error.diagnostics(), f)
    }
}

fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, XsdError>;
