// ============================================================================
// ERROR TYPES
// ============================================================================
// Every fallible operation in the crate returns one of the enums below.
// They follow the same shape throughout: a plain enum, a Display impl with a
// short human-readable message, std::error::Error, and From conversions so
// the ? operator can lift lower-level errors.

use std::fmt;
use std::io;

use crate::extract::Shape;
use crate::registry::NamespaceId;

// ============================================================================
// WALKER / EXTRACTOR ERRORS
// ============================================================================

/// Errors raised while walking a connection table and emitting rows
///
/// === CONTRACT VIOLATIONS ===
/// `UnknownState` and `ShapeMismatch` mean the connection table handed us
/// something it promised it never would. They are reported as-is and abort
/// the current report read; the walker never substitutes a placeholder.
#[derive(Debug)]
pub enum ReportError {
    /// State code outside the known enumeration (state table out of sync
    /// with the network stack being observed)
    UnknownState(u8),

    /// The coarse state selected a shape the handle cannot provide
    ShapeMismatch { state: u8, shape: Shape },

    /// The output sink refused the write
    Format(fmt::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::UnknownState(code) => {
                write!(f, "unknown TCP state code {code} (state table out of sync)")
            }
            ReportError::ShapeMismatch { state, shape } => write!(
                f,
                "handle with state code {state} cannot be read as a {shape} connection"
            ),
            ReportError::Format(e) => write!(f, "failed to write report row: {e}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<fmt::Error> for ReportError {
    fn from(e: fmt::Error) -> Self {
        ReportError::Format(e)
    }
}

// ============================================================================
// REGISTRY ERRORS
// ============================================================================

/// Errors from attaching, detaching and reading per-namespace reports
#[derive(Debug)]
pub enum RegistryError {
    /// A report is already registered for this namespace
    AlreadyAttached(NamespaceId),

    /// No report is registered for this namespace
    NotAttached(NamespaceId),

    /// Registry is full; surfaced at attach time, never per row
    Exhausted { limit: usize },

    /// Walking the namespace's table failed
    Report(ReportError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyAttached(ns) => {
                write!(f, "report already attached for namespace {ns}")
            }
            RegistryError::NotAttached(ns) => write!(f, "no report attached for namespace {ns}"),
            RegistryError::Exhausted { limit } => {
                write!(f, "cannot register report: limit of {limit} namespaces reached")
            }
            RegistryError::Report(e) => write!(f, "report read failed: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Report(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReportError> for RegistryError {
    fn from(e: ReportError) -> Self {
        RegistryError::Report(e)
    }
}

// ============================================================================
// REPORT READER ERRORS
// ============================================================================

/// Errors from parsing a published report back into records
///
/// Line numbers are 1-based and count every physical line, header included.
#[derive(Debug)]
pub enum ParseError {
    Io(io::Error),

    /// Input was empty (or only blank lines)
    MissingHeader,

    /// First line is not the expected column header
    BadHeader(String),

    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A column value could not be parsed for its type
    Field {
        line: usize,
        column: &'static str,
        value: String,
    },

    UnknownState { line: usize, name: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "failed to read report: {e}"),
            ParseError::MissingHeader => write!(f, "report is empty (no header line)"),
            ParseError::BadHeader(found) => write!(f, "unexpected report header: {found:?}"),
            ParseError::ColumnCount {
                line,
                expected,
                found,
            } => write!(f, "line {line}: expected {expected} columns, found {found}"),
            ParseError::Field {
                line,
                column,
                value,
            } => write!(f, "line {line}: invalid value {value:?} for column {column}"),
            ParseError::UnknownState { line, name } => {
                write!(f, "line {line}: unknown TCP state {name:?}")
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Json(serde_json::Error),
    /// Parsed fine but a value is out of range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {e}"),
            ConfigError::Json(e) => write!(f, "malformed config: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}
