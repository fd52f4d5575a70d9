//! Non-fatal findings recorded while extracting a workbook.
//!
//! - **`DiagnosticKind`**: what went wrong (bad address, cycle, shadowed name, ...)
//! - **`Subject`**       : the smallest entity the finding is attached to
//! - **`Diagnostic`**    : kind + subject + severity + human message
//!
//! Diagnostics never abort processing; they travel alongside the model and
//! are serialized with it.

use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::address::Address;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DiagnosticKind {
    InvalidAddress,
    DuplicateCell,
    DuplicateSheet,
    FormulaParse,
    UnknownSheetReference,
    CircularReference,
    SelfReference,
    NameShadowed,
    NameUnresolved,
    InvalidTableRange,
    TableOverlap,
    OversizedMerge,
    RowSplit,
}

impl DiagnosticKind {
    /// Default severity for the kind; purely informational kinds describe
    /// layout decisions rather than defects in the input.
    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticKind::RowSplit => Severity::Info,
            _ => Severity::Warning,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::InvalidAddress => "invalid_address",
            DiagnosticKind::DuplicateCell => "duplicate_cell",
            DiagnosticKind::DuplicateSheet => "duplicate_sheet",
            DiagnosticKind::FormulaParse => "formula_parse",
            DiagnosticKind::UnknownSheetReference => "unknown_sheet_reference",
            DiagnosticKind::CircularReference => "circular_reference",
            DiagnosticKind::SelfReference => "self_reference",
            DiagnosticKind::NameShadowed => "name_shadowed",
            DiagnosticKind::NameUnresolved => "name_unresolved",
            DiagnosticKind::InvalidTableRange => "invalid_table_range",
            DiagnosticKind::TableOverlap => "table_overlap",
            DiagnosticKind::OversizedMerge => "oversized_merge",
            DiagnosticKind::RowSplit => "row_split",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Subject {
    Workbook,
    Sheet {
        sheet: String,
    },
    Cell {
        sheet: String,
        address: Address,
    },
    /// `scope` is `None` for workbook-scoped names.
    Name {
        name: String,
        scope: Option<String>,
    },
    Table {
        sheet: String,
        name: String,
    },
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Workbook => write!(f, "workbook"),
            Subject::Sheet { sheet } => write!(f, "sheet {sheet}"),
            Subject::Cell { sheet, address } => write!(f, "{sheet}!{address}"),
            Subject::Name {
                name,
                scope: Some(sheet),
            } => write!(f, "name {name} ({sheet})"),
            Subject::Name { name, scope: None } => write!(f, "name {name}"),
            Subject::Table { sheet, name } => write!(f, "table {name} ({sheet})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub subject: Subject,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: Subject) -> Self {
        Diagnostic {
            severity: kind.default_severity(),
            kind,
            subject,
            message: String::new(),
        }
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = msg.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Shorthand for a cell-scoped diagnostic.
    pub fn at_cell(kind: DiagnosticKind, sheet: impl Into<String>, address: Address) -> Self {
        Diagnostic::new(
            kind,
            Subject::Cell {
                sheet: sheet.into(),
                address,
            },
        )
    }

    pub fn on_sheet(kind: DiagnosticKind, sheet: impl Into<String>) -> Self {
        Diagnostic::new(
            kind,
            Subject::Sheet {
                sheet: sheet.into(),
            },
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}: {}", self.kind, self.subject)
        } else {
            write!(f, "{}: {}: {}", self.kind, self.subject, self.message)
        }
    }
}
