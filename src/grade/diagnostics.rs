#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fmt::{self, Display},
    path::Path,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tabled::Tabled;
use typed_builder::TypedBuilder;

#[derive(Tabled, Serialize, Deserialize, TypedBuilder, Clone, Debug, PartialEq, Eq)]
#[builder(field_defaults(setter(into)))]
#[builder(doc)]
/// A struct representing a javac diagnostic message
pub struct JavacDiagnostic {
    /// * `path`: path to the file diagnostic is referring to
    #[tabled(rename = "File")]
    path:        String,
    /// * `file_name`: name of the file the diagnostic is about
    #[tabled(skip)]
    file_name:   String,
    /// Type of diagnostic (error or warning).
    #[tabled(skip)]
    severity:    DiagnosticSeverity,
    /// * `line_number`: line number
    #[tabled(rename = "Line")]
    line_number: u32,
    /// * `message`: the diagnostic message
    #[tabled(rename = "Message")]
    message:     String,
}

impl JavacDiagnostic {
    /// Returns the file name
    pub fn file_name(&self) -> &str {
        self.file_name.as_ref()
    }

    /// Returns the path to the diagnostic’s file.
    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }

    /// Returns the severity of the diagnostic.
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    /// Returns the 1-based line number.
    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    /// Returns the message text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for JavacDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.file_name,
            self.line_number,
            self.severity.as_str().to_lowercase(),
            self.message
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Severity of a diagnostic emitted by `javac`.
pub enum DiagnosticSeverity {
    /// Diagnostic raised as an error.
    Error,
    /// Diagnostic raised as a warning.
    Warning,
}

impl DiagnosticSeverity {
    /// Canonical upper-case spelling.
    fn as_str(self) -> &'static str {
        match self {
            DiagnosticSeverity::Error => "ERROR",
            DiagnosticSeverity::Warning => "WARNING",
        }
    }

    /// Indicates whether the severity represents an error.
    pub fn is_error(self) -> bool {
        matches!(self, DiagnosticSeverity::Error)
    }
}

impl From<bool> for DiagnosticSeverity {
    fn from(value: bool) -> Self {
        if value {
            DiagnosticSeverity::Error
        } else {
            DiagnosticSeverity::Warning
        }
    }
}

impl Serialize for DiagnosticSeverity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DiagnosticSeverity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "ERROR" => Ok(DiagnosticSeverity::Error),
            "WARNING" => Ok(DiagnosticSeverity::Warning),
            other => Err(de::Error::custom(format!("Unknown diagnostic severity: {other}"))),
        }
    }
}

impl Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
