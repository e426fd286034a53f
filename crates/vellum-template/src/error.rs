//! Structured errors surfaced by parsing, escaping and execution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a template error, so callers can distinguish classes of
/// failure programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// An action follows an ambiguous URL prefix.
    AmbiguousUrlPrefix,
    /// Malformed HTML in literal template text.
    BadHtml,
    /// Sibling branches end in incompatible sanitization contexts.
    BranchContext,
    /// A template ends in a non-text context.
    EndContext,
    /// An action would affect an element or attribute name.
    ElementOrAttributeName,
    /// An action occurs in a context that can never be sanitized.
    DisallowedContext,
    /// An action occurs in an unquoted attribute value.
    UnquotedAttribute,
    /// Partial interpolation into an enumerated attribute value.
    PartialSubstitution,
    /// A predefined escaper appears before the end of a pipeline.
    PredefinedEscaper,
    /// A named template does not exist or has no body.
    NoSuchTemplate,
    /// No output context could be computed for a recursive template.
    OutputContext,
    /// Rejected by CSP-compatibility checking.
    CspCompatibility,
    /// Unbalanced JS template literals in a script element.
    UnbalancedJsTemplate,
    /// Underlying text-template parse failure.
    Parse,
    /// Runtime execution or sanitizer failure.
    Exec,
    /// Structural mutation attempted after the first execution.
    AfterExecute,
    /// Filesystem failure while loading template sources.
    Io,
}

/// Error with positional context. Escape-time errors carry the template
/// name and the 1-based line of the offending action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub template: String,
    pub line: usize,
    pub description: String,
}

impl Error {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            template: String::new(),
            line: 0,
            description: description.into(),
        }
    }

    pub fn at(mut self, template: &str, line: usize) -> Self {
        if self.template.is_empty() {
            self.template = template.to_string();
            self.line = line;
        }
        self
    }

    /// Wrap a fully formatted runtime message without re-prefixing.
    pub fn exec(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Exec, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == ErrorCode::Exec {
            return f.write_str(&self.description);
        }
        match (self.template.is_empty(), self.line) {
            (true, _) => write!(f, "template: {}", self.description),
            (false, 0) => write!(f, "template: {}: {}", self.template, self.description),
            (false, line) => write!(f, "template: {}:{}: {}", self.template, line, self.description),
        }
    }
}

impl std::error::Error for Error {}

impl From<vellum_text::ParseError> for Error {
    fn from(e: vellum_text::ParseError) -> Self {
        Error {
            code: ErrorCode::Parse,
            template: e.template,
            line: e.line,
            description: e.message,
        }
    }
}

impl From<vellum_text::ExecError> for Error {
    fn from(e: vellum_text::ExecError) -> Self {
        Error::exec(e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_location() {
        let e = Error::new(ErrorCode::BadHtml, "bad").at("t", 3);
        assert_eq!(e.to_string(), "template: t:3: bad");
    }

    #[test]
    fn exec_errors_pass_through() {
        let e = Error::exec("template: t:1:2: boom");
        assert_eq!(e.to_string(), "template: t:1:2: boom");
    }
}
