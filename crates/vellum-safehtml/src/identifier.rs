//! The Identifier trusted type.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use vellum_text::{OpaqueValue, Value};

/// An HTML id or name: an ASCII letter followed by ASCII alphanumerics,
/// `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Identifier {
    s: String,
}

static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("static pattern"));

fn is_alphanumeric_value(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

impl Identifier {
    /// Wrap a compile-time constant identifier. Aborts on values that do
    /// not match the identifier pattern.
    pub fn from_constant(s: &'static str) -> Identifier {
        if !IDENTIFIER_PATTERN.is_match(s) {
            panic!("invalid identifier {s:?}");
        }
        Identifier { s: s.to_string() }
    }

    /// Join a constant prefix and a runtime value as `prefix-value`.
    /// The prefix must match the identifier pattern; the value may only
    /// contain ASCII alphanumerics, `-` and `_`.
    pub fn from_constant_prefix(prefix: &'static str, value: &str) -> Identifier {
        if !IDENTIFIER_PATTERN.is_match(prefix) {
            panic!("invalid prefix {prefix:?}");
        }
        if !is_alphanumeric_value(value) {
            panic!("value {value:?} contains non-alphanumeric runes");
        }
        Identifier {
            s: format!("{prefix}-{value}"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_identifier(s: impl Into<String>) -> Identifier {
    Identifier { s: s.into() }
}

impl OpaqueValue for Identifier {
    fn type_label(&self) -> &'static str {
        "safehtml.Identifier"
    }
    fn display_string(&self) -> String {
        self.s.clone()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<Identifier> for Value {
    fn from(v: Identifier) -> Value {
        Value::opaque(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_constants() {
        for input in ["foo", "F0ob4r", "foo-bar", "foo--bar", "foo-bar-baz", "foo-bar_baz"] {
            assert_eq!(IDENTIFIER_PATTERN.is_match(input), true, "input: {input:?}");
        }
        assert_eq!(Identifier::from_constant("foo-bar").as_str(), "foo-bar");
    }

    #[test]
    fn invalid_constants() {
        for input in ["foo!", "foo ", "fo o", " foo", "foo\t", "4wesome", ""] {
            assert!(!IDENTIFIER_PATTERN.is_match(input), "input: {input:?}");
        }
    }

    #[test]
    #[should_panic(expected = "invalid identifier")]
    fn from_constant_panics() {
        Identifier::from_constant("4wesome");
    }

    #[test]
    fn from_constant_prefix_joins() {
        for (prefix, value, want) in [
            ("foo", "bar", "foo-bar"),
            ("foo", "-bar", "foo--bar"),
            ("foo", "bar-baz", "foo-bar-baz"),
            ("foo", "bar_baz-", "foo-bar_baz-"),
            ("foo", "", "foo-"),
        ] {
            assert_eq!(Identifier::from_constant_prefix(prefix, value).as_str(), want);
        }
    }

    #[test]
    #[should_panic(expected = "invalid prefix")]
    fn from_constant_prefix_rejects_bad_prefix() {
        Identifier::from_constant_prefix("4wesome", "bar");
    }

    #[test]
    #[should_panic(expected = "contains non-alphanumeric runes")]
    fn from_constant_prefix_rejects_bad_value() {
        Identifier::from_constant_prefix("foo", "bar!");
    }
}
