//! The HTML trusted type.

use crate::coerce::coerce_to_utf8_interchange_valid;
use std::fmt;
use vellum_text::{OpaqueValue, Value};

/// A fragment known to be safe to insert into HTML element content.
///
/// Immutable; equal by contained string. There is no public
/// string-accepting constructor: values come from constants, from the
/// builders in this crate, or from the quarantined [`crate::unchecked`]
/// module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct HTML {
    s: String,
}

impl HTML {
    /// Wrap a compile-time constant. Trust derives from literalness.
    pub fn from_constant(s: &'static str) -> HTML {
        HTML { s: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for HTML {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_html(s: impl Into<String>) -> HTML {
    HTML { s: s.into() }
}

impl OpaqueValue for HTML {
    fn type_label(&self) -> &'static str {
        "safehtml.HTML"
    }
    fn display_string(&self) -> String {
        self.s.clone()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<HTML> for Value {
    fn from(h: HTML) -> Value {
        Value::opaque(h)
    }
}

/// HTML-escape `text` after coercing it to interchange-valid UTF-8.
/// The five significant characters become numeric or named references.
pub fn html_escaped(text: &str) -> HTML {
    HTML {
        s: escape_chars(&coerce_to_utf8_interchange_valid(text)),
    }
}

pub(crate) fn escape_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Concatenate without re-escaping.
pub fn html_concat(htmls: &[HTML]) -> HTML {
    let mut s = String::new();
    for h in htmls {
        s.push_str(h.as_str());
    }
    HTML { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"<>'"&"#;
    const ESCAPED: &str = "&lt;&gt;&#39;&#34;&amp;";

    #[test]
    fn escaped() {
        assert_eq!(html_escaped(RAW).as_str(), ESCAPED);
    }

    #[test]
    fn escaping_escaped_output_is_stable_modulo_amp() {
        // Escaping is not an involution on its own output, but produces
        // no unescaped significant characters.
        let twice = html_escaped(html_escaped("<").as_str());
        assert!(!twice.as_str().contains('<'));
    }

    #[test]
    fn concat() {
        for (input, want) in [
            (vec![], ""),
            (vec![""], ""),
            (vec!["Hello world!"], "Hello world!"),
            (vec!["Hello", " ", "world!"], "Hello world!"),
        ] {
            let htmls: Vec<HTML> = input.iter().map(|s| raw_html(*s)).collect();
            assert_eq!(html_concat(&htmls).as_str(), want);
        }
    }

    #[test]
    fn coercion_applies_during_escape() {
        assert_eq!(html_escaped("\u{0}").as_str(), "\u{FFFD}");
    }

    #[test]
    fn from_constant_round_trips() {
        const S: &str = "<b>constant</b>";
        assert_eq!(HTML::from_constant(S).as_str(), S);
        assert_eq!(HTML::from_constant(S).to_string(), S);
    }
}
