//! The URL trusted type and string sanitization for navigational
//! contexts.

use std::fmt;
use vellum_text::{OpaqueValue, Value};

/// Sentinel substituted for unsafe URLs.
pub const INVALID_URL: &str = "about:invalid#zGoSafez";

/// A URL safe for navigational and media contexts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct URL {
    s: String,
}

impl URL {
    pub fn from_constant(s: &'static str) -> URL {
        URL { s: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for URL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_url(s: impl Into<String>) -> URL {
    URL { s: s.into() }
}

impl OpaqueValue for URL {
    fn type_label(&self) -> &'static str {
        "safehtml.URL"
    }
    fn display_string(&self) -> String {
        self.s.clone()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<URL> for Value {
    fn from(v: URL) -> Value {
        Value::opaque(v)
    }
}

/// True when a full URL string is safe for navigational contexts: no
/// scheme, or one of the allowed schemes, or a media `data:` URL.
pub fn is_safe_url(s: &str) -> bool {
    let scheme_end = match s.find(|c| matches!(c, ':' | '/' | '?' | '#')) {
        Some(i) if s.as_bytes()[i] == b':' => i,
        _ => return true, // No scheme: relative URL.
    };
    let scheme = s[..scheme_end].to_ascii_lowercase();
    match scheme.as_str() {
        "http" | "https" | "ftp" | "mailto" => true,
        "data" => is_safe_media_data_url(&s[scheme_end + 1..]),
        _ => false,
    }
}

fn is_safe_media_data_url(rest: &str) -> bool {
    let lower = rest.to_ascii_lowercase();
    (lower.starts_with("image/") || lower.starts_with("video/") || lower.starts_with("audio/"))
        && lower.contains(";base64,")
}

/// Sanitize an arbitrary string into a URL, substituting the
/// `about:invalid` sentinel when the string is unsafe.
pub fn url_sanitized(s: &str) -> URL {
    if is_safe_url(s) {
        URL { s: s.to_string() }
    } else {
        URL { s: INVALID_URL.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_urls() {
        for input in [
            "http://www.foo.com/",
            "https://www.foo.com/path",
            "mailto:foo@foo.com",
            "ftp://foo.com/",
            "data:image/png;base64,abc",
            "data:video/mpeg;base64,abc",
            "data:audio/ogg;base64,abc",
            "//www.foo.com/",
            "/path",
            "?q=x",
            "#frag",
            "relative/path",
            "abc",
        ] {
            assert!(is_safe_url(input), "input: {input:?}");
        }
    }

    #[test]
    fn unsafe_urls() {
        for input in [
            "javascript:alert(1)",
            "tel:+1-234-567-8901",
            "data:image/png,abc",
            "data:text/html;base64,abc",
            "vbscript:x",
        ] {
            assert!(!is_safe_url(input), "input: {input:?}");
            assert_eq!(url_sanitized(input).as_str(), INVALID_URL);
        }
    }

    #[test]
    fn sanitized_passthrough() {
        assert_eq!(url_sanitized("/path?q=1").as_str(), "/path?q=1");
    }
}
